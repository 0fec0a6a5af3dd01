pub mod billing;
pub mod checkout;
pub mod completion;
pub mod generate;
pub mod persona;
pub mod session;
pub mod template;
