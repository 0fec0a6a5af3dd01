pub mod clients;
pub mod personas;
pub mod profiles;
pub mod prompts;
pub mod responses;
pub mod webhook_events;
