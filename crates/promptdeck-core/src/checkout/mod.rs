//! Hosted checkout creation for plan upgrades.

pub mod lemonsqueezy;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use lemonsqueezy::{CheckoutConfig, LemonSqueezyClient};

/// A purchasable plan as named by callers of the checkout endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Weekly,
    Monthly,
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        })
    }
}

impl FromStr for PlanType {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(CheckoutError::UnknownPlan(other.to_owned())),
        }
    }
}

/// Who is checking out and for what.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub email: Option<String>,
    pub user_id: String,
    pub plan: PlanType,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Invalid plan type: {0}")]
    UnknownPlan(String),

    #[error("no variant configured for the {0} plan")]
    VariantNotConfigured(PlanType),

    #[error("checkout request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx from the provider; `body` is its response text.
    #[error("{body}")]
    Api { status: u16, body: String },

    #[error("checkout response carried no URL")]
    MissingUrl,
}

impl CheckoutError {
    /// Whether the caller asked for something that cannot be sold.
    pub fn is_invalid_plan(&self) -> bool {
        matches!(self, Self::UnknownPlan(_) | Self::VariantNotConfigured(_))
    }
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Create a hosted checkout and return its URL.
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String, CheckoutError>;
}
