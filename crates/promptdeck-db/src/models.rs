use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Subscription tier of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Trial,
    Weekly,
    Pro,
    Expired,
    Free,
}

impl Plan {
    /// Plans whose balance is topped up daily rather than by a payment.
    pub fn resets_daily(self) -> bool {
        matches!(self, Self::Trial | Self::Free)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trial => "trial",
            Self::Weekly => "weekly",
            Self::Pro => "pro",
            Self::Expired => "expired",
            Self::Free => "free",
        };
        f.write_str(s)
    }
}

impl FromStr for Plan {
    type Err = PlanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial" => Ok(Self::Trial),
            "weekly" => Ok(Self::Weekly),
            "pro" => Ok(Self::Pro),
            "expired" => Ok(Self::Expired),
            "free" => Ok(Self::Free),
            other => Err(PlanParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Plan`] string.
#[derive(Debug, Clone)]
pub struct PlanParseError(pub String);

impl fmt::Display for PlanParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan: {:?}", self.0)
    }
}

impl std::error::Error for PlanParseError {}

// ---------------------------------------------------------------------------
// Variable bags
// ---------------------------------------------------------------------------

/// A single value in a client profile's structured data.
///
/// Only strings and numbers are accepted; anything else fails to
/// deserialize, both from request bodies and from the `clients.data` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientValue {
    Text(String),
    Number(serde_json::Number),
}

impl fmt::Display for ClientValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for ClientValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for ClientValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

/// Structured data attached to a client profile.
pub type ClientData = BTreeMap<String, ClientValue>;

/// Variables recorded alongside a generated response.
pub type InputVariables = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// An account with its plan and credit balance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub plan: Plan,
    pub credits: i32,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub last_credit_reset: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Whether the account is on a trial whose end date has passed.
    pub fn trial_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.plan == Plan::Trial && self.trial_ends_at.is_some_and(|ends| now > ends)
    }
}

/// A stored prompt. Text may contain `{identifier}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptTemplate {
    pub id: Uuid,
    /// `None` for shared templates visible to every account.
    pub owner_id: Option<Uuid>,
    pub text: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// An AI reply together with the variables that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GeneratedResponse {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub owner_id: Uuid,
    pub input_variables: Json<InputVariables>,
    pub ai_reply: String,
    pub created_at: DateTime<Utc>,
}

/// A response joined with the prompt it answers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SavedPrompt {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub input_variables: Json<InputVariables>,
    pub ai_reply: String,
    pub created_at: DateTime<Utc>,
    pub prompt_text: String,
    pub category: String,
    pub sub_category: Option<String>,
    pub favorite: bool,
}

/// A named set of per-customer values used to prefill template variables.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClientProfile {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub data: Json<ClientData>,
    pub created_at: DateTime<Utc>,
}

/// A reusable instruction prefix owned by one account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Persona {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
}

/// A payment webhook exactly as it was received.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookEvent {
    pub id: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
