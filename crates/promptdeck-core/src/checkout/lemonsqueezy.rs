//! LemonSqueezy checkout API client.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{error, info};

use super::{CheckoutError, CheckoutProvider, CheckoutRequest, PlanType};

pub const DEFAULT_BASE_URL: &str = "https://api.lemonsqueezy.com/v1";
const JSON_API: &str = "application/vnd.api+json";

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub api_key: String,
    pub store_id: String,
    pub weekly_variant_id: Option<String>,
    pub monthly_variant_id: Option<String>,
    pub base_url: String,
}

impl CheckoutConfig {
    pub fn variant_for(&self, plan: PlanType) -> Result<&str, CheckoutError> {
        let variant = match plan {
            PlanType::Weekly => self.weekly_variant_id.as_deref(),
            PlanType::Monthly => self.monthly_variant_id.as_deref(),
        };
        variant
            .filter(|v| !v.is_empty())
            .ok_or(CheckoutError::VariantNotConfigured(plan))
    }
}

/// JSON:API document for `POST /checkouts`.
fn checkout_body(store_id: &str, variant_id: &str, email: Option<&str>, user_id: &str) -> Value {
    let mut checkout_data = json!({ "custom": { "user_id": user_id } });
    if let Some(email) = email.filter(|e| !e.is_empty()) {
        checkout_data["email"] = json!(email);
    }

    json!({
        "data": {
            "type": "checkouts",
            "attributes": { "checkout_data": checkout_data },
            "relationships": {
                "store": { "data": { "type": "stores", "id": store_id } },
                "variant": { "data": { "type": "variants", "id": variant_id } }
            }
        }
    })
}

pub struct LemonSqueezyClient {
    http: Client,
    config: CheckoutConfig,
}

impl LemonSqueezyClient {
    pub fn new(config: CheckoutConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CheckoutProvider for LemonSqueezyClient {
    fn name(&self) -> &str {
        "lemonsqueezy"
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String, CheckoutError> {
        let variant_id = self.config.variant_for(request.plan)?;
        let body = checkout_body(
            &self.config.store_id,
            variant_id,
            request.email.as_deref(),
            &request.user_id,
        );

        let response = self
            .http
            .post(format!("{}/checkouts", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .header(reqwest::header::CONTENT_TYPE, JSON_API)
            .header(reqwest::header::ACCEPT, JSON_API)
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            error!(status = status.as_u16(), body = %text, "checkout API error");
            return Err(CheckoutError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let document: Value = response.json().await?;
        let url = document
            .pointer("/data/attributes/url")
            .and_then(Value::as_str)
            .ok_or(CheckoutError::MissingUrl)?;

        info!(user_id = %request.user_id, plan = %request.plan, "created checkout");
        Ok(url.to_owned())
    }
}
