//! OpenAI-compatible chat completion client (Groq by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatMessage, CompletionError, CompletionProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl CompletionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

pub struct GroqClient {
    http: Client,
    config: CompletionConfig,
}

impl GroqClient {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

/// Turn a raw HTTP answer into a reply or an error.
///
/// A reply in `choices[0]` wins regardless of status. Otherwise an `error`
/// payload is reported with its message, then a bare non-success status.
fn interpret_response(status: StatusCode, body: &str) -> Result<String, CompletionError> {
    let parsed = match serde_json::from_str::<ChatResponse>(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => {
            return Err(CompletionError::InvalidResponse(e.to_string()));
        }
        Err(_) => ChatResponse::default(),
    };

    let reply = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.is_empty());
    if let Some(reply) = reply {
        return Ok(reply);
    }

    if let Some(error) = parsed.error {
        return Err(CompletionError::Api {
            status: status.as_u16(),
            message: error.message.unwrap_or_else(|| "Unknown".to_owned()),
        });
    }

    if !status.is_success() {
        return Err(CompletionError::Api {
            status: status.as_u16(),
            message: body.trim().to_owned(),
        });
    }

    Err(CompletionError::EmptyReply)
}

#[async_trait]
impl CompletionProvider for GroqClient {
    fn name(&self) -> &str {
        "groq"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        debug!(model = %self.config.model, messages = messages.len(), "sending completion request");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let result = interpret_response(status, &body);
        if let Err(e) = &result {
            warn!(status = status.as_u16(), error = %e, "completion request failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_openai_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let body = serde_json::to_value(ChatRequest {
            model: DEFAULT_MODEL,
            messages: &messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        })
        .unwrap();
        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn reply_is_taken_from_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello"}}]}"#;
        assert_eq!(interpret_response(StatusCode::OK, body).unwrap(), "Hello");
    }

    #[test]
    fn error_payload_is_surfaced() {
        let body = r#"{"error":{"message":"rate limited","type":"tokens"}}"#;
        match interpret_response(StatusCode::TOO_MANY_REQUESTS, body) {
            Err(CompletionError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn non_json_failure_keeps_body_text() {
        match interpret_response(StatusCode::BAD_GATEWAY, "upstream down") {
            Err(CompletionError::Api { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_choices_is_empty_reply() {
        assert!(matches!(
            interpret_response(StatusCode::OK, r#"{"choices":[]}"#),
            Err(CompletionError::EmptyReply)
        ));
        assert!(matches!(
            interpret_response(StatusCode::OK, "not json"),
            Err(CompletionError::InvalidResponse(_))
        ));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let mut config = CompletionConfig::new("key");
        config.base_url = "http://localhost:8080/v1/".into();
        let client = GroqClient::new(config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
