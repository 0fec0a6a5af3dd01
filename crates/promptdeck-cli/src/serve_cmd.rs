use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use promptdeck_core::billing::{self, SIGNATURE_HEADER, WebhookConfig, WebhookError};
use promptdeck_core::checkout::{CheckoutError, CheckoutProvider, CheckoutRequest, PlanType};
use promptdeck_core::completion::CompletionProvider;
use promptdeck_core::generate::{GenerateError, GenerateRequest, Generation, GenerationService};
use promptdeck_core::session::{SessionConfig, validate_session_token};
use promptdeck_db::models::Profile;
use promptdeck_db::queries::profiles;

use crate::content_routes;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<GenerateError> for AppError {
    fn from(err: GenerateError) -> Self {
        let status = match &err {
            GenerateError::Validation(_) => StatusCode::BAD_REQUEST,
            GenerateError::InsufficientCredits | GenerateError::TrialExpired => StatusCode::FORBIDDEN,
            GenerateError::ProfileNotFound | GenerateError::NotFound(_) => StatusCode::NOT_FOUND,
            GenerateError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GenerateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Signature(_) => Self::bad_request("Invalid signature"),
            // Only a bad signature is the sender's fault.
            WebhookError::MalformedPayload(e) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("Invalid payload: {e}"),
            },
            WebhookError::Storage(e) => Self::internal(e),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        if err.is_invalid_plan() {
            return Self::bad_request(err.to_string());
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// JSON body whose rejection renders as `{"error": ...}`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Caller identified by a `Bearer` session token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Missing bearer token"))?;

        let user_id = validate_session_token(&state.session, token.trim()).map_err(|e| {
            debug!(error = %e, "rejected session token");
            AppError::unauthorized("Invalid session token")
        })?;
        Ok(Self(user_id))
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub session: Arc<SessionConfig>,
    pub webhook: Arc<WebhookConfig>,
    pub generation: GenerationService,
    pub checkout: Arc<dyn CheckoutProvider>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        session: SessionConfig,
        webhook: WebhookConfig,
        completion: Arc<dyn CompletionProvider>,
        checkout: Arc<dyn CheckoutProvider>,
    ) -> Self {
        Self {
            generation: GenerationService::new(pool.clone(), completion),
            pool,
            session: Arc::new(session),
            webhook: Arc::new(webhook),
            checkout,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub plan_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/me", get(me))
        .route("/api/generate", post(generate))
        .route("/api/checkout", post(create_checkout))
        .route("/api/webhooks/lemonsqueezy", post(lemonsqueezy_webhook))
        .merge(content_routes::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("promptdeck serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("promptdeck serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn me(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> Result<Json<Profile>, AppError> {
    let profile = profiles::get_profile(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    Ok(Json(profile))
}

async fn generate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(request): ApiJson<GenerateRequest>,
) -> Result<Json<Generation>, AppError> {
    let generation = state.generation.generate(user_id, &request).await?;
    Ok(Json(generation))
}

async fn lemonsqueezy_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    billing::process_webhook(&state.pool, &state.webhook, &body, signature).await?;
    Ok(Json(serde_json::json!({ "received": true })))
}

async fn create_checkout(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CheckoutBody>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let user_id = body
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("userId is required"))?;
    let plan: PlanType = body.plan_type.as_deref().unwrap_or_default().parse()?;

    let request = CheckoutRequest {
        email: body.email,
        user_id,
        plan,
    };
    let url = state.checkout.create_checkout(&request).await.map_err(|e| {
        warn!(provider = state.checkout.name(), plan = %plan, error = %e, "checkout failed");
        AppError::from(e)
    })?;
    Ok(Json(CheckoutResponse { url }))
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, header};
    use sqlx::PgPool;
    use tower::ServiceExt;

    use promptdeck_core::billing::{DAILY_CREDITS, TRIAL_DAYS, WebhookConfig};
    use promptdeck_core::checkout::{CheckoutError, CheckoutProvider, CheckoutRequest, PlanType};
    use promptdeck_core::completion::{ChatMessage, CompletionError, CompletionProvider};
    use promptdeck_core::session::{SessionConfig, generate_session_token};
    use promptdeck_db::models::Profile;
    use promptdeck_db::queries::profiles;

    use super::AppState;

    pub const WEBHOOK_SECRET: &[u8] = b"whsec_test";
    pub const WEEKLY_VARIANT: &str = "111";

    /// Replies with the last message it was sent.
    pub struct EchoProvider;

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            Ok(format!("echo: {last}"))
        }
    }

    pub struct RateLimitedProvider;

    #[async_trait]
    impl CompletionProvider for RateLimitedProvider {
        fn name(&self) -> &str {
            "rate-limited"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, CompletionError> {
            Err(CompletionError::Api {
                status: 429,
                message: "Rate limit reached".into(),
            })
        }
    }

    /// Weekly checkouts succeed; monthly ones fail the way a closed store does.
    pub struct FakeCheckout;

    #[async_trait]
    impl CheckoutProvider for FakeCheckout {
        fn name(&self) -> &str {
            "fake"
        }

        async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String, CheckoutError> {
            match request.plan {
                PlanType::Weekly => Ok(format!(
                    "https://checkout.test/{}/{}",
                    request.plan, request.user_id
                )),
                PlanType::Monthly => Err(CheckoutError::Api {
                    status: 422,
                    body: "store is closed".into(),
                }),
            }
        }
    }

    pub fn session() -> SessionConfig {
        SessionConfig::new(vec![7u8; 32])
    }

    pub fn state_with(pool: PgPool, completion: Arc<dyn CompletionProvider>) -> AppState {
        AppState::new(
            pool,
            session(),
            WebhookConfig {
                secret: WEBHOOK_SECRET.to_vec(),
                weekly_variant_id: Some(WEEKLY_VARIANT.to_owned()),
            },
            completion,
            Arc::new(FakeCheckout),
        )
    }

    pub fn app(pool: PgPool) -> Router {
        super::build_router(state_with(pool, Arc::new(EchoProvider)))
    }

    /// A fresh trial account and a bearer token for it.
    pub async fn account(pool: &PgPool, email: &str) -> (Profile, String) {
        let profile = profiles::insert_trial_profile(pool, email, DAILY_CREDITS, TRIAL_DAYS)
            .await
            .unwrap();
        let token = generate_session_token(&session(), profile.id);
        (profile, token)
    }

    pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
        app.clone().oneshot(request).await.unwrap()
    }

    pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
