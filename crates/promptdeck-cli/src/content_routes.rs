//! Saved prompts, templates, clients and personas. Every route is scoped to
//! the authenticated caller; rows owned by someone else read as not found.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use promptdeck_core::generate::{CATEGORY_KEY, TEXT_KEY, TemplateRun, TemplateRunOutcome, display_prompt};
use promptdeck_core::persona::{PersonaListing, with_default_persona};
use promptdeck_core::template::extract_variables;
use promptdeck_db::models::{
    ClientData, ClientProfile, InputVariables, Persona, PromptTemplate, SavedPrompt,
};
use promptdeck_db::queries::prompts::{NewPrompt, PromptUpdate};
use promptdeck_db::queries::responses::SavedPromptEdit;
use promptdeck_db::queries::{clients, personas, prompts, responses};

use crate::serve_cmd::{ApiJson, AppError, AppState, AuthUser};

const DEFAULT_CATEGORY: &str = "general";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/prompts", post(save_prompt))
        .route("/api/responses", get(list_responses))
        .route("/api/responses/{id}", patch(edit_response).delete(delete_response))
        .route("/api/responses/{id}/favorite", post(set_favorite))
        .route("/api/responses/{id}/reply", post(regenerate_reply))
        .route("/api/templates", get(list_templates))
        .route("/api/templates/{id}/run", post(run_template))
        .route("/api/clients", get(list_clients).post(create_client))
        .route("/api/clients/{id}", put(update_client).delete(delete_client))
        .route("/api/personas", get(list_personas).post(create_persona))
        .route("/api/personas/{id}", put(update_persona).delete(delete_persona))
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePromptBody {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponseBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub sub_category: Option<Option<String>>,
    #[serde(default)]
    pub ai_reply: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteBody {
    /// Omitted means toggle.
    #[serde(default)]
    pub favorite: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyBody {
    #[serde(default)]
    pub persona_id: Option<Uuid>,
    #[serde(default)]
    pub persona_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: ClientData,
}

#[derive(Debug, Deserialize)]
pub struct PersonaBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instructions: String,
}

#[derive(Debug, Serialize)]
pub struct SavedPromptView {
    #[serde(flatten)]
    pub saved: SavedPrompt,
    pub display_prompt: String,
}

impl From<SavedPrompt> for SavedPromptView {
    fn from(saved: SavedPrompt) -> Self {
        Self {
            display_prompt: display_prompt(&saved),
            saved,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TemplateView {
    #[serde(flatten)]
    pub template: PromptTemplate,
    pub variables: Vec<String>,
}

fn require(value: &str, what: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::bad_request(format!("{what} is required")));
    }
    Ok(())
}

async fn load_saved(state: &AppState, id: Uuid, user_id: Uuid) -> Result<SavedPrompt, AppError> {
    responses::get_saved_prompt(&state.pool, id, user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("Response not found"))
}

// ---------------------------------------------------------------------------
// Saved prompts
// ---------------------------------------------------------------------------

async fn save_prompt(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<SavePromptBody>,
) -> Result<impl IntoResponse, AppError> {
    require(&body.text, "Prompt text")?;
    let category = body
        .category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned());

    let prompt = prompts::insert_prompt(
        &state.pool,
        Some(user_id),
        &NewPrompt {
            text: &body.text,
            category: &category,
            sub_category: body.sub_category.as_deref(),
        },
    )
    .await
    .map_err(AppError::internal)?;

    let input_variables = InputVariables::from([
        (TEXT_KEY.to_owned(), body.text.clone()),
        (CATEGORY_KEY.to_owned(), category),
    ]);
    let response = responses::insert_response(&state.pool, prompt.id, user_id, &input_variables, "")
        .await
        .map_err(AppError::internal)?;

    let saved = load_saved(&state, response.id, user_id).await?;
    Ok((StatusCode::CREATED, Json(SavedPromptView::from(saved))))
}

async fn list_responses(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<SavedPromptView>>, AppError> {
    let saved = responses::list_saved_prompts(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(saved.into_iter().map(SavedPromptView::from).collect()))
}

async fn edit_response(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<EditResponseBody>,
) -> Result<Json<SavedPromptView>, AppError> {
    if let Some(text) = &body.text {
        require(text, "Prompt text")?;
    }
    let update = PromptUpdate {
        text: body.text,
        category: body.category,
        sub_category: body.sub_category,
    };
    if update.is_empty() && body.ai_reply.is_none() {
        return Err(AppError::bad_request("Nothing to update"));
    }

    let edit = responses::update_saved_prompt(&state.pool, id, user_id, &update, body.ai_reply.as_deref())
        .await
        .map_err(AppError::internal)?;
    match edit {
        SavedPromptEdit::Updated => {}
        SavedPromptEdit::NotFound => return Err(AppError::not_found("Response not found")),
        SavedPromptEdit::SharedPrompt => {
            return Err(AppError::bad_request("Shared templates cannot be edited"));
        }
    }

    let saved = load_saved(&state, id, user_id).await?;
    Ok(Json(saved.into()))
}

async fn delete_response(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = responses::delete_saved_prompt(&state.pool, id, user_id)
        .await
        .map_err(AppError::internal)?;
    if !deleted {
        return Err(AppError::not_found("Response not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn set_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<FavoriteBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let favorite = match body.favorite {
        Some(favorite) => favorite,
        None => !load_saved(&state, id, user_id).await?.favorite,
    };

    let updated = responses::set_favorite(&state.pool, id, user_id, favorite)
        .await
        .map_err(AppError::internal)?;
    if !updated {
        // The response exists but its prompt is a shared template.
        load_saved(&state, id, user_id).await?;
        return Err(AppError::bad_request("Shared templates cannot be bookmarked"));
    }
    Ok(Json(serde_json::json!({ "favorite": favorite })))
}

async fn regenerate_reply(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<ReplyBody>,
) -> Result<Json<SavedPromptView>, AppError> {
    let persona_instructions = match body.persona_id {
        Some(persona_id) => Some(
            personas::get_persona(&state.pool, persona_id, user_id)
                .await
                .map_err(AppError::internal)?
                .ok_or_else(|| AppError::not_found("Persona not found"))?
                .instructions,
        ),
        None => body.persona_instructions,
    };

    let saved = state
        .generation
        .regenerate_reply(user_id, id, persona_instructions)
        .await?;
    Ok(Json(saved.into()))
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

async fn list_templates(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<TemplateQuery>,
) -> Result<Json<Vec<TemplateView>>, AppError> {
    let category = query.category.as_deref().filter(|c| !c.trim().is_empty());
    let templates = prompts::list_templates(&state.pool, user_id, category)
        .await
        .map_err(AppError::internal)?;

    let views = templates
        .into_iter()
        .map(|template| TemplateView {
            variables: extract_variables(&template.text),
            template,
        })
        .collect();
    Ok(Json(views))
}

async fn run_template(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(run): ApiJson<TemplateRun>,
) -> Result<Json<TemplateRunOutcome>, AppError> {
    let outcome = state.generation.run_template(user_id, id, &run).await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

async fn list_clients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ClientProfile>>, AppError> {
    let clients = clients::list_clients(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(clients))
}

async fn create_client(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<ClientBody>,
) -> Result<impl IntoResponse, AppError> {
    require(&body.name, "Client name")?;
    let client = clients::insert_client(&state.pool, user_id, body.name.trim(), &body.data)
        .await
        .map_err(AppError::internal)?;
    Ok((StatusCode::CREATED, Json(client)))
}

async fn update_client(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<ClientBody>,
) -> Result<Json<ClientProfile>, AppError> {
    require(&body.name, "Client name")?;
    let client = clients::update_client(&state.pool, id, user_id, body.name.trim(), &body.data)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("Client not found"))?;
    Ok(Json(client))
}

async fn delete_client(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = clients::delete_client(&state.pool, id, user_id)
        .await
        .map_err(AppError::internal)?;
    if deleted == 0 {
        return Err(AppError::not_found("Client not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Personas
// ---------------------------------------------------------------------------

async fn list_personas(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<PersonaListing>>, AppError> {
    let stored = personas::list_personas(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(with_default_persona(stored)))
}

async fn create_persona(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(body): ApiJson<PersonaBody>,
) -> Result<impl IntoResponse, AppError> {
    require(&body.name, "Persona name")?;
    require(&body.instructions, "Persona instructions")?;
    let persona = personas::insert_persona(&state.pool, user_id, body.name.trim(), &body.instructions)
        .await
        .map_err(AppError::internal)?;
    Ok((StatusCode::CREATED, Json(persona)))
}

async fn update_persona(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<PersonaBody>,
) -> Result<Json<Persona>, AppError> {
    require(&body.name, "Persona name")?;
    require(&body.instructions, "Persona instructions")?;
    let persona = personas::update_persona(&state.pool, id, user_id, body.name.trim(), &body.instructions)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("Persona not found"))?;
    Ok(Json(persona))
}

async fn delete_persona(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = personas::delete_persona(&state.pool, id, user_id)
        .await
        .map_err(AppError::internal)?;
    if deleted == 0 {
        return Err(AppError::not_found("Persona not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
