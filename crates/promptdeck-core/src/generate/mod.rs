//! Prompt generation: credit gating, message assembly and persistence.
//!
//! Every path that calls the completion backend goes through
//! [`GenerationService::charge`] first, which checks the trial clock and then
//! takes exactly one credit with a single conditional UPDATE. Request
//! validation happens before the charge, so a rejected request costs
//! nothing. A failed upstream call does not refund the credit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use promptdeck_db::models::{
    ClientProfile, GeneratedResponse, InputVariables, PromptTemplate, SavedPrompt,
};
use promptdeck_db::queries::prompts::NewPrompt;
use promptdeck_db::queries::{clients, personas, profiles, prompts, responses};

use crate::completion::{ChatMessage, CompletionError, CompletionProvider};
use crate::persona::system_instruction;
use crate::template::{
    TemplateError, VariableForm, extract_variables, humanize, resolve_prompt, substitute,
};

/// Stored variable holding the prompt text as submitted.
pub const TEXT_KEY: &str = "text";
/// Stored variable holding the prompt category.
pub const CATEGORY_KEY: &str = "category";

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("{0}")]
    Validation(String),

    #[error("No credits left. Upgrade your plan!")]
    InsufficientCredits,

    #[error("Your 7-day free trial has expired. Upgrade to continue.")]
    TrialExpired,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Upstream(#[from] CompletionError),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl From<TemplateError> for GenerateError {
    fn from(e: TemplateError) -> Self {
        Self::Validation(e.to_string())
    }
}

/// Client details forwarded to the model ahead of the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientContext {
    pub client_name: String,
    #[serde(default)]
    pub client_data: serde_json::Value,
}

impl From<&ClientProfile> for ClientContext {
    fn from(client: &ClientProfile) -> Self {
        Self {
            client_name: client.name.clone(),
            client_data: serde_json::to_value(&*client.data).unwrap_or_default(),
        }
    }
}

/// Body of a free-form generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub persona_instructions: Option<String>,
    #[serde(default)]
    pub client: Option<ClientContext>,
}

/// Bindings and options for one template run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRun {
    /// Free text to send instead when substitution leaves braces behind.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub persona_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub reply: String,
    pub credits_remaining: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateRunOutcome {
    pub prompt: PromptTemplate,
    pub response: GeneratedResponse,
    pub credits_remaining: i32,
    /// Substitution left braces behind, so the fallback text was sent.
    pub fell_back: bool,
}

/// `Details:` block listing each variable, or `None` when there are none.
pub fn details_block<'a>(variables: impl IntoIterator<Item = (&'a String, &'a String)>) -> Option<String> {
    let lines: Vec<String> = variables
        .into_iter()
        .map(|(key, value)| format!("{}: {value}", humanize(key)))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(format!("Details:\n{}", lines.join("\n")))
    }
}

/// System and user messages for a request.
pub fn build_messages(request: &GenerateRequest) -> Vec<ChatMessage> {
    let system = system_instruction(
        request.persona_instructions.as_deref(),
        request.category.as_deref(),
    );

    let mut user = String::new();
    if let Some(client) = &request.client {
        user.push_str(&format!(
            "Client Context:\nName: {}\nDetails: {}\n\n",
            client.client_name, client.client_data
        ));
    }
    user.push_str(&request.prompt);
    if let Some(details) = details_block(&request.variables) {
        user.push_str("\n\n");
        user.push_str(&details);
    }

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Prompt text shown for a saved response.
///
/// A template with placeholders is re-substituted from the stored
/// variables, falling back to the stored `text` variable when braces
/// survive. Text without placeholders shows the stored `text` variable.
pub fn display_prompt(saved: &SavedPrompt) -> String {
    let raw = saved
        .input_variables
        .get(TEXT_KEY)
        .map_or(saved.prompt_text.as_str(), String::as_str);
    if extract_variables(&saved.prompt_text).is_empty() {
        return raw.to_owned();
    }
    resolve_prompt(&saved.prompt_text, &saved.input_variables, raw).text
}

fn user_variables(stored: &InputVariables) -> BTreeMap<String, String> {
    stored
        .iter()
        .filter(|(k, _)| k.as_str() != TEXT_KEY && k.as_str() != CATEGORY_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[derive(Clone)]
pub struct GenerationService {
    pool: PgPool,
    provider: Arc<dyn CompletionProvider>,
}

impl GenerationService {
    pub fn new(pool: PgPool, provider: Arc<dyn CompletionProvider>) -> Self {
        Self { pool, provider }
    }

    /// Check the trial clock, then take one credit. Returns the balance
    /// left afterwards.
    pub async fn charge(&self, user_id: Uuid) -> Result<i32, GenerateError> {
        let profile = profiles::get_profile(&self.pool, user_id)
            .await?
            .ok_or(GenerateError::ProfileNotFound)?;

        if profile.trial_expired_at(Utc::now()) {
            info!(%user_id, "generation refused: trial expired");
            return Err(GenerateError::TrialExpired);
        }

        let outcome = profiles::decrement_credit(&self.pool, user_id).await?;
        if !outcome.permits_generation() {
            info!(%user_id, balance = outcome.balance(), "generation refused: no credits");
            return Err(GenerateError::InsufficientCredits);
        }
        Ok(outcome.balance())
    }

    /// Handle a free-form generation request.
    pub async fn generate(
        &self,
        user_id: Uuid,
        request: &GenerateRequest,
    ) -> Result<Generation, GenerateError> {
        if request.prompt.trim().is_empty() {
            return Err(GenerateError::Validation("Prompt text is required".to_owned()));
        }

        let credits_remaining = self.charge(user_id).await?;
        let reply = self.complete(user_id, request).await?;
        Ok(Generation {
            reply,
            credits_remaining,
        })
    }

    async fn complete(&self, user_id: Uuid, request: &GenerateRequest) -> Result<String, GenerateError> {
        let messages = build_messages(request);
        match self.provider.complete(&messages).await {
            Ok(reply) => {
                info!(%user_id, provider = self.provider.name(), "generated reply");
                Ok(reply)
            }
            Err(e) => {
                warn!(%user_id, provider = self.provider.name(), error = %e, "completion failed");
                Err(e.into())
            }
        }
    }

    /// Run a stored template end to end and save the result as a new
    /// prompt and response owned by the caller.
    ///
    /// The new prompt keeps the template text. The response stores the
    /// text that was sent under `text`, then the bindings, which win over
    /// the bookkeeping keys.
    pub async fn run_template(
        &self,
        user_id: Uuid,
        template_id: Uuid,
        run: &TemplateRun,
    ) -> Result<TemplateRunOutcome, GenerateError> {
        let template = prompts::get_visible_prompt(&self.pool, template_id, user_id)
            .await?
            .ok_or(GenerateError::NotFound("template"))?;

        let client = match run.client_id {
            Some(id) => Some(
                clients::get_client(&self.pool, id, user_id)
                    .await?
                    .ok_or(GenerateError::NotFound("client"))?,
            ),
            None => None,
        };
        let persona_instructions = match run.persona_id {
            Some(id) => Some(
                personas::get_persona(&self.pool, id, user_id)
                    .await?
                    .ok_or(GenerateError::NotFound("persona"))?
                    .instructions,
            ),
            None => None,
        };

        let mut form = VariableForm::new(&template.text);
        form.select_client(client.as_ref());
        form.apply(&run.variables);
        let bindings = form.submit()?;

        // Every placeholder is bound here, so braces left after substitution
        // come from the values, not the template.
        let raw = match run.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_owned(),
            _ => substitute(&template.text, &bindings),
        };
        let resolved = resolve_prompt(&template.text, &bindings, &raw);
        let request = GenerateRequest {
            prompt: resolved.text.clone(),
            category: Some(template.category.clone()),
            variables: bindings.clone(),
            persona_instructions,
            client: client.as_ref().map(ClientContext::from),
        };

        let credits_remaining = self.charge(user_id).await?;
        let reply = self.complete(user_id, &request).await?;

        let prompt = prompts::insert_prompt(
            &self.pool,
            Some(user_id),
            &NewPrompt {
                text: &template.text,
                category: &template.category,
                sub_category: template.sub_category.as_deref(),
            },
        )
        .await?;

        let mut input_variables = BTreeMap::from([
            (TEXT_KEY.to_owned(), resolved.text),
            (CATEGORY_KEY.to_owned(), template.category.clone()),
        ]);
        input_variables.extend(bindings);
        let response =
            responses::insert_response(&self.pool, prompt.id, user_id, &input_variables, &reply).await?;

        Ok(TemplateRunOutcome {
            prompt,
            response,
            credits_remaining,
            fell_back: resolved.fell_back,
        })
    }

    /// Generate a reply for a saved prompt and store it on the response.
    pub async fn regenerate_reply(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        persona_instructions: Option<String>,
    ) -> Result<SavedPrompt, GenerateError> {
        let saved = responses::get_saved_prompt(&self.pool, response_id, user_id)
            .await?
            .ok_or(GenerateError::NotFound("response"))?;

        let request = GenerateRequest {
            prompt: display_prompt(&saved),
            category: Some(saved.category.clone()),
            variables: user_variables(&saved.input_variables),
            persona_instructions,
            client: None,
        };
        if request.prompt.trim().is_empty() {
            return Err(GenerateError::Validation("Prompt text is required".to_owned()));
        }

        self.charge(user_id).await?;
        let reply = self.complete(user_id, &request).await?;
        responses::update_reply(&self.pool, response_id, user_id, &reply).await?;

        responses::get_saved_prompt(&self.pool, response_id, user_id)
            .await?
            .ok_or(GenerateError::NotFound("response"))
    }
}
