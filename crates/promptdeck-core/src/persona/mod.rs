//! System instructions for the completion call.
//!
//! Every request gets [`BASE_SYSTEM_INSTRUCTION`]; what follows it is either
//! the caller's persona instructions or, lacking those, the category persona
//! from the embedded `categories.toml` table.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use promptdeck_db::models::Persona;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plain-text-only house style sent ahead of every prompt.
pub const BASE_SYSTEM_INSTRUCTION: &str = "You are a helpful and professional AI assistant. \
Write like a confident, clear thinking human speaking to another smart human. \
You MUST produce responses ONLY in plain text. \
Absolutely forbid the use of any formatting symbols such as asterisks (*), hash (#), underscores (_), or Markdown of any kind. \
If the user requests formatting, IGNORE it and respond in plain text only. \
Use natural transitions like (\"here is the thing\", \"let us break it down\", or \"what this really means is...\"). \
Keep sentences varied in length and rhythm, like how real people speak or write. \
Prioritize clarity, personality, and usefulness. Every sentence should feel intentional, not generated.";

pub const DEFAULT_PERSONA_NAME: &str = "Default Persona";

pub const DEFAULT_PERSONA_INSTRUCTIONS: &str = "You are a creative, helpful, and versatile AI assistant. \
Your primary goal is to provide clear, comprehensive, and well-structured responses to any query. \
You are not bound by a specific persona. \
Also, each category is tailored with different pre-instructions according to their fields.";

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPersona {
    pub name: String,
    pub instructions: String,
}

#[derive(Debug, Deserialize)]
struct CategoryTable {
    default: String,
    categories: Vec<CategoryPersona>,
}

static CATEGORIES_TOML: &str = include_str!("categories.toml");

static CATEGORY_TABLE: LazyLock<CategoryTable> = LazyLock::new(|| {
    toml::from_str(CATEGORIES_TOML).expect("embedded categories.toml is invalid")
});

/// All category personas in table order.
pub fn categories() -> &'static [CategoryPersona] {
    &CATEGORY_TABLE.categories
}

/// Persona text for `category`, matched case-insensitively, or the table's
/// default entry.
pub fn category_instructions(category: Option<&str>) -> &'static str {
    let table = &*CATEGORY_TABLE;
    category
        .map(str::trim)
        .and_then(|wanted| {
            table
                .categories
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(wanted))
        })
        .map_or(table.default.as_str(), |c| c.instructions.as_str())
}

/// Full system message: the base instruction plus persona instructions
/// when non-blank, otherwise the category persona.
pub fn system_instruction(persona_instructions: Option<&str>, category: Option<&str>) -> String {
    let tail = match persona_instructions.map(str::trim) {
        Some(instructions) if !instructions.is_empty() => instructions,
        _ => category_instructions(category),
    };
    format!("{BASE_SYSTEM_INSTRUCTION}\n{tail}")
}

/// One entry of a persona listing. The built-in default has no id.
#[derive(Debug, Clone, Serialize)]
pub struct PersonaListing {
    pub id: Option<Uuid>,
    pub name: String,
    pub instructions: String,
    pub builtin: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Persona> for PersonaListing {
    fn from(p: Persona) -> Self {
        Self {
            id: Some(p.id),
            name: p.name,
            instructions: p.instructions,
            builtin: false,
            created_at: Some(p.created_at),
        }
    }
}

/// Stored personas preceded by the built-in default.
pub fn with_default_persona(stored: Vec<Persona>) -> Vec<PersonaListing> {
    let default = PersonaListing {
        id: None,
        name: DEFAULT_PERSONA_NAME.to_owned(),
        instructions: DEFAULT_PERSONA_INSTRUCTIONS.to_owned(),
        builtin: true,
        created_at: None,
    };
    std::iter::once(default)
        .chain(stored.into_iter().map(PersonaListing::from))
        .collect()
}
