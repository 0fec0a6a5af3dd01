//! `{placeholder}` prompt templates.
//!
//! A placeholder is `{identifier}` with identifier `[a-zA-Z0-9_]+`.
//! Extraction yields each identifier once in first-seen order; substitution
//! replaces literal `{key}` tokens for bound keys and never re-scans a
//! substituted value. [`resolve_prompt`] layers the raw-text fallback on
//! top: if braces survive substitution, the substituted text is discarded.

pub mod form;

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

pub use form::{VariableForm, prefill_from_client};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-zA-Z0-9_]+)\}").expect("placeholder pattern is a valid regex")
});

/// Errors raised while collecting template variables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("missing values for: {}", .0.join(", "))]
    MissingVariables(Vec<String>),
}

/// Placeholder identifiers in `template`, deduplicated, in first-seen order.
///
/// An empty result means the template can be submitted as-is.
pub fn extract_variables(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| seen.insert(*name))
        .map(str::to_owned)
        .collect()
}

/// Replace every `{key}` whose key is bound with the bound value.
///
/// Keys are matched literally. Output that came from a value is never
/// scanned again, so a value containing `{other}` stays as written.
/// Unbound placeholders are left untouched.
pub fn substitute(template: &str, bindings: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        match bindings.get(&after_open[..close]) {
            Some(value) => {
                out.push_str(value);
                rest = &after_open[close + 1..];
            }
            None => {
                out.push('{');
                rest = after_open;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Whether `text` still carries both an opening and a closing brace.
pub fn has_leftover_braces(text: &str) -> bool {
    text.contains('{') && text.contains('}')
}

/// Final prompt text chosen by [`resolve_prompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub text: String,
    /// `true` when substitution left braces behind and `raw_text` was used.
    pub fell_back: bool,
}

/// Turn a template plus bindings into the text sent upstream and saved.
///
/// - No braces in the template: the template itself.
/// - Otherwise the substituted template, unless braces remain, in which
///   case all substitution is discarded in favour of `raw_text`.
pub fn resolve_prompt(
    template: &str,
    bindings: &BTreeMap<String, String>,
    raw_text: &str,
) -> ResolvedPrompt {
    if !template.contains('{') && !template.contains('}') {
        return ResolvedPrompt {
            text: template.to_owned(),
            fell_back: false,
        };
    }

    let substituted = substitute(template, bindings);
    if has_leftover_braces(&substituted) {
        warn!(
            unresolved = ?extract_variables(&substituted),
            "placeholders survived substitution, using raw text"
        );
        return ResolvedPrompt {
            text: raw_text.to_owned(),
            fell_back: true,
        };
    }

    ResolvedPrompt {
        text: substituted,
        fell_back: false,
    }
}

/// Variable name as shown to people: underscores become spaces.
pub fn humanize(key: &str) -> String {
    key.replace('_', " ")
}
