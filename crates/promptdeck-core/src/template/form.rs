//! Variable collection for a single template run.

use std::collections::BTreeMap;

use promptdeck_db::models::ClientProfile;

use super::{TemplateError, extract_variables};

/// Key that falls back to the client's display name when the client's data
/// has no entry of its own.
const CLIENT_NAME_KEY: &str = "client_name";

/// Values for `required` keys taken from a client profile.
///
/// Only exact key matches are copied, numbers are rendered as strings.
/// Keys the client has no value for are absent from the result.
pub fn prefill_from_client(client: &ClientProfile, required: &[String]) -> BTreeMap<String, String> {
    required
        .iter()
        .filter_map(|key| {
            let value = match client.data.get(key) {
                Some(value) => value.to_string(),
                None if key == CLIENT_NAME_KEY => client.name.clone(),
                None => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

/// The bindings being collected for one template.
#[derive(Debug, Clone, Default)]
pub struct VariableForm {
    keys: Vec<String>,
    values: BTreeMap<String, String>,
}

impl VariableForm {
    pub fn new(template: &str) -> Self {
        Self::from_keys(extract_variables(template))
    }

    pub fn from_keys(keys: Vec<String>) -> Self {
        Self {
            keys,
            values: BTreeMap::new(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// A form with no keys needs no input before submission.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Switch to `client` (or to no client). All bindings are cleared
    /// before the new client's values are filled in.
    pub fn select_client(&mut self, client: Option<&ClientProfile>) {
        self.values.clear();
        if let Some(client) = client {
            self.values = prefill_from_client(client, &self.keys);
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Apply user-entered values. Blank entries do not overwrite a prefilled
    /// value.
    pub fn apply(&mut self, entered: &BTreeMap<String, String>) {
        for (key, value) in entered {
            if !value.trim().is_empty() || !self.values.contains_key(key) {
                self.values.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn bindings(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Required keys that are unbound or bound to whitespace.
    pub fn missing(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter(|key| self.values.get(*key).is_none_or(|v| v.trim().is_empty()))
            .cloned()
            .collect()
    }

    /// Finish collection, failing if any required key lacks a value.
    pub fn submit(self) -> Result<BTreeMap<String, String>, TemplateError> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(self.values)
        } else {
            Err(TemplateError::MissingVariables(missing))
        }
    }
}
