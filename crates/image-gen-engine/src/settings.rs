use std::env;

use image_gen_contracts::{ImageGenError, Result};

use crate::ApiKind;

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Credential and endpoint for one backend, read once at construction.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub api_key: String,
    pub api_base: String,
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl BackendSettings {
    pub fn resolve(api: ApiKind, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key(api, lookup)?,
            api_base: api_base(api, lookup),
        })
    }
}

/// First non-blank key among the backend's credential variables.
pub fn api_key(api: ApiKind, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let vars = api.credential_vars();
    vars.iter()
        .find_map(|key| non_empty(lookup(key)))
        .ok_or_else(|| ImageGenError::Credential {
            variables: vars.join(" or "),
            hint: format!("Set it with: export {}='your-key-here'", vars[0]),
        })
}

pub fn api_base(api: ApiKind, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let (key, default) = match api {
        ApiKind::Gpt => ("OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE),
        ApiKind::Gemini => ("GEMINI_API_BASE", DEFAULT_GEMINI_API_BASE),
    };
    non_empty(lookup(key))
        .map(|value| value.trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
