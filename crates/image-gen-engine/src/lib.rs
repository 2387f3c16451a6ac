use std::fmt;
use std::str::FromStr;

use image_gen_contracts::{ImageGenConfig, ImageGenError, ImageGenResult, Result};

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(any(feature = "gpt", feature = "gemini"))]
mod http;
#[cfg(feature = "gemini")]
pub mod normalize;
#[cfg(feature = "gpt")]
pub mod openai;
pub mod settings;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiBackend, GeminiClient, HttpGeminiClient};
#[cfg(feature = "gpt")]
pub use openai::{GptBackend, GptClient, HttpGptClient};
pub use settings::BackendSettings;

/// Capabilities every image backend provides.
pub trait ImageBackend {
    fn name(&self) -> &str;

    /// Advisory notes about options this backend ignores or approximates.
    /// Never fails.
    fn validate_config(&self, config: &ImageGenConfig) -> Vec<String>;

    /// Text-to-image. Input images on the config are not consulted.
    fn generate(&self, config: &ImageGenConfig) -> Result<Vec<ImageGenResult>>;

    /// Prompt plus `config.images()` as conditioning input.
    fn edit(&self, config: &ImageGenConfig) -> Result<Vec<ImageGenResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKind {
    Gpt,
    Gemini,
}

impl ApiKind {
    pub fn name(self) -> &'static str {
        match self {
            ApiKind::Gpt => "gpt",
            ApiKind::Gemini => "gemini",
        }
    }

    /// Ceiling on input images accepted for an edit.
    pub fn max_input_images(self) -> usize {
        match self {
            ApiKind::Gpt => 4,
            ApiKind::Gemini => 14,
        }
    }

    /// Environment variables holding the API key; any one of them is enough.
    pub fn credential_vars(self) -> &'static [&'static str] {
        match self {
            ApiKind::Gpt => &["OPENAI_API_KEY"],
            ApiKind::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApiKind {
    type Err = ImageGenError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw {
            "gpt" => Ok(ApiKind::Gpt),
            "gemini" => Ok(ApiKind::Gemini),
            other => Err(ImageGenError::Configuration(format!(
                "Unknown API backend: {other}"
            ))),
        }
    }
}

/// Resolves a backend name and constructs it from the process environment.
pub fn get_backend(name: &str) -> Result<Box<dyn ImageBackend>> {
    let api = name.parse::<ApiKind>()?;
    build_backend(api)
}

pub fn build_backend(api: ApiKind) -> Result<Box<dyn ImageBackend>> {
    build_backend_with(api, &settings::env_lookup)
}

/// Constructs a backend, resolving credentials and endpoints through `lookup`.
///
/// A backend whose cargo feature was left out of the build fails with
/// [`ImageGenError::Dependency`] before any credential lookup.
pub fn build_backend_with(
    api: ApiKind,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Box<dyn ImageBackend>> {
    match api {
        #[cfg(feature = "gpt")]
        ApiKind::Gpt => {
            let settings = BackendSettings::resolve(api, lookup)?;
            tracing::debug!(api = %api, api_base = %settings.api_base, "constructing backend");
            Ok(Box::new(GptBackend::new(HttpGptClient::new(settings)?)))
        }
        #[cfg(feature = "gemini")]
        ApiKind::Gemini => {
            let settings = BackendSettings::resolve(api, lookup)?;
            tracing::debug!(api = %api, api_base = %settings.api_base, "constructing backend");
            Ok(Box::new(GeminiBackend::new(HttpGeminiClient::new(settings)?)))
        }
        #[allow(unreachable_patterns)]
        _ => {
            let _ = lookup;
            Err(missing_feature(api))
        }
    }
}

fn missing_feature(api: ApiKind) -> ImageGenError {
    ImageGenError::Dependency {
        message: format!("The '{api}' backend is not available in this build."),
        hint: format!("Rebuild with: cargo install image-gen-cli --features {api}"),
    }
}
