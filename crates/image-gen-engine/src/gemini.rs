use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use image_gen_contracts::inputs::media_type_for_path;
use image_gen_contracts::{ImageGenConfig, ImageGenError, ImageGenResult, Result};

use crate::http::{build_http_client, response_json_or_error};
use crate::normalize::{parse_size, ResolutionTier, SafetyThreshold, HARM_CATEGORIES};
use crate::settings::BackendSettings;
use crate::{ApiKind, ImageBackend};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-pro-image-preview";

/// Transport for `models/{model}:generateContent`.
pub trait GeminiClient {
    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value>;
}

pub struct HttpGeminiClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl HttpGeminiClient {
    pub fn new(settings: BackendSettings) -> Result<Self> {
        Ok(Self {
            api_base: settings.api_base,
            api_key: settings.api_key,
            http: build_http_client(ApiKind::Gemini)?,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

impl GeminiClient for HttpGeminiClient {
    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        tracing::debug!(%endpoint, "Gemini generateContent");
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
            .send()
            .map_err(|err| {
                ImageGenError::backend_with(format!("Gemini request failed ({endpoint})"), err)
            })?;
        response_json_or_error("Gemini", response)
    }
}

/// Gemini image backend.
///
/// The API returns at most one image per call, so `generate` issues
/// `count` sequential calls. `edit` always issues a single call whatever
/// the requested count; that mirrors what the API can do with conditioning
/// images and is kept on purpose.
pub struct GeminiBackend<C = HttpGeminiClient> {
    client: C,
    model: String,
}

impl<C: GeminiClient> GeminiBackend<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn request_payload(&self, config: &ImageGenConfig, parts: Vec<Value>) -> Value {
        let aspect_ratio = parse_size(config.size());
        let image_size = ResolutionTier::from(config.quality());
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": aspect_ratio.as_str(),
                    "imageSize": image_size.as_str(),
                },
            },
            "safetySettings": safety_settings(SafetyThreshold::from(config.moderation())),
        })
    }

    fn call(&self, config: &ImageGenConfig, parts: Vec<Value>) -> Result<Vec<ImageGenResult>> {
        let payload = self.request_payload(config, parts);
        let response = self.client.generate_content(&self.model, &payload)?;
        extract_images(&response)
    }
}

impl<C: GeminiClient> ImageBackend for GeminiBackend<C> {
    fn name(&self) -> &str {
        "gemini"
    }

    fn validate_config(&self, config: &ImageGenConfig) -> Vec<String> {
        let mut warnings = Vec::new();
        if config.transparent() {
            warnings.push(
                "--transparent not supported: Gemini cannot generate true alpha transparency"
                    .to_string(),
            );
        }
        if config.count() > 1 {
            warnings.push(format!(
                "Gemini generates one image per request; will make {} API calls",
                config.count()
            ));
        }
        warnings
    }

    fn generate(&self, config: &ImageGenConfig) -> Result<Vec<ImageGenResult>> {
        let total = config.count();
        let mut results = Vec::new();
        for idx in 1..=total {
            if total > 1 {
                tracing::info!("Generating image {idx}/{total}...");
            }
            let parts = vec![json!({ "text": config.prompt() })];
            results.extend(self.call(config, parts)?);
        }
        Ok(results)
    }

    fn edit(&self, config: &ImageGenConfig) -> Result<Vec<ImageGenResult>> {
        let mut parts = vec![json!({ "text": config.prompt() })];
        for path in config.images() {
            parts.push(image_part_from_path(path)?);
        }
        self.call(config, parts)
    }
}

fn safety_settings(threshold: SafetyThreshold) -> Vec<Value> {
    HARM_CATEGORIES
        .into_iter()
        .map(|category| {
            json!({
                "category": category,
                "threshold": threshold.as_str(),
            })
        })
        .collect()
}

fn image_part_from_path(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).map_err(|err| {
        ImageGenError::backend_with(format!("failed reading {}", path.display()), err)
    })?;
    Ok(json!({
        "inlineData": {
            "mimeType": media_type_for_path(path),
            "data": BASE64.encode(bytes),
        }
    }))
}

/// Inline image parts of the first candidate, in order.
fn extract_images(response: &Value) -> Result<Vec<ImageGenResult>> {
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for part in parts {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|err| ImageGenError::backend_with("Gemini image base64 decode failed", err))?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        let format = match mime_type.rsplit_once('/') {
            Some((_, subtype)) => subtype,
            None => "png",
        };
        out.push(ImageGenResult::new(bytes, format));
    }
    tracing::debug!(images = out.len(), "Gemini response decoded");
    Ok(out)
}
