use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

use image_gen_contracts::{ImageGenError, Result};

use crate::ApiKind;

/// Builds the blocking client. Calls wait until the API answers or fails, so
/// reqwest's default request timeout is disabled. Failure here (e.g. TLS init)
/// is treated as a missing dependency rather than an API error.
pub(crate) fn build_http_client(api: ApiKind) -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(None::<Duration>)
        .build()
        .map_err(|err| ImageGenError::Dependency {
            message: format!("Failed to initialize the HTTP client for {api}: {err}"),
            hint: "Check the TLS configuration of this system.".to_string(),
        })
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        ImageGenError::backend_with(format!("{provider} response body read failed"), err)
    })?;
    if !status.is_success() {
        return Err(ImageGenError::backend(format!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body).map_err(|err| {
        ImageGenError::backend_with(format!("{provider} returned invalid JSON payload"), err)
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
