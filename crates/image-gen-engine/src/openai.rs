use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;

use image_gen_contracts::inputs::media_type_for_path;
use image_gen_contracts::{ImageGenConfig, ImageGenError, ImageGenResult, Result};

use crate::http::{build_http_client, response_json_or_error, truncate_text};
use crate::settings::BackendSettings;
use crate::{ApiKind, ImageBackend};

pub const DEFAULT_GPT_MODEL: &str = "gpt-image-1.5";

/// Parameters shared by the generations and edits endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GptImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation: Option<String>,
}

/// An input image as uploaded to the edits endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageUpload {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|err| {
            ImageGenError::backend_with(format!("failed reading {}", path.display()), err)
        })?;
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image.png")
            .to_string();
        Ok(Self {
            file_name,
            bytes,
            mime_type: media_type_for_path(path),
        })
    }
}

/// Transport for the OpenAI Images API. Responses are returned as raw JSON.
pub trait GptClient {
    fn generate(&self, request: &GptImageRequest) -> Result<Value>;
    fn edit(&self, request: &GptImageRequest, images: &[ImageUpload]) -> Result<Value>;
    fn download(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpGptClient {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl HttpGptClient {
    pub fn new(settings: BackendSettings) -> Result<Self> {
        Ok(Self {
            api_base: settings.api_base,
            api_key: settings.api_key,
            http: build_http_client(ApiKind::Gpt)?,
        })
    }
}

impl GptClient for HttpGptClient {
    fn generate(&self, request: &GptImageRequest) -> Result<Value> {
        let endpoint = format!("{}/images/generations", self.api_base);
        tracing::debug!(%endpoint, n = request.n, size = %request.size, "OpenAI generate");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(|err| {
                ImageGenError::backend_with(format!("OpenAI request failed ({endpoint})"), err)
            })?;
        response_json_or_error("OpenAI", response)
    }

    fn edit(&self, request: &GptImageRequest, images: &[ImageUpload]) -> Result<Value> {
        let endpoint = format!("{}/images/edits", self.api_base);
        tracing::debug!(%endpoint, images = images.len(), "OpenAI edit");
        let mut form = MultipartForm::new()
            .text("model", request.model.clone())
            .text("prompt", request.prompt.clone())
            .text("size", request.size.clone())
            .text("quality", request.quality.clone())
            .text("n", request.n.to_string());
        if let Some(background) = request.background.as_ref() {
            form = form.text("background", background.clone());
        }
        if let Some(moderation) = request.moderation.as_ref() {
            form = form.text("moderation", moderation.clone());
        }
        for image in images {
            let part = MultipartPart::bytes(image.bytes.clone())
                .file_name(image.file_name.clone())
                .mime_str(&image.mime_type)
                .map_err(|err| {
                    ImageGenError::backend_with(
                        format!("invalid mime '{}' for {}", image.mime_type, image.file_name),
                        err,
                    )
                })?;
            form = form.part("image[]", part);
        }
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|err| ImageGenError::backend_with("OpenAI edits request failed", err))?;
        response_json_or_error("OpenAI edits", response)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().map_err(|err| {
            ImageGenError::backend_with(format!("failed downloading provider image ({url})"), err)
        })?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ImageGenError::backend(format!(
                "provider image download failed ({code}): {}",
                truncate_text(&body, 512)
            )));
        }
        let bytes = response.bytes().map_err(|err| {
            ImageGenError::backend_with("failed reading provider image bytes", err)
        })?;
        Ok(bytes.to_vec())
    }
}

/// GPT image backend. Options map almost one to one onto the API.
pub struct GptBackend<C = HttpGptClient> {
    client: C,
    model: String,
}

impl<C: GptClient> GptBackend<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            model: DEFAULT_GPT_MODEL.to_string(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn base_request(&self, config: &ImageGenConfig) -> GptImageRequest {
        GptImageRequest {
            model: self.model.clone(),
            prompt: config.prompt().to_string(),
            size: config.size().to_string(),
            quality: config.quality().as_str().to_string(),
            n: config.count(),
            background: None,
            moderation: None,
        }
    }

    /// Each item carries either inline base64 data or a URL to fetch. The API
    /// does not report the encoding here, so every result is tagged `png`.
    fn decode_results(&self, response: &Value) -> Result<Vec<ImageGenResult>> {
        let rows = response
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let b64 = row
                .get("b64_json")
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty());
            let url = row
                .get("url")
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty());
            let bytes = if let Some(b64) = b64 {
                BASE64.decode(b64.as_bytes()).map_err(|err| {
                    ImageGenError::backend_with("OpenAI image base64 decode failed", err)
                })?
            } else if let Some(url) = url {
                tracing::debug!(%url, "downloading OpenAI image");
                self.client.download(url)?
            } else {
                return Err(ImageGenError::backend(
                    "Unexpected response format from OpenAI API",
                ));
            };
            out.push(ImageGenResult::new(bytes, "png"));
        }
        Ok(out)
    }
}

impl<C: GptClient> ImageBackend for GptBackend<C> {
    fn name(&self) -> &str {
        "gpt"
    }

    fn validate_config(&self, _config: &ImageGenConfig) -> Vec<String> {
        Vec::new()
    }

    fn generate(&self, config: &ImageGenConfig) -> Result<Vec<ImageGenResult>> {
        let mut request = self.base_request(config);
        request.background = Some(
            if config.transparent() {
                "transparent"
            } else {
                "opaque"
            }
            .to_string(),
        );
        request.moderation = Some(config.moderation().as_str().to_string());
        let response = self.client.generate(&request)?;
        self.decode_results(&response)
    }

    fn edit(&self, config: &ImageGenConfig) -> Result<Vec<ImageGenResult>> {
        let images = config
            .images()
            .iter()
            .map(|path| ImageUpload::from_path(path))
            .collect::<Result<Vec<_>>>()?;
        let request = self.base_request(config);
        let response = self.client.edit(&request, &images)?;
        self.decode_results(&response)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;
    use std::io::Write as _;
    use std::thread;
    use std::time::{Duration, Instant};

    use base64::Engine as _;
    use serde_json::{json, Value};

    use image_gen_contracts::{ImageGenConfig, ImageGenError, Moderation, Quality, Result};

    use super::{
        GptBackend, GptClient, GptImageRequest, HttpGptClient, ImageUpload, BASE64,
        DEFAULT_GPT_MODEL,
    };
    use crate::settings::BackendSettings;
    use crate::ImageBackend;

    #[derive(Default)]
    struct FakeGptClient {
        responses: RefCell<VecDeque<Value>>,
        generate_calls: RefCell<Vec<GptImageRequest>>,
        edit_calls: RefCell<Vec<(GptImageRequest, Vec<ImageUpload>)>>,
        downloads: RefCell<Vec<String>>,
    }

    impl FakeGptClient {
        fn with_response(response: Value) -> Self {
            let client = Self::default();
            client.responses.borrow_mut().push_back(response);
            client
        }

        fn next_response(&self) -> Value {
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| json!({ "data": [] }))
        }
    }

    impl GptClient for FakeGptClient {
        fn generate(&self, request: &GptImageRequest) -> Result<Value> {
            self.generate_calls.borrow_mut().push(request.clone());
            Ok(self.next_response())
        }

        fn edit(&self, request: &GptImageRequest, images: &[ImageUpload]) -> Result<Value> {
            self.edit_calls
                .borrow_mut()
                .push((request.clone(), images.to_vec()));
            Ok(self.next_response())
        }

        fn download(&self, url: &str) -> Result<Vec<u8>> {
            self.downloads.borrow_mut().push(url.to_string());
            Ok(format!("downloaded:{url}").into_bytes())
        }
    }

    fn config(images: Vec<std::path::PathBuf>, transparent: bool) -> ImageGenConfig {
        ImageGenConfig::new(
            "a red fox",
            images,
            Quality::Medium,
            "1536x1024",
            2,
            transparent,
            Moderation::Auto,
        )
    }

    #[test]
    fn generate_maps_config_onto_request() -> anyhow::Result<()> {
        let backend = GptBackend::new(FakeGptClient::with_response(json!({
            "data": [{ "b64_json": BASE64.encode(b"img-1") }]
        })));
        let results = backend.generate(&config(Vec::new(), true))?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].image_data(), b"img-1");
        assert_eq!(results[0].format(), "png");

        let calls = backend.client().generate_calls.borrow();
        assert_eq!(
            calls.as_slice(),
            &[GptImageRequest {
                model: DEFAULT_GPT_MODEL.to_string(),
                prompt: "a red fox".to_string(),
                size: "1536x1024".to_string(),
                quality: "medium".to_string(),
                n: 2,
                background: Some("transparent".to_string()),
                moderation: Some("auto".to_string()),
            }]
        );
        Ok(())
    }

    #[test]
    fn generate_uses_opaque_background_by_default() -> anyhow::Result<()> {
        let backend = GptBackend::new(FakeGptClient::default());
        let results = backend.generate(&config(Vec::new(), false))?;
        assert!(results.is_empty());
        let calls = backend.client().generate_calls.borrow();
        assert_eq!(calls[0].background.as_deref(), Some("opaque"));
        Ok(())
    }

    #[test]
    fn url_items_are_downloaded_in_order() -> anyhow::Result<()> {
        let backend = GptBackend::new(FakeGptClient::with_response(json!({
            "data": [
                { "url": "https://cdn.example/a.png" },
                { "b64_json": BASE64.encode(b"inline") },
                { "url": "https://cdn.example/b.png", "b64_json": "" }
            ]
        })));
        let results = backend.generate(&config(Vec::new(), false))?;
        let bodies: Vec<&[u8]> = results.iter().map(|result| result.image_data()).collect();
        assert_eq!(
            bodies,
            vec![
                b"downloaded:https://cdn.example/a.png".as_slice(),
                b"inline".as_slice(),
                b"downloaded:https://cdn.example/b.png".as_slice(),
            ]
        );
        assert_eq!(backend.client().downloads.borrow().len(), 2);
        Ok(())
    }

    #[test]
    fn item_without_payload_is_an_error() {
        let backend = GptBackend::new(FakeGptClient::with_response(json!({
            "data": [{ "b64_json": BASE64.encode(b"ok") }, { "revised_prompt": "x" }]
        })));
        let err = backend.generate(&config(Vec::new(), false)).err();
        assert!(matches!(err, Some(ImageGenError::Backend { .. })));
        assert_eq!(
            err.map(|err| err.to_string()).as_deref(),
            Some("Unexpected response format from OpenAI API")
        );
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let backend = GptBackend::new(FakeGptClient::with_response(json!({
            "data": [{ "b64_json": "!!not base64!!" }]
        })));
        assert!(backend.generate(&config(Vec::new(), false)).is_err());
    }

    #[test]
    fn edit_packages_images_with_mime_types() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let first = temp.path().join("first.JPG");
        let second = temp.path().join("second.webp");
        fs::write(&first, b"jpeg-bytes")?;
        fs::write(&second, b"webp-bytes")?;

        let backend = GptBackend::new(FakeGptClient::with_response(json!({
            "data": [{ "b64_json": BASE64.encode(b"edited") }]
        })));
        let results = backend.edit(&config(vec![first, second], true))?;
        assert_eq!(results[0].image_data(), b"edited");

        let calls = backend.client().edit_calls.borrow();
        let (request, uploads) = &calls[0];
        assert_eq!(request.n, 2);
        assert_eq!(request.background, None);
        assert_eq!(request.moderation, None);
        assert_eq!(
            uploads,
            &vec![
                ImageUpload {
                    file_name: "first.JPG".to_string(),
                    bytes: b"jpeg-bytes".to_vec(),
                    mime_type: "image/jpeg".to_string(),
                },
                ImageUpload {
                    file_name: "second.webp".to_string(),
                    bytes: b"webp-bytes".to_vec(),
                    mime_type: "image/webp".to_string(),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn validate_config_has_no_warnings() {
        let backend = GptBackend::new(FakeGptClient::default());
        assert!(backend.validate_config(&config(Vec::new(), true)).is_empty());
    }

    #[test]
    fn http_client_posts_generation_request() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let body = json!({ "data": [{ "b64_json": BASE64.encode(b"png-bytes") }] }).to_string();
        let mock = server
            .mock("POST", "/images/generations")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": DEFAULT_GPT_MODEL,
                "n": 2,
                "quality": "medium",
                "background": "opaque",
                "moderation": "auto",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create();

        let client = HttpGptClient::new(BackendSettings {
            api_key: "sk-test".to_string(),
            api_base: server.url(),
        })?;
        let results = GptBackend::new(client).generate(&config(Vec::new(), false))?;
        mock.assert();
        assert_eq!(results[0].image_data(), b"png-bytes");
        Ok(())
    }

    #[test]
    fn http_client_waits_past_reqwest_default_timeout() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let body = json!({ "data": [{ "b64_json": BASE64.encode(b"slow-png") }] }).to_string();
        let mock = server
            .mock("POST", "/images/generations")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(move |writer| {
                thread::sleep(Duration::from_secs(32));
                writer.write_all(body.as_bytes())
            })
            .create();

        let client = HttpGptClient::new(BackendSettings {
            api_key: "sk-test".to_string(),
            api_base: server.url(),
        })?;
        let started = Instant::now();
        let results = GptBackend::new(client).generate(&config(Vec::new(), false))?;
        mock.assert();
        assert!(started.elapsed() >= Duration::from_secs(32));
        assert_eq!(results[0].image_data(), b"slow-png");
        Ok(())
    }

    #[test]
    fn http_client_sends_multipart_edit() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = temp.path().join("photo.JPG");
        let mask = temp.path().join("style.png");
        fs::write(&photo, b"jpeg-bytes")?;
        fs::write(&mask, b"png-bytes")?;

        let mut server = mockito::Server::new();
        let field = |name: &str, value: &str| {
            mockito::Matcher::Regex(format!(r#"name="{name}"\r\n\r\n{value}\r\n"#))
        };
        let mock = server
            .mock("POST", "/images/edits")
            .match_header("authorization", "Bearer sk-test")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("^multipart/form-data; boundary=".to_string()),
            )
            .match_body(mockito::Matcher::AllOf(vec![
                field("model", r"gpt-image-1\.5"),
                field("prompt", "a red fox"),
                field("size", "1536x1024"),
                field("quality", "medium"),
                field("n", "2"),
                mockito::Matcher::Regex(
                    r#"name="image\[\]"; filename="photo\.JPG"\r\nContent-Type: image/jpeg\r\n\r\njpeg-bytes"#
                        .to_string(),
                ),
                mockito::Matcher::Regex(
                    r#"name="image\[\]"; filename="style\.png"\r\nContent-Type: image/png\r\n\r\npng-bytes"#
                        .to_string(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(|request| {
                let body = request
                    .body()
                    .map(|raw| String::from_utf8_lossy(raw).into_owned())
                    .unwrap_or_default();
                let marker: &[u8] =
                    if body.contains(r#"name="background""#) || body.contains(r#"name="moderation""#)
                    {
                        b"unexpected-fields"
                    } else {
                        b"edited"
                    };
                json!({ "data": [{ "b64_json": BASE64.encode(marker) }] })
                    .to_string()
                    .into_bytes()
            })
            .create();

        let client = HttpGptClient::new(BackendSettings {
            api_key: "sk-test".to_string(),
            api_base: server.url(),
        })?;
        let results = GptBackend::new(client).edit(&config(vec![photo, mask], true))?;
        mock.assert();
        assert_eq!(results[0].image_data(), b"edited");
        Ok(())
    }

    #[test]
    fn http_client_reports_api_errors() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/images/generations")
            .with_status(400)
            .with_body(r#"{"error":{"message":"bad size"}}"#)
            .create();
        let client = HttpGptClient::new(BackendSettings {
            api_key: "sk-test".to_string(),
            api_base: server.url(),
        })?;
        let message = GptBackend::new(client)
            .generate(&config(Vec::new(), false))
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(message.starts_with("OpenAI request failed (400)"));
        assert!(message.contains("bad size"));
        Ok(())
    }

    #[test]
    fn http_client_downloads_url_results() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let image_url = format!("{}/files/out.png", server.url());
        let _generate = server
            .mock("POST", "/images/generations")
            .with_status(200)
            .with_body(json!({ "data": [{ "url": image_url }] }).to_string())
            .create();
        let download = server
            .mock("GET", "/files/out.png")
            .with_status(200)
            .with_body("remote-bytes")
            .create();
        let client = HttpGptClient::new(BackendSettings {
            api_key: "sk-test".to_string(),
            api_base: server.url(),
        })?;
        let results = GptBackend::new(client).generate(&config(Vec::new(), false))?;
        download.assert();
        assert_eq!(results[0].image_data(), b"remote-bytes");
        Ok(())
    }
}
