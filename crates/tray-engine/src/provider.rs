use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::compositor::encode_png;
use crate::config::{TrayConfig, DEFAULT_IMAGE_MODEL, DEFAULT_OPENAI_API_BASE};

pub const DEFAULT_SIZE: &str = "1024x1024";
pub const DEFAULT_QUALITY: &str = "standard";
pub const DEFAULT_STYLE: &str = "natural";

const DRYRUN_SCHEME: &str = "dryrun://";
const DRYRUN_EDGE: u32 = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageGenerateRequest {
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub quality: String,
    pub style: String,
    pub timeout: Duration,
}

impl ImageGenerateRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            size: DEFAULT_SIZE.to_string(),
            quality: DEFAULT_QUALITY.to_string(),
            style: DEFAULT_STYLE.to_string(),
            timeout,
        }
    }
}

/// What a provider hands back: a resource to fetch, or the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderImage {
    Url(String),
    Inline(Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} rate limited the request: {message}")]
    RateLimited { provider: String, message: String },
    #[error("{provider} did not answer within {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
    #[error("{provider} request failed ({status}): {body}")]
    Rejected {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} transport failure")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned an unusable response: {message}")]
    InvalidResponse { provider: String, message: String },
    #[error("{provider} is not configured: {message}")]
    Unavailable { provider: String, message: String },
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }

    fn from_transport(provider: &str, source: reqwest::Error, timeout: Duration) -> Self {
        if source.is_timeout() {
            return ProviderError::Timeout {
                provider: provider.to_string(),
                timeout,
            };
        }
        ProviderError::Transport {
            provider: provider.to_string(),
            source,
        }
    }

    fn invalid(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Text-to-image capability.
///
/// Implementations must honor `request.timeout` for their own I/O; callers
/// additionally stop waiting once the window has passed.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ImageGenerateRequest) -> Result<ProviderImage, ProviderError>;
    fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, ProviderError>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry(config: &TrayConfig) -> ImageProviderRegistry {
    let mut providers = ImageProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(OpenAiProvider::new(
        config.openai_api_base.clone(),
        config.openai_api_key.clone(),
    ));
    providers
}

/// Offline provider: deterministic colour swatches derived from the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ImageGenerateRequest) -> Result<ProviderImage, ProviderError> {
        let mut hasher = Sha256::new();
        hasher.update(request.model.as_bytes());
        hasher.update(request.prompt.as_bytes());
        let digest = hasher.finalize();
        Ok(ProviderImage::Url(format!(
            "{DRYRUN_SCHEME}{}",
            hex::encode(&digest[..8])
        )))
    }

    fn download(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, ProviderError> {
        let token = url
            .strip_prefix(DRYRUN_SCHEME)
            .ok_or_else(|| ProviderError::invalid(self.name(), format!("not a dryrun url: {url}")))?;
        let bytes = hex::decode(token)
            .map_err(|err| ProviderError::invalid(self.name(), err.to_string()))?;
        let [r, g, b, ..] = bytes.as_slice() else {
            return Err(ProviderError::invalid(self.name(), "dryrun token too short"));
        };
        let image = RgbImage::from_pixel(DRYRUN_EDGE, DRYRUN_EDGE, Rgb([*r, *g, *b]));
        encode_png(&DynamicImage::ImageRgb8(image))
            .map_err(|err| ProviderError::invalid(self.name(), format!("{err:#}")))
    }
}

/// OpenAI images API (`/images/generations`).
pub struct OpenAiProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        let api_base = api_base.into();
        let api_base = api_base.trim().trim_end_matches('/');
        Self {
            api_base: if api_base.is_empty() {
                DEFAULT_OPENAI_API_BASE.to_string()
            } else {
                api_base.to_string()
            },
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/images/generations", self.api_base)
    }

    fn check_status(&self, response: HttpResponse) -> Result<HttpResponse, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = truncate_text(&response.text().unwrap_or_default(), 512);
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                provider: self.name().to_string(),
                message: body,
            });
        }
        Err(ProviderError::Rejected {
            provider: self.name().to_string(),
            status: status.as_u16(),
            body,
        })
    }

    fn extract_image(&self, payload: &Value) -> Result<ProviderImage, ProviderError> {
        let Some(first) = payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
        else {
            return Err(ProviderError::invalid(self.name(), "response contained no images"));
        };
        if let Some(b64) = first.get("b64_json").and_then(Value::as_str) {
            let bytes = BASE64
                .decode(b64.as_bytes())
                .map_err(|err| ProviderError::invalid(self.name(), format!("base64: {err}")))?;
            return Ok(ProviderImage::Inline(bytes));
        }
        if let Some(url) = first
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|url| !url.is_empty())
        {
            return Ok(ProviderImage::Url(url.to_string()));
        }
        Err(ProviderError::invalid(self.name(), "image entry has neither url nor b64_json"))
    }
}

impl ImageProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, request: &ImageGenerateRequest) -> Result<ProviderImage, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Unavailable {
                provider: self.name().to_string(),
                message: "OPENAI_API_KEY not set".to_string(),
            });
        };
        let model = if request.model.trim().is_empty() {
            DEFAULT_IMAGE_MODEL
        } else {
            request.model.as_str()
        };
        let payload = json!({
            "model": model,
            "prompt": request.prompt,
            "n": 1,
            "size": request.size,
            "quality": request.quality,
            "style": request.style,
        });
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .map_err(|err| ProviderError::from_transport(self.name(), err, request.timeout))?;
        let response = self.check_status(response)?;
        let parsed: Value = response
            .json()
            .map_err(|err| ProviderError::invalid(self.name(), format!("invalid JSON: {err}")))?;
        self.extract_image(&parsed)
    }

    fn download(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|err| ProviderError::from_transport(self.name(), err, timeout))?;
        let response = self.check_status(response)?;
        let bytes = response
            .bytes()
            .map_err(|err| ProviderError::from_transport(self.name(), err, timeout))?;
        if bytes.is_empty() {
            return Err(ProviderError::invalid(self.name(), "downloaded image is empty"));
        }
        Ok(bytes.to_vec())
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn request(prompt: &str) -> ImageGenerateRequest {
        ImageGenerateRequest::new(prompt, "dall-e-3", TIMEOUT)
    }

    #[test]
    fn dryrun_is_deterministic_per_prompt() -> anyhow::Result<()> {
        let provider = DryrunProvider;
        let first = provider.generate(&request("kimchi"))?;
        let second = provider.generate(&request("kimchi"))?;
        let other = provider.generate(&request("udon"))?;
        assert_eq!(first, second);
        assert_ne!(first, other);

        let ProviderImage::Url(url) = first else {
            anyhow::bail!("dryrun should return a url");
        };
        let bytes = provider.download(&url, TIMEOUT)?;
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (DRYRUN_EDGE, DRYRUN_EDGE));
        assert_eq!(bytes, provider.download(&url, TIMEOUT)?);
        Ok(())
    }

    #[test]
    fn dryrun_rejects_foreign_urls() {
        let err = DryrunProvider.download("https://example.test/a.png", TIMEOUT);
        assert!(matches!(err, Err(ProviderError::InvalidResponse { .. })));
    }

    #[test]
    fn openai_without_key_is_unavailable() {
        let provider = OpenAiProvider::new("http://127.0.0.1:9", None);
        let err = provider.generate(&request("kimchi"));
        assert!(matches!(err, Err(ProviderError::Unavailable { .. })));
    }

    #[test]
    fn openai_maps_429_to_rate_limited() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/images/generations")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
            .create();
        let provider = OpenAiProvider::new(server.url(), Some("sk-test".to_string()));

        let err = provider.generate(&request("kimchi"));
        mock.assert();
        assert!(matches!(err, Err(ref e) if e.is_rate_limited()));
    }

    #[test]
    fn openai_maps_other_failures_to_rejected() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/images/generations")
            .with_status(400)
            .with_body("content policy violation")
            .create();
        let provider = OpenAiProvider::new(server.url(), Some("sk-test".to_string()));

        match provider.generate(&request("kimchi")) {
            Err(ProviderError::Rejected { status, body, .. }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "content policy violation");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn openai_sends_dalle_payload_and_downloads_url() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let image_url = format!("{}/files/kimchi.png", server.url());
        let generate = server
            .mock("POST", "/images/generations")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "dall-e-3",
                "n": 1,
                "size": "1024x1024",
                "quality": "standard",
                "style": "natural",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"created": 1, "data": [{"url": image_url}]}).to_string())
            .create();
        let png = DryrunProvider.download("dryrun://0a0b0c0d", TIMEOUT)?;
        let download = server
            .mock("GET", "/files/kimchi.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(png.clone())
            .create();
        let provider = OpenAiProvider::new(server.url(), Some("sk-test".to_string()));

        let image = provider.generate(&request("kimchi"))?;
        assert_eq!(image, ProviderImage::Url(image_url.clone()));
        assert_eq!(provider.download(&image_url, TIMEOUT)?, png);
        generate.assert();
        download.assert();
        Ok(())
    }

    #[test]
    fn openai_accepts_inline_base64_images() -> anyhow::Result<()> {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/images/generations")
            .with_status(200)
            .with_body(json!({"data": [{"b64_json": BASE64.encode(b"png-bytes")}]}).to_string())
            .create();
        let provider = OpenAiProvider::new(server.url(), Some("sk-test".to_string()));
        assert_eq!(
            provider.generate(&request("kimchi"))?,
            ProviderImage::Inline(b"png-bytes".to_vec())
        );
        Ok(())
    }

    #[test]
    fn default_registry_includes_dryrun_and_openai() {
        let registry = default_provider_registry(&TrayConfig::new("/tmp/tray"));
        assert_eq!(registry.names(), vec!["dryrun", "openai"]);
        assert!(registry.get("gemini").is_none());
    }
}
