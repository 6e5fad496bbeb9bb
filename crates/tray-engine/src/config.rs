use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::generator::RetryPolicy;

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// Runtime settings for a [`crate::TrayService`].
///
/// Everything lives under `data_dir` unless overridden: `uploads/` for
/// images, `cache.json` for the durable match cache, `events.jsonl` for
/// the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct TrayConfig {
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub events_path: PathBuf,
    pub cache_path: Option<PathBuf>,
    pub prompts_path: Option<PathBuf>,
    /// `None` disables real generation; every miss produces a mock tray.
    pub provider: Option<String>,
    pub openai_api_base: String,
    pub openai_api_key: Option<String>,
    pub image_model: String,
    pub retry: RetryPolicy,
}

impl TrayConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            uploads_dir: data_dir.join("uploads"),
            events_path: data_dir.join("events.jsonl"),
            cache_path: Some(data_dir.join("cache.json")),
            prompts_path: None,
            provider: None,
            openai_api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            openai_api_key: None,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            retry: RetryPolicy::default(),
            data_dir,
        }
    }

    pub fn from_env(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(data_dir);
        config.apply_overrides(non_empty_env);
        config
    }

    /// Applies `TRAY_*` / `OPENAI_*` settings from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("OPENAI_API_KEY").or_else(|| lookup("OPENAI_API_KEY_BACKUP")) {
            self.openai_api_key = Some(key);
        }
        if let Some(base) = lookup("OPENAI_API_BASE") {
            self.openai_api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("TRAY_IMAGE_MODEL") {
            self.image_model = model;
        }
        self.provider = match lookup("TRAY_PROVIDER").map(|value| value.to_ascii_lowercase()) {
            Some(value) if matches!(value.as_str(), "none" | "mock") => None,
            Some(value) => Some(value),
            None if self.openai_api_key.is_some() => Some("openai".to_string()),
            None => self.provider.take(),
        };
        if let Some(uploads) = lookup("TRAY_UPLOADS_DIR") {
            self.uploads_dir = PathBuf::from(uploads);
        }
        if let Some(cache) = lookup("TRAY_CACHE_PATH") {
            self.cache_path = if cache.eq_ignore_ascii_case("memory") {
                None
            } else {
                Some(PathBuf::from(cache))
            };
        }
        if let Some(prompts) = lookup("TRAY_PROMPTS_PATH") {
            self.prompts_path = Some(PathBuf::from(prompts));
        }

        let defaults = RetryPolicy::default();
        self.retry = RetryPolicy {
            timeout: Duration::from_secs_f64(value_as_f64(
                lookup("TRAY_REQUEST_TIMEOUT").as_deref(),
                defaults.timeout.as_secs_f64(),
                1.0,
                300.0,
            )),
            rate_limit_retries: value_as_f64(
                lookup("TRAY_RATE_LIMIT_RETRIES").as_deref(),
                defaults.rate_limit_retries as f64,
                0.0,
                10.0,
            )
            .round() as usize,
            retry_delay: Duration::from_secs_f64(value_as_f64(
                lookup("TRAY_RETRY_DELAY").as_deref(),
                defaults.retry_delay.as_secs_f64(),
                0.0,
                60.0,
            )),
        };
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn value_as_f64(raw: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
