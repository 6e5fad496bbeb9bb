use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::json;
use tray_contracts::events::{payload, EventWriter};
use tray_contracts::menu::MenuItem;
use tray_contracts::prompts::{PromptComposer, PromptRegistry};

use crate::placeholder;
use crate::provider::{ImageGenerateRequest, ImageProvider, ProviderError, ProviderImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Upper bound on one provider attempt (generate plus download).
    pub timeout: Duration,
    /// Extra attempts allowed after a rate-limit signal. Nothing else retries.
    pub rate_limit_retries: usize,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            rate_limit_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Saturates at `Duration::MAX` for oversized policies.
    pub fn worst_case_latency(&self) -> Duration {
        let retries = u32::try_from(self.rate_limit_retries).unwrap_or(u32::MAX);
        let waiting = self
            .timeout
            .checked_mul(retries.saturating_add(1))
            .unwrap_or(Duration::MAX);
        let sleeping = self
            .retry_delay
            .checked_mul(retries)
            .unwrap_or(Duration::MAX);
        waiting.saturating_add(sleeping)
    }
}

/// One menu item's picture. `placeholder` marks a degraded slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemImage {
    pub item: MenuItem,
    pub bytes: Vec<u8>,
    pub placeholder: bool,
    pub attempts: usize,
    pub error: Option<String>,
}

pub struct ItemImageGenerator {
    provider: Arc<dyn ImageProvider>,
    prompts: Arc<PromptRegistry>,
    events: EventWriter,
    model: String,
    retry: RetryPolicy,
}

impl ItemImageGenerator {
    pub fn new(
        provider: Arc<dyn ImageProvider>,
        prompts: Arc<PromptRegistry>,
        events: EventWriter,
        model: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            prompts,
            events,
            model: model.into(),
            retry,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Items are processed one at a time, in input order.
    pub fn generate_all(&self, items: &[MenuItem]) -> Vec<ItemImage> {
        items.iter().map(|item| self.generate_one(item)).collect()
    }

    /// Never fails: any provider problem turns into a placeholder image.
    pub fn generate_one(&self, item: &MenuItem) -> ItemImage {
        let prompt = match self.prompts.read(|library| {
            PromptComposer::new(library).describe(&item.name, Some(item.category))
        }) {
            Ok(prompt) => prompt,
            Err(err) => return self.degrade(item, 0, false, format!("{err:#}")),
        };

        let (outcome, attempts) = self.attempt_loop(&prompt, &item.name);
        match outcome {
            Ok(bytes) => {
                self.events.record(
                    "item_image_generated",
                    payload(json!({
                        "item": item.name,
                        "provider": self.provider.name(),
                        "attempts": attempts,
                        "bytes": bytes.len(),
                    })),
                );
                ItemImage {
                    item: item.clone(),
                    bytes,
                    placeholder: false,
                    attempts,
                    error: None,
                }
            }
            Err(err) => self.degrade(item, attempts, err.is_timeout(), error_chain_text(&err)),
        }
    }

    /// Fallible attempt loop without placeholder substitution.
    pub fn request_image(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        self.attempt_loop(prompt, prompt).0
    }

    fn attempt_loop(&self, prompt: &str, label: &str) -> (Result<Vec<u8>, ProviderError>, usize) {
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            match self.attempt_once(prompt) {
                Ok(bytes) => return (Ok(bytes), attempts),
                Err(err) if err.is_rate_limited() && attempts <= self.retry.rate_limit_retries => {
                    self.events.record(
                        "item_rate_limited",
                        payload(json!({
                            "item": label,
                            "provider": self.provider.name(),
                            "attempt": attempts,
                            "max_retries": self.retry.rate_limit_retries,
                            "retry_delay_s": self.retry.retry_delay.as_secs_f64(),
                        })),
                    );
                    thread::sleep(self.retry.retry_delay);
                }
                Err(err) => return (Err(err), attempts),
            }
        }
    }

    fn attempt_once(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        let timeout = self.retry.timeout;
        let request = ImageGenerateRequest::new(prompt, self.model.clone(), timeout);
        let provider = Arc::clone(&self.provider);
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("tray-provider".to_string())
            .spawn(move || {
                let result = provider
                    .generate(&request)
                    .and_then(|image| match image {
                        ProviderImage::Inline(bytes) => Ok(bytes),
                        ProviderImage::Url(url) => provider.download(&url, request.timeout),
                    });
                let _ = tx.send(result);
            })
            .map_err(|err| ProviderError::Unavailable {
                provider: self.provider.name().to_string(),
                message: format!("failed to spawn provider worker: {err}"),
            })?;

        // A worker that misses the window is abandoned; its late result is dropped.
        let bytes = match rx.recv_timeout(timeout) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(ProviderError::Timeout {
                    provider: self.provider.name().to_string(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ProviderError::InvalidResponse {
                    provider: self.provider.name().to_string(),
                    message: "provider worker exited without a result".to_string(),
                })
            }
        };

        image::load_from_memory(&bytes).map_err(|err| ProviderError::InvalidResponse {
            provider: self.provider.name().to_string(),
            message: format!("image did not decode: {err}"),
        })?;
        Ok(bytes)
    }

    fn degrade(
        &self,
        item: &MenuItem,
        attempts: usize,
        timed_out: bool,
        error: String,
    ) -> ItemImage {
        self.events.record(
            "item_image_failed",
            payload(json!({
                "item": item.name,
                "provider": self.provider.name(),
                "attempts": attempts,
                "timed_out": timed_out,
                "error": error,
            })),
        );
        let bytes = placeholder::render_placeholder(&item.name).unwrap_or_else(|err| {
            self.events.record(
                "placeholder_failed",
                payload(json!({"item": item.name, "error": format!("{err:#}")})),
            );
            Vec::new()
        });
        ItemImage {
            item: item.clone(),
            bytes,
            placeholder: true,
            attempts,
            error: Some(error),
        }
    }
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}
