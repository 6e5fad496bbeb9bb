use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::json;
use tray_contracts::events::{payload, EventWriter};
use tray_contracts::matching::{MatchCache, HIT_CONFIDENCE};
use tray_contracts::menu::{Category, MenuItem};
use tray_contracts::prompts::{PromptComposer, PromptLibrary, PromptRegistry};
use tray_contracts::store::open_store;
use tray_contracts::templates::{TrayTemplate, TRAY_TEMPLATES};

use crate::compositor::{render_mock_tray, TrayCompositor};
use crate::config::TrayConfig;
use crate::enhance::{enhance_bytes, EnhanceKind};
use crate::generator::ItemImageGenerator;
use crate::provider::{default_provider_registry, ImageProvider};
use crate::storage::{FileStorage, StoredImage};

const TRAY_PREFIX: &str = "tray";
const MOCK_PREFIX: &str = "mock_tray";
const PREVIEW_PREFIX: &str = "preview";
const ENHANCED_PREFIX: &str = "enhanced";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrayResponse {
    pub success: bool,
    pub image_url: String,
    pub cached: bool,
    pub mock: bool,
    pub confidence: f64,
    pub message: String,
    /// Slots drawn on a fresh composite; zero for cached and mock trays.
    pub placed_items: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ImageResponse {
    fn stored(image: StoredImage) -> Self {
        Self {
            success: true,
            image_url: Some(image.url),
            message: None,
        }
    }

    fn failed(err: &anyhow::Error) -> Self {
        Self {
            success: false,
            image_url: None,
            message: Some(format!("{err:#}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrayStats {
    pub total_cached: usize,
    pub total_food_items: usize,
    pub store: String,
    pub provider: Option<String>,
    pub category_templates: Vec<String>,
}

struct FreshTray {
    stored: StoredImage,
    placed_items: usize,
    degraded_items: Vec<String>,
}

/// Menu in, tray image out.
///
/// Cache hits short-circuit. On a miss each item is generated on its own
/// (placeholders for failures), composited and written to uploads. Any
/// error in that branch yields a mock tray instead; only a failing mock
/// path is reported to the caller.
pub struct TrayService {
    events: EventWriter,
    prompts: Arc<PromptRegistry>,
    cache: MatchCache,
    generator: Option<ItemImageGenerator>,
    compositor: TrayCompositor,
    storage: FileStorage,
}

impl TrayService {
    /// Resolves the provider named in `config` from the built-in registry.
    pub fn new(config: TrayConfig) -> Result<Self> {
        let provider = match config.provider.as_deref() {
            Some(name) => {
                let registry = default_provider_registry(&config);
                let provider = registry.get(name).ok_or_else(|| {
                    anyhow!(
                        "unknown image provider '{name}' (available: {})",
                        registry.names().join(", ")
                    )
                })?;
                Some(provider)
            }
            None => None,
        };
        Self::with_provider(config, provider)
    }

    pub fn with_provider(
        config: TrayConfig,
        provider: Option<Arc<dyn ImageProvider>>,
    ) -> Result<Self> {
        let events = EventWriter::new(
            config.events_path.clone(),
            uuid::Uuid::new_v4().to_string(),
        );
        let library = PromptLibrary::load(config.prompts_path.as_deref())
            .context("failed to load prompt library")?;
        let prompts = Arc::new(PromptRegistry::new(library));
        let store = open_store(config.cache_path.as_deref(), &events);
        let storage = FileStorage::open(&config.uploads_dir)?;
        let generator = provider.map(|provider| {
            ItemImageGenerator::new(
                provider,
                Arc::clone(&prompts),
                events.clone(),
                config.image_model.clone(),
                config.retry,
            )
        });

        events.record(
            "service_started",
            payload(json!({
                "store": store.name(),
                "provider": generator.as_ref().map(ItemImageGenerator::provider_name),
                "uploads_dir": config.uploads_dir.to_string_lossy(),
                "worst_case_item_latency_s": config.retry.worst_case_latency().as_secs_f64(),
            })),
        );

        Ok(Self {
            cache: MatchCache::new(store, Arc::clone(&prompts), events.clone()),
            compositor: TrayCompositor::new(events.clone()),
            events,
            prompts,
            generator,
            storage,
        })
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn generate_tray(&self, items: &[MenuItem], template_id: &str) -> Result<TrayResponse> {
        if items.is_empty() {
            bail!("at least one menu item is required");
        }
        let names = items
            .iter()
            .map(|item| item.name.as_str())
            .collect::<Vec<&str>>();

        let lookup = self.cache.find_match(items);
        if let (true, Some(url)) = (lookup.matched, lookup.cached_image.clone()) {
            self.events.record(
                "tray_cache_hit",
                payload(json!({"items": names, "image_url": url})),
            );
            return Ok(TrayResponse {
                success: true,
                image_url: url,
                cached: true,
                mock: false,
                confidence: lookup.confidence,
                message: "Found a cached tray image".to_string(),
                placed_items: 0,
                degraded_items: Vec::new(),
            });
        }

        match self.generate_fresh(items, template_id) {
            Ok(fresh) => {
                self.cache.save_result(items, &fresh.stored.url);
                self.events.record(
                    "tray_generated",
                    payload(json!({
                        "items": names,
                        "template": template_id,
                        "image_url": fresh.stored.url,
                        "placed_items": fresh.placed_items,
                        "degraded_items": fresh.degraded_items,
                    })),
                );
                Ok(TrayResponse {
                    success: true,
                    image_url: fresh.stored.url,
                    cached: false,
                    mock: false,
                    confidence: HIT_CONFIDENCE,
                    message: "Generated a new tray image".to_string(),
                    placed_items: fresh.placed_items,
                    degraded_items: fresh.degraded_items,
                })
            }
            Err(generation_err) => {
                self.events.record(
                    "tray_generation_failed",
                    payload(json!({
                        "items": names,
                        "template": template_id,
                        "error": format!("{generation_err:#}"),
                    })),
                );
                let stored = self.store_mock_tray().map_err(|mock_err| {
                    anyhow!(
                        "tray generation failed: {generation_err:#}; mock tray failed: {mock_err:#}"
                    )
                })?;
                self.cache.save_result(items, &stored.url);
                self.events.record(
                    "mock_tray_generated",
                    payload(json!({"items": names, "image_url": stored.url})),
                );
                Ok(TrayResponse {
                    success: true,
                    image_url: stored.url,
                    cached: false,
                    mock: true,
                    confidence: HIT_CONFIDENCE,
                    message: format!("Generated a mock tray ({generation_err})"),
                    placed_items: 0,
                    degraded_items: Vec::new(),
                })
            }
        }
    }

    fn generate_fresh(&self, items: &[MenuItem], template_id: &str) -> Result<FreshTray> {
        let Some(generator) = self.generator.as_ref() else {
            bail!("no image provider configured");
        };
        let images = generator.generate_all(items);
        let composite = self.compositor.compose(&images, template_id)?;
        let stored = self.storage.store(TRAY_PREFIX, &composite.png)?;
        Ok(FreshTray {
            placed_items: composite.placed.len(),
            degraded_items: composite.degraded_items(),
            stored,
        })
    }

    fn store_mock_tray(&self) -> Result<StoredImage> {
        let png = render_mock_tray()?;
        self.storage.store(MOCK_PREFIX, &png)
    }

    /// Single-dish image. Failures are reported, never replaced by a
    /// placeholder.
    pub fn preview_food(&self, name: &str, category: Option<Category>) -> ImageResponse {
        match self.try_preview(name, category) {
            Ok(stored) => {
                self.events.record(
                    "preview_generated",
                    payload(json!({"item": name, "image_url": stored.url})),
                );
                ImageResponse::stored(stored)
            }
            Err(err) => {
                self.events.record(
                    "preview_failed",
                    payload(json!({"item": name, "error": format!("{err:#}")})),
                );
                ImageResponse::failed(&err)
            }
        }
    }

    fn try_preview(&self, name: &str, category: Option<Category>) -> Result<StoredImage> {
        let name = name.trim();
        if name.is_empty() {
            bail!("food name is required");
        }
        let Some(generator) = self.generator.as_ref() else {
            bail!("no image provider configured");
        };
        let prompt = self
            .prompts
            .read(|library| PromptComposer::new(library).describe(name, category))?;
        let bytes = generator
            .request_image(&prompt)
            .with_context(|| format!("preview generation failed for '{name}'"))?;
        self.storage.store(PREVIEW_PREFIX, &bytes)
    }

    pub fn enhance(&self, image_url: &str, kind: EnhanceKind) -> ImageResponse {
        let result = self
            .storage
            .read(image_url)
            .and_then(|bytes| enhance_bytes(&bytes, kind))
            .and_then(|png| self.storage.store(ENHANCED_PREFIX, &png));
        match result {
            Ok(stored) => {
                self.events.record(
                    "image_enhanced",
                    payload(json!({
                        "source": image_url,
                        "kind": kind.as_str(),
                        "image_url": stored.url,
                    })),
                );
                ImageResponse::stored(stored)
            }
            Err(err) => {
                self.events.record(
                    "enhance_failed",
                    payload(json!({
                        "source": image_url,
                        "kind": kind.as_str(),
                        "error": format!("{err:#}"),
                    })),
                );
                ImageResponse::failed(&err)
            }
        }
    }

    pub fn find_cached_path(&self, image_id: &str) -> Option<PathBuf> {
        self.storage.find_cached_path(image_id)
    }

    pub fn templates(&self) -> &'static [TrayTemplate] {
        TRAY_TEMPLATES
    }

    pub fn stats(&self) -> TrayStats {
        let cache = self.cache.stats();
        TrayStats {
            total_cached: cache.total_cached,
            total_food_items: cache.total_food_items,
            store: self.cache.store_name().to_string(),
            provider: self
                .generator
                .as_ref()
                .map(|generator| generator.provider_name().to_string()),
            category_templates: self
                .prompts
                .read(|library| library.template_ids().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}
