use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::events::{payload, EventWriter};
use crate::menu::MenuItem;
use crate::prompts::{PromptComposer, PromptRegistry};
use crate::store::{KeyValueStore, MemoryKvStore};

pub const CACHE_KEY_PREFIX: &str = "menu:";
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub const HIT_CONFIDENCE: f64 = 1.0;
pub const COMPOSED_CONFIDENCE: f64 = 0.8;
pub const FAILED_CONFIDENCE: f64 = 0.0;

/// Outcome of a cache lookup.
///
/// `matched` means a usable instruction was produced: either a cached image
/// or a freshly composed prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_prompt: Option<String>,
    pub confidence: f64,
}

impl MatchResult {
    fn hit(url: String) -> Self {
        Self {
            matched: true,
            cached_image: Some(url),
            reference_prompt: None,
            confidence: HIT_CONFIDENCE,
        }
    }

    fn composed(prompt: String) -> Self {
        Self {
            matched: true,
            cached_image: None,
            reference_prompt: Some(prompt),
            confidence: COMPOSED_CONFIDENCE,
        }
    }

    fn failed() -> Self {
        Self {
            matched: false,
            cached_image: None,
            reference_prompt: None,
            confidence: FAILED_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_cached: usize,
    pub total_food_items: usize,
}

/// Sorted, `+`-joined item names. Category and id are ignored.
pub fn cache_key(items: &[MenuItem]) -> String {
    let mut names = items
        .iter()
        .map(|item| item.name.as_str())
        .collect::<Vec<&str>>();
    names.sort_unstable();
    names.join("+")
}

fn record_key(items: &[MenuItem]) -> String {
    format!("{CACHE_KEY_PREFIX}{}", cache_key(items))
}

/// Maps a menu composition to a cached tray image or a generation prompt.
///
/// The backing store is an accelerator only: every store failure degrades
/// to a miss, and writes that the store rejects land in a process-local
/// overflow map instead.
pub struct MatchCache {
    store: Arc<dyn KeyValueStore>,
    overflow: MemoryKvStore,
    prompts: Arc<PromptRegistry>,
    events: EventWriter,
    ttl: Duration,
}

impl MatchCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prompts: Arc<PromptRegistry>,
        events: EventWriter,
    ) -> Self {
        Self {
            store,
            overflow: MemoryKvStore::new(),
            prompts,
            events,
            ttl: CACHE_TTL,
        }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn find_match(&self, items: &[MenuItem]) -> MatchResult {
        if items.is_empty() {
            self.events.record(
                "cache_match_failed",
                payload(json!({"error": "no menu items supplied"})),
            );
            return MatchResult::failed();
        }
        let key = record_key(items);

        match self.store.get(&key) {
            Ok(Some(url)) => return MatchResult::hit(url),
            Ok(None) => {}
            Err(err) => {
                self.events.record(
                    "cache_read_failed",
                    payload(json!({
                        "key": key,
                        "store": self.store.name(),
                        "error": format!("{err:#}"),
                    })),
                );
            }
        }
        if let Ok(Some(url)) = self.overflow.get(&key) {
            return MatchResult::hit(url);
        }

        match self
            .prompts
            .read(|library| PromptComposer::new(library).compose(items))
        {
            Ok(prompt) => MatchResult::composed(prompt),
            Err(err) => {
                self.events.record(
                    "cache_match_failed",
                    payload(json!({"key": key, "error": format!("{err:#}")})),
                );
                MatchResult::failed()
            }
        }
    }

    pub fn save_result(&self, items: &[MenuItem], image_url: &str) {
        let key = record_key(items);
        match self.store.set_with_expiry(&key, image_url, self.ttl) {
            Ok(()) => {
                self.events.record(
                    "cache_saved",
                    payload(json!({
                        "key": key,
                        "store": self.store.name(),
                        "image_url": image_url,
                    })),
                );
            }
            Err(err) => {
                let overflow = self.overflow.set_with_expiry(&key, image_url, self.ttl);
                self.events.record(
                    "cache_write_failed",
                    payload(json!({
                        "key": key,
                        "store": self.store.name(),
                        "error": format!("{err:#}"),
                        "saved_in_memory": overflow.is_ok(),
                    })),
                );
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys = self
            .store
            .keys_with_prefix(CACHE_KEY_PREFIX)
            .unwrap_or_default();
        keys.extend(
            self.overflow
                .keys_with_prefix(CACHE_KEY_PREFIX)
                .unwrap_or_default(),
        );
        keys.sort();
        keys.dedup();
        CacheStats {
            total_cached: keys.len(),
            total_food_items: self.prompts.read(|library| library.food_count()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::menu::Category;
    use crate::prompts::PromptLibrary;
    use crate::store::FileKvStore;

    struct UnavailableStore;

    impl KeyValueStore for UnavailableStore {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("connection refused")
        }

        fn set_with_expiry(&self, _key: &str, _value: &str, _ttl: Duration) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }

        fn keys_with_prefix(&self, _prefix: &str) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("connection refused")
        }
    }

    fn scenario_items() -> Vec<MenuItem> {
        vec![
            MenuItem::new("Kimchi Stew", Category::Main),
            MenuItem::new("Pork Stir-fry", Category::Side),
            MenuItem::new("Kimchi", Category::Side),
            MenuItem::new("Seaweed Soup", Category::Soup),
        ]
    }

    fn cache_with(
        store: Arc<dyn KeyValueStore>,
        temp: &tempfile::TempDir,
    ) -> MatchCache {
        MatchCache::new(
            store,
            Arc::new(PromptRegistry::new(PromptLibrary::builtin())),
            EventWriter::new(temp.path().join("events.jsonl"), "test"),
        )
    }

    #[test]
    fn cache_key_sorts_names_and_ignores_order() {
        let forward = [
            MenuItem::new("A", Category::Main),
            MenuItem::new("B", Category::Side),
        ];
        let backward = [
            MenuItem::new("B", Category::Main),
            MenuItem::new("A", Category::Dessert),
        ];
        assert_eq!(cache_key(&forward), "A+B");
        assert_eq!(cache_key(&backward), "A+B");
    }

    proptest! {
        #[test]
        fn cache_key_is_invariant_under_permutation_category_and_id(
            (names, shuffled_names) in proptest::collection::vec("[A-Za-z ]{1,12}", 1..8)
                .prop_flat_map(|names| (Just(names.clone()), Just(names).prop_shuffle())),
            seed in any::<usize>(),
        ) {
            let items = names
                .iter()
                .map(|name| MenuItem::new(name.clone(), Category::Main))
                .collect::<Vec<MenuItem>>();
            let shuffled = shuffled_names
                .iter()
                .enumerate()
                .map(|(idx, name)| {
                    let category = Category::ALL[seed.wrapping_add(idx) % Category::ALL.len()];
                    let mut item = MenuItem::new(name.clone(), category);
                    item.id = format!("other-{idx}");
                    item
                })
                .collect::<Vec<MenuItem>>();
            prop_assert_eq!(cache_key(&items), cache_key(&shuffled));
        }
    }

    #[test]
    fn save_then_find_returns_cached_hit() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = Arc::new(FileKvStore::open(temp.path().join("cache.json"))?);
        let cache = cache_with(store, &temp);
        let items = scenario_items();

        let miss = cache.find_match(&items);
        assert!(miss.matched);
        assert_eq!(miss.cached_image, None);
        assert_eq!(miss.confidence, COMPOSED_CONFIDENCE);
        assert!(miss
            .reference_prompt
            .unwrap_or_default()
            .starts_with("A hearty Korean stew meal"));

        cache.save_result(&items, "/uploads/tray_1.png");
        let mut reordered = items.clone();
        reordered.reverse();
        assert_eq!(
            cache.find_match(&reordered),
            MatchResult {
                matched: true,
                cached_image: Some("/uploads/tray_1.png".to_string()),
                reference_prompt: None,
                confidence: HIT_CONFIDENCE,
            }
        );
        Ok(())
    }

    #[test]
    fn unavailable_store_degrades_to_memory_with_same_contract() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let cache = cache_with(Arc::new(UnavailableStore), &temp);
        let items = scenario_items();

        let miss = cache.find_match(&items);
        assert!(miss.matched);
        assert_eq!(miss.confidence, COMPOSED_CONFIDENCE);

        cache.save_result(&items, "/uploads/tray_2.png");
        let hit = cache.find_match(&items);
        assert!(hit.matched);
        assert_eq!(hit.cached_image.as_deref(), Some("/uploads/tray_2.png"));
        assert_eq!(hit.confidence, HIT_CONFIDENCE);
        assert_eq!(cache.stats().total_cached, 1);

        let log = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
        assert!(log.contains("cache_read_failed"));
        assert!(log.contains("cache_write_failed"));
        Ok(())
    }

    #[test]
    fn empty_items_report_failed_match() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let cache = cache_with(Arc::new(MemoryKvStore::new()), &temp);
        let result = cache.find_match(&[]);
        assert!(!result.matched);
        assert_eq!(result.confidence, FAILED_CONFIDENCE);
        Ok(())
    }

    #[test]
    fn stats_count_cached_menus_and_known_foods() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let cache = cache_with(Arc::new(MemoryKvStore::new()), &temp);
        cache.save_result(&scenario_items(), "/uploads/a.png");
        cache.save_result(&[MenuItem::new("Udon", Category::Main)], "/uploads/b.png");
        cache.save_result(&[MenuItem::new("Udon", Category::Soup)], "/uploads/c.png");

        let stats = cache.stats();
        assert_eq!(stats.total_cached, 2);
        assert_eq!(stats.total_food_items, PromptLibrary::builtin().food_count());
        Ok(())
    }
}
