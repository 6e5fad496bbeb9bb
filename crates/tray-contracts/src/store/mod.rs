use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::events::{payload, EventWriter};

mod file;
mod memory;

pub use file::FileKvStore;
pub use memory::MemoryKvStore;

/// Minimal key/value capability the match cache needs from a backing store.
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &str;
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}

/// Picks the backing store once at startup.
///
/// A durable path that cannot be opened degrades to an in-memory store
/// instead of aborting startup.
pub fn open_store(path: Option<&Path>, events: &EventWriter) -> Arc<dyn KeyValueStore> {
    let Some(path) = path else {
        events.record(
            "cache_store_selected",
            payload(json!({"store": "memory", "reason": "no durable path configured"})),
        );
        return Arc::new(MemoryKvStore::new());
    };
    match FileKvStore::open(path) {
        Ok(store) => {
            events.record(
                "cache_store_selected",
                payload(json!({
                    "store": store.name(),
                    "path": path.to_string_lossy().to_string(),
                })),
            );
            Arc::new(store)
        }
        Err(err) => {
            events.record(
                "cache_store_degraded",
                payload(json!({
                    "store": "memory",
                    "path": path.to_string_lossy().to_string(),
                    "error": format!("{err:#}"),
                })),
            );
            Arc::new(MemoryKvStore::new())
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn expiry_millis(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}
