use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{expiry_millis, now_millis, KeyValueStore};

/// Process-local store. Entries are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at_ms: i64,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = now_millis();
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .values()
                    .filter(|entry| entry.expires_at_ms > now)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryKvStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self.lock()?;
        let now = now_millis();
        if entries
            .get(key)
            .map(|entry| entry.expires_at_ms <= now)
            .unwrap_or(false)
        {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        self.lock()?.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at_ms: expiry_millis(ttl),
            },
        );
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let now = now_millis();
        let mut keys = self
            .lock()?
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.expires_at_ms > now)
            .map(|(key, _)| key.clone())
            .collect::<Vec<String>>();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip_and_expiry() -> anyhow::Result<()> {
        let store = MemoryKvStore::new();
        store.set_with_expiry("menu:A+B", "/uploads/a.png", Duration::from_secs(60))?;
        store.set_with_expiry("menu:gone", "/uploads/gone.png", Duration::ZERO)?;

        assert_eq!(store.get("menu:A+B")?.as_deref(), Some("/uploads/a.png"));
        assert_eq!(store.get("menu:gone")?, None);
        assert_eq!(store.keys_with_prefix("menu:")?, vec!["menu:A+B"]);
        assert_eq!(store.len(), 1);
        Ok(())
    }
}
