use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::{json, Map, Value};

use super::{expiry_millis, now_millis, KeyValueStore};

/// Durable store backed by a single JSON object on disk.
///
/// Each record is `{"value": <string>, "expires_at_ms": <epoch millis>}`.
/// Writes merge only the keys this handle touched into whatever is on disk,
/// so two handles on the same file do not clobber each other's keys.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

#[derive(Debug, Default)]
struct FileState {
    payload: Option<Map<String, Value>>,
    dirty_keys: Vec<String>,
}

impl FileKvStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let payload = read_records(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(FileState {
                payload: Some(payload),
                dirty_keys: Vec::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_state<R>(
        &self,
        f: impl FnOnce(&Path, &mut FileState) -> anyhow::Result<R>,
    ) -> anyhow::Result<R> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("file store lock poisoned"))?;
        f(&self.path, &mut guard)
    }
}

impl FileState {
    fn ensure_loaded(&mut self, path: &Path, refresh: bool) -> anyhow::Result<&mut Map<String, Value>> {
        if refresh || self.payload.is_none() {
            self.payload = Some(read_records(path)?);
        }
        Ok(self.payload.get_or_insert_with(Map::new))
    }

    fn flush(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.dirty_keys.is_empty() {
            return Ok(());
        }
        let Some(payload) = self.payload.as_ref() else {
            return Ok(());
        };

        let mut on_disk = read_records(path)?;
        for key in &self.dirty_keys {
            if let Some(value) = payload.get(key) {
                on_disk.insert(key.clone(), value.clone());
            }
        }
        let now = now_millis();
        on_disk.retain(|_, record| !is_expired(record, now));
        write_records(path, &on_disk)?;
        self.payload = Some(on_disk);
        self.dirty_keys.clear();
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.with_state(|path, state| {
            let payload = state.ensure_loaded(path, true)?;
            let now = now_millis();
            Ok(payload
                .get(key)
                .filter(|record| !is_expired(record, now))
                .and_then(|record| record.get("value"))
                .and_then(Value::as_str)
                .map(str::to_string))
        })
    }

    fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        self.with_state(|path, state| {
            let payload = state.ensure_loaded(path, true)?;
            payload.insert(
                key.to_string(),
                json!({
                    "value": value,
                    "expires_at_ms": expiry_millis(ttl),
                }),
            );
            if !state.dirty_keys.iter().any(|existing| existing == key) {
                state.dirty_keys.push(key.to_string());
            }
            state.flush(path)
        })
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.with_state(|path, state| {
            let payload = state.ensure_loaded(path, true)?;
            let now = now_millis();
            let mut keys = payload
                .iter()
                .filter(|(key, record)| key.starts_with(prefix) && !is_expired(record, now))
                .map(|(key, _)| key.clone())
                .collect::<Vec<String>>();
            keys.sort();
            Ok(keys)
        })
    }
}

fn is_expired(record: &Value, now: i64) -> bool {
    record
        .get("expires_at_ms")
        .and_then(Value::as_i64)
        .map(|expires_at| expires_at <= now)
        .unwrap_or(false)
}

fn read_records(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed reading {}", path.display()))
        }
    };
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let Value::Object(records) = parsed else {
        bail!("{} does not hold a JSON object", path.display());
    };
    Ok(records)
}

fn write_records(path: &Path, records: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(records.clone()))?,
    )
    .with_context(|| format!("failed writing {}", path.display()))?;
    Ok(())
}
