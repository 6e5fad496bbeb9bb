use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub file_name: String,
    pub url: String,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Flat directory of generated PNGs, addressed as `/uploads/<file>`.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create uploads dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `<prefix>_<uuid>.png`; never overwrites an existing file.
    pub fn store(&self, prefix: &str, bytes: &[u8]) -> Result<StoredImage> {
        if !is_safe_name(prefix) {
            bail!("invalid file prefix '{prefix}'");
        }
        let file_name = format!("{prefix}_{}.png", uuid::Uuid::new_v4().simple());
        let path = self.root.join(&file_name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(StoredImage {
            url: format!("{UPLOADS_URL_PREFIX}{file_name}"),
            file_name,
            path,
        })
    }

    pub fn resolve_url(&self, url: &str) -> Result<PathBuf> {
        let Some(file_name) = url.trim().strip_prefix(UPLOADS_URL_PREFIX) else {
            bail!("not an uploads url: {url}");
        };
        if !is_safe_name(file_name) {
            bail!("invalid uploads path: {url}");
        }
        Ok(self.root.join(file_name))
    }

    pub fn read(&self, url: &str) -> Result<Vec<u8>> {
        let path = self.resolve_url(url)?;
        fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    /// `<image_id>.png` under the root, if it exists.
    pub fn find_cached_path(&self, image_id: &str) -> Option<PathBuf> {
        let image_id = image_id.trim();
        if !is_safe_name(image_id) {
            return None;
        }
        let path = self.root.join(format!("{image_id}.png"));
        path.is_file().then_some(path)
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
}
