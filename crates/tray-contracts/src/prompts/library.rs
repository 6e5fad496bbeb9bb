use std::path::Path;
use std::sync::RwLock;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const DEFAULT_PROMPTS_JSON: &str = include_str!("../../resources/default_prompts.json");

pub const TRADITIONAL_TEMPLATE: &str = "korean_traditional";
pub const FUSION_TEMPLATE: &str = "japanese_fusion";
pub const BBQ_TEMPLATE: &str = "bbq_style";
pub const STEW_TEMPLATE: &str = "stew_focused";

/// Food-name fragments and category templates used to build generation prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptLibrary {
    #[serde(default)]
    foods: IndexMap<String, String>,
    #[serde(default)]
    category_templates: IndexMap<String, String>,
}

impl PromptLibrary {
    pub fn builtin() -> Self {
        serde_json::from_str(DEFAULT_PROMPTS_JSON).unwrap_or_default()
    }

    /// Builtin library with an optional JSON override file merged on top.
    pub fn load(overrides: Option<&Path>) -> anyhow::Result<Self> {
        let mut library = Self::builtin();
        if let Some(path) = overrides {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading prompt overrides {}", path.display()))?;
            library
                .merge_json(&raw)
                .with_context(|| format!("invalid prompt overrides {}", path.display()))?;
        }
        Ok(library)
    }

    pub fn merge_json(&mut self, raw: &str) -> anyhow::Result<()> {
        let overrides: PromptLibrary = serde_json::from_str(raw)?;
        for (name, fragment) in overrides.foods {
            self.insert_food_prompt(&name, &fragment);
        }
        for (id, template) in overrides.category_templates {
            self.insert_category_template(&id, &template);
        }
        Ok(())
    }

    pub fn food_prompt(&self, name: &str) -> Option<&str> {
        self.foods.get(name.trim()).map(String::as_str)
    }

    pub fn category_template(&self, id: &str) -> Option<&str> {
        self.category_templates.get(id).map(String::as_str)
    }

    pub fn food_count(&self) -> usize {
        self.foods.len()
    }

    pub fn template_ids(&self) -> impl Iterator<Item = &str> {
        self.category_templates.keys().map(String::as_str)
    }

    pub fn insert_food_prompt(&mut self, name: &str, fragment: &str) {
        let name = name.trim();
        let fragment = fragment.trim();
        if name.is_empty() || fragment.is_empty() {
            return;
        }
        self.foods.insert(name.to_string(), fragment.to_string());
    }

    pub fn insert_category_template(&mut self, id: &str, template: &str) {
        let id = id.trim();
        if id.is_empty() || template.trim().is_empty() {
            return;
        }
        self.category_templates
            .insert(id.to_string(), template.trim().to_string());
    }
}

/// Shared, synchronized home of the prompt library.
///
/// Readers borrow the library for the duration of a closure; additions at
/// runtime take the write lock.
#[derive(Debug, Default)]
pub struct PromptRegistry {
    inner: RwLock<PromptLibrary>,
}

impl PromptRegistry {
    pub fn new(library: PromptLibrary) -> Self {
        Self {
            inner: RwLock::new(library),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&PromptLibrary) -> R) -> anyhow::Result<R> {
        let guard = self
            .inner
            .read()
            .map_err(|_| anyhow::anyhow!("prompt registry lock poisoned"))?;
        Ok(f(&guard))
    }

    pub fn add_food_prompt(&self, name: &str, fragment: &str) -> anyhow::Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| anyhow::anyhow!("prompt registry lock poisoned"))?;
        guard.insert_food_prompt(name, fragment);
        Ok(())
    }

    pub fn add_category_template(&self, id: &str, template: &str) -> anyhow::Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| anyhow::anyhow!("prompt registry lock poisoned"))?;
        guard.insert_category_template(id, template);
        Ok(())
    }
}
