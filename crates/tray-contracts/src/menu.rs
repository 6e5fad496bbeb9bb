use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Main,
    Side,
    Soup,
    Dessert,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Main,
        Category::Side,
        Category::Soup,
        Category::Dessert,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Main => "main",
            Category::Side => "side",
            Category::Soup => "soup",
            Category::Dessert => "dessert",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "main" => Ok(Category::Main),
            "side" => Ok(Category::Side),
            "soup" => Ok(Category::Soup),
            "dessert" => Ok(Category::Dessert),
            other => bail!("unknown category '{other}'"),
        }
    }
}

/// One dish on the tray. Identity is `id`; cache matching only looks at `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MenuItem {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            category,
            description: None,
        }
    }
}

/// Unvalidated item as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMenuItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub main: usize,
    pub side: usize,
    pub soup: usize,
    pub dessert: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedMenu {
    pub items: Vec<MenuItem>,
    pub total_items: usize,
    pub categories: CategoryCounts,
}

pub fn validate_items(raw: &[RawMenuItem]) -> anyhow::Result<ValidatedMenu> {
    if raw.is_empty() {
        bail!("at least one menu item is required");
    }

    let mut items = Vec::with_capacity(raw.len());
    let mut counts = CategoryCounts::default();
    for (index, entry) in raw.iter().enumerate() {
        let position = index + 1;
        let name = entry
            .name
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let category = entry
            .category
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        let (Some(name), Some(category)) = (name, category) else {
            bail!("item {position}: name and category are required");
        };
        let Ok(category) = category.parse::<Category>() else {
            bail!("item {position}: unknown category '{category}'");
        };

        match category {
            Category::Main => counts.main += 1,
            Category::Side => counts.side += 1,
            Category::Soup => counts.soup += 1,
            Category::Dessert => counts.dessert += 1,
        }

        let id = entry
            .id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("item_{position}"));
        items.push(MenuItem {
            id,
            name: name.to_string(),
            category,
            description: entry
                .description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        });
    }

    Ok(ValidatedMenu {
        total_items: items.len(),
        items,
        categories: counts,
    })
}
