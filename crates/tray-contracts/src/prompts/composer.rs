use crate::menu::{Category, MenuItem};

use super::library::{PromptLibrary, TRADITIONAL_TEMPLATE};
use super::rules::select_template;

const FALLBACK_TEMPLATE: &str = "A school cafeteria meal tray with {main_dish}, {side_dish}, and {soup} on a white tray, food photography style";

const MAIN_SLOT: &str = "{main_dish}";
const SIDE_SLOT: &str = "{side_dish}";
const SOUP_SLOT: &str = "{soup}";

const DEFAULT_MAIN_FRAGMENT: &str = "steamed white rice";
const DEFAULT_SIDE_FRAGMENT: &str = "seasonal vegetable side dishes";
const DEFAULT_SOUP_FRAGMENT: &str = "a bowl of clear soup";

#[derive(Debug, Clone, Copy)]
pub struct PromptComposer<'a> {
    library: &'a PromptLibrary,
}

impl<'a> PromptComposer<'a> {
    pub fn new(library: &'a PromptLibrary) -> Self {
        Self { library }
    }

    /// Tray-level prompt for a non-empty item list.
    pub fn compose(&self, items: &[MenuItem]) -> String {
        let main = first_of(items, Category::Main);
        let side = first_of(items, Category::Side);
        let soup = first_of(items, Category::Soup);

        let template_id = select_template(main.map(|idx| items[idx].name.as_str()));
        let template = self
            .library
            .category_template(template_id)
            .or_else(|| self.library.category_template(TRADITIONAL_TEMPLATE))
            .unwrap_or(FALLBACK_TEMPLATE);

        let mut prompt = template.to_string();
        for (slot, representative, default) in [
            (MAIN_SLOT, main, DEFAULT_MAIN_FRAGMENT),
            (SIDE_SLOT, side, DEFAULT_SIDE_FRAGMENT),
            (SOUP_SLOT, soup, DEFAULT_SOUP_FRAGMENT),
        ] {
            let fragment = representative
                .map(|idx| self.fragment(&items[idx].name))
                .unwrap_or(default);
            prompt = prompt.replace(slot, fragment);
        }

        let additional = items
            .iter()
            .enumerate()
            .filter(|(idx, _)| ![main, side, soup].contains(&Some(*idx)))
            .map(|(_, item)| self.fragment(&item.name))
            .collect::<Vec<&str>>();
        if !additional.is_empty() {
            prompt.push_str(", along with ");
            prompt.push_str(&additional.join(", "));
        }

        prompt
    }

    /// Single-dish prompt used for per-item generation and previews.
    pub fn describe(&self, name: &str, category: Option<Category>) -> String {
        if let Some(fragment) = self.library.food_prompt(name) {
            return format!(
                "A high-quality, appetizing photo of {fragment}, professional food photography, natural lighting, Korean food style"
            );
        }
        format!(
            "A high-quality, appetizing photo of {}, {}, Korean food photography style, natural lighting, professional food photography",
            name.trim(),
            category_phrase(category)
        )
    }

    fn fragment<'n>(&self, name: &'n str) -> &'n str
    where
        'a: 'n,
    {
        self.library.food_prompt(name).unwrap_or(name)
    }
}

fn first_of(items: &[MenuItem], category: Category) -> Option<usize> {
    items.iter().position(|item| item.category == category)
}

fn category_phrase(category: Option<Category>) -> &'static str {
    match category {
        Some(Category::Main) => "as a main dish, beautifully presented on a plate",
        Some(Category::Side) => "as a side dish, colorful and well-arranged",
        Some(Category::Soup) => "as a soup, steaming and inviting",
        Some(Category::Dessert) => "as a dessert, sweet and appealing",
        None => "well-presented on a plate",
    }
}
