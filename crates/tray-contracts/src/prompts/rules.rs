use super::library::{BBQ_TEMPLATE, FUSION_TEMPLATE, STEW_TEMPLATE, TRADITIONAL_TEMPLATE};

/// Maps a main-dish keyword family onto a category template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemplateRule {
    pub name: &'static str,
    pub template_id: &'static str,
    pub keywords: &'static [&'static str],
}

impl TemplateRule {
    pub fn matches(&self, main_dish: &str) -> bool {
        let lowered = main_dish.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()))
    }
}

/// Evaluated top to bottom; the first matching rule wins.
pub const TEMPLATE_RULES: &[TemplateRule] = &[
    TemplateRule {
        name: "fusion",
        template_id: FUSION_TEMPLATE,
        keywords: &["cutlet", "tonkatsu", "curry", "돈까스", "카레"],
    },
    TemplateRule {
        name: "bbq",
        template_id: BBQ_TEMPLATE,
        keywords: &["pork belly", "samgyeopsal", "ribs", "galbi", "삼겹살", "갈비"],
    },
    TemplateRule {
        name: "stew",
        template_id: STEW_TEMPLATE,
        keywords: &["stew", "jjigae", "soup", "찌개", "탕"],
    },
];

pub const DEFAULT_TEMPLATE: &str = TRADITIONAL_TEMPLATE;

pub fn matching_rule(main_dish: &str) -> Option<&'static TemplateRule> {
    TEMPLATE_RULES.iter().find(|rule| rule.matches(main_dish))
}

pub fn select_template(main_dish: Option<&str>) -> &'static str {
    main_dish
        .and_then(matching_rule)
        .map(|rule| rule.template_id)
        .unwrap_or(DEFAULT_TEMPLATE)
}
