mod composer;
mod library;
mod rules;

pub use composer::PromptComposer;
pub use library::{
    PromptLibrary, PromptRegistry, BBQ_TEMPLATE, FUSION_TEMPLATE, STEW_TEMPLATE,
    TRADITIONAL_TEMPLATE,
};
pub use rules::{matching_rule, select_template, TemplateRule, DEFAULT_TEMPLATE, TEMPLATE_RULES};
