pub mod events;
pub mod matching;
pub mod menu;
pub mod prompts;
pub mod store;
pub mod templates;
