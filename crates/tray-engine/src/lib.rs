pub mod compositor;
pub mod config;
pub mod enhance;
pub mod generator;
pub mod placeholder;
pub mod provider;
pub mod service;
pub mod storage;

pub use compositor::{render_mock_tray, Composite, PlacedItem, TrayCompositor};
pub use config::TrayConfig;
pub use enhance::EnhanceKind;
pub use generator::{ItemImage, ItemImageGenerator, RetryPolicy};
pub use provider::{
    default_provider_registry, DryrunProvider, ImageGenerateRequest, ImageProvider,
    ImageProviderRegistry, OpenAiProvider, ProviderError, ProviderImage,
};
pub use service::{ImageResponse, TrayResponse, TrayService, TrayStats};
pub use storage::{FileStorage, StoredImage};
