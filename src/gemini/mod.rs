pub mod client;
pub mod error;
pub mod models;

use async_trait::async_trait;

use crate::processing::DecodedImage;

pub use client::GeminiClient;
pub use error::ModelError;
pub use models::ModelSelection;

/// A multimodal model that answers a text prompt about one image.
#[async_trait]
pub trait ReportModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str, image: &DecodedImage) -> Result<String, ModelError>;
}
