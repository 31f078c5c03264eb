//! Boundary to the external generative text API.

pub mod gemini;

use async_trait::async_trait;

use crate::errors::ProviderError;

pub use gemini::GeminiClient;

/// Issues one prompt with one credential and returns the raw reply text.
/// The credential applies to this call only. Implementations do not retry;
/// the generator owns retry policy.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ProviderError>;
}
