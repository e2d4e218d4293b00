pub mod gemini;

pub use gemini::GeminiClient;

use crate::models::ChatMode;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;

/// Incremental text from a streaming generation. An `Err` item ends the stream.
pub type TextStream = BoxStream<'static, Result<String, String>>;

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    pub fn for_mode(mode: ChatMode) -> Self {
        Self {
            temperature: match mode {
                ChatMode::Simple => 0.3,
                ChatMode::Conversational => 0.7,
            },
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
        }
    }
}

/// A generative text backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate the whole reply in one call
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String, String>;

    /// Start a streaming generation. Errors returned here happen before any text is produced.
    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<TextStream, String>;
}
