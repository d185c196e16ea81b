//! Generative model providers
//!
//! The gateway only talks to a model through [`AiProvider`], so the concrete
//! backend can be swapped without touching retry or validation logic.

use serde::Serialize;

pub mod gemini;

pub use gemini::GeminiProvider;

/// Sampling settings forwarded to the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }
}

/// Raw text returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub text: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Text-completion backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AiProvider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<ProviderReply, ProviderError>;

    /// Short identifier used in logs
    fn name(&self) -> &'static str;
}
