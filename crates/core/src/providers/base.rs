//! Base ModelProvider trait and supporting types.

use async_trait::async_trait;
use sk_protocol::block_models::BlockConfig;
use sk_protocol::run_models::TokenUsage;
use thiserror::Error;

/// A single model invocation: a fully resolved prompt sent to one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// The model identifier (e.g. "claude-3-haiku").
    pub model: String,

    /// The resolved prompt text.
    pub prompt: String,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,

    pub stop_sequences: Vec<String>,
}

impl ModelRequest {
    /// Create a new ModelRequest for the given model and prompt.
    ///
    /// Defaults:
    /// - temperature: provider default
    /// - max_tokens: provider default
    /// - stop_sequences: empty
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
            stop_sequences: Vec::new(),
        }
    }

    /// Copy the advanced generation settings of a block.
    pub fn with_block_settings(mut self, config: &BlockConfig) -> Self {
        self.temperature = config.temperature;
        self.max_tokens = config.max_tokens;
        self.stop_sequences = config.stop_sequences.clone();
        self
    }
}

/// The text a model returned plus whatever accounting the provider reported.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelResponse {
    pub text: String,
    pub token_usage: Option<TokenUsage>,
    pub cost_estimate: Option<f64>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Provider not available: {0}")]
    NotAvailable(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Timed out after {0}s")]
    Timeout(u64),
}

/// The model invocation capability the engine depends on.
///
/// Implementations own transport, authentication and call timeouts. The
/// engine never retries a failed call.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn check_availability(&self) -> bool;
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;
}
