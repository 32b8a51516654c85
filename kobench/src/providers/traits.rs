//! Model adapter trait and shared request/response types

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::runner::rate_limiter::RateLimiter;

/// Prefix of every prediction that stands in for a failed generation
pub const ERROR_SENTINEL: &str = "Error:";

/// Whether a persisted prediction is a failed-generation sentinel
pub fn is_error_output(text: &str) -> bool {
    text.trim_start().starts_with(ERROR_SENTINEL)
}

/// Per-call generation settings
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound for one call, rate-limit wait included
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(600),
        }
    }
}

impl GenerateOptions {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Request for a single-turn completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

/// Response from a model backend
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated text, trimmed
    pub content: String,
    pub model: String,
    pub finish_reason: String,
    pub latency_ms: u64,
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Request URLs are dropped: some backends authenticate through them
impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.without_url())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A hosted model behind one uniform `generate` capability
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Model identifier as configured (e.g. "helpy-pro")
    fn name(&self) -> &str;

    /// Model name sent to the backend
    fn api_model(&self) -> &str;

    /// Send a completion request
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse>;

    /// Get the rate limiter for this model
    fn rate_limiter(&self) -> &Arc<RateLimiter>;

    /// Generate text for `prompt`, never failing
    ///
    /// Transport, backend and timeout failures come back as a prediction
    /// starting with [`ERROR_SENTINEL`] so that one bad sample never aborts
    /// a batch.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> String {
        let request = CompletionRequest::new(prompt, options.max_tokens)
            .with_temperature(options.temperature);
        let start = Instant::now();

        let result = match tokio::time::timeout(options.timeout, self.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: options.timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(response) => {
                tracing::debug!(
                    "{} answered in {}ms ({})",
                    self.name(),
                    response.latency_ms,
                    response.finish_reason
                );
                response.content
            }
            Err(e) => {
                tracing::warn!(
                    "Generation failed on {} after {}ms: {}",
                    self.name(),
                    start.elapsed().as_millis(),
                    e
                );
                format!("{} {}", ERROR_SENTINEL, e)
            }
        }
    }

}
