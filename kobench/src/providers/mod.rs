//! Model adapters

pub mod gemini;
pub mod openai;
pub mod traits;

pub use gemini::GeminiClient;
pub use openai::OpenAICompatibleClient;
pub use traits::{
    is_error_output, CompletionRequest, CompletionResponse, GenerateOptions, LLMProvider,
    ProviderError, ProviderResult, ERROR_SENTINEL,
};

use crate::config::{Backend, Config};
use std::sync::Arc;

/// Enum to hold any backend client
pub enum Provider {
    OpenAICompatible(OpenAICompatibleClient),
    Gemini(GeminiClient),
}

impl Provider {
    /// Get the provider as a trait object
    pub fn as_provider(&self) -> &dyn LLMProvider {
        match self {
            Provider::OpenAICompatible(c) => c,
            Provider::Gemini(c) => c,
        }
    }

    /// Build the client for a configured model identifier
    pub fn from_config(id: &str, config: &Config) -> ProviderResult<Self> {
        let model = config
            .model(id)
            .ok_or_else(|| ProviderError::Config(format!("Unknown model: {}", id)))?;

        match model.backend {
            Backend::OpenAICompatible => Ok(Provider::OpenAICompatible(
                OpenAICompatibleClient::from_config(id, model)?,
            )),
            Backend::Gemini => Ok(Provider::Gemini(GeminiClient::from_config(id, model)?)),
        }
    }

    pub fn into_shared(self) -> Arc<dyn LLMProvider> {
        match self {
            Provider::OpenAICompatible(c) => Arc::new(c),
            Provider::Gemini(c) => Arc::new(c),
        }
    }
}

/// Create one model by identifier
pub fn create_model(id: &str, config: &Config) -> ProviderResult<Arc<dyn LLMProvider>> {
    Provider::from_config(id, config).map(Provider::into_shared)
}

/// Create every enabled model, collecting the ones that failed to initialize
pub fn create_enabled_models(
    config: &Config,
) -> (Vec<Arc<dyn LLMProvider>>, Vec<(String, ProviderError)>) {
    create_models(&config.evaluation.enabled_models, config)
}

/// Create the named models; a failure disables that model only
pub fn create_models(
    ids: &[String],
    config: &Config,
) -> (Vec<Arc<dyn LLMProvider>>, Vec<(String, ProviderError)>) {
    let mut providers = Vec::new();
    let mut failures = Vec::new();

    for id in ids {
        match create_model(id, config) {
            Ok(provider) => {
                tracing::debug!("Initialized {} ({})", id, provider.api_model());
                providers.push(provider);
            }
            Err(e) => {
                tracing::error!("Failed to initialize {}: {}", id, e);
                failures.push((id.clone(), e));
            }
        }
    }

    (providers, failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_is_config_error() {
        let config = Config::default();
        let err = create_model("claude-9", &config).err().unwrap();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[test]
    fn test_missing_key_disables_only_that_model() {
        let toml = r#"
[evaluation]
enabled_models = ["keyed", "unkeyed"]

[models.keyed]
backend = "openai_compatible"
endpoint = "http://127.0.0.1:1/v1/chat/completions"
api_model = "a"
api_key_env = "KOBENCH_TEST_PROVIDER_KEY"

[models.unkeyed]
backend = "gemini"
endpoint = "http://127.0.0.1:1/models"
api_model = "b"
api_key_env = "KOBENCH_TEST_PROVIDER_MISSING_KEY"
"#;
        std::env::set_var("KOBENCH_TEST_PROVIDER_KEY", "secret");
        let config = Config::from_toml(toml).unwrap();
        let (providers, failures) = create_enabled_models(&config);

        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "keyed");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "unkeyed");
    }
}
