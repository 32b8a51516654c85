//! Client for OpenAI-compatible chat-completions endpoints (mlapi.run, vLLM, OpenAI)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::traits::{CompletionRequest, CompletionResponse, LLMProvider, ProviderError, ProviderResult};
use crate::config::ModelConfig;
use crate::runner::rate_limiter::RateLimiter;

/// Chat-completions client bound to one deployed model
pub struct OpenAICompatibleClient {
    name: String,
    api_key: String,
    endpoint: String,
    api_model: String,
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    /// Sent as `chat_template_kwargs.enable_thinking` when set
    enable_thinking: Option<bool>,
    /// `max_completion_tokens` rather than `max_tokens`
    uses_completion_tokens: bool,
}

impl OpenAICompatibleClient {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            api_model: api_model.into(),
            http_client: Client::new(),
            rate_limiter: Arc::new(RateLimiter::new(60)),
            enable_thinking: None,
            uses_completion_tokens: true,
        }
    }

    /// Create from a model definition, reading the key from its env var
    pub fn from_config(name: &str, model: &ModelConfig) -> ProviderResult<Self> {
        let api_key = std::env::var(&model.api_key_env)
            .map_err(|_| ProviderError::Config(format!("{} not set", model.api_key_env)))?;

        let mut client = Self::new(name, &model.endpoint, &model.api_model, api_key)
            .with_rate_limit(model.rpm)
            .with_completion_tokens(model.uses_completion_tokens);
        if let Some(thinking) = model.enable_thinking {
            client = client.with_thinking(thinking);
        }
        Ok(client)
    }

    pub fn with_rate_limit(mut self, rpm: u32) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::new(rpm));
        self
    }

    pub fn with_thinking(mut self, enabled: bool) -> Self {
        self.enable_thinking = Some(enabled);
        self
    }

    pub fn with_completion_tokens(mut self, enabled: bool) -> Self {
        self.uses_completion_tokens = enabled;
        self
    }

    fn build_body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let (max_tokens, max_completion_tokens) = if self.uses_completion_tokens {
            (None, Some(request.max_tokens))
        } else {
            (Some(request.max_tokens), None)
        };

        ChatRequest {
            model: &self.api_model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens,
            max_completion_tokens,
            temperature: request.temperature,
            chat_template_kwargs: self
                .enable_thinking
                .map(|enable_thinking| TemplateKwargs { enable_thinking }),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_template_kwargs: Option<TemplateKwargs>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct TemplateKwargs {
    enable_thinking: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    /// Some completion-style servers answer with a bare `text`
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    text: Option<String>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    /// Reasoning channel of models that split thinking from the answer
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Answer text of a chat response: content, then reasoning, then bare text
fn response_text(response: &ChatResponse) -> ProviderResult<(String, String)> {
    if let Some(choice) = response.choices.first() {
        let message = choice.message.as_ref();
        let text = non_empty(message.and_then(|m| m.content.as_deref()))
            .or_else(|| non_empty(message.and_then(|m| m.reasoning_content.as_deref())))
            .or_else(|| non_empty(choice.text.as_deref()))
            .unwrap_or_default();
        let finish_reason = choice.finish_reason.clone().unwrap_or_else(|| "unknown".to_string());
        return Ok((text.to_string(), finish_reason));
    }

    match response.text.as_deref() {
        Some(text) => Ok((text.trim().to_string(), "unknown".to_string())),
        None => Err(ProviderError::Parse("No choices in response".to_string())),
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn api_model(&self) -> &str {
        &self.api_model
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        self.rate_limiter.acquire().await;

        let start = Instant::now();
        let body = self.build_body(request);

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60)
                * 1000;
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => body,
            };

            if status == 401 || status == 403 {
                return Err(ProviderError::Auth {
                    status: status.as_u16(),
                    message,
                });
            }

            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let api_response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Parse(format!("{}: {}", e, body)))?;
        let (content, finish_reason) = response_text(&api_response)?;

        Ok(CompletionResponse {
            content,
            model: api_response.model.unwrap_or_else(|| self.api_model.clone()),
            finish_reason,
            latency_ms,
        })
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}
