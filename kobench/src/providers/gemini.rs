//! Google Generative Language API client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::traits::{CompletionRequest, CompletionResponse, LLMProvider, ProviderError, ProviderResult};
use crate::config::ModelConfig;
use crate::runner::rate_limiter::RateLimiter;

/// `generateContent` client for one Gemini model
pub struct GeminiClient {
    name: String,
    api_key: String,
    /// Models base URL, e.g. `https://generativelanguage.googleapis.com/v1beta/models`
    base_url: String,
    api_model: String,
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
}

impl GeminiClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_model: api_model.into(),
            http_client: Client::new(),
            rate_limiter: Arc::new(RateLimiter::new(60)),
        }
    }

    /// Create from a model definition, reading the key from its env var
    pub fn from_config(name: &str, model: &ModelConfig) -> ProviderResult<Self> {
        let api_key = std::env::var(&model.api_key_env)
            .map_err(|_| ProviderError::Config(format!("{} not set", model.api_key_env)))?;
        Ok(Self::new(name, &model.endpoint, &model.api_model, api_key).with_rate_limit(model.rpm))
    }

    pub fn with_rate_limit(mut self, rpm: u32) -> Self {
        self.rate_limiter = Arc::new(RateLimiter::new(rpm));
        self
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.api_model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    /// Set on thought-summary parts of thinking models
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

fn join_parts<'a>(parts: impl Iterator<Item = &'a ResponsePart>) -> String {
    parts
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
        .trim()
        .to_string()
}

/// Answer parts of the first candidate, thought parts when there are none
fn candidate_text(response: &GenerateResponse) -> ProviderResult<(String, String)> {
    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| ProviderError::Parse("No candidates in response".to_string()))?;
    let finish_reason = candidate
        .finish_reason
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let parts = match &candidate.content {
        Some(content) => &content.parts,
        None => return Ok((String::new(), finish_reason)),
    };

    let answer = join_parts(parts.iter().filter(|p| !p.thought));
    if !answer.is_empty() {
        return Ok((answer, finish_reason));
    }
    Ok((join_parts(parts.iter().filter(|p| p.thought)), finish_reason))
}

#[async_trait]
impl LLMProvider for GeminiClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn api_model(&self) -> &str {
        &self.api_model
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        self.rate_limiter.acquire().await;

        let start = Instant::now();
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: &request.prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let response = self
            .http_client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        if status == 429 {
            return Err(ProviderError::RateLimited { retry_after_ms: 60_000 });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<GeminiError>(&body) {
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

        let api_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.without_url().to_string()))?;
        let (content, finish_reason) = candidate_text(&api_response)?;

        Ok(CompletionResponse {
            content,
            model: api_response
                .model_version
                .unwrap_or_else(|| self.api_model.clone()),
            finish_reason,
            latency_ms,
        })
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> ProviderResult<(String, String)> {
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        candidate_text(&response)
    }

    #[test]
    fn test_url_layout() {
        let client = GeminiClient::new(
            "gemini-3-flash",
            "https://generativelanguage.googleapis.com/v1beta/models/",
            "gemini-3-flash-preview",
            "k",
        );
        assert_eq!(
            client.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-flash-preview:generateContent"
        );
    }

    #[test]
    fn test_answer_parts_skip_thoughts() {
        let (text, reason) = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[
                {"text":"생각 중...","thought":true},
                {"text":"정답: "},
                {"text":"3"}
            ]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(text, "정답: 3");
        assert_eq!(reason, "STOP");
    }

    #[test]
    fn test_thought_fallback_when_no_answer() {
        let (text, _) = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"아마 2","thought":true}]},"finishReason":"MAX_TOKENS"}]}"#,
        )
        .unwrap();
        assert_eq!(text, "아마 2");
    }

    #[test]
    fn test_blocked_candidate_is_empty() {
        let (text, reason) = parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
        assert_eq!(text, "");
        assert_eq!(reason, "SAFETY");
        assert!(matches!(parse(r#"{"candidates":[]}"#), Err(ProviderError::Parse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_keeps_key_out_of_sentinel() {
        let client = GeminiClient::new("g", "http://127.0.0.1:1/v1beta/models", "gemini-x", "SECRET_KEY_123")
            .with_rate_limit(0);
        let options = crate::providers::GenerateOptions::default()
            .with_timeout(std::time::Duration::from_secs(10));
        let output = client.generate("질문", &options).await;
        assert!(output.starts_with("Error:"), "{}", output);
        assert!(!output.contains("SECRET_KEY_123"), "{}", output);
        assert!(!output.contains("key="), "{}", output);
    }

    #[test]
    fn test_request_shape() {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: "질문" }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: 1024,
                temperature: Some(0.7),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "질문");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
    }
}
