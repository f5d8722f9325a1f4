use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use crate::content::{diagnosis_from_reply, prompts, ContentError, ContentService, Diagnosis, ErrorReport};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_MAX_TOKENS: u32 = 600;
const DIAGNOSIS_MAX_TOKENS: u32 = 300;
const DEFAULT_TEMPERATURE: f32 = 0.5;
const DIAGNOSIS_TEMPERATURE: f32 = 0.3;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Copy)]
struct Sampling {
    max_tokens: u32,
    temperature: f32,
}

const LESSON_SAMPLING: Sampling = Sampling {
    max_tokens: DEFAULT_MAX_TOKENS,
    temperature: DEFAULT_TEMPERATURE,
};

const DIAGNOSIS_SAMPLING: Sampling = Sampling {
    max_tokens: DIAGNOSIS_MAX_TOKENS,
    temperature: DIAGNOSIS_TEMPERATURE,
};

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct LlmProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmProvider {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Self {
        let api_key = env_string("LLM_API_KEY").or_else(|| env_string("OPENROUTER_API_KEY"));
        let model = env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = normalize_endpoint(
            env_string("LLM_API_ENDPOINT")
                .or_else(|| env_string("LLM_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
        );
        let timeout = Duration::from_millis(env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS));

        Self::new(LlmConfig {
            api_key,
            model,
            api_endpoint,
            timeout,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }

    async fn chat(&self, messages: &[ChatMessage], sampling: Sampling) -> Result<ChatResponse, ContentError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ContentError::Unavailable("LLM_API_KEY"))?;

        let url = format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": sampling.max_tokens,
            "temperature": sampling.temperature,
            "stream": false
        });

        self.post_with_retry(&url, api_key, &payload).await
    }

    async fn complete_with_system(
        &self,
        system: &str,
        user: &str,
        sampling: Sampling,
    ) -> Result<String, ContentError> {
        let messages = [ChatMessage::new("system", system), ChatMessage::new("user", user)];
        let response = self.chat(&messages, sampling).await?;
        response
            .first_content()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ContentError::EmptyResponse)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, ContentError> {
        let mut last_error: Option<ContentError> = None;

        for retry in 0..=MAX_RETRIES {
            match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(|e| {
                            tracing::error!(error = %e, "failed to parse chat completion body");
                            ContentError::Json(e)
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = ContentError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && is_retryable(status) {
                        warn!(retry, ?status, "content request failed, retrying");
                        sleep(backoff(retry)).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = ContentError::Request(e);
                    if retry < MAX_RETRIES {
                        warn!(retry, "content request error, retrying");
                        sleep(backoff(retry)).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or(ContentError::EmptyResponse))
    }
}

#[async_trait]
impl ContentService for LlmProvider {
    async fn generate(&self, prompt: &str, subject: &str) -> Result<String, ContentError> {
        self.complete_with_system(&prompts::system_message(subject), prompt, LESSON_SAMPLING)
            .await
    }

    async fn classify_error(&self, _subject: &str, report: &ErrorReport) -> Diagnosis {
        let reply = self
            .complete_with_system(
                prompts::DIAGNOSIS_SYSTEM_MESSAGE,
                &prompts::diagnosis(report),
                DIAGNOSIS_SAMPLING,
            )
            .await;
        diagnosis_from_reply(reply)
    }
}

fn backoff(retry: usize) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> LlmProvider {
        LlmProvider::new(LlmConfig {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout: Duration::from_millis(100),
        })
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("https://openrouter.ai/api".into()), "https://openrouter.ai/api/v1");
        assert_eq!(normalize_endpoint("https://api.openai.com/v1/".into()), "https://api.openai.com/v1");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(reqwest::StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_millis(200));
        assert_eq!(backoff(2), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let provider = offline();
        assert!(!provider.is_available());
        let err = provider.generate("hello", "C").await.unwrap_err();
        assert!(matches!(err, ContentError::Unavailable("LLM_API_KEY")));
    }

    #[tokio::test]
    async fn test_classify_without_key_falls_back() {
        let report = ErrorReport {
            topic: "Loops".into(),
            question: "q".into(),
            wrong_answer: "a".into(),
            correct_answer: "b".into(),
            explanation: "e".into(),
            level: crate::types::AbilityLevel::Beginner,
        };
        assert_eq!(offline().classify_error("C", &report).await, Diagnosis::fallback());
    }
}
