use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use tablebook_core::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm api error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm returned no choices")]
    EmptyResponse,
    #[error("llm reply is not valid json: {0}")]
    InvalidJson(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String, LlmError>;
}

/// Runs a JSON-mode completion and parses the reply.
pub async fn complete_json(
    client: &dyn LlmClient,
    prompt: &str,
) -> Result<serde_json::Value, LlmError> {
    let raw = client.complete(prompt, ResponseFormat::Json).await?;
    serde_json::from_str(strip_code_fence(&raw))
        .map_err(|error| LlmError::InvalidJson(format!("{error}; reply was `{raw}`")))
}

// Some local models wrap JSON in a markdown fence even in JSON mode.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Chat-completions client for OpenAI and for servers exposing the same API
/// (Ollama serves it under `/v1`).
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match config.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => config.provider.default_base_url().to_string(),
        };
        Self::new(
            base_url,
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": &self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.1
        });
        if format == ResponseFormat::Json {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let mut request = self.http.post(self.endpoint()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tablebook_core::config::{LlmConfig, LlmProvider};

    use super::{complete_json, ChatCompletionsClient, LlmClient, LlmError, ResponseFormat};

    /// Replays canned replies in order and records every prompt it saw.
    #[derive(Default)]
    pub(crate) struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub(crate) prompts: Mutex<Vec<(String, ResponseFormat)>>,
    }

    impl ScriptedLlm {
        pub(crate) fn with_replies(replies: &[&str]) -> Self {
            let replies = replies.iter().map(|reply| Ok(reply.to_string())).collect();
            Self { replies: Mutex::new(replies), prompts: Mutex::default() }
        }

        pub(crate) fn failing(message: &str) -> Self {
            let replies = VecDeque::from([Err(message.to_string())]);
            Self { replies: Mutex::new(replies), prompts: Mutex::default() }
        }

        pub(crate) fn last_prompt(&self) -> String {
            self.prompts
                .lock()
                .expect("prompts lock")
                .last()
                .map(|(prompt, _)| prompt.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            prompt: &str,
            format: ResponseFormat,
        ) -> Result<String, LlmError> {
            self.prompts.lock().expect("prompts lock").push((prompt.to_string(), format));
            match self.replies.lock().expect("replies lock").pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(body)) => Err(LlmError::Status { status: 500, body }),
                None => Err(LlmError::EmptyResponse),
            }
        }
    }

    #[tokio::test]
    async fn complete_json_accepts_fenced_reply() {
        let llm = ScriptedLlm::with_replies(&["```json\n{\"response\": true}\n```"]);
        let value = complete_json(&llm, "prompt").await.expect("json");
        assert_eq!(value["response"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn complete_json_reports_invalid_reply() {
        let llm = ScriptedLlm::with_replies(&["definitely not json"]);
        let error = complete_json(&llm, "prompt").await.expect_err("invalid");
        assert!(matches!(error, LlmError::InvalidJson(_)));
    }

    #[test]
    fn openai_provider_defaults_to_public_endpoint() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: Some("sk-test".to_string().into()),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 5,
        };
        let client = ChatCompletionsClient::from_config(&config).expect("client");
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn blank_ollama_base_url_falls_back_to_local_server() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: Some("  ".to_string()),
            model: "llama3.1".to_string(),
            timeout_secs: 5,
        };
        let client = ChatCompletionsClient::from_config(&config).expect("client");
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn explicit_base_url_wins_and_loses_trailing_slash() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: Some("http://gpu-box:11434/v1/".to_string()),
            model: "llama3.1".to_string(),
            timeout_secs: 5,
        };
        let client = ChatCompletionsClient::from_config(&config).expect("client");
        assert_eq!(client.endpoint(), "http://gpu-box:11434/v1/chat/completions");
    }
}
