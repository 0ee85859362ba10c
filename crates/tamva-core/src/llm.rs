//! Blocking OpenAI-compatible chat completion client.
//!
//! Shared by the transcript corrector, the reasoning agent and the session message
//! generator. Each caller picks its own model, temperature and token limit.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Model for the general reasoning agent.
    #[serde(default = "default_agent_model")]
    pub agent_model: String,

    /// Small fast model for transcript correction.
    #[serde(default = "default_correction_model")]
    pub correction_model: String,

    /// Model that writes chat-session messages.
    #[serde(default = "default_session_model")]
    pub session_model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_agent_model() -> String {
    "gpt-4o".to_string()
}

fn default_correction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_session_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            agent_model: default_agent_model(),
            correction_model: default_correction_model(),
            session_model: default_session_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("response had no content")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    pub fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Something that completes a chat. `ChatClient` in production, scripted fakes in tests.
pub trait ChatCompletion: Send + Sync {
    fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ChatError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl ChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ChatError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ChatError::MissingApiKey)?
            .to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::Http(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

impl ChatCompletion for ChatClient {
    fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &options.model,
            messages,
            temperature: Some(options.temperature),
            max_tokens: options.max_tokens,
        };
        debug!(model = %options.model, messages = messages.len(), "chat completion");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ChatError::Http(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().unwrap_or_default();
            return Err(ChatError::Api { status, body });
        }
        let parsed: ChatResponse = res.json().map_err(|e| ChatError::Http(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ChatError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_key() {
        assert!(matches!(
            ChatClient::from_config(&LlmConfig::default()),
            Err(ChatError::MissingApiKey)
        ));
        let config = LlmConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!config.has_api_key());
        assert!(ChatClient::from_config(&config).is_err());
    }

    #[test]
    fn request_serializes_openai_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: Some(0.0),
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn response_tolerates_null_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
