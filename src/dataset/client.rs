//! OpenAI-compatible chat completion client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dataset::DatasetError;

/// Something that answers a list of chat messages with one reply.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DatasetError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Endpoint configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "qwen3-235b-a22b".to_string(),
            temperature: 1.0,
        }
    }
}

pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Reads the key from `DASHSCOPE_API_KEY` and the base URL from
    /// `OPENAI_API_BASE`.
    pub fn from_env() -> Result<Self, DatasetError> {
        let api_key = std::env::var("DASHSCOPE_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(DatasetError::MissingApiKey)?;
        let mut config = OpenAiConfig {
            api_key,
            ..Default::default()
        };
        if let Ok(base_url) = std::env::var("OPENAI_API_BASE") {
            if !base_url.is_empty() {
                config.base_url = base_url;
            }
        }
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DatasetError> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DatasetError::Api { status, body });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(DatasetError::EmptyResponse)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = OpenAiClient::new(OpenAiConfig {
            base_url: "http://localhost:8000/v1/".to_string(),
            ..Default::default()
        });
        assert_eq!(client.endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_completion_response_parsing() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_messages_serialize_as_role_content() {
        let value = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(value, serde_json::json!({"role": "user", "content": "hi"}));
    }
}
