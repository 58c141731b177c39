use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ChatMessage, ChatModel};
use crate::errors::LlmError;

/// Chat completions from a local Ollama server via its native `/api/chat`.
///
/// Construction is cheap and does no I/O; an unreachable server only
/// shows up when the first generation is attempted.
#[derive(Clone)]
pub struct OllamaChat {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaChat {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Request(format!(
                "ollama chat returned {}: {}",
                status, text
            )));
        }

        let payload: Value = response.json().await?;
        let content = payload["message"]["content"]
            .as_str()
            .ok_or(LlmError::MissingContent)?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let chat = OllamaChat::new("http://localhost:11434/", "mistral");
        assert_eq!(chat.base_url, "http://localhost:11434");
        assert_eq!(chat.model_id(), "mistral");
    }

    #[tokio::test]
    async fn unreachable_server_surfaces_as_http_error() {
        let chat = OllamaChat::new("http://127.0.0.1:9", "mistral");
        let err = chat.generate(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_)));
    }
}
