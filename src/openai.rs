//! Chat-completions client used as the classification backend.

use crate::classify::{ClassifierBackend, Prompt};
use crate::error::BackendError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Base URL without the trailing `/chat/completions`.
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let endpoint = format!("{}/chat/completions", config.api_base.trim_end_matches('/'));
        Ok(OpenAiBackend {
            client,
            endpoint,
            config,
        })
    }

    fn request<'a>(&'a self, prompt: &'a Prompt) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.0,
        }
    }
}

impl ClassifierBackend for OpenAiBackend {
    fn complete(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.request(prompt))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        first_content(response.json()?)
    }
}

fn first_content(response: ChatResponse) -> Result<String, BackendError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or(BackendError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(api_base: &str) -> OpenAiBackend {
        OpenAiBackend::new(OpenAiConfig {
            api_key: "key".to_string(),
            api_base: api_base.to_string(),
            model: "gpt-4o".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            backend("https://api.openai.com/v1/").endpoint,
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            backend("http://localhost:8080").endpoint,
            "http://localhost:8080/chat/completions"
        );
    }

    #[test]
    fn test_request_body() {
        let backend = backend("http://localhost");
        let prompt = Prompt {
            system: "sys".to_string(),
            user: "usr".to_string(),
        };
        let body = serde_json::to_value(backend.request(&prompt)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "usr"},
                ],
                "temperature": 0.0,
            })
        );
    }

    #[test]
    fn test_first_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Rejection Notice"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(response).unwrap(), "Rejection Notice");

        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_content(response), Err(BackendError::EmptyResponse)));

        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert_eq!(first_content(response).unwrap(), "");
    }

    #[test]
    fn test_unreachable_server_is_an_error() {
        let backend = backend("http://127.0.0.1:9");
        let prompt = Prompt {
            system: String::new(),
            user: String::new(),
        };
        assert!(backend.complete(&prompt).is_err());
    }
}
