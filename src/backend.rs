//! Model backend adapters.
//!
//! A [`Backend`] answers one question at a time and nothing more: no retry,
//! no post-processing. Retry policy lives in the runner so that adapters stay
//! trivially fakeable in tests.
//!
//! Two HTTP adapters are provided, both blocking (`ureq`) because the runner
//! keeps exactly one request in flight:
//! - [`OllamaBackend`] for an Ollama server (`/api/chat`)
//! - [`ChatCompletionsBackend`] for OpenAI-compatible chat completion endpoints

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a backend call. All of them are treated as transient.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Ask a model a question, get text back
pub trait Backend {
    /// Send a system prompt and a user question to `model`
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` on network, timeout or protocol failure.
    fn ask(
        &self,
        model: &str,
        system_prompt: &str,
        question: &str,
        timeout: Duration,
    ) -> Result<String, BackendError>;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn ask(
        &self,
        model: &str,
        system_prompt: &str,
        question: &str,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        (**self).ask(model, system_prompt, question, timeout)
    }
}

impl<B: Backend + ?Sized> Backend for &B {
    fn ask(
        &self,
        model: &str,
        system_prompt: &str,
        question: &str,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        (**self).ask(model, system_prompt, question, timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Build the message list; an empty system prompt is omitted
fn build_messages(system_prompt: &str, question: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage::new("system", system_prompt));
    }
    messages.push(ChatMessage::new("user", question));
    messages
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Ollama `/api/chat` adapter
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    host: String,
}

impl OllamaBackend {
    /// Create an adapter for an Ollama host such as `http://localhost:11434`
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
        }
    }

    /// Chat endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/api/chat", self.host)
    }
}

impl Backend for OllamaBackend {
    fn ask(
        &self,
        model: &str,
        system_prompt: &str,
        question: &str,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        let request = OllamaChatRequest {
            model,
            messages: build_messages(system_prompt, question),
            stream: false,
        };
        let response = ureq::post(&self.endpoint())
            .timeout(timeout)
            .send_json(&request)
            .map_err(|e| map_ureq_error(e, timeout))?;

        let body: OllamaChatResponse = response
            .into_json()
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        Ok(body.message.content)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat completions adapter with bearer authentication
#[derive(Debug, Clone)]
pub struct ChatCompletionsBackend {
    url: String,
    api_key: String,
}

impl ChatCompletionsBackend {
    /// Create an adapter for a full chat completions URL
    #[must_use]
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl Backend for ChatCompletionsBackend {
    fn ask(
        &self,
        model: &str,
        system_prompt: &str,
        question: &str,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        let request = CompletionRequest {
            model,
            messages: build_messages(system_prompt, question),
        };
        let response = ureq::post(&self.url)
            .timeout(timeout)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(&request)
            .map_err(|e| map_ureq_error(e, timeout))?;

        let body: CompletionResponse = response
            .into_json()
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| BackendError::InvalidResponse("response has no choices".to_string()))
    }
}

fn map_ureq_error(error: ureq::Error, timeout: Duration) -> BackendError {
    match error {
        ureq::Error::Status(code, response) => BackendError::Status {
            code,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => {
            if is_timeout(&transport) {
                BackendError::Timeout(timeout)
            } else {
                BackendError::Transport(transport.to_string())
            }
        }
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_messages_with_system() {
        let messages = build_messages("sys", "q?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::new("system", "sys"));
        assert_eq!(messages[1], ChatMessage::new("user", "q?"));
    }

    #[test]
    fn test_build_messages_without_system() {
        let messages = build_messages("", "q?");
        assert_eq!(messages, vec![ChatMessage::new("user", "q?")]);
    }

    #[test]
    fn test_ollama_endpoint_trims_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/");
        assert_eq!(backend.endpoint(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_ollama_request_shape() {
        let request = OllamaChatRequest {
            model: "qwen3:8b",
            messages: build_messages("sys", "q"),
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "qwen3:8b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn test_ollama_response_parsing() {
        let body = r#"{"model":"m","message":{"role":"assistant","content":"Oslo"},"done":true}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.message.content, "Oslo");
    }

    #[test]
    fn test_completion_response_parsing() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"1905"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "1905");

        let empty: CompletionResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.choices.is_empty());
    }

    #[test]
    fn test_unreachable_host_is_backend_error() {
        // Port 9 on localhost is not expected to serve HTTP
        let backend = OllamaBackend::new("http://127.0.0.1:9");
        let result = backend.ask("m", "s", "q", Duration::from_millis(500));
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Status {
            code: 503,
            body: "overloaded".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));

        let err = BackendError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
    }
}
