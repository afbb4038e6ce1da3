//! Ollama capability backend
//!
//! Talks to the Ollama `/api/chat` endpoint over direct HTTP. The persona is
//! sent as the system message; transcript messages written by agents are sent
//! as assistant turns prefixed with the agent name so the model can tell the
//! participants apart.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::error::CapabilityError;
use crate::transcript::{Author, Message};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Chat request for the Ollama API
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Response from the Ollama chat endpoint
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Capability that generates replies with a model served by Ollama
#[derive(Debug, Clone)]
pub struct OllamaCapability {
    base_url: String,
    model: String,
    temperature: Option<f32>,
    http_client: reqwest::Client,
}

impl OllamaCapability {
    /// Create a new Ollama capability
    pub fn new(ollama_url: &str, model: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(ollama_url),
            model: model.into(),
            temperature: None,
            http_client: reqwest::Client::new(),
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_messages(persona: &str, view: &[Message]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(view.len() + 1);
        if !persona.is_empty() {
            messages.push(ChatMessage::new("system", persona));
        }
        for message in view {
            let chat_message = match &message.author {
                Author::User => ChatMessage::new("user", message.content.clone()),
                Author::Agent(name) => {
                    ChatMessage::new("assistant", format!("{}: {}", name, message.content))
                }
                Author::System => ChatMessage::new("system", message.content.clone()),
            };
            messages.push(chat_message);
        }
        messages
    }
}

/// Reduce a configured URL to `scheme://host:port`
fn normalize_base_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("localhost");
            let port = url.port().unwrap_or(11434);
            format!("{}://{}:{}", url.scheme(), host, port)
        }
        Err(e) => {
            tracing::warn!("Invalid Ollama URL '{}' ({}), using default", raw, e);
            DEFAULT_OLLAMA_URL.to_string()
        }
    }
}

#[async_trait]
impl Capability for OllamaCapability {
    async fn generate(&self, persona: &str, view: &[Message]) -> Result<String, CapabilityError> {
        let request = ChatRequest {
            model: &self.model,
            messages: Self::build_messages(persona, view),
            stream: false,
            options: self.temperature.map(|temperature| ChatOptions { temperature }),
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            "Sending chat request to Ollama"
        );

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CapabilityError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Status { code, body });
        }

        let raw_body = response
            .text()
            .await
            .map_err(|e| CapabilityError::Request(e.to_string()))?;
        let parsed: ChatResponse = serde_json::from_str(&raw_body)
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;

        Ok(parsed.message.content)
    }
}
