use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;

use crate::model::{ChatMessage, Role};

/// Text-generation backend: a message sequence in, generated text out.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String>;
}

pub struct OllamaProvider {
    client: ollama_rs::Ollama,
}

impl OllamaProvider {
    pub fn new(client: ollama_rs::Ollama) -> Self {
        Self { client }
    }

    /// Client for an endpoint like `http://localhost:11434`.
    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid Ollama URL: {}", url))?;
        let host = url.host_str().context("Ollama URL has no host")?;
        let port = url.port_or_known_default().unwrap_or(11434);
        Ok(Self::new(ollama_rs::Ollama::new(format!("{}://{}", url.scheme(), host), port)))
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn generate(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String> {
        use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage as OllamaMessage};

        let messages = messages
            .into_iter()
            .map(|m| match m.role {
                Role::System => OllamaMessage::system(m.content),
                Role::User => OllamaMessage::user(m.content),
                Role::Assistant => OllamaMessage::assistant(m.content),
            })
            .collect();

        let res = self
            .client
            .send_chat_messages(ChatMessageRequest::new(model.to_string(), messages))
            .await?;

        Ok(res.message.content)
    }
}

pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String> {
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": 0.7,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await?.error_for_status()?;
        let json: serde_json::Value = res.json().await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .context("Failed to parse content from OpenAI response")?;

        Ok(content.to_string())
    }
}
