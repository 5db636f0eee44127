// src/llm_extract.rs

use crate::config::LlmSection;
use crate::error::BillError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Sends one prompt, gets one reply. Anything that goes wrong on the way
/// is a `BillError::Model`.
#[async_trait]
pub trait ModelClient {
    async fn complete(&self, prompt: &str) -> Result<String, BillError>;

    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    api_key: String,
}

impl ChatClient {
    pub fn new(llm: &LlmSection, api_key: String) -> Result<Self, BillError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            model: llm.model.clone(),
            temperature: llm.temperature,
            api_key,
        })
    }

    /// Resolve the API key from the configured environment variable.
    pub fn from_env(llm: &LlmSection) -> Result<Self, Box<dyn std::error::Error>> {
        let api_key = std::env::var(&llm.api_key_env)
            .map_err(|_| format!("{} env var required for the model endpoint", llm.api_key_env))?;
        info!(url = %llm.base_url, model = %llm.model, "Using chat completion endpoint");
        Ok(Self::new(llm, api_key)?)
    }

    fn request(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl ModelClient for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, BillError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, prompt_chars = prompt.len(), "Sending prompt");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BillError::Model(format!("{status}: {body}")));
        }

        let chat_response: ChatResponse = response.json().await?;
        reply_content(chat_response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Content of the single completion choice, trimmed.
fn reply_content(response: ChatResponse) -> Result<String, BillError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BillError::Model("response contained no choices".to_string()))?
        .message
        .content
        .unwrap_or_default();

    let content = content.trim();
    if content.is_empty() {
        return Err(BillError::Model("model returned empty response".to_string()));
    }
    Ok(content.to_string())
}
