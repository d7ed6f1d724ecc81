//! Ollama chat client used as the generative summarizer.

use crate::error::SummaryError;
use crate::summarizer::Summarizer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the Ollama client.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 120,
        }
    }
}

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Asks Ollama to constrain output to JSON.
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Summarizer backed by an Ollama-compatible `/api/chat` endpoint.
pub struct OllamaSummarizer {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaSummarizer {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        info!(
            "Initializing summarizer with model {} at {}",
            config.model_name, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn build_request(&self, prompt: &str) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        }
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn complete(&self, prompt: &str) -> Result<String, SummaryError> {
        let url = format!("{}/api/chat", self.config.ollama_url);
        let request = self.build_request(prompt);

        debug!("Sending summary request ({} prompt chars)", prompt.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummaryError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    SummaryError::Transport(format!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.config.ollama_url
                    ))
                } else {
                    SummaryError::Transport(format!("Failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::Transport(format!(
                "Ollama API error {}: {}",
                status, body
            )));
        }

        let chat_response: OllamaChatResponse = response.json().await.map_err(|e| {
            SummaryError::Transport(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(chat_response.message.content)
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// System prompt for venue summaries.
const SYSTEM_PROMPT: &str = r#"You review cafes for people who work remotely.
You read customer reviews and judge how suitable the cafe is for working on a laptop.
Answer with a single JSON object matching the requested schema.
Only output valid JSON, no explanations or markdown."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_config_default() {
        let config = OllamaConfig::default();
        assert_eq!(config.model_name, "llama3.2:latest");
        assert_eq!(config.timeout_seconds, 120);
    }

    #[test]
    fn test_request_shape() {
        let summarizer = OllamaSummarizer::new(OllamaConfig::default()).unwrap();
        let request = summarizer.build_request("hello");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama3.2:latest");
        assert_eq!(json["stream"], false);
        assert_eq!(json["format"], "json");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
    }
}
