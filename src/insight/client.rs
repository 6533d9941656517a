//! Completion client for Ollama and OpenAI-compatible endpoints

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response from a completion backend
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub tokens_used: Option<usize>,
}

/// Connection settings for a completion endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API endpoint URL
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Maximum tokens for the response
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Something that turns a prompt into text
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse>;
}

/// HTTP completion client
pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build completion HTTP client")?;
        Ok(Self { config, client })
    }

    fn is_ollama(&self) -> bool {
        self.config.endpoint.contains("11434") || self.config.endpoint.contains("ollama")
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<LlmResponse> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));

        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json".to_string(),
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens as i32,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama request failed: {} - {}", status, body);
        }

        let result: OllamaGenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(LlmResponse {
            content: result.response,
            tokens_used: result.eval_count.map(|n| n.max(0) as usize),
        })
    }

    async fn complete_openai(&self, prompt: &str) -> Result<LlmResponse> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );

        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let mut req_builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.config.api_key {
            req_builder = req_builder.bearer_auth(key);
        }

        let response = req_builder
            .send()
            .await
            .context("Failed to send request to OpenAI-compatible API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI request failed: {} - {}", status, body);
        }

        let result: OpenAIChatResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            tokens_used: result.usage.map(|u| u.total_tokens.max(0) as usize),
        })
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<LlmResponse> {
        if self.is_ollama() {
            self.complete_ollama(prompt).await
        } else {
            self.complete_openai(prompt).await
        }
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    eval_count: Option<i32>,
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_flavor() {
        let ollama = LlmClient::new(LlmConfig::default()).unwrap();
        assert!(ollama.is_ollama());

        let openai = LlmClient::new(LlmConfig {
            endpoint: "https://api.example.com".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert!(!openai.is_ollama());
    }

    #[test]
    fn test_openai_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{}"}}],"usage":{"total_tokens":12}}"#;
        let parsed: OpenAIChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{}");
        assert_eq!(parsed.usage.map(|u| u.total_tokens), Some(12));
    }
}
