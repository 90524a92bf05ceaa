//! Chat-completion client for an Ollama endpoint
//!
//! The analysis engine depends on [`ChatModel`] only. [`OllamaClient`] talks to
//! `/api/chat`, `/api/version` and `/api/ps`. Connection failures are reported
//! as [`LlmError::Connection`] so batch drivers can tell an unreachable model
//! apart from a model that answered badly.

use crate::config::OllamaConfig;
use crate::utils::error::LlmError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Result of one non-streamed chat completion
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletion {
    pub content: String,

    /// Tokens generated
    pub eval_count: u64,

    /// Generation time in nanoseconds
    pub eval_duration: u64,

    /// Total request time in nanoseconds, as measured by the server
    pub total_duration: u64,
}

impl ChatCompletion {
    /// Generation throughput; zero when the server reported no timing
    pub fn tokens_per_second(&self) -> f64 {
        tokens_per_second(self.eval_count, self.eval_duration)
    }
}

pub fn tokens_per_second(eval_count: u64, eval_duration_ns: u64) -> f64 {
    if eval_duration_ns == 0 {
        return 0.0;
    }
    eval_count as f64 / eval_duration_ns as f64 * 1e9
}

/// A model currently loaded by the server (`/api/ps`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunningModel {
    pub name: String,
    pub model: String,
    pub size: i64,
    pub digest: String,
    pub details: serde_json::Value,
    pub expires_at: Option<String>,
    pub size_vram: i64,
}

impl RunningModel {
    /// Whether this entry is the configured model, allowing the implicit `:latest` tag
    pub fn matches(&self, llm: &str) -> bool {
        self.name == llm || self.name == format!("{llm}:latest")
    }
}

/// Model inference endpoint
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Single-turn, non-streamed completion of `prompt`
    async fn chat(&self, model: &str, prompt: &str) -> Result<ChatCompletion>;

    /// Server version string
    async fn version(&self) -> Result<String>;

    /// Models loaded right now, used for telemetry
    async fn running_models(&self) -> Result<Vec<RunningModel>>;

    /// Host label recorded with telemetry rows
    fn host(&self) -> &str {
        ""
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    keep_alive: u32,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    eval_duration: u64,
    #[serde(default)]
    total_duration: u64,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct PsResponse {
    #[serde(default)]
    models: Vec<RunningModel>,
}

// ============================================================================
// Ollama client
// ============================================================================

/// [`ChatModel`] backed by an Ollama server
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        })
    }

    /// Check if the server answers at all
    pub async fn is_available(&self) -> bool {
        self.version().await.is_ok()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self.client.get(&url).send().await?;
        decode_response(response).await
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(LlmError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn chat(&self, model: &str, prompt: &str) -> Result<ChatCompletion> {
        let url = format!("{}/api/chat", self.endpoint);
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            keep_alive: 0,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        tracing::debug!(model = %model, prompt_len = prompt.len(), "Sending chat request");

        let response = self.client.post(&url).json(&request).send().await?;
        let parsed: ChatResponse = decode_response(response).await?;

        Ok(ChatCompletion {
            content: parsed.message.content,
            eval_count: parsed.eval_count,
            eval_duration: parsed.eval_duration,
            total_duration: parsed.total_duration,
        })
    }

    async fn version(&self) -> Result<String> {
        let parsed: VersionResponse = self.get_json("/api/version").await?;
        Ok(parsed.version)
    }

    async fn running_models(&self) -> Result<Vec<RunningModel>> {
        let parsed: PsResponse = self.get_json("/api/ps").await?;
        Ok(parsed.models)
    }

    fn host(&self) -> &str {
        &self.endpoint
    }
}
