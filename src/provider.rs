//! Generation Batch API Abstraction
//!
//! The engine submits lesson generation work as asynchronous batches and later
//! polls for their completion. `BatchApi` is the seam between the engine and
//! a concrete provider; `OpenAiBatchClient` talks to the OpenAI Batch API.

use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod openai;
pub mod prompt;

pub use openai::OpenAiBatchClient;
pub use prompt::{DefaultPromptBuilder, PromptBuilder};

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Completion options applied to every request in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>, // 0.0-2.0
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: Some(4000),
        }
    }
}

/// One generation request inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    /// Caller-chosen id echoed back on the matching output line
    pub custom_id: String,
    pub theme: String,
    pub messages: Vec<ChatMessage>,
    pub options: CompletionOptions,
}

/// External view of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    /// Still validating or generating
    Running { state: String },
    /// No further progress will happen; results may or may not exist
    Ended {
        state: String,
        results_ref: Option<String>,
    },
}

impl BatchStatus {
    pub fn state(&self) -> &str {
        match self {
            BatchStatus::Running { state } | BatchStatus::Ended { state, .. } => state,
        }
    }
}

/// Asynchronous batched generation API
#[async_trait]
pub trait BatchApi: Send + Sync {
    /// Submit requests as one batch, returning the external batch id
    async fn submit(&self, requests: Vec<BatchRequest>) -> Result<String, ApiError>;

    /// Query the state of a previously submitted batch
    async fn get_status(&self, batch_id: &str) -> Result<BatchStatus, ApiError>;

    /// Download the newline-delimited JSON output of an ended batch
    async fn fetch_results(&self, results_ref: &str) -> Result<String, ApiError>;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}

/// Provider connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; falls back to `OPENAI_API_KEY` when unset
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub default_options: CompletionOptions,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            default_options: CompletionOptions::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model cannot be empty".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!("base_url must be an http(s) URL: {}", self.base_url));
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }

    /// Configured key, or the `OPENAI_API_KEY` environment variable
    pub fn resolve_api_key(&self) -> Result<String, ApiError> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ApiError::ProviderNotConfigured(
                    "no API key configured (set provider.api_key or OPENAI_API_KEY)".to_string(),
                )
            })
    }
}

// Helper function to map HTTP errors to ApiError
pub(crate) fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        map_status_error(status.as_u16(), &error.to_string())
    } else if error.is_timeout() {
        ApiError::ProviderRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

pub(crate) fn map_status_error(status: u16, detail: &str) -> ApiError {
    match status {
        401 | 403 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", detail)),
        429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", detail)),
        _ => ApiError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, detail
        )),
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_provider_http_client(request_timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}
