//! OpenAI Batch API client.
//!
//! Submission uploads the requests as a JSONL file, then creates a batch that
//! points at it. Output is read back from the batch's output file.

use super::{
    build_provider_http_client, map_http_error, map_status_error, BatchApi, BatchRequest,
    BatchStatus, ProviderConfig,
};
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const CHAT_COMPLETIONS_ENDPOINT: &str = "/v1/chat/completions";
const COMPLETION_WINDOW: &str = "24h";

#[derive(Serialize)]
struct BatchInputLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: ChatCompletionBody<'a>,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [super::ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    response_format: serde_json::Value,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
    #[serde(default)]
    error_file_id: Option<String>,
}

/// Map an OpenAI batch state onto the engine's two-way view
fn classify_batch(batch: BatchObject) -> BatchStatus {
    match batch.status.as_str() {
        "validating" | "in_progress" | "finalizing" | "cancelling" => {
            BatchStatus::Running { state: batch.status }
        }
        _ => BatchStatus::Ended {
            results_ref: batch.output_file_id,
            state: batch.status,
        },
    }
}

/// Render batch requests as the JSONL upload body
pub fn encode_batch_input(model: &str, requests: &[BatchRequest]) -> Result<String, ApiError> {
    let mut out = String::new();
    for request in requests {
        let line = BatchInputLine {
            custom_id: &request.custom_id,
            method: "POST",
            url: CHAT_COMPLETIONS_ENDPOINT,
            body: ChatCompletionBody {
                model,
                messages: &request.messages,
                temperature: request.options.temperature,
                max_tokens: request.options.max_tokens,
                response_format: json!({ "type": "json_object" }),
            },
        };
        let encoded = serde_json::to_string(&line)
            .map_err(|e| ApiError::ProviderError(format!("Failed to encode batch line: {}", e)))?;
        out.push_str(&encoded);
        out.push('\n');
    }
    Ok(out)
}

/// OpenAI batch client
pub struct OpenAiBatchClient {
    client: Client,
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiBatchClient {
    /// Build a client. A missing API key only fails the first request, so
    /// read-only commands work without credentials.
    pub fn new(config: &ProviderConfig) -> Result<Self, ApiError> {
        let client = build_provider_http_client(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self {
            client,
            model: config.model.clone(),
            api_key: config.resolve_api_key().ok(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_key(&self) -> Result<&str, ApiError> {
        self.api_key.as_deref().ok_or_else(|| {
            ApiError::ProviderNotConfigured(
                "no API key configured (set provider.api_key or OPENAI_API_KEY)".to_string(),
            )
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(map_status_error(status, &error_text))
    }

    async fn upload_input(&self, jsonl: String) -> Result<String, ApiError> {
        let part = Part::text(jsonl)
            .file_name("lesson_batch.jsonl")
            .mime_str("application/jsonl")
            .map_err(map_http_error)?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(self.api_key()?)
            .multipart(form)
            .send()
            .await
            .map_err(map_http_error)?;
        let file: FileObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse file upload: {}", e)))?;
        Ok(file.id)
    }
}

#[async_trait]
impl BatchApi for OpenAiBatchClient {
    async fn submit(&self, requests: Vec<BatchRequest>) -> Result<String, ApiError> {
        let jsonl = encode_batch_input(&self.model, &requests)?;
        let input_file_id = self.upload_input(jsonl).await?;
        debug!(input_file_id = %input_file_id, requests = requests.len(), "Uploaded batch input");

        let response = self
            .client
            .post(format!("{}/batches", self.base_url))
            .bearer_auth(self.api_key()?)
            .json(&json!({
                "input_file_id": input_file_id,
                "endpoint": CHAT_COMPLETIONS_ENDPOINT,
                "completion_window": COMPLETION_WINDOW,
            }))
            .send()
            .await
            .map_err(map_http_error)?;
        let batch: BatchObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse batch: {}", e)))?;

        info!(batch_id = %batch.id, status = %batch.status, "Created provider batch");
        Ok(batch.id)
    }

    async fn get_status(&self, batch_id: &str) -> Result<BatchStatus, ApiError> {
        let response = self
            .client
            .get(format!("{}/batches/{}", self.base_url, batch_id))
            .bearer_auth(self.api_key()?)
            .send()
            .await
            .map_err(map_http_error)?;
        let batch: BatchObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse batch: {}", e)))?;

        if let Some(error_file_id) = &batch.error_file_id {
            debug!(batch_id, error_file_id = %error_file_id, "Batch reported per-request errors");
        }
        Ok(classify_batch(batch))
    }

    async fn fetch_results(&self, results_ref: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .get(format!("{}/files/{}/content", self.base_url, results_ref))
            .bearer_auth(self.api_key()?)
            .send()
            .await
            .map_err(map_http_error)?;
        Self::check(response)
            .await?
            .text()
            .await
            .map_err(map_http_error)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
