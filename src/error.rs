//! Error types for the lesson pool batch engine.

use crate::types::{BatchJobStatus, PoolType};
use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Batch job not found: {0}")]
    JobNotFound(String),

    #[error("Lesson not found: {0}")]
    ItemNotFound(String),

    #[error("Pool {0} already has an active batch job ({1})")]
    ActiveJobExists(PoolType, String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("sled: {}", err),
        ))
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors surfaced by the batch engine and its external collaborators
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Batch submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Batch status poll failed: {0}")]
    PollFailed(String),

    #[error("Batch results fetch failed: {0}")]
    ResultsFetchFailed(String),

    #[error("Rate limiter '{limiter}' timed out after {waited:?} waiting for {requested} token(s)")]
    RateLimitTimeout {
        limiter: String,
        requested: u32,
        waited: Duration,
    },

    #[error("Rate limiter '{limiter}' cannot grant {requested} token(s) (capacity {capacity})")]
    RateLimitExceedsCapacity {
        limiter: String,
        requested: u32,
        capacity: u32,
    },

    #[error("Invalid job transition for {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: BatchJobStatus,
        to: BatchJobStatus,
    },

    #[error("Unknown pool type: {0}")]
    UnknownPool(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
