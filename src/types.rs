//! Core data model: pools, batch jobs, pool statistics and lessons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

/// Named lesson inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    /// Lessons delivered on the broadcast schedule
    Scheduled,
    /// Lessons handed out when a user asks for one
    OnDemand,
}

impl PoolType {
    pub const ALL: [PoolType; 2] = [PoolType::Scheduled, PoolType::OnDemand];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Scheduled => "scheduled",
            PoolType::OnDemand => "on_demand",
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "scheduled" => Ok(PoolType::Scheduled),
            "on_demand" | "ondemand" => Ok(PoolType::OnDemand),
            other => Err(ApiError::UnknownPool(other.to_string())),
        }
    }
}

/// Lifecycle of a batch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobStatus {
    Created,
    Processing,
    Completed,
    Failed,
}

impl BatchJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchJobStatus::Completed | BatchJobStatus::Failed)
    }

    /// `created -> processing -> {completed | failed}`; `created` may also fail directly.
    /// Re-entering `processing` is allowed so ingestion can be retried after a restart.
    pub fn can_transition_to(&self, next: BatchJobStatus) -> bool {
        match (self, next) {
            (BatchJobStatus::Created, BatchJobStatus::Processing) => true,
            (BatchJobStatus::Created, BatchJobStatus::Failed) => true,
            (BatchJobStatus::Processing, BatchJobStatus::Processing) => true,
            (BatchJobStatus::Processing, BatchJobStatus::Completed) => true,
            (BatchJobStatus::Processing, BatchJobStatus::Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchJobStatus::Created => "created",
            BatchJobStatus::Processing => "processing",
            BatchJobStatus::Completed => "completed",
            BatchJobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BatchJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submission to the external batch API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    /// Internal id (hex, derived from the external id and submission time)
    pub id: String,
    /// Id assigned by the external batch API
    pub batch_id: String,
    pub pool: PoolType,
    pub status: BatchJobStatus,
    pub expected_count: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results_ref: Option<String>,
}

impl BatchJob {
    pub fn new(batch_id: String, pool: PoolType, expected_count: u32) -> Self {
        let started_at = Utc::now();
        Self {
            id: compute_job_id(&batch_id, pool, &started_at),
            batch_id,
            pool,
            status: BatchJobStatus::Created,
            expected_count,
            started_at,
            completed_at: None,
            results_ref: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Move to `next`, stamping `completed_at` on terminal states.
    pub fn transition(&mut self, next: BatchJobStatus) -> Result<(), ApiError> {
        if !self.status.can_transition_to(next) {
            return Err(ApiError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

fn compute_job_id(batch_id: &str, pool: PoolType, started_at: &DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(batch_id.as_bytes());
    hasher.update(pool.as_str().as_bytes());
    hasher.update(started_at.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    format!("job_{}", hex::encode(&digest.as_bytes()[..8]))
}

/// Inventory counters for one pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub pool: PoolType,
    pub total_items: u64,
    pub available_items: u64,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub last_batch_id: Option<String>,
}

impl PoolStats {
    pub fn empty(pool: PoolType) -> Self {
        Self {
            pool,
            total_items: 0,
            available_items: 0,
            last_generated_at: None,
            last_batch_id: None,
        }
    }
}

/// A normalized, persisted lesson with its quiz payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub pool: PoolType,
    pub theme: String,
    pub title: String,
    pub content: Vec<String>,
    pub quiz_question: String,
    pub quiz_options: Vec<String>,
    pub correct_option_index: usize,
    pub explanation: String,
    pub option_explanations: Vec<String>,
    pub hashtags: Vec<String>,
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}
