//! Batch Job Orchestrator
//!
//! Decides when a pool needs more lessons and how many generation requests to
//! submit, then records the resulting batch job. At most one non-terminal job
//! exists per pool; the storage layer enforces this with an atomic claim.

use crate::batch::normalize::{theme_slug, DEFAULT_THEME};
use crate::config::Environment;
use crate::error::{ApiError, StorageError};
use crate::inventory::PoolInventory;
use crate::provider::{BatchApi, BatchRequest, CompletionOptions, DefaultPromptBuilder, PromptBuilder};
use crate::rate_limit::RateLimiters;
use crate::store::{JobStore, PoolStore};
use crate::types::{BatchJob, PoolType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Batch sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Lessons requested by each generation request
    #[serde(default = "default_items_per_request")]
    pub items_per_request: u32,

    #[serde(default = "default_max_requests_development")]
    pub max_requests_development: u32,

    #[serde(default = "default_max_requests_production")]
    pub max_requests_production: u32,
}

fn default_items_per_request() -> u32 {
    5
}

fn default_max_requests_development() -> u32 {
    1
}

fn default_max_requests_production() -> u32 {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            items_per_request: default_items_per_request(),
            max_requests_development: default_max_requests_development(),
            max_requests_production: default_max_requests_production(),
        }
    }
}

impl BatchConfig {
    pub fn request_cap(&self, environment: Environment) -> u32 {
        match environment {
            Environment::Development => self.max_requests_development,
            Environment::Production => self.max_requests_production,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.items_per_request == 0 {
            return Err("items_per_request must be at least 1".to_string());
        }
        if self.max_requests_development == 0 || self.max_requests_production == 0 {
            return Err("request caps must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Number of requests needed for `items`, clamped to `cap`
pub fn plan_requests(items: u64, items_per_request: u32, cap: u32) -> u32 {
    if items == 0 || items_per_request == 0 {
        return 0;
    }
    let per_request = u64::from(items_per_request);
    let needed = (items + per_request - 1) / per_request;
    needed.min(u64::from(cap)) as u32
}

/// What a refill attempt did
#[derive(Debug)]
pub enum RefillOutcome {
    /// A job for the pool is still in flight
    AlreadyActive,
    /// The pool is at or above its threshold
    NotNeeded,
    Submitted { job: BatchJob },
    /// Nothing was persisted; the next refill trigger tries again
    SubmissionFailed { error: String },
}

impl fmt::Display for RefillOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefillOutcome::AlreadyActive => write!(f, "batch already in flight"),
            RefillOutcome::NotNeeded => write!(f, "no refill needed"),
            RefillOutcome::Submitted { job } => write!(
                f,
                "submitted {} ({} lessons expected)",
                job.batch_id, job.expected_count
            ),
            RefillOutcome::SubmissionFailed { error } => write!(f, "submission failed: {}", error),
        }
    }
}

/// Orchestrator inputs that come from configuration
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub batch: BatchConfig,
    pub environment: Environment,
    pub themes: Vec<String>,
    pub options: CompletionOptions,
}

pub struct BatchOrchestrator {
    store: Arc<dyn PoolStore>,
    api: Arc<dyn BatchApi>,
    inventory: Arc<PoolInventory>,
    limiters: RateLimiters,
    prompts: Arc<dyn PromptBuilder>,
    settings: OrchestratorSettings,
    theme_cursor: AtomicUsize,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn PoolStore>,
        api: Arc<dyn BatchApi>,
        inventory: Arc<PoolInventory>,
        limiters: RateLimiters,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            api,
            inventory,
            limiters,
            prompts: Arc::new(DefaultPromptBuilder),
            settings,
            theme_cursor: AtomicUsize::new(0),
        }
    }

    pub fn with_prompt_builder(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    fn next_theme(&self) -> &str {
        let themes = &self.settings.themes;
        if themes.is_empty() {
            return DEFAULT_THEME;
        }
        let index = self.theme_cursor.fetch_add(1, Ordering::Relaxed) % themes.len();
        &themes[index]
    }

    fn build_requests(&self, pool: PoolType, count: u32) -> Vec<BatchRequest> {
        let stamp = Utc::now().timestamp_millis();
        let per_request = self.settings.batch.items_per_request;
        (0..count)
            .map(|index| {
                let theme = self.next_theme();
                BatchRequest {
                    custom_id: format!("{}-{}-{}-{}", pool.as_str(), stamp, index, theme_slug(theme)),
                    theme: theme.to_string(),
                    messages: self.prompts.build(pool, theme, per_request),
                    options: self.settings.options.clone(),
                }
            })
            .collect()
    }

    fn submission_failed(&self, pool: PoolType, error: &ApiError) -> Result<RefillOutcome, ApiError> {
        error!(pool = %pool, error = %error, "Batch submission failed");
        self.inventory.record_generation_attempt(pool, None)?;
        Ok(RefillOutcome::SubmissionFailed {
            error: error.to_string(),
        })
    }

    /// Submit a generation batch for `pool` if it is running low
    pub async fn refill_pool(&self, pool: PoolType) -> Result<RefillOutcome, ApiError> {
        if let Some(active) = self.store.active_job_for_pool(pool)? {
            debug!(pool = %pool, job_id = %active.id, status = %active.status, "Refill skipped: job in flight");
            return Ok(RefillOutcome::AlreadyActive);
        }

        if !self.inventory.is_refill_needed(pool)? {
            debug!(pool = %pool, "Refill skipped: pool above threshold");
            return Ok(RefillOutcome::NotNeeded);
        }

        let items_to_generate = self.inventory.refill_quantity(pool)?;
        let per_request = self.settings.batch.items_per_request;
        let cap = self.settings.batch.request_cap(self.settings.environment);
        let request_count = plan_requests(items_to_generate, per_request, cap);
        if request_count == 0 {
            return Ok(RefillOutcome::NotNeeded);
        }

        let requests = self.build_requests(pool, request_count);

        if let Err(e) = self.limiters.batch.acquire().await {
            return self.submission_failed(pool, &e);
        }

        let batch_id = match self.api.submit(requests).await {
            Ok(batch_id) => batch_id,
            Err(e) => return self.submission_failed(pool, &e),
        };

        let job = BatchJob::new(batch_id, pool, request_count * per_request);
        match self.store.insert_active_job(&job) {
            Ok(()) => {}
            Err(StorageError::ActiveJobExists(_, holder)) => {
                warn!(
                    pool = %pool,
                    batch_id = %job.batch_id,
                    holder = %holder,
                    "Concurrent refill won the pool slot; submitted batch is not tracked"
                );
                return Ok(RefillOutcome::AlreadyActive);
            }
            Err(e) => return Err(e.into()),
        }

        self.inventory
            .record_generation_attempt(pool, Some(&job.batch_id))?;

        info!(
            pool = %pool,
            job_id = %job.id,
            batch_id = %job.batch_id,
            requests = request_count,
            expected = job.expected_count,
            items_to_generate,
            provider = self.api.provider_name(),
            "Submitted generation batch"
        );
        Ok(RefillOutcome::Submitted { job })
    }

    /// Run `refill_pool` for every pool; one pool's error does not stop the others
    pub async fn refill_all(&self) -> Vec<(PoolType, Result<RefillOutcome, ApiError>)> {
        let mut outcomes = Vec::with_capacity(PoolType::ALL.len());
        for pool in PoolType::ALL {
            let outcome = self.refill_pool(pool).await;
            if let Err(e) = &outcome {
                error!(pool = %pool, error = %e, "Refill failed");
            }
            outcomes.push((pool, outcome));
        }
        outcomes
    }
}
