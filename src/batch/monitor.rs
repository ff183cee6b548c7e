//! Batch Monitor
//!
//! Polls every non-terminal batch job on a fixed timer and drives it through
//! `created -> processing -> {completed | failed}`. Each job is checked inside
//! its own failure boundary. Consecutive check failures are counted in memory;
//! a job that reaches `max_errors` is forced to `failed`. The backoff computed
//! for a failing job is advisory: it is logged and reported, and the next
//! poll still happens on the regular timer.

use crate::batch::backoff::BackoffConfig;
use crate::batch::orchestrator::BatchOrchestrator;
use crate::batch::processor::{ProcessingReport, ResultProcessor};
use crate::error::ApiError;
use crate::provider::{BatchApi, BatchStatus};
use crate::rate_limit::RateLimiters;
use crate::store::{JobStore, PoolStore};
use crate::types::{BatchJob, BatchJobStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between monitoring passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Consecutive check failures before a job is forced to `failed`
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,

    /// Pause between two job checks within one pass
    #[serde(default = "default_inter_job_delay_ms")]
    pub inter_job_delay_ms: u64,

    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Top up every pool after each pass
    #[serde(default = "default_refill_after_pass")]
    pub refill_after_pass: bool,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_max_errors() -> u32 {
    3
}

fn default_inter_job_delay_ms() -> u64 {
    1_000
}

fn default_refill_after_pass() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_errors: default_max_errors(),
            inter_job_delay_ms: default_inter_job_delay_ms(),
            backoff: BackoffConfig::default(),
            refill_after_pass: default_refill_after_pass(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("interval_secs must be at least 1".to_string());
        }
        if self.max_errors == 0 {
            return Err("max_errors must be at least 1".to_string());
        }
        self.backoff.validate().map_err(|e| format!("backoff: {}", e))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct JobHealth {
    errors: u32,
    retries: u32,
}

/// Result of checking one job
#[derive(Debug)]
pub enum JobCheck {
    StillRunning { state: String },
    Completed(ProcessingReport),
    Failed { reason: String },
    /// Status could not be determined; the job stays as it was
    CheckFailed {
        errors: u32,
        max_errors: u32,
        backoff: Duration,
        error: String,
    },
}

impl JobCheck {
    fn describe(&self) -> String {
        match self {
            JobCheck::StillRunning { state } => format!("still running ({})", state),
            JobCheck::Completed(report) => format!("completed: {}", report),
            JobCheck::Failed { reason } => format!("failed: {}", reason),
            JobCheck::CheckFailed {
                errors,
                max_errors,
                backoff,
                error,
            } => format!(
                "check failed ({}/{}): {}; suggested backoff {:.1}s",
                errors,
                max_errors,
                error,
                backoff.as_secs_f64()
            ),
        }
    }
}

/// One job's result within a pass
#[derive(Debug)]
pub struct JobOutcome {
    pub job: BatchJob,
    pub result: Result<JobCheck, ApiError>,
}

#[derive(Debug)]
pub enum PassResult {
    /// Another pass held the reentrancy flag
    Skipped,
    Completed(Vec<JobOutcome>),
}

/// Clears the running flag when a pass ends, including on cancellation
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BatchMonitor {
    store: Arc<dyn PoolStore>,
    api: Arc<dyn BatchApi>,
    processor: Arc<ResultProcessor>,
    limiters: RateLimiters,
    config: MonitorConfig,
    health: Mutex<HashMap<String, JobHealth>>,
    running: AtomicBool,
    orchestrator: Option<Arc<BatchOrchestrator>>,
}

impl BatchMonitor {
    pub fn new(
        store: Arc<dyn PoolStore>,
        api: Arc<dyn BatchApi>,
        processor: Arc<ResultProcessor>,
        limiters: RateLimiters,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            api,
            processor,
            limiters,
            config,
            health: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            orchestrator: None,
        }
    }

    /// Refill pools after each scheduled pass
    pub fn with_orchestrator(mut self, orchestrator: Arc<BatchOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Consecutive check failures recorded for a job
    pub fn error_count(&self, job_id: &str) -> u32 {
        self.health.lock().get(job_id).map(|h| h.errors).unwrap_or(0)
    }

    pub fn retry_count(&self, job_id: &str) -> u32 {
        self.health.lock().get(job_id).map(|h| h.retries).unwrap_or(0)
    }

    fn clear_health(&self, job_id: &str) {
        self.health.lock().remove(job_id);
    }

    fn reset_errors(&self, job_id: &str) {
        if let Some(health) = self.health.lock().get_mut(job_id) {
            health.errors = 0;
        }
    }

    fn persist_transition(&self, job: &mut BatchJob, next: BatchJobStatus) -> Result<(), ApiError> {
        let mut updated = job.clone();
        updated.transition(next)?;
        self.store.put_job(&updated)?;
        *job = updated;
        Ok(())
    }

    fn force_fail(&self, job: &mut BatchJob, reason: String) -> Result<JobCheck, ApiError> {
        self.persist_transition(job, BatchJobStatus::Failed)?;
        error!(job_id = %job.id, batch_id = %job.batch_id, pool = %job.pool, reason = %reason, "Batch job failed");
        Ok(JobCheck::Failed { reason })
    }

    fn record_failure(&self, job: &mut BatchJob, err: &ApiError) -> Result<JobCheck, ApiError> {
        let health = {
            let mut health = self.health.lock();
            let entry = health.entry(job.id.clone()).or_default();
            entry.errors += 1;
            entry.retries += 1;
            *entry
        };
        let backoff = self
            .config
            .backoff
            .delay(health.retries.saturating_sub(1), &job.id);

        warn!(
            job_id = %job.id,
            batch_id = %job.batch_id,
            errors = health.errors,
            max_errors = self.config.max_errors,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Batch status check failed"
        );

        if health.errors >= self.config.max_errors {
            self.clear_health(&job.id);
            return self.force_fail(
                job,
                format!("{} consecutive check failures, last: {}", health.errors, err),
            );
        }

        Ok(JobCheck::CheckFailed {
            errors: health.errors,
            max_errors: self.config.max_errors,
            backoff,
            error: err.to_string(),
        })
    }

    /// Poll one job and apply the resulting transition.
    ///
    /// A rate limiter timeout before the poll is returned as an error and is
    /// not counted against the job. Errors while ingesting results are.
    pub async fn check_job(&self, job: &mut BatchJob) -> Result<JobCheck, ApiError> {
        self.limiters.batch.acquire().await?;

        let status = self.api.get_status(&job.batch_id).await;
        match status {
            Err(e) => self.record_failure(job, &ApiError::PollFailed(e.to_string())),
            Ok(BatchStatus::Running { state }) => {
                if job.status == BatchJobStatus::Created {
                    self.persist_transition(job, BatchJobStatus::Processing)?;
                    info!(job_id = %job.id, batch_id = %job.batch_id, state = %state, "Batch job processing");
                }
                self.reset_errors(&job.id);
                Ok(JobCheck::StillRunning { state })
            }
            Ok(BatchStatus::Ended {
                state,
                results_ref: Some(results_ref),
            }) => {
                debug!(job_id = %job.id, state = %state, results_ref = %results_ref, "Batch ended with results");
                let processed = self.processor.process(job, &results_ref).await;
                match processed {
                    Ok(report) => {
                        self.clear_health(&job.id);
                        Ok(JobCheck::Completed(report))
                    }
                    Err(e) if job.status.is_terminal() => {
                        self.clear_health(&job.id);
                        Ok(JobCheck::Failed {
                            reason: e.to_string(),
                        })
                    }
                    // Counts on top of earlier failures so repeated ingestion
                    // errors still reach `max_errors`.
                    Err(e) => self.record_failure(job, &e),
                }
            }
            Ok(BatchStatus::Ended {
                state,
                results_ref: None,
            }) => {
                self.clear_health(&job.id);
                self.force_fail(job, format!("batch ended '{}' without results", state))
            }
        }
    }

    async fn check_all(&self) -> Result<Vec<JobOutcome>, ApiError> {
        let jobs = self.store.list_active_jobs()?;
        let delay = Duration::from_millis(self.config.inter_job_delay_ms);
        let mut outcomes = Vec::with_capacity(jobs.len());

        for (index, mut job) in jobs.into_iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                sleep(delay).await;
            }
            let result = self.check_job(&mut job).await;
            if let Err(e) = &result {
                error!(job_id = %job.id, error = %e, "Batch job check aborted");
            }
            outcomes.push(JobOutcome { job, result });
        }
        Ok(outcomes)
    }

    /// One monitoring pass over every non-terminal job.
    ///
    /// Returns `PassResult::Skipped` if a pass is already in progress.
    pub async fn run_pass(&self) -> Result<PassResult, ApiError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Monitoring pass already running; skipping");
            return Ok(PassResult::Skipped);
        }
        let _guard = PassGuard(&self.running);

        let outcomes = self.check_all().await?;
        if !outcomes.is_empty() {
            info!(jobs = outcomes.len(), "Monitoring pass finished");
        }
        Ok(PassResult::Completed(outcomes))
    }

    /// Check every non-terminal job now and describe what happened
    pub async fn force_check_all(&self) -> String {
        let outcomes = match self.run_pass().await {
            Ok(PassResult::Completed(outcomes)) => outcomes,
            Ok(PassResult::Skipped) => {
                return "A monitoring pass is already running; try again shortly.".to_string()
            }
            Err(e) => return format!("Failed to list active batch jobs: {}", e),
        };

        if outcomes.is_empty() {
            return "No active batch jobs.".to_string();
        }

        let mut report = format!("Checked {} active batch job(s):", outcomes.len());
        for outcome in &outcomes {
            let detail = match &outcome.result {
                Ok(check) => check.describe(),
                Err(e) => format!("check error: {}", e),
            };
            let _ = write!(
                report,
                "\n- {} [{}] batch {} ({}): {}",
                outcome.job.id,
                outcome.job.pool,
                outcome.job.batch_id,
                outcome.job.status,
                detail
            );
        }
        report
    }

    /// Run passes on the configured interval until `shutdown` resolves.
    ///
    /// A pass in progress always finishes before shutdown is observed.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.config.interval_secs, "Batch monitor started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_pass().await {
                        error!(error = %e, "Monitoring pass failed");
                    }
                    if self.config.refill_after_pass {
                        if let Some(orchestrator) = &self.orchestrator {
                            orchestrator.refill_all().await;
                        }
                    }
                }
            }
        }
        info!("Batch monitor stopped");
    }
}
