//! Result Processor
//!
//! Turns the NDJSON output of an ended batch into persisted lessons. Every
//! line is handled on its own: a line that cannot be parsed, has no text, or
//! holds an unrepairable payload is skipped and counted as a failure without
//! affecting its neighbours.

use crate::batch::extract::{custom_id, extract_text};
use crate::batch::normalize::{
    lesson_values, normalize_lesson, theme_from_custom_id, LessonContext, DEFAULT_THEME,
};
use crate::batch::repair::parse_payload;
use crate::error::ApiError;
use crate::inventory::PoolInventory;
use crate::provider::BatchApi;
use crate::rate_limit::RateLimiters;
use crate::store::{JobStore, PoolStore};
use crate::types::{BatchJob, BatchJobStatus, Lesson};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome counts of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingReport {
    pub success_count: u64,
    pub failure_count: u64,
}

impl fmt::Display for ProcessingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lesson(s) stored, {} failure(s)",
            self.success_count, self.failure_count
        )
    }
}

/// Lessons parsed out of a results file, before persistence
#[derive(Debug, Clone, Default)]
pub struct ParsedResults {
    pub lessons: Vec<Lesson>,
    pub failure_count: u64,
}

/// Parse an NDJSON results file into normalized lessons.
///
/// Lessons from one line are named `{custom_id}`, `{custom_id}-1`, ...
/// Lines without a custom id fall back to `{batch_id}-line{n}`.
pub fn parse_results(
    ndjson: &str,
    job: &BatchJob,
    themes: &[String],
    created_at: DateTime<Utc>,
) -> ParsedResults {
    let mut parsed = ParsedResults::default();

    for (line_no, line) in ndjson.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(batch_id = %job.batch_id, line = line_no + 1, error = %e, "Skipping unparsable result line");
                parsed.failure_count += 1;
                continue;
            }
        };

        let base_id = custom_id(&value)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-line{}", job.batch_id, line_no + 1));

        let Some((strategy, text)) = extract_text(&value) else {
            warn!(custom_id = %base_id, "No generated text in result line");
            parsed.failure_count += 1;
            continue;
        };

        let payload = match parse_payload(&text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(custom_id = %base_id, strategy, error = %e, "Skipping malformed payload");
                parsed.failure_count += 1;
                continue;
            }
        };

        let values = lesson_values(payload);
        if values.is_empty() {
            warn!(custom_id = %base_id, "Payload held no lessons");
            parsed.failure_count += 1;
            continue;
        }

        let theme = theme_from_custom_id(&base_id, themes).unwrap_or(DEFAULT_THEME);
        debug!(custom_id = %base_id, strategy, lessons = values.len(), "Parsed result line");

        for (index, raw) in values.iter().enumerate() {
            let id = if index == 0 {
                base_id.clone()
            } else {
                format!("{}-{}", base_id, index)
            };
            let ctx = LessonContext {
                id,
                pool: job.pool,
                theme,
                batch_id: &job.batch_id,
                created_at,
            };
            parsed.lessons.push(normalize_lesson(raw, &ctx));
        }
    }

    parsed
}

/// Fetches, parses and persists the output of ended batches
pub struct ResultProcessor {
    store: Arc<dyn PoolStore>,
    api: Arc<dyn BatchApi>,
    inventory: Arc<PoolInventory>,
    limiters: RateLimiters,
    themes: Vec<String>,
}

impl ResultProcessor {
    pub fn new(
        store: Arc<dyn PoolStore>,
        api: Arc<dyn BatchApi>,
        inventory: Arc<PoolInventory>,
        limiters: RateLimiters,
        themes: Vec<String>,
    ) -> Self {
        Self {
            store,
            api,
            inventory,
            limiters,
            themes,
        }
    }

    /// Apply a transition to `job` only once the stored record reflects it
    fn persist_transition(&self, job: &mut BatchJob, next: BatchJobStatus) -> Result<(), ApiError> {
        let mut updated = job.clone();
        updated.transition(next)?;
        self.store.put_job(&updated)?;
        *job = updated;
        Ok(())
    }

    /// Ingest the results of `job` and close it out.
    ///
    /// The job ends `completed` once its lessons are stored, or `failed` when
    /// the results file cannot be fetched. A rate limiter timeout or storage
    /// error leaves the job in `processing` for the next pass. Lessons stored
    /// by an earlier run are skipped and not counted again.
    pub async fn process(
        &self,
        job: &mut BatchJob,
        results_ref: &str,
    ) -> Result<ProcessingReport, ApiError> {
        self.persist_transition(job, BatchJobStatus::Processing)?;

        self.limiters.outbound.acquire().await?;

        let ndjson = match self.api.fetch_results(results_ref).await {
            Ok(text) => text,
            Err(e) => {
                error!(job_id = %job.id, batch_id = %job.batch_id, error = %e, "Failed to fetch batch results");
                self.persist_transition(job, BatchJobStatus::Failed)?;
                return Err(ApiError::ResultsFetchFailed(e.to_string()));
            }
        };

        let parsed = parse_results(&ndjson, job, &self.themes, Utc::now());
        let mut report = ProcessingReport {
            success_count: 0,
            failure_count: parsed.failure_count,
        };

        // Each lesson is stored and counted atomically, so a rerun after a
        // storage error only counts what the earlier run did not store.
        for lesson in &parsed.lessons {
            if self.inventory.record_ingested(lesson)? {
                report.success_count += 1;
            }
        }

        job.results_ref = Some(results_ref.to_string());
        self.persist_transition(job, BatchJobStatus::Completed)?;

        info!(
            job_id = %job.id,
            pool = %job.pool,
            expected = job.expected_count,
            success = report.success_count,
            failures = report.failure_count,
            "Batch results processed"
        );
        Ok(report)
    }
}
