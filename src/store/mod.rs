//! Persistence interfaces for batch jobs, pool statistics and lessons.
//!
//! The engine only talks to these traits. `SledStore` is the durable
//! implementation; every write is an idempotent upsert so a restarted process
//! picks up exactly where the persisted job status says it left off.

pub mod persistence;

pub use persistence::SledStore;

use crate::error::StorageError;
use crate::types::{BatchJob, Lesson, PoolStats, PoolType};

/// Batch job records
pub trait JobStore {
    fn get_job(&self, job_id: &str) -> Result<Option<BatchJob>, StorageError>;

    /// Upsert a job. Terminal jobs release their pool's active slot.
    fn put_job(&self, job: &BatchJob) -> Result<(), StorageError>;

    /// Insert a new non-terminal job, atomically claiming the pool's active slot.
    ///
    /// Fails with `StorageError::ActiveJobExists` when another active job
    /// already holds the slot.
    fn insert_active_job(&self, job: &BatchJob) -> Result<(), StorageError>;

    fn list_jobs(&self) -> Result<Vec<BatchJob>, StorageError>;

    /// Jobs in `created` or `processing`, oldest first
    fn list_active_jobs(&self) -> Result<Vec<BatchJob>, StorageError> {
        let mut jobs: Vec<BatchJob> = self
            .list_jobs()?
            .into_iter()
            .filter(BatchJob::is_active)
            .collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    fn active_job_for_pool(&self, pool: PoolType) -> Result<Option<BatchJob>, StorageError> {
        Ok(self
            .list_active_jobs()?
            .into_iter()
            .find(|job| job.pool == pool))
    }
}

/// Per-pool inventory counters
pub trait StatsStore {
    fn get_stats(&self, pool: PoolType) -> Result<Option<PoolStats>, StorageError>;

    /// Atomically apply `update` to the pool's stats, creating an empty row first if needed.
    fn update_stats(
        &self,
        pool: PoolType,
        update: &mut dyn FnMut(&mut PoolStats),
    ) -> Result<PoolStats, StorageError>;
}

/// Normalized lessons
pub trait ItemStore {
    fn put_item(&self, item: &Lesson) -> Result<(), StorageError>;

    fn get_item(&self, item_id: &str) -> Result<Option<Lesson>, StorageError>;

    /// Store a freshly produced lesson and add it to its pool's total and
    /// available counts in one atomic step.
    ///
    /// Returns false, changing nothing, when a lesson with the same id is
    /// already stored.
    fn insert_produced(&self, item: &Lesson) -> Result<bool, StorageError>;

    fn list_items(&self, pool: PoolType) -> Result<Vec<Lesson>, StorageError>;

    /// Oldest unused lesson of a pool
    fn next_unused(&self, pool: PoolType) -> Result<Option<Lesson>, StorageError> {
        Ok(self
            .list_items(pool)?
            .into_iter()
            .filter(|item| !item.used)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))))
    }

    /// Flip the used flag. Returns false when the lesson was already used.
    fn mark_used(&self, item_id: &str) -> Result<bool, StorageError>;
}

/// Everything the engine needs from storage
pub trait PoolStore: JobStore + StatsStore + ItemStore + Send + Sync {}

impl<T> PoolStore for T where T: JobStore + StatsStore + ItemStore + Send + Sync {}
