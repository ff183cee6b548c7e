//! Sled-backed persistence for jobs, pool stats and lessons

use crate::error::StorageError;
use crate::store::{ItemStore, JobStore, StatsStore};
use crate::types::{BatchJob, Lesson, PoolStats, PoolType};
use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::{debug, warn};

const TREE_JOBS: &str = "batch_jobs";
const TREE_STATS: &str = "pool_stats";
const TREE_ITEMS: &str = "lessons";
const TREE_ACTIVE: &str = "active_jobs";

/// Sled implementation of all three stores
#[derive(Clone)]
pub struct SledStore {
    jobs: Tree,
    stats: Tree,
    items: Tree,
    /// pool -> id of the job currently holding the pool's active slot
    active: Tree,
}

impl SledStore {
    /// Open (or create) a store at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let jobs = db.open_tree(TREE_JOBS)?;
        let stats = db.open_tree(TREE_STATS)?;
        let items = db.open_tree(TREE_ITEMS)?;
        let active = db.open_tree(TREE_ACTIVE)?;
        Ok(Self {
            jobs,
            stats,
            items,
            active,
        })
    }

    fn write_job(&self, job: &BatchJob) -> Result<(), StorageError> {
        let value = bincode::serialize(job)?;
        self.jobs.insert(job.id.as_bytes(), value)?;
        Ok(())
    }

    /// Whether the job named in an occupied active slot still blocks new submissions
    fn slot_holder_is_live(&self, holder_id: &str) -> Result<bool, StorageError> {
        Ok(self
            .get_job(holder_id)?
            .map(|job| job.is_active())
            .unwrap_or(false))
    }

    /// Point the pool's active slot at `job`, taking over a slot whose holder is no longer active
    fn claim_slot(&self, job: &BatchJob) -> Result<(), StorageError> {
        let key = job.pool.as_str().as_bytes();
        let claimed = self.active.compare_and_swap(
            key,
            None as Option<&[u8]>,
            Some(job.id.as_bytes()),
        )?;

        if let Err(conflict) = claimed {
            let current = conflict.current.map(|v| v.to_vec()).unwrap_or_default();
            let holder = String::from_utf8_lossy(&current).to_string();
            if self.slot_holder_is_live(&holder)? {
                return Err(StorageError::ActiveJobExists(job.pool, holder));
            }

            // Holder finished (or was never written); take the slot over.
            warn!(pool = %job.pool, stale_holder = %holder, "Reclaiming stale active job slot");
            let reclaimed =
                self.active
                    .compare_and_swap(key, Some(current.as_slice()), Some(job.id.as_bytes()))?;
            if reclaimed.is_err() {
                return Err(StorageError::ActiveJobExists(job.pool, holder));
            }
        }

        Ok(())
    }
}

impl JobStore for SledStore {
    fn get_job(&self, job_id: &str) -> Result<Option<BatchJob>, StorageError> {
        match self.jobs.get(job_id.as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    fn put_job(&self, job: &BatchJob) -> Result<(), StorageError> {
        self.write_job(job)?;
        if job.status.is_terminal() {
            // Only release the slot if this job is the one holding it.
            let released = self.active.compare_and_swap(
                job.pool.as_str().as_bytes(),
                Some(job.id.as_bytes()),
                None as Option<&[u8]>,
            )?;
            if released.is_ok() {
                debug!(job_id = %job.id, pool = %job.pool, "Released active job slot");
            }
        }
        Ok(())
    }

    fn insert_active_job(&self, job: &BatchJob) -> Result<(), StorageError> {
        // The record goes in first so a concurrent claimer never sees a live holder as missing.
        self.write_job(job)?;
        if let Err(e) = self.claim_slot(job) {
            self.jobs.remove(job.id.as_bytes())?;
            return Err(e);
        }
        Ok(())
    }

    fn list_jobs(&self) -> Result<Vec<BatchJob>, StorageError> {
        let mut jobs = Vec::new();
        for entry in self.jobs.iter() {
            let (_, value) = entry?;
            jobs.push(bincode::deserialize(&value)?);
        }
        Ok(jobs)
    }
}

impl StatsStore for SledStore {
    fn get_stats(&self, pool: PoolType) -> Result<Option<PoolStats>, StorageError> {
        match self.stats.get(pool.as_str().as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    fn update_stats(
        &self,
        pool: PoolType,
        update: &mut dyn FnMut(&mut PoolStats),
    ) -> Result<PoolStats, StorageError> {
        let key = pool.as_str().as_bytes();
        loop {
            let current = self.stats.get(key)?;
            let mut stats = match &current {
                Some(raw) => bincode::deserialize(raw)?,
                None => PoolStats::empty(pool),
            };
            update(&mut stats);
            let encoded = bincode::serialize(&stats)?;
            if self
                .stats
                .compare_and_swap(key, current, Some(encoded))?
                .is_ok()
            {
                return Ok(stats);
            }
        }
    }
}

impl ItemStore for SledStore {
    fn put_item(&self, item: &Lesson) -> Result<(), StorageError> {
        let value = bincode::serialize(item)?;
        self.items.insert(item.id.as_bytes(), value)?;
        Ok(())
    }

    fn get_item(&self, item_id: &str) -> Result<Option<Lesson>, StorageError> {
        match self.items.get(item_id.as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    fn insert_produced(&self, item: &Lesson) -> Result<bool, StorageError> {
        let value = bincode::serialize(item)?;
        let stats_key = item.pool.as_str().as_bytes();

        let result: TransactionResult<bool, bincode::Error> =
            (&self.items, &self.stats).transaction(|(items, stats)| {
                if items.get(item.id.as_bytes())?.is_some() {
                    return Ok(false);
                }
                let mut row: PoolStats = match stats.get(stats_key)? {
                    Some(raw) => {
                        bincode::deserialize(&raw).map_err(ConflictableTransactionError::Abort)?
                    }
                    None => PoolStats::empty(item.pool),
                };
                row.total_items += 1;
                row.available_items += 1;
                let encoded = bincode::serialize(&row).map_err(ConflictableTransactionError::Abort)?;

                items.insert(item.id.as_bytes(), value.as_slice())?;
                stats.insert(stats_key, encoded)?;
                Ok(true)
            });

        match result {
            Ok(inserted) => Ok(inserted),
            Err(TransactionError::Abort(e)) => Err(e.into()),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn list_items(&self, pool: PoolType) -> Result<Vec<Lesson>, StorageError> {
        let mut items = Vec::new();
        for entry in self.items.iter() {
            let (_, value) = entry?;
            let item: Lesson = bincode::deserialize(&value)?;
            if item.pool == pool {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn mark_used(&self, item_id: &str) -> Result<bool, StorageError> {
        let key = item_id.as_bytes();
        loop {
            let Some(current) = self.items.get(key)? else {
                return Err(StorageError::ItemNotFound(item_id.to_string()));
            };
            let mut item: Lesson = bincode::deserialize(&current)?;
            if item.used {
                return Ok(false);
            }
            item.used = true;
            item.used_at = Some(Utc::now());
            let encoded = bincode::serialize(&item)?;
            if self
                .items
                .compare_and_swap(key, Some(current), Some(encoded))?
                .is_ok()
            {
                return Ok(true);
            }
        }
    }
}
