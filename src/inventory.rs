//! Pool Inventory Manager
//!
//! Tracks how many lessons each pool has produced and how many are still
//! unconsumed, and decides when a pool needs refilling. Counts only ever move
//! additively: production adds, consumption subtracts one.

use crate::error::ApiError;
use crate::store::{ItemStore, PoolStore, StatsStore};
use crate::types::{Lesson, PoolStats, PoolType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Target size and refill threshold of one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Number of unconsumed lessons a refill aims for
    pub size: u64,
    /// Refill when fewer than this many lessons are available
    pub min_threshold: u64,
}

impl PoolSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.size == 0 {
            return Err("size must be at least 1".to_string());
        }
        if self.min_threshold > self.size {
            return Err(format!(
                "min_threshold ({}) cannot exceed size ({})",
                self.min_threshold, self.size
            ));
        }
        Ok(())
    }
}

/// Settings for every pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolsConfig {
    #[serde(default = "default_scheduled")]
    pub scheduled: PoolSettings,
    #[serde(default = "default_on_demand")]
    pub on_demand: PoolSettings,
}

fn default_scheduled() -> PoolSettings {
    PoolSettings {
        size: 20,
        min_threshold: 5,
    }
}

fn default_on_demand() -> PoolSettings {
    PoolSettings {
        size: 30,
        min_threshold: 10,
    }
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            scheduled: default_scheduled(),
            on_demand: default_on_demand(),
        }
    }
}

impl PoolsConfig {
    pub fn get(&self, pool: PoolType) -> PoolSettings {
        match pool {
            PoolType::Scheduled => self.scheduled,
            PoolType::OnDemand => self.on_demand,
        }
    }
}

/// Inventory accounting on top of the stats and item stores
pub struct PoolInventory {
    store: Arc<dyn PoolStore>,
    pools: PoolsConfig,
}

impl PoolInventory {
    pub fn new(store: Arc<dyn PoolStore>, pools: PoolsConfig) -> Self {
        Self { store, pools }
    }

    pub fn settings(&self, pool: PoolType) -> PoolSettings {
        self.pools.get(pool)
    }

    pub fn stats(&self, pool: PoolType) -> Result<Option<PoolStats>, ApiError> {
        Ok(self.store.get_stats(pool)?)
    }

    /// Unconsumed lessons; 0 when the pool has never been refilled
    pub fn available(&self, pool: PoolType) -> Result<u64, ApiError> {
        Ok(self
            .stats(pool)?
            .map(|stats| stats.available_items)
            .unwrap_or(0))
    }

    pub fn is_refill_needed(&self, pool: PoolType) -> Result<bool, ApiError> {
        match self.stats(pool)? {
            Some(stats) => Ok(stats.available_items < self.settings(pool).min_threshold),
            None => Ok(true),
        }
    }

    /// How many lessons bring the pool back to its target size
    pub fn refill_quantity(&self, pool: PoolType) -> Result<u64, ApiError> {
        let available = self.available(pool)?;
        Ok(self.settings(pool).size.saturating_sub(available))
    }

    /// Add `delta` freshly ingested lessons to both counters
    pub fn record_production(&self, pool: PoolType, delta: u64) -> Result<PoolStats, ApiError> {
        let stats = self.store.update_stats(pool, &mut |stats| {
            stats.total_items += delta;
            stats.available_items += delta;
        })?;
        info!(
            pool = %pool,
            delta,
            total = stats.total_items,
            available = stats.available_items,
            "Recorded pool production"
        );
        Ok(stats)
    }

    /// Store one freshly ingested lesson and count it into its pool.
    ///
    /// Storing and counting happen together, so running the same results
    /// again only counts lessons that were not stored the first time.
    /// Returns false for a lesson that is already stored.
    pub fn record_ingested(&self, lesson: &Lesson) -> Result<bool, ApiError> {
        let inserted = self.store.insert_produced(lesson)?;
        if !inserted {
            debug!(pool = %lesson.pool, item_id = %lesson.id, "Lesson already stored");
        }
        Ok(inserted)
    }

    /// Stamp generation metadata without touching the counts.
    ///
    /// `batch_id = None` marks a failed submission attempt.
    pub fn record_generation_attempt(
        &self,
        pool: PoolType,
        batch_id: Option<&str>,
    ) -> Result<PoolStats, ApiError> {
        let now = Utc::now();
        let stats = self.store.update_stats(pool, &mut |stats| {
            stats.last_generated_at = Some(now);
            if let Some(batch_id) = batch_id {
                stats.last_batch_id = Some(batch_id.to_string());
            }
        })?;
        Ok(stats)
    }

    /// Mark a lesson used and take it out of the available count.
    ///
    /// Returns false (and changes nothing) if the lesson was already used.
    pub fn record_consumption(&self, pool: PoolType, item_id: &str) -> Result<bool, ApiError> {
        if !self.store.mark_used(item_id)? {
            debug!(pool = %pool, item_id, "Lesson already consumed");
            return Ok(false);
        }
        let stats = self.store.update_stats(pool, &mut |stats| {
            stats.available_items = stats.available_items.saturating_sub(1);
        })?;
        debug!(
            pool = %pool,
            item_id,
            available = stats.available_items,
            "Recorded lesson consumption"
        );
        Ok(true)
    }

    /// Take the oldest unused lesson from a pool
    pub fn next_item(&self, pool: PoolType) -> Result<Option<Lesson>, ApiError> {
        loop {
            let Some(mut item) = self.store.next_unused(pool)? else {
                return Ok(None);
            };
            // Another consumer may win the race for the same lesson; try the next one.
            if self.record_consumption(pool, &item.id)? {
                item.used = true;
                item.used_at = Some(Utc::now());
                return Ok(Some(item));
            }
        }
    }

    /// Stats for every pool, with empty rows for pools never refilled
    pub fn snapshot(&self) -> Result<Vec<PoolStats>, ApiError> {
        PoolType::ALL
            .iter()
            .map(|pool| {
                Ok::<_, ApiError>(
                    self.stats(*pool)?
                        .unwrap_or_else(|| PoolStats::empty(*pool)),
                )
            })
            .collect()
    }
}
