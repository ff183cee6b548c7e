//! Engine facade
//!
//! Wires storage, rate limiters, the batch API and the batch components
//! together from one configuration. The CLI and embedding applications talk
//! to `LessonEngine`; tests can build one around any store and `BatchApi`.

use crate::batch::{
    BatchMonitor, BatchOrchestrator, OrchestratorSettings, RefillOutcome, ResultProcessor,
};
use crate::config::LessonPoolConfig;
use crate::error::ApiError;
use crate::inventory::{PoolInventory, PoolSettings};
use crate::provider::{BatchApi, OpenAiBatchClient, PromptBuilder};
use crate::rate_limit::RateLimiters;
use crate::store::{JobStore, PoolStore, SledStore};
use crate::types::{BatchJob, Lesson, PoolStats, PoolType};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One pool's row in a status report
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub stats: PoolStats,
    pub settings: PoolSettings,
    pub refill_needed: bool,
}

/// Inventory and in-flight work at a point in time
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub pools: Vec<PoolStatus>,
    pub active_jobs: Vec<BatchJob>,
}

/// A consumed lesson plus the refill it triggered, if any
pub struct NextLesson {
    pub lesson: Option<Lesson>,
    pub refill: Option<JoinHandle<Result<RefillOutcome, ApiError>>>,
}

pub struct LessonEngine {
    store: Arc<dyn PoolStore>,
    inventory: Arc<PoolInventory>,
    orchestrator: Arc<BatchOrchestrator>,
    processor: Arc<ResultProcessor>,
    monitor: Arc<BatchMonitor>,
}

impl LessonEngine {
    pub fn new(
        config: &LessonPoolConfig,
        store: Arc<dyn PoolStore>,
        api: Arc<dyn BatchApi>,
    ) -> Self {
        Self::build(config, store, api, None)
    }

    /// Like `new`, with a custom prompt builder for generation requests
    pub fn with_prompt_builder(
        config: &LessonPoolConfig,
        store: Arc<dyn PoolStore>,
        api: Arc<dyn BatchApi>,
        prompts: Arc<dyn PromptBuilder>,
    ) -> Self {
        Self::build(config, store, api, Some(prompts))
    }

    /// Open the sled store at `store_path` and connect to the configured provider
    pub fn open(config: &LessonPoolConfig, store_path: &Path) -> Result<Self, ApiError> {
        let store: Arc<dyn PoolStore> = Arc::new(SledStore::new(store_path)?);
        let api: Arc<dyn BatchApi> = Arc::new(OpenAiBatchClient::new(&config.provider)?);
        info!(
            store = %store_path.display(),
            provider = api.provider_name(),
            model = %config.provider.model,
            environment = %config.environment,
            "Lesson engine opened"
        );
        Ok(Self::new(config, store, api))
    }

    fn build(
        config: &LessonPoolConfig,
        store: Arc<dyn PoolStore>,
        api: Arc<dyn BatchApi>,
        prompts: Option<Arc<dyn PromptBuilder>>,
    ) -> Self {
        let limiters = RateLimiters::from_config(&config.rate_limits);
        let inventory = Arc::new(PoolInventory::new(store.clone(), config.pools.clone()));

        let mut orchestrator = BatchOrchestrator::new(
            store.clone(),
            api.clone(),
            inventory.clone(),
            limiters.clone(),
            OrchestratorSettings {
                batch: config.batch.clone(),
                environment: config.environment,
                themes: config.themes.clone(),
                options: config.provider.default_options.clone(),
            },
        );
        if let Some(prompts) = prompts {
            orchestrator = orchestrator.with_prompt_builder(prompts);
        }
        let orchestrator = Arc::new(orchestrator);

        let processor = Arc::new(ResultProcessor::new(
            store.clone(),
            api.clone(),
            inventory.clone(),
            limiters.clone(),
            config.themes.clone(),
        ));

        let monitor = Arc::new(
            BatchMonitor::new(
                store.clone(),
                api,
                processor.clone(),
                limiters,
                config.monitor.clone(),
            )
            .with_orchestrator(orchestrator.clone()),
        );

        Self {
            store,
            inventory,
            orchestrator,
            processor,
            monitor,
        }
    }

    pub fn store(&self) -> &Arc<dyn PoolStore> {
        &self.store
    }

    pub fn inventory(&self) -> &Arc<PoolInventory> {
        &self.inventory
    }

    pub fn orchestrator(&self) -> &Arc<BatchOrchestrator> {
        &self.orchestrator
    }

    pub fn processor(&self) -> &Arc<ResultProcessor> {
        &self.processor
    }

    pub fn monitor(&self) -> &Arc<BatchMonitor> {
        &self.monitor
    }

    /// Consume the oldest unused lesson of `pool`.
    ///
    /// When the pool drops below its threshold a refill is started on the
    /// current tokio runtime; the consumer never waits for it.
    pub fn next_lesson(&self, pool: PoolType) -> Result<NextLesson, ApiError> {
        let lesson = self.inventory.next_item(pool)?;

        let refill = if self.inventory.is_refill_needed(pool)? {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let orchestrator = self.orchestrator.clone();
                    Some(handle.spawn(async move { orchestrator.refill_pool(pool).await }))
                }
                Err(_) => {
                    debug!(pool = %pool, "No runtime available; refill deferred to the monitor");
                    None
                }
            }
        } else {
            None
        };

        Ok(NextLesson { lesson, refill })
    }

    pub fn status(&self) -> Result<EngineStatus, ApiError> {
        let pools = self
            .inventory
            .snapshot()?
            .into_iter()
            .map(|stats| {
                let pool = stats.pool;
                Ok::<_, ApiError>(PoolStatus {
                    refill_needed: self.inventory.is_refill_needed(pool)?,
                    settings: self.inventory.settings(pool),
                    stats,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let active_jobs = self.store.list_active_jobs()?;
        Ok(EngineStatus { pools, active_jobs })
    }
}
