//! CLI route: single route table and run context. Dispatches to the engine and presentation.

use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_lesson_json, format_refill_outcomes, format_status_json, format_status_text,
};
use crate::config::{ConfigLoader, LessonPoolConfig};
use crate::engine::LessonEngine;
use crate::error::{ApiError, StorageError};
use crate::types::PoolType;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Runtime context for CLI execution: workspace, loaded config and the engine.
pub struct RunContext {
    engine: LessonEngine,
    config: LessonPoolConfig,
    workspace_root: PathBuf,
}

/// Load and validate configuration for a workspace or an explicit file
pub fn load_config(
    workspace_root: &Path,
    config_path: Option<&Path>,
) -> Result<LessonPoolConfig, ApiError> {
    let config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(workspace_root)?,
    };
    config.validate().map_err(|errors| {
        let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ApiError::ConfigError(format!(
            "Configuration validation failed:\n{}",
            error_msgs.join("\n")
        ))
    })?;
    Ok(config)
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = load_config(&workspace_root, config_path.as_deref())?;
        let store_path = ConfigLoader::resolve_store_path(&config, &workspace_root);
        std::fs::create_dir_all(&store_path)
            .map_err(|e| ApiError::StorageError(StorageError::IoError(e)))?;

        let engine = LessonEngine::open(&config, &store_path)?;
        Ok(Self {
            engine,
            config,
            workspace_root,
        })
    }

    pub fn engine(&self) -> &LessonEngine {
        &self.engine
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn require_provider(&self) -> Result<(), ApiError> {
        self.config.provider.resolve_api_key().map(|_| ())
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        debug!(command = ?command, "Executing command");
        match command {
            Commands::Refill { pool } => self.handle_refill(*pool).await,
            Commands::Monitor { once } => self.handle_monitor(*once).await,
            Commands::Check => {
                self.require_provider()?;
                Ok(self.engine.monitor().force_check_all().await)
            }
            Commands::Status { format } => self.handle_status(format),
            Commands::Next { pool } => self.handle_next(*pool).await,
        }
    }

    async fn handle_refill(&self, pool: Option<PoolType>) -> Result<String, ApiError> {
        self.require_provider()?;
        let orchestrator = self.engine.orchestrator();
        let outcomes = match pool {
            Some(pool) => vec![(pool, orchestrator.refill_pool(pool).await)],
            None => orchestrator.refill_all().await,
        };
        Ok(format_refill_outcomes(&outcomes))
    }

    async fn handle_monitor(&self, once: bool) -> Result<String, ApiError> {
        self.require_provider()?;
        let monitor = self.engine.monitor();
        if once {
            return Ok(monitor.force_check_all().await);
        }
        monitor
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl-C; stopping monitor");
                }
            })
            .await;
        Ok("Monitor stopped.".to_string())
    }

    fn handle_status(&self, format: &str) -> Result<String, ApiError> {
        let status = self.engine.status()?;
        match format {
            "json" => format_status_json(&status),
            "text" => Ok(format_status_text(&status)),
            other => Err(ApiError::ConfigError(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    async fn handle_next(&self, pool: PoolType) -> Result<String, ApiError> {
        let next = self.engine.next_lesson(pool)?;
        if let Some(refill) = next.refill {
            // The process exits after printing; let the triggered refill finish first.
            match refill.await {
                Ok(Ok(outcome)) => info!(pool = %pool, outcome = %outcome, "Refill after consumption"),
                Ok(Err(e)) => warn!(pool = %pool, error = %e, "Refill after consumption failed"),
                Err(e) => warn!(pool = %pool, error = %e, "Refill task did not complete"),
            }
        }
        match next.lesson {
            Some(lesson) => format_lesson_json(&lesson),
            None => Ok(format!("Pool '{}' is empty.", pool)),
        }
    }
}
