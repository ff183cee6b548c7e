//! Batch generation: submission, monitoring and result ingestion.

pub mod backoff;
pub mod extract;
pub mod monitor;
pub mod normalize;
pub mod orchestrator;
pub mod processor;
pub mod repair;

pub use backoff::BackoffConfig;
pub use monitor::{BatchMonitor, JobCheck, JobOutcome, MonitorConfig, PassResult};
pub use orchestrator::{BatchConfig, BatchOrchestrator, OrchestratorSettings, RefillOutcome};
pub use processor::{ProcessingReport, ResultProcessor};
