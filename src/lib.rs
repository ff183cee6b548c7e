//! lessonpool: batch generation and pool inventory for quiz lessons
//!
//! Keeps two lesson pools (scheduled and on-demand) stocked by submitting
//! generation work to an asynchronous batch API, polling the resulting jobs,
//! and ingesting their often malformed output into normalized lessons.

pub mod batch;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod provider;
pub mod rate_limit;
pub mod store;
pub mod types;

pub use engine::LessonEngine;
