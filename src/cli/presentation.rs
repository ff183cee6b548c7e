//! CLI presentation: text and json formatters per command.

use crate::batch::RefillOutcome;
use crate::engine::EngineStatus;
use crate::error::ApiError;
use crate::types::{Lesson, PoolType};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn to_pretty_json(value: &impl serde::Serialize) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::ProviderError(format!("Failed to render JSON: {}", e)))
}

pub fn format_status_text(status: &EngineStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Pools")));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Pool",
        "Available",
        "Total",
        "Size",
        "Threshold",
        "Refill",
        "Last batch",
    ]);
    for row in &status.pools {
        table.add_row(vec![
            row.stats.pool.to_string(),
            row.stats.available_items.to_string(),
            row.stats.total_items.to_string(),
            row.settings.size.to_string(),
            row.settings.min_threshold.to_string(),
            if row.refill_needed { "needed" } else { "-" }.to_string(),
            row.stats
                .last_batch_id
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    out.push_str(&format!("{}\n\n", table));

    out.push_str(&format!("{}\n\n", format_section_heading("Active batch jobs")));
    if status.active_jobs.is_empty() {
        out.push_str("  None\n");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Job", "Pool", "Batch", "Status", "Expected", "Started"]);
    for job in &status.active_jobs {
        table.add_row(vec![
            job.id.clone(),
            job.pool.to_string(),
            job.batch_id.clone(),
            job.status.to_string(),
            job.expected_count.to_string(),
            job.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]);
    }
    out.push_str(&format!("{}\n", table));
    out
}

pub fn format_status_json(status: &EngineStatus) -> Result<String, ApiError> {
    let pools: Vec<serde_json::Value> = status
        .pools
        .iter()
        .map(|row| {
            json!({
                "pool": row.stats.pool,
                "available_items": row.stats.available_items,
                "total_items": row.stats.total_items,
                "size": row.settings.size,
                "min_threshold": row.settings.min_threshold,
                "refill_needed": row.refill_needed,
                "last_generated_at": row.stats.last_generated_at,
                "last_batch_id": row.stats.last_batch_id,
            })
        })
        .collect();
    to_pretty_json(&json!({
        "pools": pools,
        "active_jobs": status.active_jobs,
    }))
}

pub fn format_refill_outcomes(outcomes: &[(PoolType, Result<RefillOutcome, ApiError>)]) -> String {
    outcomes
        .iter()
        .map(|(pool, outcome)| match outcome {
            Ok(outcome) => format!("{}: {}", pool, outcome),
            Err(e) => format!("{}: error: {}", pool, e),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_lesson_json(lesson: &Lesson) -> Result<String, ApiError> {
    to_pretty_json(lesson)
}
