//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ProviderNotConfigured(_) => format!(
            "{}\nHint: export OPENAI_API_KEY or set provider.api_key in config/config.toml",
            e
        ),
        ApiError::ConfigError(_) => format!("{}\nHint: check config/config.toml and LESSONPOOL__* variables", e),
        _ => e.to_string(),
    }
}
