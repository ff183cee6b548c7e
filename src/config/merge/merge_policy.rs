//! Merge rules: defaults, override order, conflict handling.

use crate::config::Environment;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with merge policy defaults applied.
///
/// `LESSONPOOL_ENV` seeds `environment` so a file only needs to set it when
/// it disagrees with the selected environment.
pub fn builder_with_defaults(env_name: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let environment = env_name.parse::<Environment>().unwrap_or_default();
    Config::builder()
        .set_default("environment", environment.as_str())?
        .set_default("storage.store_path", ".lessonpool/store")
}
