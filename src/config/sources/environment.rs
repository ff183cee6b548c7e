//! Environment variable source: LESSONPOOL__SECTION__KEY=value

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};

pub const ENV_PREFIX: &str = "LESSONPOOL";
pub const ENV_SEPARATOR: &str = "__";

/// Add the `LESSONPOOL__*` override layer to builder.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    )
}
