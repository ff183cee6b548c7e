//! Config loading facade: one entry point over the merge policy and sources.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::LessonPoolConfig;
use config::{Config, ConfigError, File};
use std::path::{Path, PathBuf};

/// Loads `LessonPoolConfig` from every configured source
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace
    /// `config/config.toml`, `config/{LESSONPOOL_ENV}.toml`, `LESSONPOOL__*`
    /// environment variables.
    pub fn load(workspace_root: &Path) -> Result<LessonPoolConfig, ConfigError> {
        let env_name = workspace_file::environment_name();
        let builder = merge_policy::builder_with_defaults(&env_name)?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root, &env_name)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load configuration from a single file, ignoring every other source
    pub fn load_from_file(path: &Path) -> Result<LessonPoolConfig, ConfigError> {
        Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Path of the user-level config file, if a home directory is known
    pub fn xdg_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    /// Store path with relative paths resolved against the workspace
    pub fn resolve_store_path(config: &LessonPoolConfig, workspace_root: &Path) -> PathBuf {
        let path = &config.storage.store_path;
        if path.is_absolute() {
            path.clone()
        } else {
            workspace_root.join(path)
        }
    }
}
