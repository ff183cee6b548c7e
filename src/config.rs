//! Configuration System
//!
//! Layered configuration for the lesson pool engine: built-in defaults, a
//! user-level file, workspace files and `LESSONPOOL__*` environment
//! variables, merged in that order and validated as a whole.

use crate::batch::{BatchConfig, MonitorConfig};
use crate::inventory::PoolsConfig;
use crate::logging::LoggingConfig;
use crate::rate_limit::RateLimitConfig;
use crate::types::PoolType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use crate::provider::ProviderConfig;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Deployment environment; selects the per-batch request cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Storage location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory, relative paths resolve against the workspace
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".lessonpool/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

/// The twenty UI/UX themes lessons rotate through
pub fn default_themes() -> Vec<String> {
    [
        "Color Theory",
        "Typography",
        "User Research",
        "Prototyping",
        "Usability Testing",
        "Information Architecture",
        "Interaction Design",
        "Visual Hierarchy",
        "Responsive Design",
        "Accessibility",
        "Mobile UX",
        "UI Animation",
        "Design Systems",
        "User Personas",
        "Wireframing",
        "Design Psychology",
        "UX Writing",
        "Microinteractions",
        "Dark Patterns",
        "User Onboarding",
    ]
    .iter()
    .map(|theme| theme.to_string())
    .collect()
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonPoolConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub pools: PoolsConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Lesson themes, used round-robin
    #[serde(default = "default_themes")]
    pub themes: Vec<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LessonPoolConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            pools: PoolsConfig::default(),
            batch: BatchConfig::default(),
            monitor: MonitorConfig::default(),
            rate_limits: RateLimitConfig::default(),
            provider: ProviderConfig::default(),
            storage: StorageConfig::default(),
            themes: default_themes(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Pool(PoolType, String),
    Batch(String),
    Monitor(String),
    RateLimit(String, String),
    Provider(String),
    Storage(String),
    Themes(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Pool(pool, msg) => write!(f, "Pool '{}': {}", pool, msg),
            ValidationError::Batch(msg) => write!(f, "Batch: {}", msg),
            ValidationError::Monitor(msg) => write!(f, "Monitor: {}", msg),
            ValidationError::RateLimit(name, msg) => write!(f, "Rate limit '{}': {}", name, msg),
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Themes(msg) => write!(f, "Themes: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl LessonPoolConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for pool in PoolType::ALL {
            if let Err(e) = self.pools.get(pool).validate() {
                errors.push(ValidationError::Pool(pool, e));
            }
        }

        if let Err(e) = self.batch.validate() {
            errors.push(ValidationError::Batch(e));
        }

        if let Err(e) = self.monitor.validate() {
            errors.push(ValidationError::Monitor(e));
        }

        for (name, settings) in [
            ("batch", &self.rate_limits.batch),
            ("outbound", &self.rate_limits.outbound),
        ] {
            if let Err(e) = settings.validate() {
                errors.push(ValidationError::RateLimit(name.to_string(), e));
            }
        }

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }

        if self.storage.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for theme in &self.themes {
            if theme.trim().is_empty() {
                errors.push(ValidationError::Themes("theme names cannot be blank".to_string()));
            } else if !seen.insert(theme.trim().to_lowercase()) {
                errors.push(ValidationError::Themes(format!("duplicate theme '{}'", theme)));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
