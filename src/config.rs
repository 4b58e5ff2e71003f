//! Configuration System
//!
//! Layered configuration: built-in defaults, then an optional TOML file, then
//! `CATALOG_REBUILD__SECTION__KEY` environment overrides. Validation collects every
//! problem instead of stopping at the first.

use crate::dispatch::DispatchConfig;
use crate::error::RebuildError;
use crate::logging::{self, LoggingConfig};
use crate::notify::NotifyConfig;
use crate::query::QueryConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "CATALOG_REBUILD";

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "CATALOG_REBUILD_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildConfig {
    /// Name reported in store notifications
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// Catalog reads
    #[serde(default)]
    pub query: QueryConfig,

    /// Queue publishing
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Chat notifications
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_process_name() -> String {
    "initialize_catalog_rules".to_string()
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            query: QueryConfig::default(),
            dispatch: DispatchConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Query(String),
    Dispatch(String),
    Notify(String),
    Logging(String),
    System(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Query(msg) => write!(f, "Query: {}", msg),
            ValidationError::Dispatch(msg) => write!(f, "Dispatch: {}", msg),
            ValidationError::Notify(msg) => write!(f, "Notify: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
            ValidationError::System(msg) => write!(f, "System: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RebuildConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.process_name.trim().is_empty() {
            errors.push(ValidationError::System(
                "process_name cannot be empty".to_string(),
            ));
        }
        if let Err(e) = self.query.validate() {
            errors.push(ValidationError::Query(e));
        }
        if let Err(e) = self.dispatch.validate() {
            errors.push(ValidationError::Dispatch(e));
        }
        if let Err(e) = self.notify.validate() {
            errors.push(ValidationError::Notify(e));
        }
        if let Err(e) = logging::validate(&self.logging) {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render as TOML, the format the loader reads.
    pub fn to_toml(&self) -> Result<String, RebuildError> {
        toml::to_string_pretty(self)
            .map_err(|e| RebuildError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

/// Loads [`RebuildConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, then `path` (or `$CATALOG_REBUILD_CONFIG` if set), then env overrides.
    pub fn load(path: Option<&Path>) -> Result<RebuildConfig, RebuildError> {
        let mut builder = Self::builder_with_defaults()?;

        let env_path = std::env::var(CONFIG_PATH_ENV).ok().filter(|p| !p.is_empty());
        match (path, env_path.as_deref()) {
            (Some(path), _) => {
                debug!(config_path = %path.display(), "Loading configuration file");
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            (None, Some(env_path)) => {
                debug!(config_path = env_path, "Loading configuration file from environment");
                builder = builder.add_source(
                    File::with_name(env_path)
                        .format(FileFormat::Toml)
                        .required(true),
                );
            }
            (None, None) => {}
        }

        let config = Self::finish(builder.add_source(Self::environment()))?;
        Self::checked(config)
    }

    /// Load a single file over the defaults, ignoring the environment.
    pub fn load_from_file(path: &Path) -> Result<RebuildConfig, RebuildError> {
        let builder = Self::builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml).required(true));
        Self::checked(Self::finish(builder)?)
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, RebuildError> {
        let defaults = Config::try_from(&RebuildConfig::default())?;
        Ok(Config::builder().add_source(defaults))
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<RebuildConfig, RebuildError> {
        Ok(builder.build()?.try_deserialize()?)
    }

    fn checked(config: RebuildConfig) -> Result<RebuildConfig, RebuildError> {
        config.validate().map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            RebuildError::ConfigError(format!("Invalid configuration: {}", joined))
        })?;
        Ok(config)
    }
}
