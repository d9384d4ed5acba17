//! Configuration Loader
//!
//! Layers built-in defaults, an optional configuration file and `MONITOR__*` environment
//! overrides using the `config` crate, then validates the result.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::MonitorConfig;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "MONITOR_CONFIG";

/// Base name tried when no explicit file is given (`config/monitor.toml`, `.yaml`, ...)
const DEFAULT_CONFIG_BASENAME: &str = "config/monitor";

/// Loaded, validated configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: MonitorConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration, honoring `MONITOR_CONFIG` when set
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let explicit = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from_path(explicit)
    }

    /// Load configuration from a specific file (required) or the default location (optional)
    pub fn load_from_path(path: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = config::Config::builder();

        match &path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigurationError::ConfigFileNotFound { path: path.clone() });
                }
                debug!(path = %path.display(), "Loading monitor configuration file");
                builder = builder.add_source(config::File::from(path.as_path()).required(true));
            }
            None => {
                builder = builder
                    .add_source(config::File::with_name(DEFAULT_CONFIG_BASENAME).required(false));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MONITOR")
                .separator("__")
                .try_parsing(true),
        );

        let config: MonitorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        let source_label = path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());
        info!(
            interval_seconds = config.orchestrator.interval_seconds,
            channel_prefix = %config.hub.channel_prefix,
            source = %source_label,
            "Monitor configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            source: path,
        }))
    }

    /// Wrap an already-built configuration (tests and embedding)
    pub fn from_config(config: MonitorConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            source: None,
        }))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
