//! Runtime configuration.
//!
//! Read from a TOML file, then overridden from the environment:
//!
//! | variable             | setting                              |
//! |----------------------|--------------------------------------|
//! | `TIMESTAMP_EXPIRY`   | `gateway.auth.timestamp_expiry`      |
//! | `PORT`               | `gateway.port`                       |
//! | `LOG_LEVEL`          | `logging.level`                      |
//! | `ENFORCE_HTTPS`      | `gateway.enforce_https`              |
//! | `TASK_QUEUE_CHANNEL` | `task_queue.channel`                 |
//! | `DEBUG`              | `general.debug`                      |

use anyhow::{Context, Result};
use api_gateway::{ConfigError, GatewayConfig, HttpsMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use task_queue::TaskQueueConfig;
use tracing::warn;

/// File read when `CONFIG` is not set, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub general: GeneralConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub task_queue: TaskQueueConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Include exception details in HTTP error bodies
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load from `CONFIG`, else [`DEFAULT_CONFIG_FILE`] when present, else
    /// defaults; then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("CONFIG").map(PathBuf::from).or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply overrides; `lookup` returns a variable's value if set.
    ///
    /// Unparseable numbers are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("TIMESTAMP_EXPIRY") {
            match value.trim().parse() {
                Ok(expiry) => self.gateway.auth.timestamp_expiry = expiry,
                Err(_) => warn!(value = %value, "Ignoring invalid TIMESTAMP_EXPIRY"),
            }
        }

        if let Some(value) = lookup("PORT") {
            match value.trim().parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => warn!(value = %value, "Ignoring invalid PORT"),
            }
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(mode) = lookup("ENFORCE_HTTPS") {
            self.gateway.enforce_https = Some(HttpsMode::parse(&mode));
        }

        if let Some(channel) = lookup("TASK_QUEUE_CHANNEL") {
            self.task_queue.channel = channel;
        }

        if let Some(debug) = lookup("DEBUG") {
            self.general.debug = parse_flag(&debug);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_queue.channel.trim().is_empty() {
            return Err(ConfigError::Invalid("task_queue.channel cannot be empty".into()));
        }
        self.gateway_config().validate()
    }

    /// Gateway settings with the general flags folded in.
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut gateway = self.gateway.clone();
        gateway.debug |= self.general.debug;
        gateway
    }
}

/// `1`, `true`, `yes` and `on` (any case) are true.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
