//! Gateway configuration with validation.

use request_auth::VerifierConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 8000)
    pub port: u16,
    /// What to do with plain-HTTP requests. `None` serves them.
    pub enforce_https: Option<HttpsMode>,
    /// Include exception details in error bodies
    pub debug: bool,
    /// Largest request body buffered for signature checks, in bytes
    pub max_body_size: usize,
    /// Task functions callable through `POST /v1/tasks/{function}`
    pub callable_tasks: Vec<String>,
    /// How long a task call may take before the caller gives up, in seconds
    pub task_timeout_secs: u64,
    /// Signed-request verification
    pub auth: VerifierConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            enforce_https: None,
            debug: false,
            max_body_size: 1024 * 1024,
            callable_tasks: Vec::new(),
            task_timeout_secs: 30,
            auth: VerifierConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.timestamp_expiry == 0 {
            return Err(ConfigError::InvalidTimestampExpiry);
        }

        if self.auth.header_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyHeaderPrefix);
        }

        if self.auth.legacy_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyHeaderPrefix);
        }

        if self.max_body_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_body_size cannot be 0".into(),
            ));
        }

        if self.task_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "task_timeout_secs cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn is_callable(&self, function: &str) -> bool {
        self.callable_tasks.iter().any(|name| name == function)
    }
}

/// Handling of requests that did not arrive over HTTPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpsMode {
    /// Answer 404
    Reject,
    /// Answer 301 to the `https` URL
    Redirect,
}

impl HttpsMode {
    /// `reject` rejects; any other value redirects.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("reject") {
            Self::Reject
        } else {
            Self::Redirect
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("timestamp_expiry cannot be 0")]
    InvalidTimestampExpiry,

    #[error("auth header prefixes cannot be empty")]
    EmptyHeaderPrefix,

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
