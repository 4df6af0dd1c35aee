//! Domain layer: configuration and error types.

pub mod config;
pub mod error;

pub use config::{ConfigError, GatewayConfig, HttpsMode};
pub use error::{ids, ApiError, ErrorBody, ErrorEntry, GatewayError};
