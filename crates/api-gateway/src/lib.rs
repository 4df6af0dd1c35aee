//! # API Gateway - HTTP surface for signed requests
//!
//! Verifies Ethereum-signed requests, renders errors as `{"errors": [...]}`
//! and exposes allow-listed task functions over HTTP.
//!
//! # Architecture
//!
//! ```text
//!           HTTP request
//!                │
//!  ┌─────────────┴──────────────┐
//!  │  TraceLayer (api_request)  │
//!  │  EnforceHttpsLayer         │
//!  │  SignatureAuthLayer        │  signed routes only
//!  └─────────────┬──────────────┘
//!                │
//!  ┌─────────────┴──────────────┐
//!  │  /v1/timestamp  /health    │  public
//!  │  /v1/whoami                │  signed
//!  │  /v1/tasks/{function}      │  signed, allow-listed
//!  └─────────────┬──────────────┘
//!                │ TaskDispatcher
//!                ▼
//!            task queue
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use api_gateway::{ApiGatewayService, GatewayConfig};
//!
//! let service = ApiGatewayService::new(GatewayConfig::default(), listener.dispatcher().clone())?;
//! service.start(shutdown_signal()).await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;

pub use domain::{
    ids, ApiError, ConfigError, ErrorBody, ErrorEntry, GatewayConfig, GatewayError, HttpsMode,
};
pub use extract::JsonBody;
pub use middleware::{AuthMode, EnforceHttpsLayer, SignatureAuthLayer, VerifiedAddress};
pub use router::{build_router, AppState};
pub use service::ApiGatewayService;
