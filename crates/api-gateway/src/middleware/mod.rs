//! Middleware stack for the gateway.
//!
//! Order (outermost first): trace span, HTTPS enforcement, then signature
//! auth on the routes that require it.

pub mod auth;
pub mod https;
pub mod tracing;

pub use auth::{AuthMode, HttpRequestSource, SignatureAuthLayer, SignatureAuthService, VerifiedAddress};
pub use https::{EnforceHttpsLayer, EnforceHttpsService, FORWARDED_PROTO};
pub use self::tracing::{log_request, make_span};
