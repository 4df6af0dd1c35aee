//! Request tracing hooks for `tower_http::trace::TraceLayer`.
//!
//! Every request runs in an `api_request` span. At debug level the full
//! request line and headers are logged on entry.

use axum::{body::Body, http::Request};
use tracing::{debug, enabled, info_span, Level, Span};

/// Span for one HTTP request.
pub fn make_span(req: &Request<Body>) -> Span {
    info_span!(
        "api_request",
        http.method = %req.method(),
        http.target = %req.uri().path(),
    )
}

/// Log the request and its headers when debug logging is on.
pub fn log_request(req: &Request<Body>, _span: &Span) {
    if !enabled!(Level::DEBUG) {
        return;
    }

    debug!("Preparing request: {} {}", req.method(), req.uri().path());
    for (name, value) in req.headers() {
        debug!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
}
