//! HTTPS enforcement middleware.
//!
//! The request protocol is taken from `X-Forwarded-Proto` when a proxy sets
//! it, else from the request URI, else assumed to be plain HTTP.

use crate::domain::config::HttpsMode;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

/// Header set by TLS-terminating proxies.
pub const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// HTTPS enforcement layer. Passes everything through when `mode` is `None`.
#[derive(Clone, Copy, Default)]
pub struct EnforceHttpsLayer {
    mode: Option<HttpsMode>,
}

impl EnforceHttpsLayer {
    pub fn new(mode: Option<HttpsMode>) -> Self {
        Self { mode }
    }
}

impl<S> Layer<S> for EnforceHttpsLayer {
    type Service = EnforceHttpsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EnforceHttpsService {
            inner,
            mode: self.mode,
        }
    }
}

/// HTTPS enforcement service
#[derive(Clone)]
pub struct EnforceHttpsService<S> {
    inner: S,
    mode: Option<HttpsMode>,
}

impl<S> Service<Request<Body>> for EnforceHttpsService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let Some(mode) = self.mode else {
            return Box::pin(self.inner.call(req));
        };

        if request_protocol(&req) == "https" {
            return Box::pin(self.inner.call(req));
        }

        let response = match mode {
            HttpsMode::Reject => {
                debug!(path = %req.uri().path(), "Rejecting plain HTTP request");
                StatusCode::NOT_FOUND.into_response()
            }
            HttpsMode::Redirect => match https_url(&req) {
                Some(location) => {
                    debug!(location = %location, "Redirecting plain HTTP request");
                    (
                        StatusCode::MOVED_PERMANENTLY,
                        [(header::LOCATION, location)],
                    )
                        .into_response()
                }
                None => StatusCode::NOT_FOUND.into_response(),
            },
        };
        Box::pin(async move { Ok(response) })
    }
}

/// Protocol the client used to reach us.
fn request_protocol<B>(req: &Request<B>) -> String {
    if let Some(proto) = req
        .headers()
        .get(FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
    {
        return proto.trim().to_ascii_lowercase();
    }
    req.uri().scheme_str().unwrap_or("http").to_ascii_lowercase()
}

/// The same URL with its scheme replaced by `https`.
fn https_url<B>(req: &Request<B>) -> Option<String> {
    let host = req
        .uri()
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            req.headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })?;
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Some(format!("https://{host}{path}"))
}
