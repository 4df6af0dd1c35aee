//! Signed-request authentication middleware.
//!
//! Buffers the request body, verifies the auth headers (or query args)
//! against it and stores the signer's address as a [`VerifiedAddress`]
//! request extension. The body is passed on unchanged.

use crate::domain::error::ApiError;
use axum::{
    body::{to_bytes, Body},
    extract::Query,
    http::{HeaderMap, Request},
    response::{IntoResponse, Response},
};
use request_auth::{Address, RequestSource, RequestVerifier};
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Address proven by the request signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAddress(pub Address);

/// Whether unsigned requests get through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Every request must be signed.
    Required,
    /// Unsigned requests pass without a [`VerifiedAddress`]; partially
    /// signed ones are rejected.
    Optional,
}

/// Auth fields read from a request's headers and query string.
pub struct HttpRequestSource<'a> {
    headers: &'a HeaderMap,
    query: HashMap<String, String>,
}

impl<'a> HttpRequestSource<'a> {
    pub fn new(headers: &'a HeaderMap, uri: &axum::http::Uri) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        Self { headers, query }
    }
}

impl RequestSource for HttpRequestSource<'_> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn query_arg(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Signature authentication layer
#[derive(Clone)]
pub struct SignatureAuthLayer {
    verifier: Arc<RequestVerifier>,
    mode: AuthMode,
    max_body_size: usize,
}

impl SignatureAuthLayer {
    pub fn new(verifier: Arc<RequestVerifier>, mode: AuthMode, max_body_size: usize) -> Self {
        Self {
            verifier,
            mode,
            max_body_size,
        }
    }
}

impl<S> Layer<S> for SignatureAuthLayer {
    type Service = SignatureAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SignatureAuthService {
            inner,
            verifier: Arc::clone(&self.verifier),
            mode: self.mode,
            max_body_size: self.max_body_size,
        }
    }
}

/// Signature authentication service
#[derive(Clone)]
pub struct SignatureAuthService<S> {
    inner: S,
    verifier: Arc<RequestVerifier>,
    mode: AuthMode,
    max_body_size: usize,
}

impl<S> Service<Request<Body>> for SignatureAuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
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
        let verifier = Arc::clone(&self.verifier);
        let mode = self.mode;
        let max_body_size = self.max_body_size;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            if mode == AuthMode::Optional {
                let signed = {
                    let source = HttpRequestSource::new(&parts.headers, &parts.uri);
                    verifier.is_request_signed(&source, true)
                };
                match signed {
                    Ok(true) => {}
                    Ok(false) => return inner.call(Request::from_parts(parts, body)).await,
                    Err(e) => {
                        debug!(path = %parts.uri.path(), error = %e, "Partially signed request");
                        return Ok(ApiError::from(e).into_response());
                    }
                }
            }

            let bytes = match to_bytes(body, max_body_size).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %parts.uri.path(), error = %e, "Cannot read request body");
                    return Ok(ApiError::bad_arguments("Request body too large or unreadable")
                        .into_response());
                }
            };

            let verified = {
                let source = HttpRequestSource::new(&parts.headers, &parts.uri);
                verifier.verify_request_now(
                    &source,
                    parts.method.as_str(),
                    parts.uri.path(),
                    &bytes,
                )
            };

            match verified {
                Ok(address) => {
                    debug!(address = %address, path = %parts.uri.path(), "Request signature verified");
                    parts.extensions.insert(VerifiedAddress(address));
                    inner
                        .call(Request::from_parts(parts, Body::from(bytes)))
                        .await
                }
                Err(e) => {
                    debug!(
                        method = %parts.method,
                        path = %parts.uri.path(),
                        error_id = e.id(),
                        error = %e,
                        "Request verification failed"
                    );
                    Ok(ApiError::from(e).into_response())
                }
            }
        })
    }
}
