use crate::domain::config::GatewayConfig;
use crate::handlers;
use crate::middleware::{make_span, log_request, AuthMode, EnforceHttpsLayer, SignatureAuthLayer};
use axum::routing::{get, post};
use axum::Router;
use request_auth::RequestVerifier;
use std::sync::Arc;
use task_queue::TaskDispatcher;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub verifier: Arc<RequestVerifier>,
    pub dispatcher: TaskDispatcher,
}

impl AppState {
    pub fn new(config: GatewayConfig, dispatcher: TaskDispatcher) -> Self {
        let verifier = Arc::new(RequestVerifier::new(&config.auth));
        Self {
            config: Arc::new(config),
            verifier,
            dispatcher,
        }
    }
}

/// Build the HTTP router.
///
/// Signed routes sit behind [`SignatureAuthLayer`]; the HTTPS and tracing
/// layers wrap everything.
pub fn build_router(state: AppState) -> Router {
    let auth = SignatureAuthLayer::new(
        Arc::clone(&state.verifier),
        AuthMode::Required,
        state.config.max_body_size,
    );

    let signed = Router::new()
        .route("/v1/whoami", get(handlers::whoami))
        .route("/v1/tasks/:function", post(handlers::call_task))
        .route_layer(auth);

    let public = Router::new()
        .route("/v1/timestamp", get(handlers::timestamp))
        .route("/health", get(handlers::health));

    let https = EnforceHttpsLayer::new(state.config.enforce_https);

    public
        .merge(signed)
        .with_state(state)
        .layer(https)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_span)
                .on_request(log_request),
        )
}
