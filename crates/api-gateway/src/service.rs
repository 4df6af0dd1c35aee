//! API Gateway service - binds the HTTP server and runs it until shutdown.

use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::router::{build_router, AppState};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use task_queue::TaskDispatcher;
use tokio::net::TcpListener;
use tracing::info;

/// API Gateway service state
pub struct ApiGatewayService {
    state: AppState,
}

impl ApiGatewayService {
    /// Create a new API Gateway service
    pub fn new(config: GatewayConfig, dispatcher: TaskDispatcher) -> Result<Self, GatewayError> {
        config.validate()?;
        Ok(Self {
            state: AppState::new(config, dispatcher),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// The full router, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config().http_addr())
            .await
            .map_err(GatewayError::Bind)?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound socket until `shutdown` resolves.
    ///
    /// In-flight requests finish before this returns.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(
            addr = ?addr,
            enforce_https = ?self.config().enforce_https,
            "Starting HTTP server"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(GatewayError::Serve)?;

        info!("API Gateway stopped");
        Ok(())
    }
}
