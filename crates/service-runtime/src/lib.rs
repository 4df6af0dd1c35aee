//! # Dgas Service Runtime
//!
//! Wires the services together in one process:
//!
//! ```text
//!   HTTP ──→ ApiGatewayService ──call──→ ┌──────────────┐
//!                   ↑                    │  pub/sub bus │
//!                   └──────result─────── │  (in-memory) │
//!                                        └──────┬───────┘
//!                                               ↓
//!                                        TaskListener
//!                                        (SystemTaskHandler, ...)
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then environment)
//! 2. Install the tracing subscriber
//! 3. Start the task listener
//! 4. Serve HTTP until Ctrl-C
//!
//! ## Shutdown Sequence
//!
//! 1. Soft-stop the listener, letting in-flight tasks finish
//! 2. Stop accepting HTTP connections and drain open requests

pub mod config;
pub mod handlers;

use anyhow::{Context, Result};
use api_gateway::ApiGatewayService;
use shared_bus::{InMemoryBroker, PubSubConnection};
use std::future::Future;
use std::sync::Arc;
use task_queue::{ListenerState, TaskListener};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use config::{GeneralConfig, LoggingConfig, RuntimeConfig, DEFAULT_CONFIG_FILE};
pub use handlers::SystemTaskHandler;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &RuntimeConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

/// All services of one process.
pub struct ServiceRuntime {
    config: RuntimeConfig,
    broker: Arc<InMemoryBroker>,
    listener: TaskListener,
    gateway: ApiGatewayService,
}

impl ServiceRuntime {
    /// Validate `config` and build the services. Nothing runs yet.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let broker = Arc::new(InMemoryBroker::new());
        let connection: Arc<dyn PubSubConnection> = Arc::new(broker.connection());
        let listener = TaskListener::new(connection, &config.task_queue);
        listener.add_task_handler::<SystemTaskHandler>(());

        let gateway = ApiGatewayService::new(config.gateway_config(), listener.dispatcher().clone())
            .context("Failed to create API gateway")?;

        Ok(Self {
            config,
            broker,
            listener,
            gateway,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The bus every connection of this process shares.
    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }

    pub fn listener(&self) -> &TaskListener {
        &self.listener
    }

    pub fn gateway(&self) -> &ApiGatewayService {
        &self.gateway
    }

    /// Bind the configured HTTP address and run until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.gateway.config().http_addr();
        let socket = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        self.serve(socket, shutdown).await
    }

    /// Start the listener and serve HTTP on `socket` until `shutdown`
    /// resolves.
    pub async fn serve<F>(&self, socket: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            channel = %self.config.task_queue.channel,
            functions = ?self.listener.registered_functions(),
            "Starting task listener"
        );
        self.listener.start().await;

        let listener = self.listener.clone();
        let result = self
            .gateway
            .serve(socket, async move {
                shutdown.await;
                info!("Shutdown signal received, draining task listener");
                listener.stop(true).await;
            })
            .await;

        if self.listener.state() != ListenerState::Stopped {
            self.listener.stop(false).await;
        }

        result.context("HTTP server failed")?;
        info!("Shutdown complete");
        Ok(())
    }
}
