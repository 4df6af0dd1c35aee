use anyhow::Result;
use service_runtime::{init_tracing, RuntimeConfig, ServiceRuntime};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::load()?;
    init_tracing(&config)?;

    info!("===========================================");
    info!("  Dgas Service Runtime v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let runtime = ServiceRuntime::new(config)?;
    info!(addr = %runtime.gateway().config().http_addr(), "Service is running. Press Ctrl+C to stop.");

    runtime
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await
}
