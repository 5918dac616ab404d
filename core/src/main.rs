/// Chat backend - JSON API server entry point
use std::env;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wachat_core::messenger_api::start_messenger_api;
use wachat_core::{ChatService, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let api_addr = config.api_addr;
    info!("Starting chat backend");
    info!("   Data dir: {}", config.data_dir.display());
    info!("   Payload dir: {}", config.payload_dir.display());

    let service = ChatService::open(config)
        .map_err(|e| anyhow::anyhow!("Store error: {}", e))?;
    let store = service.store().clone();

    tokio::select! {
        result = start_messenger_api(service, api_addr) => {
            result.map_err(|e| anyhow::anyhow!("API error: {}", e))?;
        }
        _ = wait_for_shutdown() => {}
    }

    store.flush().map_err(|e| anyhow::anyhow!("Store error: {}", e))?;
    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("SIGTERM received");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
