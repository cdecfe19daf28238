//! Video generation pipeline worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adreel_genclient::HttpGenerationClient;
use adreel_pipeline::{NotificationHub, PipelineConfig, PipelineOrchestrator, PipelineRunner};
use adreel_storage::{R2AssetStore, StorageClient};
use adreel_store::{CreditLedger, MemoryStore};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::from_default_env().add_directive("adreel=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting adreel-worker");

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);

    let storage = match StorageClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create storage client: {}", e);
            std::process::exit(1);
        }
    };

    let generation = match HttpGenerationClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create generation client: {}", e);
            std::process::exit(1);
        }
    };

    // In-process store for development; a durable deployment swaps in a
    // JobStore/LedgerStore backed by its database.
    let store = Arc::new(MemoryStore::new());
    let ledger = CreditLedger::new(store.clone());

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        config,
        store,
        ledger,
        Arc::new(generation),
        Arc::new(R2AssetStore::new(storage)),
        NotificationHub::new(),
    ));

    let runner = Arc::new(PipelineRunner::new(orchestrator));

    // Setup signal handler
    let shutdown_runner = Arc::clone(&runner);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_runner.shutdown();
    });

    runner.run().await;

    info!("Worker shutdown complete");
}
