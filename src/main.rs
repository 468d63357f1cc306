use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use log_relay::broker::{Broker, IggyBroker, InMemoryBroker};
use log_relay::claim::{ClaimStore, InMemoryClaimStore, RedisClaimStore};
use log_relay::config::{BrokerBackend, ClaimStoreBackend};
use log_relay::metrics::try_init_metrics;
use log_relay::persistence::{InMemorySysLogRepository, PgSysLogRepository, SysLogRepository};
use log_relay::{AppState, Config, build_router, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Config is loaded before tracing so LOG_LEVEL can seed the filter;
    // errors are reported after the subscriber is up.
    let config = Config::from_env();
    let default_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    utils::init_tracing(&default_level);

    info!("Starting log relay v{}", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run(config: Arc<Config>) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        broker = %config.broker_backend,
        claim_store = %config.claim_store_backend,
        stream = %config.stream,
        topic = %config.topic,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        try_init_metrics(addr);
        info!("Prometheus metrics available on http://{addr}/metrics");
    }

    let broker = connect_broker(&config).await?;
    let claim_store = connect_claim_store(&config).await?;
    let repository = connect_repository(&config).await?;

    let state = AppState::new(config.clone(), broker, claim_store, repository);
    let app = build_router(state.clone());

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /             - Status page");
    info!("  GET  /log?msg=...  - Publish a log line");
    info!("  GET  /logs/{{id}}    - Look up a processed record");
    info!("  GET  /health       - Health check");
    info!("  GET  /ready        - Readiness check");
    info!("  GET  /stats        - Service statistics");

    axum::serve(listener, app)
        .with_graceful_shutdown(utils::shutdown_signal())
        .await
        .map_err(|e| {
            error!("Server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

async fn connect_broker(config: &Arc<Config>) -> Result<Arc<dyn Broker>, exitcode::ExitCode> {
    match config.broker_backend {
        BrokerBackend::Iggy => {
            info!("Connecting to Iggy server...");
            let broker = IggyBroker::connect(config.clone()).await.map_err(|e| {
                error!("Failed to connect to Iggy server: {e}");
                exitcode::UNAVAILABLE
            })?;
            broker.initialize_defaults().await.map_err(|e| {
                error!("Failed to initialize stream and topic: {e}");
                exitcode::UNAVAILABLE
            })?;
            info!(
                "Stream '{}' and topic '{}' initialized",
                config.stream, config.topic
            );
            Ok(Arc::new(broker))
        }
        BrokerBackend::Memory => {
            warn!("Using in-memory broker; records do not survive a restart");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}

async fn connect_claim_store(
    config: &Config,
) -> Result<Arc<dyn ClaimStore>, exitcode::ExitCode> {
    match config.claim_store_backend {
        ClaimStoreBackend::Redis => {
            info!("Connecting to Redis claim store...");
            let store = RedisClaimStore::connect(&config.redis_url, config.store_timeout)
                .await
                .map_err(|e| {
                    error!("Failed to connect to Redis: {e}");
                    exitcode::UNAVAILABLE
                })?;
            Ok(Arc::new(store))
        }
        ClaimStoreBackend::Memory => {
            warn!("Using in-memory claim store; duplicates are only suppressed within this process");
            Ok(Arc::new(InMemoryClaimStore::new()))
        }
    }
}

async fn connect_repository(
    config: &Config,
) -> Result<Arc<dyn SysLogRepository>, exitcode::ExitCode> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; processed records are kept in memory");
        return Ok(Arc::new(InMemorySysLogRepository::new()));
    };

    let repository = PgSysLogRepository::connect(url, config.database_max_connections)
        .await
        .map_err(|e| {
            error!("Failed to open PostgreSQL repository: {e}");
            exitcode::UNAVAILABLE
        })?;
    info!("PostgreSQL repository ready");

    Ok(Arc::new(repository))
}
