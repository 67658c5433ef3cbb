//! docpress server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use docpress_core::api::{self, AppState};
use docpress_core::config::Config;
use docpress_core::convert::SofficeConverter;
use docpress_core::jobs::{self, ConvertService};
use docpress_core::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // DOCPRESS_CONFIG points at a config file; the environment overrides it
    // either way.
    let config = match std::env::var("DOCPRESS_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load()?,
    };

    telemetry::init_logging(&config.observability)?;
    telemetry::init_metrics()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "docpress server starting");

    tokio::fs::create_dir_all(&config.storage.data_dir).await?;
    if config.auth.api_key.is_empty() {
        tracing::warn!("API key is empty; /api/v1 endpoints accept unauthenticated requests");
    }

    let converter = Arc::new(SofficeConverter::new(
        config.converter.binary.clone(),
        config.converter.timeout,
    ));
    let service = Arc::new(ConvertService::new(&config, converter));
    let dispatcher = service.clone().start();
    let sweeper = jobs::start_sweeper(service.clone());

    let router = api::build_router(AppState { service }, &config);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The listener is closed; stop the background tasks. Conversions already
    // handed to the retry supervisor run to completion.
    dispatcher.shutdown();
    sweeper.shutdown();
    dispatcher.join().await;
    sweeper.join().await;

    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
}
