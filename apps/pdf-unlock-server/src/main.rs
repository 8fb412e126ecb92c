//! PDF Unlock server
//!
//! Removes and adds PDF passwords and converts PDFs to PowerPoint decks.
//! Every generated file expires after a configurable TTL.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_unlock_server::config::Config;
use pdf_unlock_server::pdf::QpdfSecurity;
use pdf_unlock_server::routes;
use pdf_unlock_server::state::AppState;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "pdf_unlock_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers)
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting PDF Unlock server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        root = %config.storage.root_dir.display(),
        ttl_hours = config.storage.file_ttl_hours,
        workers = config.server.workers,
        "File store configured"
    );

    let qpdf = QpdfSecurity::new(config.security.qpdf_path.clone(), std::env::temp_dir());
    if !qpdf.is_available().await {
        tracing::warn!(
            "qpdf not found at '{}'; unlock and lock requests will fail",
            config.security.qpdf_path
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    let autostart = config.cleanup.autostart;

    let app_state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    if autostart {
        app_state.sweeper().start();
    }

    let app = routes::app(app_state.clone());

    tracing::info!("PDF Unlock server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app_state.sweeper().stop().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
