//! shelf-server: HTTP content-delivery server.
//!
//! Ties the shelf-* crates into a running server:
//!
//! - Axum-based HTTP API for bitstream content and metadata
//! - Byte-range and conditional-request negotiation
//! - Usage telemetry with a recent-events endpoint
//! - Graceful shutdown via signal handling

pub mod citation;
pub mod context;
pub mod error;
pub mod middleware;
pub mod range;
pub mod repository;
pub mod resolver;
pub mod router;
pub mod routes;
pub mod sender;
pub mod session;
pub mod source;
pub mod telemetry;

use std::net::SocketAddr;

use shelf_core::config::Config;

use crate::context::AppContext;

/// Start the shelf server.
///
/// Initializes the database and asset store, constructs the
/// [`AppContext`], and serves HTTP until a shutdown signal arrives.
pub async fn start(config: Config) -> shelf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy();
    let db = shelf_db::init_pool(&db_str)?;
    if existed {
        tracing::info!("Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }

    if !config.server.assetstore.exists() {
        std::fs::create_dir_all(&config.server.assetstore)?;
        tracing::info!(
            "Created assetstore directory {}",
            config.server.assetstore.display()
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| shelf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, db);
    let app = router::build_router(ctx);

    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| shelf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| shelf_core::Error::Internal(format!("Server error: {e}")))?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
