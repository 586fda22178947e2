//! Toyshop -- HTTP service bootstrap for the toy shop API.
//!
//! This crate wires the pieces every request goes through: versioned route
//! units with identifier validation, the uploads file server, and a single
//! error normalization point. Startup is an ordered sequence (database,
//! routes, listener) that refuses to listen on any failure.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod storage;

use crate::bootstrap::Bootstrap;
use crate::config::ServerConfig;
use crate::error::StartupError;

/// Boot the service with the built-in route units and serve until Ctrl-C or
/// SIGTERM.
pub async fn serve(config: ServerConfig) -> Result<(), StartupError> {
    let running = Bootstrap::new(config, api::routes::registry())
        .start()
        .await?;
    running.serve(shutdown_signal()).await
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
