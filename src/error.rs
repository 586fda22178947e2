//! Fatal startup failures. None of these are HTTP-visible; any of them aborts
//! the boot sequence and the process exits non-zero.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::api::loader::RouteLoadError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    #[error("database unavailable at {}: {source:#}", path.display())]
    Database {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    RouteLoad(#[from] RouteLoadError),

    #[error("uploads directory {} is not usable: {reason}", path.display())]
    StaticMount { path: PathBuf, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server terminated: {0}")]
    Serve(#[source] std::io::Error),
}
