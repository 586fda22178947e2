//! Read-only file serving for uploaded toy pictures.
//!
//! `tower_http::services::ServeDir` does the serving and keeps requests inside
//! the root. A missing file is answered with its own 404; that response is
//! final and does not go through the error normalizer.

use std::path::{Path, PathBuf};

use axum::Router;
use tower_http::services::ServeDir;
use tracing::info;

use crate::config::StaticMountConfig;
use crate::error::StartupError;

/// A verified uploads directory, ready to be mounted.
#[derive(Debug, Clone)]
pub struct StaticMount {
    prefix: String,
    root: PathBuf,
}

impl StaticMount {
    /// Check that the configured root is an existing, readable directory.
    pub fn prepare(config: &StaticMountConfig) -> Result<Self, StartupError> {
        let root = &config.disk_root;
        let unusable = |reason: String| StartupError::StaticMount {
            path: root.clone(),
            reason,
        };

        let metadata = std::fs::metadata(root).map_err(|e| unusable(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(unusable("not a directory".to_string()));
        }
        std::fs::read_dir(root).map_err(|e| unusable(format!("not readable: {e}")))?;
        let root = root.canonicalize().map_err(|e| unusable(e.to_string()))?;

        info!(prefix = %config.public_prefix, root = %root.display(), "static mount ready");
        Ok(Self {
            prefix: config.public_prefix.clone(),
            root,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Nest the file server under the public prefix.
    pub fn attach<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.nest_service(&self.prefix, ServeDir::new(&self.root))
    }
}
