use std::sync::Arc;

use crate::api::error::ApiError;
use crate::config::ServerConfig;
use crate::storage::Pool;

/// Read-only state shared by every request after startup.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(pool: Pool, config: ServerConfig) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }

    /// Run a blocking storage call off the async workers.
    pub async fn with_pool<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Pool) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let value = tokio::task::spawn_blocking(move || f(&pool)).await??;
        Ok(value)
    }
}
