//! API layer -- axum routes, handlers, and middleware.
//!
//! Request pipeline, outermost first:
//!
//! ```text
//! TraceLayer
//!  ├─ {UPLOADS_PATH}/**      ServeDir (own 404)
//!  └─ CatchPanicLayer
//!      └─ normalize_errors
//!          ├─ /api/v1.0/...  route units (+ id validator on `{id}` units)
//!          └─ fallback       404 "Not found"
//! ```

pub mod error;
pub mod loader;
pub mod routes;
pub mod state;
pub mod static_mount;
pub mod validate;

use axum::{middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use self::loader::{LoadedRoutes, MountTable};
use self::state::AppState;
use self::static_mount::StaticMount;
use crate::config::API_PREFIX;

/// The application under construction. Owned by the bootstrap sequence,
/// filled in step by step, then turned into a plain [`Router`].
pub struct Server {
    state: AppState,
    api: Router<AppState>,
    table: MountTable,
    uploads: Option<StaticMount>,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            api: Router::new(),
            table: MountTable::default(),
            uploads: None,
        }
    }

    pub fn mount_static(&mut self, mount: StaticMount) {
        self.uploads = Some(mount);
    }

    /// Nest loaded route units under the version prefix.
    pub fn mount_routes(&mut self, routes: LoadedRoutes) {
        let api = std::mem::take(&mut self.api);
        self.api = api.nest(API_PREFIX, routes.router);
        self.table = routes.table;
    }

    pub fn mount_table(&self) -> &MountTable {
        &self.table
    }

    /// Close the pipeline: fallback, error normalization, panic capture,
    /// static files, request tracing.
    pub fn into_router(self) -> (Router, MountTable) {
        let api = self
            .api
            .fallback(error::not_found)
            .layer(middleware::from_fn(error::normalize_errors))
            .layer(CatchPanicLayer::custom(error::panic_response));

        let mut app: Router<AppState> = Router::new();
        if let Some(uploads) = &self.uploads {
            info!(
                prefix = uploads.prefix(),
                root = %uploads.root().display(),
                "serving uploads"
            );
            app = uploads.attach(app);
        }
        let router = app
            .merge(api)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state);
        (router, self.table)
    }
}
