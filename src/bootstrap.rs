//! Startup sequencing.
//!
//! ```text
//! INIT → DB_CONNECTING → DB_CONNECTED → ROUTES_LOADING → ROUTES_LOADED → LISTENING
//!   └──────────────┴──────────────┴──────────────┴──────────────┴──→ FAILED
//! ```
//!
//! Each step completes before the next starts. The listener is bound only
//! after the database answered and every route unit loaded; any failure moves
//! to `FAILED` and the socket is never opened.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::api::loader::{load_routes, MountTable, RouteRegistry};
use crate::api::state::AppState;
use crate::api::static_mount::StaticMount;
use crate::api::validate::IdValidator;
use crate::api::Server;
use crate::config::ServerConfig;
use crate::error::StartupError;
use crate::storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    DbConnecting,
    DbConnected,
    RoutesLoading,
    RoutesLoaded,
    Listening,
    Failed,
}

impl Phase {
    /// The only phase reachable on success, if any.
    pub fn successor(self) -> Option<Phase> {
        match self {
            Phase::Init => Some(Phase::DbConnecting),
            Phase::DbConnecting => Some(Phase::DbConnected),
            Phase::DbConnected => Some(Phase::RoutesLoading),
            Phase::RoutesLoading => Some(Phase::RoutesLoaded),
            Phase::RoutesLoaded => Some(Phase::Listening),
            Phase::Listening | Phase::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Listening | Phase::Failed)
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        if next == Phase::Failed {
            return !self.is_terminal();
        }
        self.successor() == Some(next)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "INIT",
            Phase::DbConnecting => "DB_CONNECTING",
            Phase::DbConnected => "DB_CONNECTED",
            Phase::RoutesLoading => "ROUTES_LOADING",
            Phase::RoutesLoaded => "ROUTES_LOADED",
            Phase::Listening => "LISTENING",
            Phase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

pub struct Bootstrap {
    config: ServerConfig,
    registry: RouteRegistry,
    phase: watch::Sender<Phase>,
}

impl Bootstrap {
    pub fn new(config: ServerConfig, registry: RouteRegistry) -> Self {
        let (phase, _) = watch::channel(Phase::Init);
        Self {
            config,
            registry,
            phase,
        }
    }

    /// Observe phase changes, including the final `FAILED`.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn advance(&self, next: Phase) {
        let current = self.phase();
        debug_assert!(
            current.can_transition_to(next),
            "illegal bootstrap transition {current} -> {next}"
        );
        self.phase.send_replace(next);
        info!(from = %current, to = %next, "bootstrap phase");
    }

    /// Run the sequence up to `LISTENING`. On error the phase is `FAILED`
    /// and nothing is listening.
    pub async fn start(self) -> Result<Running, StartupError> {
        match self.run_sequence().await {
            Ok((listener, router, table)) => {
                self.advance(Phase::Listening);
                Ok(Running {
                    listener,
                    router,
                    table,
                    phase: self.phase,
                })
            }
            Err(err) => {
                error!(phase = %self.phase(), error = %err, "startup failed");
                self.advance(Phase::Failed);
                Err(err)
            }
        }
    }

    async fn run_sequence(&self) -> Result<(TcpListener, Router, MountTable), StartupError> {
        let uploads = StaticMount::prepare(&self.config.uploads)?;

        self.advance(Phase::DbConnecting);
        let db_path = self.config.database_path.clone();
        let pool = tokio::task::spawn_blocking({
            let db_path = db_path.clone();
            move || storage::connect(&db_path)
        })
        .await
        .map_err(|e| StartupError::Database {
            path: db_path.clone(),
            source: e.into(),
        })?
        .map_err(|source| StartupError::Database {
            path: db_path.clone(),
            source,
        })?;
        info!(path = %db_path.display(), "database connected");
        self.advance(Phase::DbConnected);

        self.advance(Phase::RoutesLoading);
        let validator = IdValidator::for_kind(self.config.id_format);
        let routes = load_routes(&self.registry, &validator)?;
        self.advance(Phase::RoutesLoaded);

        let mut server = Server::new(AppState::new(pool, self.config.clone()));
        server.mount_static(uploads);
        server.mount_routes(routes);
        let (router, table) = server.into_router();

        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        Ok((listener, router, table))
    }
}

/// A bound, fully wired server that has not started accepting yet.
pub struct Running {
    listener: TcpListener,
    router: Router,
    table: MountTable,
    phase: watch::Sender<Phase>,
}

impl Running {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn mount_table(&self) -> &MountTable {
        &self.table
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, routes = self.table.len(), "toyshop listening");
        }
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(StartupError::Serve)?;
        info!("server stopped");
        Ok(())
    }
}
