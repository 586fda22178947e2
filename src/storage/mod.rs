//! SQLite storage layer -- connection pool, schema, toy queries.
//!
//! This is the persistence collaborator the HTTP core depends on. The core
//! only needs [`connect`] to succeed before routes are loaded.

pub mod schema;
pub mod toys;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

const POOL_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the SQLite database and return a migrated connection pool.
///
/// The file is probed with a direct connection first so an unreachable path
/// fails immediately instead of after the pool's connection timeout.
pub fn connect(path: &Path) -> Result<Pool> {
    let probe = rusqlite::Connection::open(path)
        .with_context(|| format!("cannot open database file {}", path.display()))?;
    ping_conn(&probe)?;
    drop(probe);

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::builder()
        .connection_timeout(POOL_CONNECT_TIMEOUT)
        .build(manager)
        .context("failed to build connection pool")?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Check that a pooled connection answers a trivial query.
pub fn ping(pool: &Pool) -> Result<()> {
    let conn = pool.get()?;
    ping_conn(&conn)
}

fn ping_conn(conn: &rusqlite::Connection) -> Result<()> {
    let one: i64 = conn
        .query_row("SELECT 1", [], |row| row.get(0))
        .context("database did not answer ping")?;
    anyhow::ensure!(one == 1, "unexpected ping result {one}");
    Ok(())
}
