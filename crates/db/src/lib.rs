//! Database layer: SQLite pool construction, migrations, and the job
//! store repository.
//!
//! Each broker instance owns one SQLite file. That file is the durable
//! source of truth for job state; everything in-process (the push
//! subscriber map, the engine handle) is a cache or an optimization.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::SqlitePool;

/// Create a connection pool from a `sqlite:` database URL.
///
/// The database file is created if missing. WAL mode keeps the single
/// writer (the dispatch loop) from blocking readers (ingress handlers,
/// status checks); the busy timeout covers the brief windows where two
/// connections do contend.
///
/// In-memory URLs get a single-connection pool: every new connection to
/// `:memory:` opens a fresh empty database, so pooling would silently
/// split state.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let max_connections = if database_url.contains(":memory:") || database_url.contains("mode=memory")
    {
        1
    } else {
        5
    };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
