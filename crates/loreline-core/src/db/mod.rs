//! SQLite graph-store utilities.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` to allow concurrent readers while a writer commits
//! - `busy_timeout = 5s` to reduce transient lock failures under contention
//! - `foreign_keys = ON` so edge tables cannot reference missing entities
//!
//! The target database is an explicit parameter everywhere: [`open_store`]
//! takes the database name and every engine call takes the resulting
//! connection. There is no ambient "current database" state.

pub mod fts;
pub mod migrations;
pub mod query;
pub mod schema;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, Transaction};
use std::{path::Path, time::Duration};

use crate::error::EngineError;

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the named graph database under `root`, apply runtime
/// pragmas, and migrate schema to the latest version.
///
/// `database` is a bare name, not a path; one SQLite file per world keeps
/// tenants fully isolated.
///
/// # Errors
///
/// Returns an error if the name is empty or contains path separators, or if
/// opening/configuring/migrating the database fails.
pub fn open_store(root: &Path, database: &str) -> Result<Connection> {
    if database.trim().is_empty() {
        bail!("database name must not be empty");
    }
    if database.contains(['/', '\\']) || database.contains("..") {
        bail!("database name '{database}' must not contain path separators");
    }

    std::fs::create_dir_all(root)
        .with_context(|| format!("create store directory {}", root.display()))?;

    let path = root.join(format!("{database}.sqlite3"));
    let mut conn = Connection::open(&path)
        .with_context(|| format!("open graph database {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    Ok(conn)
}

/// Open a fully migrated in-memory store. Used by tests and ephemeral tooling.
///
/// # Errors
///
/// Returns an error if opening or migrating the database fails.
pub fn open_memory_store() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Run `f` inside one scoped store transaction.
///
/// The transaction commits only when `f` returns `Ok`; any error path drops
/// the transaction, which rolls it back. This is the engine's only
/// concurrency primitive: guard checks and mutations made through the
/// provided [`Transaction`] are serialized by SQLite's isolation.
///
/// # Errors
///
/// Returns `f`'s error unchanged, or [`EngineError::Storage`] if the
/// transaction itself cannot be started or committed.
pub fn with_transaction<T, F>(conn: &mut Connection, f: F) -> Result<T, EngineError>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, EngineError>,
{
    let tx = conn
        .transaction()
        .map_err(|e| EngineError::Storage(anyhow::Error::new(e).context("begin transaction")))?;

    let value = f(&tx)?;

    tx.commit()
        .map_err(|e| EngineError::Storage(anyhow::Error::new(e).context("commit transaction")))?;

    Ok(value)
}
