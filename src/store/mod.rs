// src/store/mod.rs

//! SQLite-backed entity store.
//!
//! One connection behind a mutex. Every public method takes the lock for a
//! single short statement or transaction, so each record write is atomic;
//! nothing coordinates across calls. Callers must not hold results across
//! an expectation that other records stayed unchanged.
//!
//! The per-entity operations live in the submodules:
//! - [`runs`], [`files`], [`duties`], [`sheets`] for the records themselves,
//! - [`tags`] for the shared tag-association service.

mod duties;
mod files;
mod runs;
mod schema;
mod sheets;
mod tags;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Transaction};
use tracing::debug;

use crate::errors::{Result, RunwardenError};
use crate::types::Status;

pub struct Store {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        debug!(db = ?path, "opened entity store");
        Self::bootstrap(conn)
    }

    /// Private in-memory database, used by tests and `--dry-run`.
    pub fn in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RunwardenError::Other(anyhow!("entity store lock poisoned")))
    }

    /// Run `f` against the connection while holding the store lock.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.lock()?;
        Ok(f(&conn)?)
    }

    /// Run `f` inside one transaction; it commits only if `f` returns `Ok`.
    pub(crate) fn with_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

pub(crate) fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn opt_path(value: Option<String>) -> Option<PathBuf> {
    value.map(PathBuf::from)
}

/// SQL `IN (...)` placeholder list for `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_file_database_and_reopens_with_existing_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("runwarden.db");
        {
            let store = Store::open(&db).unwrap();
            store
                .get_or_create_run(Path::new("/data/E/S/R"), "R", chrono::Utc::now())
                .unwrap();
        }
        let store = Store::open(&db).unwrap();
        assert_eq!(store.all_runs().unwrap().len(), 1);
    }

    #[test]
    fn placeholder_list_matches_count() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }
}
