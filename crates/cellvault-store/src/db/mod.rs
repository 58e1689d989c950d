pub mod models;
mod cells;
mod pending;
mod schema;
mod versions;
mod workbooks;

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;

use crate::config::{StoreConfig, DEFAULT_BUSY_TIMEOUT};
use crate::error::{Result, StoreError};

/// Handle to the versioned workbook store.
///
/// Clones share one connection behind a mutex. Every mutating call holds the
/// lock for the length of a single SQLite transaction, so readers observe a
/// store either before or after a write, never part-way through.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) a store backed by a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path.as_ref(), DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open_with_timeout(&config.database_path, config.busy_timeout)
    }

    fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?, busy_timeout)
    }

    fn from_connection(conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` inside one write transaction; commit on `Ok`, roll back on `Err`
    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Decode a JSON text column
fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_connection() {
        let store = Store::open_in_memory().unwrap();
        let other = store.clone();
        store.create_or_update_workbook(Path::new("/tmp/shared.xlsx")).unwrap();
        assert!(other.get_workbook(Path::new("/tmp/shared.xlsx")).unwrap().is_some());
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("store.sqlite3");
        Store::open(&db).unwrap();
        assert!(db.exists());
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            database_path: dir.path().join("cfg.sqlite3"),
            busy_timeout: Duration::from_millis(250),
        };
        Store::from_config(&config).unwrap();
        assert!(config.database_path.exists());
    }
}
