use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{WorkbookId, WorkbookRecord};
use super::Store;
use crate::error::Result;
use crate::paths::{normalize_path, path_key, FileFingerprint};

const WORKBOOK_COLUMNS: &str = "id, file_path, file_size, content_hash, created_at, updated_at";

impl Store {
    /// Register a workbook, or refresh its size and hash if the file changed.
    ///
    /// Returns the workbook id. The file does not have to exist; when it does,
    /// its SHA-256 and size are recorded.
    pub fn create_or_update_workbook(&self, path: impl AsRef<Path>) -> Result<WorkbookId> {
        let path = path.as_ref();
        self.write(|tx| upsert_workbook(tx, path))
    }

    /// Look up a workbook by path
    pub fn get_workbook(&self, path: impl AsRef<Path>) -> Result<Option<WorkbookRecord>> {
        let key = path_key(path.as_ref())?;
        let conn = self.lock()?;
        find_workbook(&conn, &key)
    }
}

pub(super) fn find_workbook(conn: &Connection, key: &str) -> Result<Option<WorkbookRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {WORKBOOK_COLUMNS} FROM workbooks WHERE file_path = ?1"),
            params![key],
            workbook_from_row,
        )
        .optional()?;
    Ok(record)
}

pub(super) fn upsert_workbook(conn: &Connection, path: &Path) -> Result<WorkbookId> {
    let normalized = normalize_path(path)?;
    let key = path_key(&normalized)?;
    let fingerprint = FileFingerprint::read(&normalized)?;
    let now = Utc::now();

    let Some(existing) = find_workbook(conn, &key)? else {
        conn.execute(
            "INSERT INTO workbooks (file_path, file_size, content_hash, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                key,
                fingerprint.as_ref().map(|f| f.size as i64),
                fingerprint.as_ref().map(|f| f.hash.as_str()),
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!("Registered workbook {} as {}", key, id);
        return Ok(id);
    };

    if let Some(fingerprint) = fingerprint {
        if existing.content_hash.as_deref() != Some(fingerprint.hash.as_str())
            || existing.file_size != Some(fingerprint.size as i64)
        {
            conn.execute(
                "UPDATE workbooks SET file_size = ?1, content_hash = ?2, updated_at = ?3 WHERE id = ?4",
                params![fingerprint.size as i64, fingerprint.hash, now, existing.id],
            )?;
            tracing::debug!("Workbook {} changed on disk", key);
        }
    }

    Ok(existing.id)
}

fn workbook_from_row(r: &Row<'_>) -> rusqlite::Result<WorkbookRecord> {
    Ok(WorkbookRecord {
        id: r.get(0)?,
        file_path: r.get(1)?,
        file_size: r.get(2)?,
        content_hash: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}
