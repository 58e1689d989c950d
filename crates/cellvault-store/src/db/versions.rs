use std::path::Path;

use cellvault_core::{CellCoord, ChunkPayload};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::cells::{load_chunks, upsert_cell_row};
use super::models::{VersionId, VersionRecord, VersionSnapshot, WorkbookId};
use super::workbooks::upsert_workbook;
use super::{json_column, Store};
use crate::error::{Result, StoreError};
use crate::extract::WorkbookExtract;
use crate::paths::path_key;

const VERSION_COLUMNS: &str =
    "v.id, v.workbook_id, v.version_number, v.change_description, v.created_at, v.updated_at";

impl Store {
    /// Create the next version of a workbook.
    ///
    /// If the workbook already has a version, the new one starts as an exact
    /// copy of the latest version's chunks, cells and snapshot, and `payload`
    /// is ignored. Otherwise the version is populated from `payload`, or left
    /// empty when there is none. Existing versions are never modified.
    pub fn create_new_version(
        &self,
        path: impl AsRef<Path>,
        description: &str,
        payload: Option<&WorkbookExtract>,
    ) -> Result<VersionId> {
        let path = path.as_ref();
        self.write(|tx| {
            let workbook_id = upsert_workbook(tx, path)?;
            let parent = latest_version(tx, workbook_id)?;
            let (version_id, number) = insert_version(tx, workbook_id, description)?;

            match (parent, payload) {
                (Some(parent), payload) => {
                    if payload.is_some() {
                        tracing::warn!(
                            "Ignoring extraction payload for {}: copying version {} instead",
                            path.display(),
                            parent.version_number
                        );
                    }
                    copy_version_contents(tx, parent.id, version_id)?;
                }
                (None, Some(extract)) => {
                    insert_extract(tx, version_id, extract)?;
                    refresh_snapshot(tx, version_id)?;
                }
                (None, None) => refresh_snapshot(tx, version_id)?,
            }

            tracing::info!(
                "Created version {} (id {}) of {}: {}",
                number,
                version_id,
                path.display(),
                description
            );
            Ok(version_id)
        })
    }

    /// Create the next version of a workbook directly from an extraction
    /// payload, regardless of earlier versions.
    pub fn record_extraction(
        &self,
        path: impl AsRef<Path>,
        description: &str,
        extract: &WorkbookExtract,
    ) -> Result<VersionId> {
        let path = path.as_ref();
        self.write(|tx| {
            let workbook_id = upsert_workbook(tx, path)?;
            let (version_id, number) = insert_version(tx, workbook_id, description)?;
            insert_extract(tx, version_id, extract)?;
            refresh_snapshot(tx, version_id)?;

            tracing::info!(
                "Recorded extraction of {} as version {} ({} chunks)",
                path.display(),
                number,
                extract.chunks.len()
            );
            Ok(version_id)
        })
    }

    pub fn get_latest_version(&self, path: impl AsRef<Path>) -> Result<Option<VersionRecord>> {
        let key = path_key(path.as_ref())?;
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM file_versions v \
                     JOIN workbooks w ON w.id = v.workbook_id \
                     WHERE w.file_path = ?1 ORDER BY v.version_number DESC LIMIT 1"
                ),
                params![key],
                version_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All versions of a workbook, oldest first
    pub fn list_versions(&self, path: impl AsRef<Path>) -> Result<Vec<VersionRecord>> {
        let key = path_key(path.as_ref())?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {VERSION_COLUMNS} FROM file_versions v \
             JOIN workbooks w ON w.id = v.workbook_id \
             WHERE w.file_path = ?1 ORDER BY v.version_number"
        ))?;
        let versions = stmt
            .query_map(params![key], version_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(versions)
    }

    pub fn get_version(&self, version_id: VersionId) -> Result<Option<VersionRecord>> {
        let conn = self.lock()?;
        find_version(&conn, version_id)
    }

    /// The consolidated per-sheet view of every cell in a version
    pub fn get_version_snapshot(&self, version_id: VersionId) -> Result<Option<VersionSnapshot>> {
        let conn = self.lock()?;
        let snapshot = conn
            .query_row(
                "SELECT consolidated_snapshot FROM file_versions \
                 WHERE id = ?1 AND consolidated_snapshot IS NOT NULL",
                params![version_id],
                |r| json_column(r, 0),
            )
            .optional()?;
        Ok(snapshot)
    }

    /// Store the serialized document a version was produced from
    pub fn attach_document(&self, version_id: VersionId, document: &[u8]) -> Result<()> {
        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE file_versions SET document = ?1, updated_at = ?2 WHERE id = ?3",
                params![document, Utc::now(), version_id],
            )?;
            if updated == 0 {
                return Err(StoreError::VersionNotFound(version_id));
            }
            Ok(())
        })
    }

    pub fn get_document(&self, version_id: VersionId) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let document = conn
            .query_row(
                "SELECT document FROM file_versions WHERE id = ?1",
                params![version_id],
                |r| r.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()?;
        Ok(document.flatten())
    }
}

pub(super) fn find_version(conn: &Connection, version_id: VersionId) -> Result<Option<VersionRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {VERSION_COLUMNS} FROM file_versions v WHERE v.id = ?1"),
            params![version_id],
            version_from_row,
        )
        .optional()?;
    Ok(record)
}

fn latest_version(conn: &Connection, workbook_id: WorkbookId) -> Result<Option<VersionRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {VERSION_COLUMNS} FROM file_versions v \
                 WHERE v.workbook_id = ?1 ORDER BY v.version_number DESC LIMIT 1"
            ),
            params![workbook_id],
            version_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Insert the next numbered version row; returns `(id, version_number)`
fn insert_version(conn: &Connection, workbook_id: WorkbookId, description: &str) -> Result<(VersionId, i64)> {
    let number: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM file_versions WHERE workbook_id = ?1",
        params![workbook_id],
        |r| r.get(0),
    )?;
    let now = Utc::now();
    conn.execute(
        "INSERT INTO file_versions (workbook_id, version_number, change_description, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![workbook_id, number, description, now],
    )?;
    Ok((conn.last_insert_rowid(), number))
}

/// Copy every chunk and cell row of `parent` into `child`, plus its snapshot
fn copy_version_contents(conn: &Connection, parent: VersionId, child: VersionId) -> Result<()> {
    let chunks = conn.execute(
        "INSERT INTO chunks (version_id, chunk_index, sheet_name, start_row, end_row, \
                             payload, rollup_text, content_hash, modified) \
         SELECT ?2, chunk_index, sheet_name, start_row, end_row, \
                payload, rollup_text, content_hash, modified \
         FROM chunks WHERE version_id = ?1 ORDER BY id",
        params![parent, child],
    )?;

    // Cells follow their chunk by (chunk_index, sheet_name), which is unique per version
    let cells = conn.execute(
        "INSERT INTO cells (version_id, chunk_id, sheet_name, cell_address, payload, content_hash) \
         SELECT ?2, nc.id, c.sheet_name, c.cell_address, c.payload, c.content_hash \
         FROM cells c \
         JOIN chunks oc ON oc.id = c.chunk_id \
         JOIN chunks nc ON nc.version_id = ?2 \
                       AND nc.chunk_index = oc.chunk_index \
                       AND nc.sheet_name = oc.sheet_name \
         WHERE c.version_id = ?1 ORDER BY c.id",
        params![parent, child],
    )?;

    conn.execute(
        "UPDATE file_versions \
         SET consolidated_snapshot = (SELECT consolidated_snapshot FROM file_versions WHERE id = ?1) \
         WHERE id = ?2",
        params![parent, child],
    )?;

    tracing::debug!(
        "Copied {} chunks and {} cells from version {} to {}",
        chunks,
        cells,
        parent,
        child
    );
    Ok(())
}

/// Persist the chunks and cells of an extraction payload under `version_id`
fn insert_extract(conn: &Connection, version_id: VersionId, extract: &WorkbookExtract) -> Result<()> {
    extract.validate().map_err(StoreError::InvalidPayload)?;

    for (position, chunk) in extract.chunks.iter().enumerate() {
        let payload = chunk.to_payload();
        let chunk_index = chunk.chunk_index.unwrap_or(position as i64);
        let chunk_id = insert_chunk(conn, version_id, chunk_index, &payload)?;

        for cell in payload.iter_cells() {
            let coord = CellCoord::from_a1(&cell.address)?;
            upsert_cell_row(conn, version_id, chunk_id, &payload.sheet, coord, &cell.payload)?;
        }
    }

    Ok(())
}

fn insert_chunk(conn: &Connection, version_id: VersionId, chunk_index: i64, payload: &ChunkPayload) -> Result<i64> {
    conn.execute(
        "INSERT INTO chunks (version_id, chunk_index, sheet_name, start_row, end_row, \
                             payload, rollup_text, content_hash, modified) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
        params![
            version_id,
            chunk_index,
            payload.sheet,
            payload.start_row,
            payload.end_row,
            serde_json::to_string(payload)?,
            payload.rollup_text(),
            payload.content_hash()?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Rebuild the consolidated snapshot of a version from its chunks
pub(super) fn refresh_snapshot(conn: &Connection, version_id: VersionId) -> Result<()> {
    let mut snapshot = VersionSnapshot::default();
    for chunk in load_chunks(conn, version_id, None)? {
        let sheet = snapshot.sheets.entry(chunk.sheet_name.clone()).or_default();
        for cell in chunk.payload.iter_cells() {
            let address = cell
                .coord()
                .map(|coord| coord.to_a1())
                .unwrap_or_else(|| cell.address.clone());
            sheet.insert(address, cell.payload.clone());
        }
    }

    conn.execute(
        "UPDATE file_versions SET consolidated_snapshot = ?1, updated_at = ?2 WHERE id = ?3",
        params![serde_json::to_string(&snapshot)?, Utc::now(), version_id],
    )?;
    Ok(())
}

fn version_from_row(r: &Row<'_>) -> rusqlite::Result<VersionRecord> {
    Ok(VersionRecord {
        id: r.get(0)?,
        workbook_id: r.get(1)?,
        version_number: r.get(2)?,
        change_description: r.get(3)?,
        created_at: r.get(4)?,
        updated_at: r.get(5)?,
    })
}
