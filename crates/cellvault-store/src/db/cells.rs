use cellvault_core::{json_hash, CellCoord, CellPayload};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{ChunkId, ChunkLocator, ChunkRecord, CellUpdate, UpdateReport, VersionId};
use super::versions::{find_version, refresh_snapshot};
use super::{json_column, Store};
use crate::error::{Result, StoreError};

const CHUNK_COLUMNS: &str = "id, version_id, chunk_index, sheet_name, start_row, end_row, \
                             payload, rollup_text, content_hash, modified";

impl Store {
    /// Merge cell deltas into a version in place.
    ///
    /// Each update lands in the chunk of its sheet whose row range contains
    /// the cell; updates with no such chunk (or a malformed address) are
    /// skipped and reported. The whole batch is one transaction.
    pub fn update_cells(&self, version_id: VersionId, updates: &[CellUpdate]) -> Result<UpdateReport> {
        self.write(|tx| {
            if find_version(tx, version_id)?.is_none() {
                return Err(StoreError::VersionNotFound(version_id));
            }

            let mut report = UpdateReport::default();
            for update in updates {
                if apply_update(tx, version_id, update)? {
                    report.applied += 1;
                } else {
                    report.skipped.push((update.sheet.clone(), update.address.clone()));
                }
            }

            if report.applied > 0 {
                refresh_snapshot(tx, version_id)?;
            }

            tracing::debug!(
                "Updated {} cells in version {} ({} skipped)",
                report.applied,
                version_id,
                report.skipped.len()
            );
            Ok(report)
        })
    }

    /// Payload of one cell, if the version has it
    pub fn get_cell(&self, version_id: VersionId, sheet: &str, address: &str) -> Result<Option<CellPayload>> {
        let address = CellCoord::from_a1(address)?.to_a1();
        let conn = self.lock()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM cells WHERE version_id = ?1 AND sheet_name = ?2 AND cell_address = ?3",
                params![version_id, sheet, address],
                |r| json_column(r, 0),
            )
            .optional()?;
        Ok(payload)
    }

    pub fn get_chunk(&self, version_id: VersionId, locator: &ChunkLocator) -> Result<Option<ChunkRecord>> {
        let conn = self.lock()?;
        match locator {
            ChunkLocator::Id(id) => {
                let chunk = conn
                    .query_row(
                        &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE version_id = ?1 AND id = ?2"),
                        params![version_id, id],
                        chunk_from_row,
                    )
                    .optional()?;
                Ok(chunk)
            }
            ChunkLocator::Row { sheet, row } => chunk_containing(&conn, version_id, sheet, *row),
        }
    }

    /// Every chunk of a version, optionally limited to one sheet
    pub fn get_all_chunks(&self, version_id: VersionId, sheet: Option<&str>) -> Result<Vec<ChunkRecord>> {
        let conn = self.lock()?;
        load_chunks(&conn, version_id, sheet)
    }
}

pub(super) fn load_chunks(conn: &Connection, version_id: VersionId, sheet: Option<&str>) -> Result<Vec<ChunkRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunks \
         WHERE version_id = ?1 AND (?2 IS NULL OR sheet_name = ?2) \
         ORDER BY sheet_name, start_row"
    ))?;
    let chunks = stmt
        .query_map(params![version_id, sheet], chunk_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(chunks)
}

fn chunk_containing(conn: &Connection, version_id: VersionId, sheet: &str, row: u32) -> Result<Option<ChunkRecord>> {
    let chunk = conn
        .query_row(
            &format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks \
                 WHERE version_id = ?1 AND sheet_name = ?2 AND start_row <= ?3 AND end_row >= ?3 \
                 LIMIT 1"
            ),
            params![version_id, sheet, row],
            chunk_from_row,
        )
        .optional()?;
    Ok(chunk)
}

/// Merge one delta into its chunk and cell row. Returns `false` when the update was skipped.
fn apply_update(conn: &Connection, version_id: VersionId, update: &CellUpdate) -> Result<bool> {
    let coord = match CellCoord::from_a1(&update.address) {
        Ok(coord) => coord,
        Err(e) => {
            tracing::warn!("Skipping update of {}!{}: {}", update.sheet, update.address, e);
            return Ok(false);
        }
    };

    let Some(mut chunk) = chunk_containing(conn, version_id, &update.sheet, coord.row)? else {
        tracing::warn!(
            "Skipping update of {}!{}: no chunk in version {} covers row {}",
            update.sheet,
            update.address,
            version_id,
            coord.row
        );
        return Ok(false);
    };

    let Some(merged) = chunk.payload.upsert(coord, &update.payload).cloned() else {
        return Ok(false);
    };

    conn.execute(
        "UPDATE chunks SET payload = ?1, rollup_text = ?2, content_hash = ?3, modified = 1 WHERE id = ?4",
        params![
            serde_json::to_string(&chunk.payload)?,
            chunk.payload.rollup_text(),
            chunk.payload.content_hash()?,
            chunk.id
        ],
    )?;
    upsert_cell_row(conn, version_id, chunk.id, &update.sheet, coord, &merged)?;

    Ok(true)
}

/// Insert or replace the cell row for `(version, sheet, address)`
pub(super) fn upsert_cell_row(
    conn: &Connection,
    version_id: VersionId,
    chunk_id: ChunkId,
    sheet: &str,
    coord: CellCoord,
    payload: &CellPayload,
) -> Result<()> {
    conn.execute(
        "INSERT INTO cells (version_id, chunk_id, sheet_name, cell_address, payload, content_hash) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT (version_id, sheet_name, cell_address) DO UPDATE SET \
           chunk_id = excluded.chunk_id, \
           payload = excluded.payload, \
           content_hash = excluded.content_hash",
        params![
            version_id,
            chunk_id,
            sheet,
            coord.to_a1(),
            serde_json::to_string(payload)?,
            json_hash(payload)?,
        ],
    )?;
    Ok(())
}

fn chunk_from_row(r: &Row<'_>) -> rusqlite::Result<ChunkRecord> {
    Ok(ChunkRecord {
        id: r.get(0)?,
        version_id: r.get(1)?,
        chunk_index: r.get(2)?,
        sheet_name: r.get(3)?,
        start_row: r.get(4)?,
        end_row: r.get(5)?,
        payload: json_column(r, 6)?,
        rollup_text: r.get(7)?,
        content_hash: r.get(8)?,
        modified: r.get(9)?,
    })
}
