use std::collections::BTreeSet;

use cellvault_core::Color;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::models::{EditStatus, PendingEditRecord};
use super::{json_column, Store};
use crate::error::{Result, StoreError};

const EDIT_COLUMNS: &str = "id, version_id, file_path, sheet_name, cell_address, original_state, \
                            proposed, intended_fill, created_at, status";

impl Store {
    pub fn insert_pending_edit(&self, edit: &PendingEditRecord) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO pending_edits ({EDIT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    edit.id.to_string(),
                    edit.version_id,
                    edit.file_path,
                    edit.sheet_name,
                    edit.cell_address,
                    serde_json::to_string(&edit.original_state)?,
                    serde_json::to_string(&edit.proposed)?,
                    edit.intended_fill.map(|c| c.to_hex()),
                    edit.created_at,
                    edit.status.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_pending_edit(&self, id: Uuid) -> Result<Option<PendingEditRecord>> {
        let conn = self.lock()?;
        find_edit(&conn, id)
    }

    /// Look up several edits; unknown ids are left out
    pub fn get_pending_edits(&self, ids: &[Uuid]) -> Result<Vec<PendingEditRecord>> {
        let conn = self.lock()?;
        let mut edits = Vec::with_capacity(ids.len());
        for id in unique(ids) {
            if let Some(edit) = find_edit(&conn, id)? {
                edits.push(edit);
            }
        }
        Ok(edits)
    }

    /// Move edits that are still pending to `status` in one transaction.
    ///
    /// Edits that are unknown or already accepted/rejected are left alone.
    /// Returns the edits that moved, carrying their new status.
    pub fn transition_pending_edits(&self, ids: &[Uuid], status: EditStatus) -> Result<Vec<PendingEditRecord>> {
        if status == EditStatus::Pending {
            return Err(StoreError::InvalidTransition(status.to_string()));
        }

        self.write(|tx| {
            let mut moved = Vec::new();
            for id in unique(ids) {
                let Some(mut edit) = find_edit(tx, id)? else {
                    tracing::debug!("Pending edit {} not found", id);
                    continue;
                };
                if edit.status != EditStatus::Pending {
                    tracing::debug!("Pending edit {} already {}", id, edit.status);
                    continue;
                }

                tx.execute(
                    "UPDATE pending_edits SET status = ?1 WHERE id = ?2 AND status = 'pending'",
                    params![status.as_str(), id.to_string()],
                )?;
                edit.status = status;
                moved.push(edit);
            }
            Ok(moved)
        })
    }
}

/// Ids in first-seen order without repeats
fn unique(ids: &[Uuid]) -> impl Iterator<Item = Uuid> + '_ {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(move |id| seen.insert(*id))
}

fn find_edit(conn: &Connection, id: Uuid) -> Result<Option<PendingEditRecord>> {
    let edit = conn
        .query_row(
            &format!("SELECT {EDIT_COLUMNS} FROM pending_edits WHERE id = ?1"),
            params![id.to_string()],
            edit_from_row,
        )
        .optional()?;
    Ok(edit)
}

fn edit_from_row(r: &Row<'_>) -> rusqlite::Result<PendingEditRecord> {
    let conversion = |idx: usize, message: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
    };

    let id: String = r.get(0)?;
    let fill: Option<String> = r.get(7)?;
    let status: String = r.get(9)?;

    Ok(PendingEditRecord {
        id: Uuid::parse_str(&id).map_err(|e| conversion(0, e.to_string()))?,
        version_id: r.get(1)?,
        file_path: r.get(2)?,
        sheet_name: r.get(3)?,
        cell_address: r.get(4)?,
        original_state: json_column(r, 5)?,
        proposed: json_column(r, 6)?,
        intended_fill: fill
            .map(|hex| Color::from_hex(&hex).ok_or_else(|| conversion(7, format!("bad color {hex}"))))
            .transpose()?,
        created_at: r.get(8)?,
        status: status.parse().map_err(|e| conversion(9, e))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellvault_core::CellPayload;
    use chrono::Utc;
    use serde_json::json;

    fn store_with_version() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let version = store
            .create_new_version("/tmp/cellvault-pending/book.xlsx", "initial", None)
            .unwrap();
        (store, version)
    }

    fn edit(version_id: i64) -> PendingEditRecord {
        PendingEditRecord {
            id: Uuid::new_v4(),
            version_id,
            file_path: "/tmp/cellvault-pending/book.xlsx".into(),
            sheet_name: "Sheet1".into(),
            cell_address: "A1".into(),
            original_state: json!({"value": 1.0}),
            proposed: CellPayload::value(2.0),
            intended_fill: Some(Color::rgb(0, 128, 255)),
            created_at: Utc::now(),
            status: EditStatus::Pending,
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let (store, version) = store_with_version();
        let record = edit(version);
        store.insert_pending_edit(&record).unwrap();

        let loaded = store.get_pending_edit(record.id).unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.proposed, record.proposed);
        assert_eq!(loaded.intended_fill, record.intended_fill);
        assert_eq!(loaded.original_state, record.original_state);
        assert_eq!(loaded.status, EditStatus::Pending);
    }

    #[test]
    fn test_transition_only_moves_pending() {
        let (store, version) = store_with_version();
        let first = edit(version);
        let second = edit(version);
        store.insert_pending_edit(&first).unwrap();
        store.insert_pending_edit(&second).unwrap();

        let moved = store
            .transition_pending_edits(&[first.id, first.id], EditStatus::Accepted)
            .unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].status, EditStatus::Accepted);

        let moved = store
            .transition_pending_edits(&[first.id, second.id, Uuid::new_v4()], EditStatus::Rejected)
            .unwrap();
        assert_eq!(moved.iter().map(|e| e.id).collect::<Vec<_>>(), vec![second.id]);

        let statuses: Vec<EditStatus> = store
            .get_pending_edits(&[first.id, second.id])
            .unwrap()
            .iter()
            .map(|e| e.status)
            .collect();
        assert_eq!(statuses, vec![EditStatus::Accepted, EditStatus::Rejected]);
    }

    #[test]
    fn test_transition_back_to_pending_is_rejected() {
        let (store, _) = store_with_version();
        assert!(matches!(
            store.transition_pending_edits(&[Uuid::new_v4()], EditStatus::Pending),
            Err(StoreError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_edit_requires_existing_version() {
        let (store, version) = store_with_version();
        assert!(store.insert_pending_edit(&edit(version + 7)).is_err());
    }
}
