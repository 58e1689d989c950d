//! Propose, accept and reject cell edits.
//!
//! An edit is shown in the live session straight away, with the cell painted
//! in the pending fill, and recorded as `pending`. Accepting a batch forks a
//! new store version per source version and writes the proposed payloads into
//! it. Rejecting puts the live cells back exactly as they were and never
//! touches the store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use cellvault_core::{CellCoord, CellPayload};
use cellvault_store::{
    normalize_path, CellUpdate, EditStatus, PendingEditRecord, Store, StoreError, UpdateReport,
    VersionId,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::PendingEditConfig;
use crate::error::{EditError, Result, SessionError};
use crate::session::{LiveSession, SessionManager, SharedSession};
use crate::snapshot::OriginalState;

pub type EditId = Uuid;

/// Result of [`PendingEditManager::accept`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcceptOutcome {
    pub success: bool,
    pub accepted_count: usize,
    pub failed_ids: Vec<EditId>,
    /// Versions created to hold the accepted edits
    pub accepted_version_ids: Vec<VersionId>,
}

/// Result of [`PendingEditManager::reject`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RejectOutcome {
    pub success: bool,
    pub rejected_count: usize,
    pub failed_ids: Vec<EditId>,
}

/// Accepted edits of one source version, waiting to be committed
struct VersionBatch {
    file_path: String,
    edits: Vec<(EditId, CellUpdate)>,
}

pub struct PendingEditManager {
    store: Store,
    sessions: Arc<dyn SessionManager>,
    config: PendingEditConfig,
}

impl PendingEditManager {
    pub fn new(store: Store, sessions: Arc<dyn SessionManager>) -> Self {
        Self {
            store,
            sessions,
            config: PendingEditConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PendingEditConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Show `cell_data` in the live cell and record it as a pending edit.
    ///
    /// `version_id` must be a version of the workbook at `file_path`. The
    /// cell's state is captured before anything changes. If the edit cannot
    /// be shown or recorded, the cell is put back before the error is
    /// returned.
    pub fn apply(
        &self,
        session: &mut dyn LiveSession,
        sheet: &str,
        address: &str,
        cell_data: &CellPayload,
        version_id: VersionId,
        file_path: &Path,
    ) -> Result<EditId> {
        let address = CellCoord::from_a1(address)?.to_a1();
        let file_path = normalize_path(file_path)?.to_string_lossy().into_owned();
        self.check_version(version_id, &file_path)?;

        let original = OriginalState::capture(session, sheet, &address)?;
        let original_json = serde_json::to_value(&original)?;

        if let Err(e) = self.show_edit(session, sheet, &address, cell_data) {
            roll_back(session, sheet, &address, &original);
            return Err(e.into());
        }

        let record = PendingEditRecord {
            id: Uuid::new_v4(),
            version_id,
            file_path,
            sheet_name: sheet.to_string(),
            cell_address: address.clone(),
            original_state: original_json,
            proposed: cell_data.clone(),
            intended_fill: cell_data.fill,
            created_at: Utc::now(),
            status: EditStatus::Pending,
        };

        if let Err(e) = self.store.insert_pending_edit(&record) {
            tracing::warn!("Failed to record edit of {}!{}: {}", sheet, address, e);
            roll_back(session, sheet, &address, &original);
            return Err(e.into());
        }

        tracing::info!(
            "Pending edit {} on {}!{} (version {})",
            record.id,
            sheet,
            address,
            version_id
        );
        Ok(record.id)
    }

    /// [`apply`](Self::apply) against the shared session of `file_path`
    pub fn propose(
        &self,
        file_path: &Path,
        sheet: &str,
        address: &str,
        cell_data: &CellPayload,
        version_id: VersionId,
    ) -> Result<EditId> {
        let shared = self.sessions.session(file_path)?;
        let mut session = shared.lock().map_err(|_| SessionError::Poisoned)?;
        self.apply(&mut *session, sheet, address, cell_data, version_id, file_path)
    }

    /// Commit pending edits into new store versions.
    ///
    /// Ids that are unknown or no longer pending are ignored. A cell whose
    /// final fill cannot be set, or whose update does not land in the store,
    /// is reported in `failed_ids`; the rest of the batch goes ahead.
    pub fn accept(&self, ids: &[EditId]) -> Result<AcceptOutcome> {
        let candidates = self.pending(ids)?;
        let sessions = self.sessions_for(&candidates)?;
        let moved = self.store.transition_pending_edits(&edit_ids(&candidates), EditStatus::Accepted)?;

        let mut failed_ids = Vec::new();
        let mut batches: BTreeMap<VersionId, VersionBatch> = BTreeMap::new();

        for edit in &moved {
            if let Err(e) = self.finalize_fill(&sessions, edit) {
                tracing::warn!(
                    "Failed to apply final fill of {}!{} for edit {}: {}",
                    edit.sheet_name,
                    edit.cell_address,
                    edit.id,
                    e
                );
                failed_ids.push(edit.id);
                continue;
            }

            batches
                .entry(edit.version_id)
                .or_insert_with(|| VersionBatch {
                    file_path: edit.file_path.clone(),
                    edits: Vec::new(),
                })
                .edits
                .push((
                    edit.id,
                    CellUpdate::new(
                        edit.sheet_name.clone(),
                        edit.cell_address.clone(),
                        edit.proposed.clone(),
                    ),
                ));
        }

        let mut accepted_version_ids = Vec::new();
        for (source_version, batch) in batches {
            match self.commit(source_version, &batch) {
                Ok((version_id, report)) => {
                    accepted_version_ids.push(version_id);
                    for (sheet, address) in &report.skipped {
                        failed_ids.extend(
                            batch
                                .edits
                                .iter()
                                .filter(|(_, u)| &u.sheet == sheet && &u.address == address)
                                .map(|(id, _)| *id),
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to commit {} edits from version {}: {}",
                        batch.edits.len(),
                        source_version,
                        e
                    );
                    failed_ids.extend(batch.edits.iter().map(|(id, _)| *id));
                }
            }
        }

        let mut seen = BTreeSet::new();
        failed_ids.retain(|id| seen.insert(*id));

        let accepted_count = moved.len() - failed_ids.len();
        tracing::info!(
            "Accepted {} edits into {} versions ({} failed)",
            accepted_count,
            accepted_version_ids.len(),
            failed_ids.len()
        );

        Ok(AcceptOutcome {
            success: failed_ids.is_empty(),
            accepted_count,
            failed_ids,
            accepted_version_ids,
        })
    }

    /// Discard pending edits and put their live cells back. The store keeps no trace of them.
    pub fn reject(&self, ids: &[EditId]) -> Result<RejectOutcome> {
        let candidates = self.pending(ids)?;
        let sessions = self.sessions_for(&candidates)?;
        let moved = self.store.transition_pending_edits(&edit_ids(&candidates), EditStatus::Rejected)?;

        let mut failed_ids = Vec::new();
        for edit in &moved {
            if let Err(e) = restore_edit(&sessions, edit) {
                tracing::warn!(
                    "Failed to restore {}!{} for edit {}: {}",
                    edit.sheet_name,
                    edit.cell_address,
                    edit.id,
                    e
                );
                failed_ids.push(edit.id);
            }
        }

        let rejected_count = moved.len() - failed_ids.len();
        tracing::info!("Rejected {} edits ({} failed)", rejected_count, failed_ids.len());

        Ok(RejectOutcome {
            success: failed_ids.is_empty(),
            rejected_count,
            failed_ids,
        })
    }

    fn check_version(&self, version_id: VersionId, file_path: &str) -> Result<()> {
        let version = self
            .store
            .get_version(version_id)?
            .ok_or(StoreError::VersionNotFound(version_id))?;
        let workbook = self.store.get_workbook(file_path)?;
        if workbook.map(|w| w.id) != Some(version.workbook_id) {
            return Err(EditError::VersionMismatch {
                version_id,
                file_path: file_path.to_string(),
            });
        }
        Ok(())
    }

    /// Write the proposed payload into the live cell and paint the pending fill
    fn show_edit(
        &self,
        session: &mut dyn LiveSession,
        sheet: &str,
        address: &str,
        cell_data: &CellPayload,
    ) -> std::result::Result<(), SessionError> {
        if let Some(value) = &cell_data.value {
            session.set_value(sheet, address, Some(value.clone()))?;
        }
        if let Some(formula) = cell_data.formula_text() {
            session.set_formula(sheet, address, Some(formula.to_string()))?;
        }
        if let Some(format) = &cell_data.number_format {
            session.set_number_format(sheet, address, Some(format.clone()))?;
        }
        if let Some(font) = &cell_data.font {
            let mut merged = session.font(sheet, address)?;
            merged.merge(font);
            session.set_font(sheet, address, merged)?;
        }
        if let Some(fill) = self.config.pending_fill.or(cell_data.fill) {
            session.set_fill(sheet, address, Some(fill))?;
        }
        Ok(())
    }

    /// Replace the pending highlight with the intended fill, else the original one
    fn finalize_fill(&self, sessions: &BTreeMap<String, SharedSession>, edit: &PendingEditRecord) -> Result<()> {
        let original: OriginalState = serde_json::from_value(edit.original_state.clone())?;
        let fill = edit.intended_fill.or(original.fill);

        let shared = session_of(sessions, edit)?;
        let mut session = shared.lock().map_err(|_| SessionError::Poisoned)?;
        session.set_fill(&edit.sheet_name, &edit.cell_address, fill)?;
        Ok(())
    }

    /// Fork a new version of the batch's workbook and write the edits into it
    fn commit(&self, source_version: VersionId, batch: &VersionBatch) -> Result<(VersionId, UpdateReport)> {
        let description = format!(
            "Accepted {} edit(s) proposed against version {}",
            batch.edits.len(),
            source_version
        );
        let version_id = self
            .store
            .create_new_version(&batch.file_path, &description, None)?;

        let updates: Vec<CellUpdate> = batch.edits.iter().map(|(_, u)| u.clone()).collect();
        let report = self.store.update_cells(version_id, &updates)?;
        Ok((version_id, report))
    }

    /// The still-pending edits among `ids`
    fn pending(&self, ids: &[EditId]) -> Result<Vec<PendingEditRecord>> {
        let mut edits = self.store.get_pending_edits(ids)?;
        edits.retain(|edit| {
            let pending = edit.status == EditStatus::Pending;
            if !pending {
                tracing::debug!("Edit {} already {}", edit.id, edit.status);
            }
            pending
        });
        Ok(edits)
    }

    /// Open every session the edits need before any state changes
    fn sessions_for(&self, edits: &[PendingEditRecord]) -> Result<BTreeMap<String, SharedSession>> {
        let mut sessions = BTreeMap::new();
        for edit in edits {
            if !sessions.contains_key(&edit.file_path) {
                let session = self.sessions.session(Path::new(&edit.file_path))?;
                sessions.insert(edit.file_path.clone(), session);
            }
        }
        Ok(sessions)
    }
}

fn edit_ids(edits: &[PendingEditRecord]) -> Vec<EditId> {
    edits.iter().map(|edit| edit.id).collect()
}

fn session_of<'a>(
    sessions: &'a BTreeMap<String, SharedSession>,
    edit: &PendingEditRecord,
) -> std::result::Result<&'a SharedSession, SessionError> {
    sessions
        .get(&edit.file_path)
        .ok_or_else(|| SessionError::Unavailable(edit.file_path.clone()))
}

fn restore_edit(sessions: &BTreeMap<String, SharedSession>, edit: &PendingEditRecord) -> Result<()> {
    let original: OriginalState = serde_json::from_value(edit.original_state.clone())?;
    let shared = session_of(sessions, edit)?;
    let mut session = shared.lock().map_err(|_| SessionError::Poisoned)?;
    original.restore(&mut *session, &edit.sheet_name, &edit.cell_address)?;
    Ok(())
}

/// Best-effort restore after a failed apply; the original error is what gets reported
fn roll_back(session: &mut dyn LiveSession, sheet: &str, address: &str, original: &OriginalState) {
    if let Err(e) = original.restore(session, sheet, address) {
        tracing::error!("Failed to roll back {}!{}: {}", sheet, address, e);
    }
}
