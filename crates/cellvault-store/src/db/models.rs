use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use cellvault_core::{CellPayload, ChunkPayload, Color};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkbookId = i64;
pub type VersionId = i64;
pub type ChunkId = i64;

/// A tracked workbook file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkbookRecord {
    pub id: WorkbookId,
    /// Normalized absolute path
    pub file_path: String,
    pub file_size: Option<i64>,
    /// SHA-256 of the file bytes at the last sighting
    pub content_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A numbered, immutable version of a workbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: VersionId,
    pub workbook_id: WorkbookId,
    pub version_number: i64,
    pub change_description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored chunk with its decoded payload
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub version_id: VersionId,
    pub chunk_index: i64,
    pub sheet_name: String,
    pub start_row: u32,
    pub end_row: u32,
    pub payload: ChunkPayload,
    pub rollup_text: String,
    pub content_hash: String,
    /// Set once any cell in the chunk has been updated since extraction
    pub modified: bool,
}

/// How to find a chunk within a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkLocator {
    Id(ChunkId),
    /// The chunk of `sheet` whose row range contains `row`
    Row { sheet: String, row: u32 },
}

/// One cell delta for [`crate::Store::update_cells`]
#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    pub sheet: String,
    pub address: String,
    pub payload: CellPayload,
}

impl CellUpdate {
    pub fn new(sheet: impl Into<String>, address: impl Into<String>, payload: CellPayload) -> Self {
        Self {
            sheet: sheet.into(),
            address: address.into(),
            payload,
        }
    }
}

/// Outcome of a batch of cell updates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Updates that landed in a chunk
    pub applied: usize,
    /// `(sheet, address)` of updates with no containing chunk or a malformed address
    pub skipped: Vec<(String, String)>,
}

impl UpdateReport {
    pub fn all_applied(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Every cell of a version keyed by sheet then normalized A1 address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub sheets: BTreeMap<String, BTreeMap<String, CellPayload>>,
}

impl VersionSnapshot {
    pub fn cell(&self, sheet: &str, address: &str) -> Option<&CellPayload> {
        self.sheets.get(sheet)?.get(address)
    }

    pub fn cell_count(&self) -> usize {
        self.sheets.values().map(BTreeMap::len).sum()
    }
}

/// Lifecycle state of a pending edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditStatus {
    Pending,
    Accepted,
    Rejected,
}

impl EditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditStatus::Pending => "pending",
            EditStatus::Accepted => "accepted",
            EditStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for EditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EditStatus::Pending),
            "accepted" => Ok(EditStatus::Accepted),
            "rejected" => Ok(EditStatus::Rejected),
            other => Err(format!("Unknown edit status: {}", other)),
        }
    }
}

/// A proposed change applied to a live document but not yet committed
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEditRecord {
    pub id: Uuid,
    pub version_id: VersionId,
    pub file_path: String,
    pub sheet_name: String,
    pub cell_address: String,
    /// Live cell state captured before the edit, opaque to the store
    pub original_state: serde_json::Value,
    pub proposed: CellPayload,
    /// Fill the proposal asks for, restored in place of the pending highlight on accept
    pub intended_fill: Option<Color>,
    pub created_at: DateTime<Utc>,
    pub status: EditStatus,
}
