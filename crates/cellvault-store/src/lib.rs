//! Versioned storage of workbook cells.
//!
//! A workbook file is tracked by its normalized path. Each extraction or
//! accepted edit batch produces a new numbered version; a version holds the
//! workbook's cells grouped into row-range chunks. New versions fork from
//! the latest one as a full copy, so earlier versions never change.

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod paths;

pub use config::StoreConfig;
pub use db::models::{
    CellUpdate, ChunkId, ChunkLocator, ChunkRecord, EditStatus, PendingEditRecord, UpdateReport,
    VersionId, VersionRecord, VersionSnapshot, WorkbookId, WorkbookRecord,
};
pub use db::Store;
pub use error::{Result, StoreError};
pub use extract::{annotate_dependencies, ExtractChunk, Extractor, JsonExtractor, WorkbookExtract};
pub use ingest::ExtractOutcome;
pub use paths::{normalize_path, FileFingerprint};
