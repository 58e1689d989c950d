use cellvault_core::AddressError;
use cellvault_store::{StoreError, VersionId};
use thiserror::Error;

/// Errors raised by a live document session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Invalid cell address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Session unavailable: {0}")]
    Unavailable(String),

    #[error("Session lock poisoned")]
    Poisoned,
}

/// Pending-edit error type
#[derive(Error, Debug)]
pub enum EditError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Version {version_id} does not belong to workbook {file_path}")]
    VersionMismatch { version_id: VersionId, file_path: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid cell address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EditError>;
