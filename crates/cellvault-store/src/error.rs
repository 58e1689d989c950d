use cellvault_core::AddressError;
use thiserror::Error;

use crate::db::models::VersionId;

/// Store error type
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid workbook path: {0}")]
    InvalidPath(String),

    #[error("Version not found: {0}")]
    VersionNotFound(VersionId),

    #[error("Invalid cell address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Invalid extraction payload: {0}")]
    InvalidPayload(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid pending edit transition to {0}")]
    InvalidTransition(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
