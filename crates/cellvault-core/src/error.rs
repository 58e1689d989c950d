use thiserror::Error;

/// Errors raised while parsing A1-style addresses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    #[error("Column out of range: {0}")]
    ColumnOutOfRange(String),

    #[error("Row out of range: {0}")]
    RowOutOfRange(String),

    #[error("Missing sheet qualifier: {0}")]
    MissingSheet(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),
}
