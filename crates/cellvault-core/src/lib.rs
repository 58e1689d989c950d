pub mod cell;
pub mod chunk;
pub mod error;
pub mod format;
pub mod hash;
pub mod range;

pub use cell::{CellPayload, CellValue};
pub use chunk::{ChunkCell, ChunkPayload};
pub use error::AddressError;
pub use format::{Color, FontSpec};
pub use hash::{content_hash, json_hash};
pub use range::{
    col_from_label, col_to_label, unquote_sheet, CellCoord, CellRange, QualifiedAddress, MAX_COL,
    MAX_ROW,
};
