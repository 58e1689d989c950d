//! Row-range chunks of a sheet.
//!
//! A chunk is a contiguous slice of one sheet's rows (`start_row..=end_row`),
//! stored, hashed and summarised as a unit. Cells are kept as a 2-D array:
//! one inner vector per row, each cell carrying its own A1 address.
//!
//! Row ranges are fixed when a workbook is first extracted. Updates can add or
//! change cells inside a chunk's range but never move a cell to another chunk.

use serde::{Deserialize, Serialize};

use crate::cell::CellPayload;
use crate::hash::json_hash;
use crate::range::CellCoord;

/// A cell as it sits inside a chunk's 2-D array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkCell {
    /// Unqualified A1 address; the sheet comes from the owning chunk
    pub address: String,
    #[serde(flatten)]
    pub payload: CellPayload,
}

impl ChunkCell {
    pub fn new(address: impl Into<String>, payload: CellPayload) -> Self {
        Self {
            address: address.into(),
            payload,
        }
    }

    /// Parsed coordinate, or `None` if the stored address is malformed
    pub fn coord(&self) -> Option<CellCoord> {
        CellCoord::from_a1(&self.address).ok()
    }
}

/// Encoded payload of one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub sheet: String,
    pub start_row: u32,
    pub end_row: u32,
    #[serde(default)]
    pub cells: Vec<Vec<ChunkCell>>,
}

impl ChunkPayload {
    /// Create an empty chunk covering `start_row..=end_row`
    pub fn new(sheet: impl Into<String>, start_row: u32, end_row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            start_row: start_row.min(end_row),
            end_row: start_row.max(end_row),
            cells: Vec::new(),
        }
    }

    /// Check if a row falls inside this chunk's range
    pub fn contains_row(&self, row: u32) -> bool {
        row >= self.start_row && row <= self.end_row
    }

    /// Check if two chunks of the same sheet share any row
    pub fn overlaps(&self, other: &ChunkPayload) -> bool {
        self.sheet == other.sheet
            && self.start_row <= other.end_row
            && other.start_row <= self.end_row
    }

    /// Iterate over all cells in row-major order
    pub fn iter_cells(&self) -> impl Iterator<Item = &ChunkCell> {
        self.cells.iter().flatten()
    }

    /// Number of cells stored in this chunk
    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the cell at a coordinate
    pub fn get(&self, coord: CellCoord) -> Option<&ChunkCell> {
        self.iter_cells().find(|cell| cell.coord() == Some(coord))
    }

    /// Merge `delta` into the cell at `coord`, inserting the cell if it is absent.
    ///
    /// Returns the merged payload, or `None` when the row lies outside this chunk.
    pub fn upsert(&mut self, coord: CellCoord, delta: &CellPayload) -> Option<&CellPayload> {
        if !self.contains_row(coord.row) {
            return None;
        }

        let existing = self.cells.iter().enumerate().find_map(|(r, row)| {
            row.iter()
                .position(|cell| cell.coord() == Some(coord))
                .map(|c| (r, c))
        });

        let (r, c) = match existing {
            Some(pos) => pos,
            None => self.insert_cell(coord),
        };

        let cell = &mut self.cells[r][c];
        cell.payload.merge(delta);
        Some(&cell.payload)
    }

    /// Insert an empty cell keeping rows ordered by row number and cells by column
    fn insert_cell(&mut self, coord: CellCoord) -> (usize, usize) {
        let row_of = |row: &Vec<ChunkCell>| row.iter().find_map(ChunkCell::coord).map(|c| c.row);

        let r = match self.cells.iter().position(|row| row_of(row) == Some(coord.row)) {
            Some(r) => r,
            None => {
                let at = self
                    .cells
                    .iter()
                    .position(|row| row_of(row).is_some_and(|existing| existing > coord.row))
                    .unwrap_or(self.cells.len());
                self.cells.insert(at, Vec::new());
                at
            }
        };

        let row = &mut self.cells[r];
        let c = row
            .iter()
            .position(|cell| cell.coord().is_some_and(|existing| existing.col > coord.col))
            .unwrap_or(row.len());
        row.insert(c, ChunkCell::new(coord.to_a1(), CellPayload::default()));
        (r, c)
    }

    /// One line per non-blank cell: `<address>: <formula or value>`
    pub fn rollup_text(&self) -> String {
        self.iter_cells()
            .filter_map(|cell| {
                let text = cell.payload.display_text();
                (!text.is_empty()).then(|| format!("{}: {}", cell.address, text))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Hash of the encoded cell array
    pub fn content_hash(&self) -> Result<String, serde_json::Error> {
        json_hash(&self.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;

    fn sample() -> ChunkPayload {
        let mut chunk = ChunkPayload::new("Sheet1", 1, 10);
        chunk.cells = vec![
            vec![
                ChunkCell::new("A1", CellPayload::value(1.0)),
                ChunkCell::new("C1", CellPayload::formula("=A1*2")),
            ],
            vec![ChunkCell::new("A5", CellPayload::value("label"))],
        ];
        chunk
    }

    #[test]
    fn test_chunk_cell_json_is_flat() {
        let cell = ChunkCell::new("B2", CellPayload::value(4.0));
        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json, serde_json::json!({"address": "B2", "value": 4.0}));
    }

    #[test]
    fn test_get_and_contains_row() {
        let chunk = sample();
        assert!(chunk.contains_row(1));
        assert!(chunk.contains_row(10));
        assert!(!chunk.contains_row(11));
        assert_eq!(chunk.len(), 3);

        let cell = chunk.get(CellCoord::new(5, 1)).unwrap();
        assert_eq!(cell.payload.value, Some(CellValue::Text("label".to_string())));
        assert!(chunk.get(CellCoord::new(2, 2)).is_none());
    }

    #[test]
    fn test_upsert_existing_merges() {
        let mut chunk = sample();
        let merged = chunk
            .upsert(CellCoord::new(1, 1), &CellPayload::value(20.0))
            .unwrap()
            .clone();
        assert_eq!(merged.value, Some(CellValue::Number(20.0)));
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn test_upsert_inserts_in_row_order() {
        let mut chunk = sample();
        chunk.upsert(CellCoord::new(3, 2), &CellPayload::value(7.0)).unwrap();
        chunk.upsert(CellCoord::new(1, 2), &CellPayload::value(8.0)).unwrap();

        let addresses: Vec<_> = chunk.iter_cells().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["A1", "B1", "C1", "B3", "A5"]);
    }

    #[test]
    fn test_upsert_outside_range_is_rejected() {
        let mut chunk = sample();
        assert!(chunk.upsert(CellCoord::new(11, 1), &CellPayload::value(1.0)).is_none());
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn test_rollup_and_hash_follow_content() {
        let mut chunk = sample();
        assert_eq!(chunk.rollup_text(), "A1: 1\nC1: =A1*2\nA5: label");

        let before = chunk.content_hash().unwrap();
        assert_eq!(before, sample().content_hash().unwrap());

        chunk.upsert(CellCoord::new(1, 1), &CellPayload::value(2.0)).unwrap();
        assert_ne!(before, chunk.content_hash().unwrap());
    }

    #[test]
    fn test_overlaps() {
        let a = ChunkPayload::new("Sheet1", 1, 10);
        assert!(a.overlaps(&ChunkPayload::new("Sheet1", 10, 20)));
        assert!(!a.overlaps(&ChunkPayload::new("Sheet1", 11, 20)));
        assert!(!a.overlaps(&ChunkPayload::new("Sheet2", 1, 10)));
    }
}
