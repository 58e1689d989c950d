//! Extraction payloads and the extractor seam.
//!
//! The store does not read spreadsheet files itself. An [`Extractor`] turns a
//! workbook into a [`WorkbookExtract`]: a list of row-range chunks with their
//! cells. Before a payload is persisted, [`annotate_dependencies`] writes the
//! precedent/dependent lists into every cell.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use cellvault_core::{CellPayload, ChunkCell, ChunkPayload, QualifiedAddress};
use cellvault_formula::{build_dependency_maps, DependencyGraph};
use serde::{Deserialize, Serialize};

/// Suffix of the sidecar file read by [`JsonExtractor`]
pub const SIDECAR_SUFFIX: &str = ".extract.json";

/// One chunk of an extraction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractChunk {
    /// Position within the sheet; defaults to the chunk's position in the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i64>,
    pub sheet: String,
    pub start_row: u32,
    pub end_row: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<Vec<ChunkCell>>>,
}

impl ExtractChunk {
    pub fn new(sheet: impl Into<String>, start_row: u32, end_row: u32) -> Self {
        Self {
            chunk_index: None,
            sheet: sheet.into(),
            start_row,
            end_row,
            cells: None,
        }
    }

    pub fn with_cells(mut self, cells: Vec<Vec<ChunkCell>>) -> Self {
        self.cells = Some(cells);
        self
    }

    /// Chunk payload as stored, with its row range normalized
    pub fn to_payload(&self) -> ChunkPayload {
        let mut payload = ChunkPayload::new(self.sheet.clone(), self.start_row, self.end_row);
        payload.cells = self.cells.clone().unwrap_or_default();
        payload
    }

    fn cells_mut(&mut self) -> impl Iterator<Item = &mut ChunkCell> {
        self.cells.iter_mut().flatten().flatten()
    }
}

/// Everything an extractor produced for one workbook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookExtract {
    #[serde(default)]
    pub chunks: Vec<ExtractChunk>,
}

impl WorkbookExtract {
    pub fn new(chunks: Vec<ExtractChunk>) -> Self {
        Self { chunks }
    }

    /// Parse a payload from JSON text
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Every cell keyed by qualified address. Cells with malformed addresses are left out.
    pub fn cells(&self) -> BTreeMap<QualifiedAddress, CellPayload> {
        let mut cells = BTreeMap::new();
        for chunk in &self.chunks {
            for cell in chunk.cells.iter().flatten().flatten() {
                match cell.coord() {
                    Some(coord) => {
                        cells.insert(
                            QualifiedAddress::new(chunk.sheet.clone(), coord),
                            cell.payload.clone(),
                        );
                    }
                    None => tracing::debug!(
                        "Ignoring cell with malformed address {}!{}",
                        chunk.sheet,
                        cell.address
                    ),
                }
            }
        }
        cells
    }

    /// Check that chunk ranges of a sheet are disjoint and that every cell
    /// lies inside its chunk. Returns a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        let payloads: Vec<ChunkPayload> = self.chunks.iter().map(ExtractChunk::to_payload).collect();

        for (i, chunk) in payloads.iter().enumerate() {
            if chunk.start_row == 0 {
                return Err(format!("chunk {} of {} starts at row 0", i, chunk.sheet));
            }
            if let Some(other) = payloads[i + 1..].iter().find(|other| chunk.overlaps(other)) {
                return Err(format!(
                    "rows {}-{} and {}-{} of {} overlap",
                    chunk.start_row, chunk.end_row, other.start_row, other.end_row, chunk.sheet
                ));
            }
            for cell in chunk.iter_cells() {
                match cell.coord() {
                    Some(coord) if chunk.contains_row(coord.row) => {}
                    Some(_) => {
                        return Err(format!(
                            "cell {}!{} is outside rows {}-{}",
                            chunk.sheet, cell.address, chunk.start_row, chunk.end_row
                        ))
                    }
                    None => {
                        return Err(format!(
                            "cell address {}!{} is malformed",
                            chunk.sheet, cell.address
                        ))
                    }
                }
            }
        }

        Ok(())
    }
}

/// Run the dependency graph builder over every cell and write the resulting
/// precedent/dependent lists into each cell payload.
pub fn annotate_dependencies(extract: &mut WorkbookExtract) -> DependencyGraph {
    let graph = build_dependency_maps(&extract.cells());

    for chunk in &mut extract.chunks {
        let sheet = chunk.sheet.clone();
        for cell in chunk.cells_mut() {
            let Some(coord) = cell.coord() else { continue };
            let address = QualifiedAddress::new(sheet.clone(), coord);

            cell.payload.precedents = graph
                .precedents(&address)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            cell.payload.dependents = graph
                .dependents(&address)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
        }
    }

    graph
}

/// Turns a workbook file into an extraction payload
pub trait Extractor {
    fn extract(&self, path: &Path) -> anyhow::Result<WorkbookExtract>;
}

/// Reads a pre-computed extraction payload from JSON.
///
/// By default the payload sits next to the workbook as `<workbook>.extract.json`.
#[derive(Debug, Clone, Default)]
pub struct JsonExtractor {
    source: Option<PathBuf>,
}

impl JsonExtractor {
    /// Read the sidecar file of whichever workbook is extracted
    pub fn sidecar() -> Self {
        Self::default()
    }

    /// Always read `source`, regardless of the workbook
    pub fn from_file(source: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }

    pub fn sidecar_path(workbook: &Path) -> PathBuf {
        let mut name = workbook.as_os_str().to_os_string();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }
}

impl Extractor for JsonExtractor {
    fn extract(&self, path: &Path) -> anyhow::Result<WorkbookExtract> {
        let source = self
            .source
            .clone()
            .unwrap_or_else(|| Self::sidecar_path(path));
        let text = fs::read_to_string(&source)
            .with_context(|| format!("Failed to read extraction payload {}", source.display()))?;
        let extract = WorkbookExtract::from_json(&text)
            .with_context(|| format!("Invalid extraction payload {}", source.display()))?;
        tracing::debug!(
            "Read {} chunks for {} from {}",
            extract.chunks.len(),
            path.display(),
            source.display()
        );
        Ok(extract)
    }
}
