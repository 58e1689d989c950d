//! Live workbook sessions.
//!
//! A session is the open, mutable document a user is looking at. Edits are
//! shown there first and only reach the store once accepted.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cellvault_core::{CellCoord, CellValue, Color, FontSpec};
use cellvault_store::normalize_path;

use crate::error::SessionError;

/// Cell-level access to an open workbook, addressed by sheet name and A1 address
pub trait LiveSession {
    /// `None` for a blank cell
    fn value(&self, sheet: &str, address: &str) -> Result<Option<CellValue>, SessionError>;
    /// Set a constant value, clearing any formula. `Some(CellValue::Empty)` blanks the cell like `None`.
    fn set_value(&mut self, sheet: &str, address: &str, value: Option<CellValue>) -> Result<(), SessionError>;

    fn formula(&self, sheet: &str, address: &str) -> Result<Option<String>, SessionError>;
    fn set_formula(&mut self, sheet: &str, address: &str, formula: Option<String>) -> Result<(), SessionError>;

    fn number_format(&self, sheet: &str, address: &str) -> Result<Option<String>, SessionError>;
    fn set_number_format(&mut self, sheet: &str, address: &str, format: Option<String>) -> Result<(), SessionError>;

    fn font(&self, sheet: &str, address: &str) -> Result<FontSpec, SessionError>;
    /// Replace the cell's font entirely
    fn set_font(&mut self, sheet: &str, address: &str, font: FontSpec) -> Result<(), SessionError>;

    fn fill(&self, sheet: &str, address: &str) -> Result<Option<Color>, SessionError>;
    fn set_fill(&mut self, sheet: &str, address: &str, fill: Option<Color>) -> Result<(), SessionError>;
}

/// A session shared by everyone editing the same workbook
pub type SharedSession = Arc<Mutex<dyn LiveSession + Send>>;

/// Hands out the one live session of a workbook path
pub trait SessionManager: Send + Sync {
    fn session(&self, path: &Path) -> Result<SharedSession, SessionError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct LiveCell {
    value: Option<CellValue>,
    formula: Option<String>,
    number_format: Option<String>,
    font: FontSpec,
    fill: Option<Color>,
}

/// In-memory session. Sheets must be added before their cells can be touched.
#[derive(Debug, Default)]
pub struct MemorySession {
    sheets: BTreeMap<String, BTreeMap<CellCoord, LiveCell>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheets<I, S>(sheets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut session = Self::new();
        for sheet in sheets {
            session.add_sheet(sheet);
        }
        session
    }

    pub fn add_sheet(&mut self, name: impl Into<String>) {
        self.sheets.entry(name.into()).or_default();
    }

    fn cell(&self, sheet: &str, address: &str) -> Result<Option<&LiveCell>, SessionError> {
        let coord = CellCoord::from_a1(address)?;
        let cells = self
            .sheets
            .get(sheet)
            .ok_or_else(|| SessionError::SheetNotFound(sheet.to_string()))?;
        Ok(cells.get(&coord))
    }

    fn cell_mut(&mut self, sheet: &str, address: &str) -> Result<&mut LiveCell, SessionError> {
        let coord = CellCoord::from_a1(address)?;
        let cells = self
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| SessionError::SheetNotFound(sheet.to_string()))?;
        Ok(cells.entry(coord).or_default())
    }
}

impl LiveSession for MemorySession {
    fn value(&self, sheet: &str, address: &str) -> Result<Option<CellValue>, SessionError> {
        Ok(self.cell(sheet, address)?.and_then(|c| c.value.clone()))
    }

    fn set_value(&mut self, sheet: &str, address: &str, value: Option<CellValue>) -> Result<(), SessionError> {
        let cell = self.cell_mut(sheet, address)?;
        cell.value = value.filter(|v| !v.is_empty());
        cell.formula = None;
        Ok(())
    }

    fn formula(&self, sheet: &str, address: &str) -> Result<Option<String>, SessionError> {
        Ok(self.cell(sheet, address)?.and_then(|c| c.formula.clone()))
    }

    fn set_formula(&mut self, sheet: &str, address: &str, formula: Option<String>) -> Result<(), SessionError> {
        self.cell_mut(sheet, address)?.formula = formula;
        Ok(())
    }

    fn number_format(&self, sheet: &str, address: &str) -> Result<Option<String>, SessionError> {
        Ok(self.cell(sheet, address)?.and_then(|c| c.number_format.clone()))
    }

    fn set_number_format(&mut self, sheet: &str, address: &str, format: Option<String>) -> Result<(), SessionError> {
        self.cell_mut(sheet, address)?.number_format = format;
        Ok(())
    }

    fn font(&self, sheet: &str, address: &str) -> Result<FontSpec, SessionError> {
        Ok(self
            .cell(sheet, address)?
            .map(|c| c.font.clone())
            .unwrap_or_default())
    }

    fn set_font(&mut self, sheet: &str, address: &str, font: FontSpec) -> Result<(), SessionError> {
        self.cell_mut(sheet, address)?.font = font;
        Ok(())
    }

    fn fill(&self, sheet: &str, address: &str) -> Result<Option<Color>, SessionError> {
        Ok(self.cell(sheet, address)?.and_then(|c| c.fill))
    }

    fn set_fill(&mut self, sheet: &str, address: &str, fill: Option<Color>) -> Result<(), SessionError> {
        self.cell_mut(sheet, address)?.fill = fill;
        Ok(())
    }
}

/// Keeps one [`MemorySession`] per normalized workbook path
#[derive(Default)]
pub struct MemorySessionManager {
    sessions: Mutex<HashMap<PathBuf, SharedSession>>,
}

impl MemorySessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session` as the live session of `path`, replacing any previous one
    pub fn insert(&self, path: &Path, session: MemorySession) -> Result<SharedSession, SessionError> {
        let key = session_key(path)?;
        let shared: SharedSession = Arc::new(Mutex::new(session));
        self.sessions
            .lock()
            .map_err(|_| SessionError::Poisoned)?
            .insert(key, shared.clone());
        Ok(shared)
    }

    /// Forget the session of `path`, so later lookups start from an empty document
    pub fn close(&self, path: &Path) -> Result<bool, SessionError> {
        let key = session_key(path)?;
        Ok(self
            .sessions
            .lock()
            .map_err(|_| SessionError::Poisoned)?
            .remove(&key)
            .is_some())
    }
}

impl SessionManager for MemorySessionManager {
    fn session(&self, path: &Path) -> Result<SharedSession, SessionError> {
        let key = session_key(path)?;
        let mut sessions = self.sessions.lock().map_err(|_| SessionError::Poisoned)?;
        let session = sessions.entry(key).or_insert_with(|| {
            let fresh: SharedSession = Arc::new(Mutex::new(MemorySession::new()));
            fresh
        });
        Ok(session.clone())
    }
}

fn session_key(path: &Path) -> Result<PathBuf, SessionError> {
    normalize_path(path).map_err(|e| SessionError::Unavailable(e.to_string()))
}
