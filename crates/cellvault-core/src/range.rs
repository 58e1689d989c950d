use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;

/// Highest column number (XFD)
pub const MAX_COL: u32 = 16_384;
/// Highest row number
pub const MAX_ROW: u32 = 1_048_576;

/// Cell coordinate, 1-indexed on both axes like A1 notation (A1 -> row 1, col 1)
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    pub const fn new(row: u32, col: u32) -> Self {
        CellCoord { row, col }
    }

    /// Parse A1 notation, tolerating `$` anchors (e.g., "$B$2" -> (2, 2))
    pub fn from_a1(notation: &str) -> Result<Self, AddressError> {
        let invalid = || AddressError::InvalidAddress(notation.to_string());
        let mut col_str = String::new();
        let mut row_str = String::new();

        for c in notation.trim().chars() {
            match c {
                '$' if row_str.is_empty() => {}
                c if c.is_ascii_alphabetic() => {
                    if !row_str.is_empty() {
                        return Err(invalid()); // Letters after numbers
                    }
                    col_str.push(c.to_ascii_uppercase());
                }
                c if c.is_ascii_digit() => row_str.push(c),
                _ => return Err(invalid()),
            }
        }

        if col_str.is_empty() || row_str.is_empty() {
            return Err(invalid());
        }

        let col = col_from_label(&col_str)
            .ok_or_else(|| AddressError::ColumnOutOfRange(notation.to_string()))?;
        let row: u32 = row_str
            .parse()
            .map_err(|_| AddressError::RowOutOfRange(notation.to_string()))?;

        if row == 0 || row > MAX_ROW {
            return Err(AddressError::RowOutOfRange(notation.to_string()));
        }

        Ok(CellCoord { row, col })
    }

    /// Convert to A1 notation (e.g., (1, 1) -> "A1")
    pub fn to_a1(&self) -> String {
        format!("{}{}", col_to_label(self.col), self.row)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

impl FromStr for CellCoord {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellCoord::from_a1(s)
    }
}

/// Convert a 1-indexed column number to its label (1 -> A, 26 -> Z, 27 -> AA)
pub fn col_to_label(col: u32) -> String {
    let mut label = String::new();
    let mut n = col;

    while n > 0 {
        n -= 1;
        label.insert(0, char::from(b'A' + (n % 26) as u8));
        n /= 26;
    }

    label
}

/// Convert a column label to its 1-indexed number (A -> 1, AA -> 27).
///
/// Returns `None` for empty labels, non-letters, or columns past `XFD`.
pub fn col_from_label(label: &str) -> Option<u32> {
    if label.is_empty() || label.len() > 3 {
        return None;
    }

    let mut col: u32 = 0;
    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }

    if col == 0 || col > MAX_COL {
        None
    } else {
        Some(col)
    }
}

/// A sheet-qualified cell address, rendered as `Sheet!A1`
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedAddress {
    pub sheet: String,
    pub coord: CellCoord,
}

impl QualifiedAddress {
    pub fn new(sheet: impl Into<String>, coord: CellCoord) -> Self {
        Self {
            sheet: sheet.into(),
            coord,
        }
    }

    /// Parse `Sheet!A1` or `'My Sheet'!A1`
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let (sheet, cell) = text
            .rsplit_once('!')
            .ok_or_else(|| AddressError::MissingSheet(text.to_string()))?;
        let sheet = unquote_sheet(sheet);
        if sheet.is_empty() {
            return Err(AddressError::MissingSheet(text.to_string()));
        }
        Ok(Self::new(sheet, CellCoord::from_a1(cell)?))
    }

    /// Parse an address that may or may not carry a sheet qualifier
    pub fn parse_with_default(text: &str, default_sheet: &str) -> Result<Self, AddressError> {
        if text.contains('!') {
            Self::parse(text)
        } else {
            Ok(Self::new(default_sheet, CellCoord::from_a1(text)?))
        }
    }
}

/// Strip the single quotes Excel puts around sheet names, unescaping `''`
pub fn unquote_sheet(sheet: &str) -> String {
    let sheet = sheet.trim();
    match sheet
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        Some(inner) => inner.replace("''", "'"),
        None => sheet.to_string(),
    }
}

impl fmt::Display for QualifiedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.coord)
    }
}

impl From<QualifiedAddress> for String {
    fn from(addr: QualifiedAddress) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for QualifiedAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        QualifiedAddress::parse(&value)
    }
}

/// A rectangular range of cells (e.g., A1:B10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellCoord,
    pub end: CellCoord,
}

impl CellRange {
    pub fn new(start: CellCoord, end: CellCoord) -> Self {
        // Normalize so start is top-left and end is bottom-right
        CellRange {
            start: CellCoord::new(start.row.min(end.row), start.col.min(end.col)),
            end: CellCoord::new(start.row.max(end.row), start.col.max(end.col)),
        }
    }

    /// Create from A1:B1 notation
    pub fn from_a1(notation: &str) -> Result<Self, AddressError> {
        match notation.split_once(':') {
            None => {
                let coord = CellCoord::from_a1(notation)?;
                Ok(CellRange::new(coord, coord))
            }
            Some((start, end)) => Ok(CellRange::new(
                CellCoord::from_a1(start)?,
                CellCoord::from_a1(end)?,
            )),
        }
    }

    /// Check if a coordinate is within this range
    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row >= self.start.row
            && coord.row <= self.end.row
            && coord.col >= self.start.col
            && coord.col <= self.end.col
    }

    pub fn row_count(&self) -> u64 {
        u64::from(self.end.row - self.start.row) + 1
    }

    pub fn col_count(&self) -> u64 {
        u64::from(self.end.col - self.start.col) + 1
    }

    /// Total number of cells; computed in u64 so whole-sheet ranges don't overflow
    pub fn cell_count(&self) -> u64 {
        self.row_count() * self.col_count()
    }

    /// Iterate over all coordinates in the range (row by row)
    pub fn iter(&self) -> CellRangeIter {
        CellRangeIter {
            range: *self,
            current_row: self.start.row,
            current_col: self.start.col,
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

impl IntoIterator for CellRange {
    type Item = CellCoord;
    type IntoIter = CellRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over coordinates in a range
pub struct CellRangeIter {
    range: CellRange,
    current_row: u32,
    current_col: u32,
}

impl Iterator for CellRangeIter {
    type Item = CellCoord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row > self.range.end.row {
            return None;
        }

        let coord = CellCoord::new(self.current_row, self.current_col);

        self.current_col += 1;
        if self.current_col > self.range.end.col {
            self.current_col = self.range.start.col;
            self.current_row += 1;
        }

        Some(coord)
    }
}
