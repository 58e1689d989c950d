//! Extraction of the cells a formula reads.
//!
//! This is a textual scan, not a full formula parser: it recognises A1-style
//! ranges and single cells (optionally sheet-qualified, optionally `$`-anchored)
//! and ignores everything else. It never fails; malformed or oversized
//! references are logged and skipped.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use cellvault_core::{unquote_sheet, CellCoord, CellRange, QualifiedAddress};
use regex::{Captures, Regex};

/// Ranges covering more cells than this are skipped entirely
pub const MAX_RANGE_CELLS: u64 = 10_000;

/// Stands in for an already-expanded range so the single-cell pass can't re-match it
const RANGE_PLACEHOLDER: &str = "__RANGE__";

const SHEET_PREFIX: &str = r"(?:'((?:[^']|'')+)'|([A-Za-z_][A-Za-z0-9_.]*))!";
const CELL_TOKEN: &str = r"\$?[A-Za-z]{1,3}\$?[0-9]+";

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?:{SHEET_PREFIX})?({CELL_TOKEN}):({CELL_TOKEN})"
        ))
        .expect("range pattern is valid")
    })
}

fn cell_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?:{SHEET_PREFIX})?({CELL_TOKEN})")).expect("cell pattern is valid")
    })
}

fn string_literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""(?:[^"]|"")*""#).expect("string literal pattern is valid"))
}

/// Extract every cell address a formula reads, expanded and sheet-qualified.
///
/// Returns an empty set when `formula` is `None` or does not start with `=`.
/// Unqualified references resolve against `current_sheet`.
///
/// ```
/// use cellvault_formula::extract_all_cell_references;
///
/// let refs = extract_all_cell_references(Some("=SUM(A1:B2)"), "Sheet1");
/// let refs: Vec<String> = refs.iter().map(ToString::to_string).collect();
/// assert_eq!(refs, ["Sheet1!A1", "Sheet1!B1", "Sheet1!A2", "Sheet1!B2"]);
/// ```
pub fn extract_all_cell_references(
    formula: Option<&str>,
    current_sheet: &str,
) -> BTreeSet<QualifiedAddress> {
    let mut refs = BTreeSet::new();

    let Some(formula) = formula.map(str::trim_start) else {
        return refs;
    };
    if !formula.starts_with('=') {
        return refs;
    }

    // Text constants can look like references ("A1"); blank them first
    let without_strings = string_literal_regex().replace_all(formula, "\"\"");

    let remaining = expand_ranges(&without_strings, current_sheet, &mut refs);
    collect_single_cells(&remaining, current_sheet, &mut refs);

    refs
}

/// First pass: expand `Start:End` ranges into `refs` and return the formula
/// with each range replaced by a placeholder.
fn expand_ranges(formula: &str, current_sheet: &str, refs: &mut BTreeSet<QualifiedAddress>) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut last = 0;

    for caps in range_regex().captures_iter(formula) {
        let Some(whole) = caps.get(0) else { continue };
        if !is_token_boundary(formula, whole.start(), whole.end()) {
            continue;
        }

        out.push_str(&formula[last..whole.start()]);
        out.push_str(RANGE_PLACEHOLDER);
        last = whole.end();

        let sheet = sheet_name(&caps, current_sheet);
        let (Some(start), Some(end)) = (caps.get(3), caps.get(4)) else {
            continue;
        };
        let range = match (CellCoord::from_a1(start.as_str()), CellCoord::from_a1(end.as_str())) {
            (Ok(start), Ok(end)) => CellRange::new(start, end),
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!("Skipping malformed range {}: {}", whole.as_str(), e);
                continue;
            }
        };

        if range.cell_count() > MAX_RANGE_CELLS {
            tracing::warn!(
                "Skipping range {} ({} cells exceeds the {} cell limit)",
                whole.as_str(),
                range.cell_count(),
                MAX_RANGE_CELLS
            );
            continue;
        }

        refs.extend(range.iter().map(|coord| QualifiedAddress::new(sheet.clone(), coord)));
    }

    out.push_str(&formula[last..]);
    out
}

/// Second pass: standalone `[Sheet!]A1` tokens that are not part of a range
fn collect_single_cells(formula: &str, current_sheet: &str, refs: &mut BTreeSet<QualifiedAddress>) {
    for caps in cell_regex().captures_iter(formula) {
        let Some(whole) = caps.get(0) else { continue };
        if !is_token_boundary(formula, whole.start(), whole.end()) {
            continue;
        }
        if formula[whole.end()..].starts_with(':') {
            continue;
        }

        let Some(token) = caps.get(3) else { continue };
        match CellCoord::from_a1(token.as_str()) {
            Ok(coord) => {
                refs.insert(QualifiedAddress::new(sheet_name(&caps, current_sheet), coord));
            }
            Err(e) => tracing::debug!("Skipping malformed reference {}: {}", whole.as_str(), e),
        }
    }
}

fn sheet_name(caps: &Captures<'_>, current_sheet: &str) -> String {
    caps.get(1)
        .map(|quoted| unquote_sheet(&format!("'{}'", quoted.as_str())))
        .or_else(|| caps.get(2).map(|bare| bare.as_str().to_string()))
        .unwrap_or_else(|| current_sheet.to_string())
}

/// A reference must not be glued to an identifier on either side, and must not
/// be a function name such as `LOG10(`.
fn is_token_boundary(formula: &str, start: usize, end: usize) -> bool {
    let before = formula[..start].chars().next_back();
    let after = formula[end..].chars().next();

    let glued_before = before.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '$'));
    let glued_after = after.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '(' | '!'));

    !glued_before && !glued_after
}
