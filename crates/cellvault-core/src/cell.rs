use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::format::{Color, FontSpec};
use crate::range::QualifiedAddress;

/// Represents the raw value stored in a cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Render the value the way a sheet would display it
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

/// Everything the store knows about one cell.
///
/// Deltas use the same type: a field left as `None` (or an empty list) means
/// "keep what is there" when merged with [`CellPayload::merge`]. Fields this
/// type does not model are kept in `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CellValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<FontSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub precedents: Vec<QualifiedAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependents: Vec<QualifiedAddress>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CellPayload {
    /// Create a payload holding just a value
    pub fn value(value: impl Into<CellValue>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Create a payload holding just a formula
    pub fn formula(expression: impl Into<String>) -> Self {
        Self {
            formula: Some(expression.into()),
            ..Self::default()
        }
    }

    /// Builder pattern: set font
    pub fn with_font(mut self, font: FontSpec) -> Self {
        self.font = Some(font);
        self
    }

    /// Builder pattern: set fill color
    pub fn with_fill(mut self, color: Color) -> Self {
        self.fill = Some(color);
        self
    }

    /// Builder pattern: set number format
    pub fn with_number_format(mut self, format: impl Into<String>) -> Self {
        self.number_format = Some(format.into());
        self
    }

    /// The formula text, if the cell holds a non-blank one
    pub fn formula_text(&self) -> Option<&str> {
        self.formula.as_deref().filter(|f| !f.trim().is_empty())
    }

    /// Check if this payload carries nothing at all
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map_or(true, CellValue::is_empty)
            && self.formula_text().is_none()
            && self.font.as_ref().map_or(true, FontSpec::is_empty)
            && self.fill.is_none()
            && self.number_format.is_none()
            && self.precedents.is_empty()
            && self.dependents.is_empty()
            && self.extra.is_empty()
    }

    /// Text shown for this cell in chunk rollups: the formula if any, else the value
    pub fn display_text(&self) -> String {
        match self.formula_text() {
            Some(formula) => formula.to_string(),
            None => self
                .value
                .as_ref()
                .map(CellValue::as_text)
                .unwrap_or_default(),
        }
    }

    /// Merge a delta into this payload; only the fields present in `delta` override.
    /// A blank formula counts as absent.
    pub fn merge(&mut self, delta: &CellPayload) {
        if delta.value.is_some() {
            self.value = delta.value.clone();
        }
        if let Some(formula) = delta.formula_text() {
            self.formula = Some(formula.to_string());
        }
        if let Some(font) = &delta.font {
            self.font.get_or_insert_with(FontSpec::default).merge(font);
        }
        if delta.fill.is_some() {
            self.fill = delta.fill;
        }
        if delta.number_format.is_some() {
            self.number_format = delta.number_format.clone();
        }
        if !delta.precedents.is_empty() {
            self.precedents = delta.precedents.clone();
        }
        if !delta.dependents.is_empty() {
            self.dependents = delta.dependents.clone();
        }
        for (key, value) in &delta.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_value_as_text() {
        assert_eq!(CellValue::Number(42.0).as_text(), "42");
        assert_eq!(CellValue::Number(42.5).as_text(), "42.5");
        assert_eq!(CellValue::Boolean(true).as_text(), "TRUE");
        assert_eq!(CellValue::Text("hello".to_string()).as_text(), "hello");
        assert_eq!(CellValue::Empty.as_text(), "");
    }

    #[test]
    fn test_cell_value_untagged_json() {
        let payload: CellPayload = serde_json::from_value(json!({"value": 10})).unwrap();
        assert_eq!(payload.value, Some(CellValue::Number(10.0)));

        let payload: CellPayload = serde_json::from_value(json!({"value": "ten"})).unwrap();
        assert_eq!(payload.value, Some(CellValue::Text("ten".to_string())));

        let payload: CellPayload = serde_json::from_value(json!({"value": true})).unwrap();
        assert_eq!(payload.value, Some(CellValue::Boolean(true)));
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let raw = json!({
            "value": 3,
            "comment": "checked by finance",
            "alignment": {"horizontal": "center"}
        });
        let payload: CellPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.extra["comment"], json!("checked by finance"));

        let back = serde_json::to_value(&payload).unwrap();
        assert_eq!(back["alignment"]["horizontal"], json!("center"));
        assert_eq!(back["value"], json!(3.0));
    }

    #[test]
    fn test_merge_is_dictionary_update() {
        let mut cell = CellPayload::value(10.0)
            .with_font(FontSpec::new().with_name("Arial").with_size(10.0))
            .with_number_format("0.00");
        let delta = CellPayload::formula("=B1*2").with_font(FontSpec::new().with_bold(true));

        cell.merge(&delta);

        assert_eq!(cell.value, Some(CellValue::Number(10.0)));
        assert_eq!(cell.formula.as_deref(), Some("=B1*2"));
        let font = cell.font.as_ref().unwrap();
        assert_eq!(font.name.as_deref(), Some("Arial"));
        assert_eq!(font.bold, Some(true));
        assert_eq!(cell.number_format.as_deref(), Some("0.00"));
    }

    #[test]
    fn test_merge_ignores_blank_formula() {
        let mut cell = CellPayload::formula("=A1+1");
        cell.merge(&CellPayload::formula("   ").with_number_format("0%"));
        assert_eq!(cell.formula.as_deref(), Some("=A1+1"));
        assert_eq!(cell.number_format.as_deref(), Some("0%"));

        let mut plain = CellPayload::value(2.0);
        plain.merge(&CellPayload::formula(""));
        assert_eq!(plain.formula, None);
    }

    #[test]
    fn test_display_text_prefers_formula() {
        let mut cell = CellPayload::value(5.0);
        assert_eq!(cell.display_text(), "5");
        cell.formula = Some("=A1+1".to_string());
        assert_eq!(cell.display_text(), "=A1+1");
        cell.formula = Some("  ".to_string());
        assert_eq!(cell.display_text(), "5");
    }
}
