use cellvault_core::{CellValue, Color, FontSpec};
use serde::{Deserialize, Serialize};

use crate::session::LiveSession;
use crate::error::SessionError;

/// Everything about a live cell an edit can change, captured before the edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OriginalState {
    #[serde(default)]
    pub value: Option<CellValue>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub number_format: Option<String>,
    #[serde(default)]
    pub font: FontSpec,
    #[serde(default)]
    pub fill: Option<Color>,
}

impl OriginalState {
    /// A blank value is recorded as `None`, so the state survives its JSON round trip.
    pub fn capture(session: &dyn LiveSession, sheet: &str, address: &str) -> Result<Self, SessionError> {
        Ok(Self {
            value: session.value(sheet, address)?.filter(|v| !v.is_empty()),
            formula: session.formula(sheet, address)?,
            number_format: session.number_format(sheet, address)?,
            font: session.font(sheet, address)?,
            fill: session.fill(sheet, address)?,
        })
    }

    /// Put every captured field back
    pub fn restore(&self, session: &mut dyn LiveSession, sheet: &str, address: &str) -> Result<(), SessionError> {
        // set_value clears the formula, so the formula goes back second
        session.set_value(sheet, address, self.value.clone())?;
        if self.formula.is_some() {
            session.set_formula(sheet, address, self.formula.clone())?;
        }
        session.set_number_format(sheet, address, self.number_format.clone())?;
        session.set_font(sheet, address, self.font.clone())?;
        session.set_fill(sheet, address, self.fill)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySession;

    #[test]
    fn test_capture_then_restore() {
        let mut session = MemorySession::with_sheets(["S"]);
        session.set_value("S", "B2", Some(CellValue::Number(4.0))).unwrap();
        session.set_formula("S", "B2", Some("=A1*4".into())).unwrap();
        session.set_number_format("S", "B2", Some("0.0".into())).unwrap();
        session
            .set_font("S", "B2", FontSpec::new().with_name("Arial").with_bold(true))
            .unwrap();
        session.set_fill("S", "B2", Some(Color::rgb(10, 20, 30))).unwrap();

        let original = OriginalState::capture(&session, "S", "B2").unwrap();

        session.set_value("S", "B2", Some(CellValue::Text("x".into()))).unwrap();
        session.set_font("S", "B2", FontSpec::new().with_size(20.0)).unwrap();
        session.set_fill("S", "B2", None).unwrap();
        session.set_number_format("S", "B2", None).unwrap();

        original.restore(&mut session, "S", "B2").unwrap();
        assert_eq!(OriginalState::capture(&session, "S", "B2").unwrap(), original);
    }

    #[test]
    fn test_json_round_trip_of_blank_cell() {
        let session = MemorySession::with_sheets(["S"]);
        let blank = OriginalState::capture(&session, "S", "Z9").unwrap();
        assert_eq!(blank, OriginalState::default());

        let json = serde_json::to_value(&blank).unwrap();
        assert_eq!(serde_json::from_value::<OriginalState>(json).unwrap(), blank);
    }

    #[test]
    fn test_blank_value_survives_json_round_trip() {
        let mut session = MemorySession::with_sheets(["S"]);
        session.set_value("S", "C3", Some(CellValue::Empty)).unwrap();
        session.set_number_format("S", "C3", Some("@".into())).unwrap();

        let original = OriginalState::capture(&session, "S", "C3").unwrap();
        assert_eq!(original.value, None);

        let stored = serde_json::to_value(&original).unwrap();
        let decoded: OriginalState = serde_json::from_value(stored).unwrap();
        assert_eq!(decoded, original);

        session.set_value("S", "C3", Some(CellValue::Number(1.0))).unwrap();
        decoded.restore(&mut session, "S", "C3").unwrap();
        assert_eq!(OriginalState::capture(&session, "S", "C3").unwrap(), original);
        assert_eq!(session.value("S", "C3").unwrap(), None);
    }
}
