use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AddressError;

/// RGBA color, serialized as a CSS hex string (`#rrggbb` or `#rrggbbaa`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }

    /// Convert to CSS hex color string
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!(
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }

    /// Parse from CSS hex color string, with or without the leading `#`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            6 => Some(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Color::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    /// Light amber used to flag cells holding an unreviewed edit
    pub const PENDING: Color = Color::rgb(0xff, 0xf2, 0xcc);
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl TryFrom<String> for Color {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or(AddressError::InvalidColor(value))
    }
}

/// Font properties of a cell. Every field is optional so a font can also act as a patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl FontSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set font name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder pattern: set font size
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    /// Builder pattern: set bold
    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = Some(bold);
        self
    }

    /// Builder pattern: set italic
    pub fn with_italic(mut self, italic: bool) -> Self {
        self.italic = Some(italic);
        self
    }

    /// Builder pattern: set font color
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == FontSpec::default()
    }

    /// Merge another font into this one (other's present fields override)
    pub fn merge(&mut self, other: &FontSpec) {
        if other.name.is_some() {
            self.name = other.name.clone();
        }
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.bold.is_some() {
            self.bold = other.bold;
        }
        if other.italic.is_some() {
            self.italic = other.italic;
        }
        if other.color.is_some() {
            self.color = other.color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex() {
        let color = Color::rgb(255, 128, 64);
        assert_eq!(color.to_hex(), "#ff8040");
        assert_eq!(Color::from_hex("#ff8040"), Some(color));
        assert_eq!(Color::from_hex("FF8040"), Some(color));
        assert_eq!(Color::from_hex("#ff804080"), Some(Color::rgba(255, 128, 64, 128)));
        assert_eq!(Color::from_hex("#ff80"), None);
        assert_eq!(Color::from_hex("#zz8040"), None);
    }

    #[test]
    fn test_color_serde_as_hex() {
        let json = serde_json::to_string(&Color::PENDING).unwrap();
        assert_eq!(json, "\"#fff2cc\"");
        let parsed: Color = serde_json::from_str("\"#000000\"").unwrap();
        assert_eq!(parsed, Color::BLACK);
        assert!(serde_json::from_str::<Color>("\"nope\"").is_err());
    }

    #[test]
    fn test_font_merge_overrides_present_fields_only() {
        let mut font = FontSpec::new()
            .with_name("Calibri")
            .with_size(11.0)
            .with_bold(false);
        font.merge(&FontSpec::new().with_bold(true).with_color(Color::WHITE));

        assert_eq!(font.name.as_deref(), Some("Calibri"));
        assert_eq!(font.size, Some(11.0));
        assert_eq!(font.bold, Some(true));
        assert_eq!(font.color, Some(Color::WHITE));
        assert_eq!(font.italic, None);
    }
}
