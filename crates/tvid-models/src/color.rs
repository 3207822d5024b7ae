//! RGBA color parsing.
//!
//! Colors travel through job JSON as strings: `#RRGGBB`, `#RRGGBBAA` or one of
//! a handful of names (the ones the caption presets use).

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// Straight (non-premultiplied) RGBA8 color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Channels as an array, in RGBA order.
    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Same color with its alpha replaced.
    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

impl FromStr for Color {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let named = match raw.to_ascii_lowercase().as_str() {
            "black" => Some(Color::BLACK),
            "white" => Some(Color::WHITE),
            "transparent" => Some(Color::TRANSPARENT),
            "green" => Some(Color::rgb(0, 128, 0)),
            "red" => Some(Color::rgb(255, 0, 0)),
            "yellow" => Some(Color::rgb(255, 255, 0)),
            _ => None,
        };
        if let Some(color) = named {
            return Ok(color);
        }

        let hex = raw
            .strip_prefix('#')
            .ok_or_else(|| ModelError::InvalidColor(raw.to_string()))?;
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return Err(ModelError::InvalidColor(raw.to_string()));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| ModelError::InvalidColor(raw.to_string()))
        };
        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Color::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }
}

impl TryFrom<String> for Color {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl JsonSchema for Color {
    fn schema_name() -> String {
        "Color".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!("#ff8000".parse::<Color>().unwrap(), Color::rgb(255, 128, 0));
        assert_eq!(
            "#00000080".parse::<Color>().unwrap(),
            Color::rgba(0, 0, 0, 128)
        );
    }

    #[test]
    fn test_parse_named() {
        assert_eq!("White".parse::<Color>().unwrap(), Color::WHITE);
        assert_eq!("green".parse::<Color>().unwrap(), Color::rgb(0, 128, 0));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("ff8000".parse::<Color>().is_err());
        assert!("#ff80".parse::<Color>().is_err());
        assert!("#gg0000".parse::<Color>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Color::rgba(1, 2, 3, 4)).unwrap();
        assert_eq!(json, "\"#01020304\"");
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Color::rgba(1, 2, 3, 4));
    }
}
