//! Display configuration model
//!
//! Wire format matches what the overlay and config pages read: camelCase keys,
//! pixel values as `"<n>px"` strings, colors as hex strings or `transparent`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CSS color restricted to hex notation or the `transparent` keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Color {
    Transparent,
    /// Normalised to `#` followed by 3 or 6 hex digits
    Hex(String),
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "transparent" {
            return Ok(Color::Transparent);
        }

        let digits = s
            .strip_prefix('#')
            .ok_or_else(|| format!("'{}' is not a hex color", s))?;

        if !matches!(digits.len(), 3 | 6) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("'{}' is not a hex color", s));
        }

        Ok(Color::Hex(s.to_string()))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

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
        match self {
            Color::Transparent => write!(f, "transparent"),
            Color::Hex(hex) => write!(f, "{}", hex),
        }
    }
}

/// Whole-pixel length, serialized as `"<n>px"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pixels(pub u32);

impl Pixels {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl FromStr for Pixels {
    type Err = String;

    /// Accepts `"24px"` or a bare `"24"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
        number
            .parse::<u32>()
            .map(Pixels)
            .map_err(|_| format!("'{}' is not a pixel value", s))
    }
}

impl TryFrom<String> for Pixels {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pixels> for String {
    fn from(px: Pixels) -> Self {
        px.to_string()
    }
}

impl fmt::Display for Pixels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px", self.0)
    }
}

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl FromStr for TextAlign {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(TextAlign::Left),
            "center" => Ok(TextAlign::Center),
            "right" => Ok(TextAlign::Right),
            other => Err(format!("'{}' is not a text alignment", other)),
        }
    }
}

/// The single shared configuration record rendered by every subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayConfig {
    /// Caption text color
    pub color: Color,

    /// Caption font size (12-72 px)
    pub font_size: Pixels,

    /// CSS font-family list
    pub font_family: String,

    pub text_align: TextAlign,

    /// Whether older lines scroll instead of being cut
    pub scroll_enabled: bool,

    pub background_color: Color,

    /// Background opacity in percent (1-100)
    pub background_opacity: u8,

    pub padding: Pixels,
    pub padding_horizontal: Pixels,
    pub margin_left: Pixels,
    pub margin_right: Pixels,

    /// Number of caption lines kept on screen (1-50)
    pub max_lines: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: Color::Hex("#FFFFFF".to_string()),
            font_size: Pixels(24),
            font_family: "Arial, sans-serif".to_string(),
            text_align: TextAlign::Center,
            scroll_enabled: false,
            background_color: Color::Transparent,
            background_opacity: 100,
            padding: Pixels(10),
            padding_horizontal: Pixels(0),
            margin_left: Pixels(0),
            margin_right: Pixels(0),
            max_lines: 5,
        }
    }
}
