//! Stroke data types

use serde::{Deserialize, Serialize};

use crate::geometry::PixelPoint;

/// How a stroke combines with ink already on the layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeMode {
    /// Source-over: drawn on top of existing ink
    #[default]
    Pen,
    /// Destination-out: removes ink it crosses, leaving transparency
    Eraser,
}

/// Straight (non-premultiplied) RGBA colour, serialized as `#RRGGBBAA`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);

    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    #[must_use]
    pub const fn alpha(self) -> u8 {
        self.0[3]
    }

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA` (leading `#` optional)
    pub fn parse_hex(s: &str) -> Result<Self, ColorParseError> {
        let hex = s.trim().trim_start_matches('#');
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ColorParseError(s.to_string()))
        };
        let nibble = |i: usize| {
            u8::from_str_radix(&hex[i..=i], 16)
                .map(|v| v * 17)
                .map_err(|_| ColorParseError(s.to_string()))
        };

        if !hex.is_ascii() {
            return Err(ColorParseError(s.to_string()));
        }
        match hex.len() {
            3 => Ok(Self([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
            6 => Ok(Self([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Ok(Self([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => Err(ColorParseError(s.to_string())),
        }
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        let [r, g, b, a] = self.0;
        format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid colour {0:?}, expected #RRGGBB or #RRGGBBAA")]
pub struct ColorParseError(pub String);

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl std::str::FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}

/// Identifier of a stroke within one ink layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokeId(pub u64);

/// Pen parameters captured when a stroke starts
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    /// Line width in surface pixels
    pub width: f32,
    pub mode: StrokeMode,
}

impl StrokeStyle {
    #[must_use]
    pub fn pen(color: Color, width: f32) -> Self {
        Self {
            color,
            width,
            mode: StrokeMode::Pen,
        }
    }

    #[must_use]
    pub fn eraser(width: f32) -> Self {
        Self {
            color: Color::BLACK,
            width,
            mode: StrokeMode::Eraser,
        }
    }
}

/// One freehand ink path, in pixels of the surface it was captured on
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub id: StrokeId,
    pub points: Vec<PixelPoint>,
    pub style: StrokeStyle,
}

impl Stroke {
    #[must_use]
    pub fn mode(&self) -> StrokeMode {
        self.style.mode
    }

    #[must_use]
    pub fn first_point(&self) -> Option<PixelPoint> {
        self.points.first().copied()
    }

    #[must_use]
    pub fn last_point(&self) -> Option<PixelPoint> {
        self.points.last().copied()
    }
}
