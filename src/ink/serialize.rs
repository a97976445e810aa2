//! Scale-independent stored form of an ink layer
//!
//! Points are percent of the page extent and widths are percent of the page
//! width, so a layer restores correctly onto a surface of any size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::stroke::{Color, StrokeMode};
use crate::geometry::PercentPoint;

pub const INK_FORMAT_VERSION: u32 = 1;

fn default_version() -> u32 {
    INK_FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedStroke {
    pub id: u64,
    #[serde(default)]
    pub mode: StrokeMode,
    pub color: Color,
    /// Line width as percent of the page width
    pub width: f32,
    pub points: Vec<PercentPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedInk {
    #[serde(default = "default_version")]
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub strokes: Vec<SerializedStroke>,
}

impl Default for SerializedInk {
    fn default() -> Self {
        Self::empty()
    }
}

impl SerializedInk {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: INK_FORMAT_VERSION,
            updated_at: Utc::now(),
            strokes: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut ink: Self = serde_json::from_str(json)?;
        for stroke in &mut ink.strokes {
            for point in &mut stroke.points {
                *point = point.clamped();
            }
        }
        if ink.version > INK_FORMAT_VERSION {
            log::warn!(
                "Ink layer was written by a newer format (v{}), reading as v{INK_FORMAT_VERSION}",
                ink.version
            );
        }
        Ok(ink)
    }
}
