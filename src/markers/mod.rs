//! Percent-anchored interactive overlay markers

mod overlay;

pub use overlay::{MarkerOverlay, MarkerStyle};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::PercentPoint;
use crate::ink::Color;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(pub Uuid);

impl MarkerId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MarkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A hidden answer revealed by clicking its toggle control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerMarker {
    pub id: MarkerId,
    pub page: usize,
    /// Position of the toggle control
    pub anchor: PercentPoint,
    /// Explicit position of the revealed text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_anchor: Option<PercentPoint>,
    pub text: String,
    pub color: Color,
    pub font_size: f32,
    #[serde(default)]
    pub visible: bool,
}

impl AnswerMarker {
    /// Where the revealed text goes. Without an explicit position it sits
    /// `offset` percent above the control.
    #[must_use]
    pub fn text_position(&self, offset: f32) -> PercentPoint {
        self.text_anchor
            .unwrap_or_else(|| PercentPoint::new(self.anchor.x, self.anchor.y - offset))
    }
}

/// A button that plays an audio clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrigger {
    pub id: MarkerId,
    pub page: usize,
    pub anchor: PercentPoint,
    pub audio_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Marker {
    Answer(AnswerMarker),
    Audio(AudioTrigger),
}

impl Marker {
    #[must_use]
    pub fn id(&self) -> MarkerId {
        match self {
            Marker::Answer(m) => m.id,
            Marker::Audio(m) => m.id,
        }
    }

    #[must_use]
    pub fn page(&self) -> usize {
        match self {
            Marker::Answer(m) => m.page,
            Marker::Audio(m) => m.page,
        }
    }

    #[must_use]
    pub fn anchor(&self) -> PercentPoint {
        match self {
            Marker::Answer(m) => m.anchor,
            Marker::Audio(m) => m.anchor,
        }
    }

    fn anchor_mut(&mut self) -> &mut PercentPoint {
        match self {
            Marker::Answer(m) => &mut m.anchor,
            Marker::Audio(m) => &mut m.anchor,
        }
    }

    #[must_use]
    pub fn as_answer(&self) -> Option<&AnswerMarker> {
        match self {
            Marker::Answer(m) => Some(m),
            Marker::Audio(_) => None,
        }
    }

    #[must_use]
    pub fn as_audio(&self) -> Option<&AudioTrigger> {
        match self {
            Marker::Audio(m) => Some(m),
            Marker::Answer(_) => None,
        }
    }

    /// Clamp every stored position, for data read from storage
    fn reclamp(&mut self) {
        let anchor = self.anchor_mut();
        *anchor = anchor.clamped();
        if let Marker::Answer(m) = self {
            m.text_anchor = m.text_anchor.map(PercentPoint::clamped);
        }
    }
}

/// The kind-specific fields of a marker being added
#[derive(Debug, Clone, PartialEq)]
pub enum NewMarker {
    Answer {
        text: String,
        color: Option<Color>,
        font_size: Option<f32>,
    },
    Audio {
        audio_ref: String,
        label: Option<String>,
    },
}

impl NewMarker {
    #[must_use]
    pub fn answer(text: impl Into<String>) -> Self {
        Self::Answer {
            text: text.into(),
            color: None,
            font_size: None,
        }
    }

    #[must_use]
    pub fn audio(audio_ref: impl Into<String>) -> Self {
        Self::Audio {
            audio_ref: audio_ref.into(),
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, new_label: impl Into<String>) -> Self {
        if let Self::Audio { label, .. } = &mut self {
            *label = Some(new_label.into());
        }
        self
    }
}

/// Style edit for an answer marker; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerEdit {
    pub text: Option<String>,
    pub color: Option<Color>,
    pub font_size: Option<f32>,
    pub text_position: Option<PercentPoint>,
}

fn sanitize_font_size(size: f32, fallback: f32) -> f32 {
    if size.is_finite() && size > 0.0 {
        size
    } else {
        fallback
    }
}
