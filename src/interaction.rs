//! Pointer interaction modes
//!
//! Exactly one mode is active at a time, so the ink layer and the marker
//! overlay never both consume the same pointer stream.

use crate::geometry::PixelPoint;
use crate::markers::MarkerId;

/// Tool selected by the host
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tool {
    #[default]
    None,
    Pen,
    Eraser,
}

/// An in-progress marker drag
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragState {
    pub marker: MarkerId,
    /// Pointer position minus the marker anchor at pointer-down, in pixels
    pub grab_offset: (f32, f32),
    /// Pointer position at pointer-down
    pub start: PixelPoint,
    /// Set once the pointer travelled beyond the hit radius
    pub moved: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum InteractionMode {
    #[default]
    Idle,
    DrawingPen,
    DrawingEraser,
    DraggingMarker(DragState),
}

impl InteractionMode {
    /// Mode a tool selection switches to
    #[must_use]
    pub fn for_tool(tool: Tool) -> Self {
        match tool {
            Tool::None => Self::Idle,
            Tool::Pen => Self::DrawingPen,
            Tool::Eraser => Self::DrawingEraser,
        }
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        matches!(self, Self::DrawingPen | Self::DrawingEraser)
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self, Self::DraggingMarker(_))
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DrawingPen => "drawing-pen",
            Self::DrawingEraser => "drawing-eraser",
            Self::DraggingMarker(_) => "dragging-marker",
        }
    }
}
