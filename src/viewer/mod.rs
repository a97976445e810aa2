//! Lifecycle and synchronization of the render, ink and marker layers

mod controller;
mod pointer;

pub use controller::Viewer;

use std::time::Duration;

use crate::geometry::PixelSize;
use crate::interaction::InteractionMode;
use crate::ink::Color;
use crate::markers::MarkerStyle;
use crate::notification::Notification;
use crate::render::RenderConfig;
use crate::settings::Settings;

/// Multiplier applied by one zoom step
pub const ZOOM_STEP: f32 = 1.25;

/// Everything the viewer needs from configuration
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub render: RenderConfig,
    pub pen_color: Color,
    /// Pen width in pixels at scale 1.0
    pub pen_width: f32,
    pub eraser_width: f32,
    pub marker_hit_radius: f32,
    pub marker_style: MarkerStyle,
    pub min_point_interval: Duration,
    pub notification_duration: Duration,
    /// Markers can be dragged; otherwise pointer-down on a marker activates it
    pub editable: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Settings::default().viewer_config()
    }
}

/// Where the viewer is in the load/render cycle
#[derive(Clone, Debug, PartialEq)]
pub enum Lifecycle {
    Unloaded,
    Loading,
    /// A document is open at `page`; `rendering` while a newer surface is
    /// on its way
    Ready {
        page: usize,
        rendering: bool,
    },
    /// The last load failed; nothing is displayed
    Failed {
        message: String,
    },
}

impl Lifecycle {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Lifecycle::Ready { .. })
    }
}

/// Signals for the host to drive its loading/error chrome and containers
#[derive(Clone, Debug)]
pub enum HostSignal {
    Loading,
    Ready { page: usize, page_count: usize },
    DocumentFailed { message: String },
    /// A surface became ready; the host should size its containers to it
    SurfaceResized { page: usize, size: PixelSize },
    ModeChanged(InteractionMode),
    Notice(Notification),
}
