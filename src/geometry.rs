//! Percent-anchored coordinate system
//!
//! Overlay geometry is stored as percentages (0-100) of the page's rendered
//! extent; pointer and hit-test geometry lives in pixels of the current
//! [`PageSurface`](crate::render::PageSurface). Conversions happen only here.

use serde::{Deserialize, Serialize};

/// Lower bound of the percent space
pub const PERCENT_MIN: f32 = 0.0;
/// Upper bound of the percent space
pub const PERCENT_MAX: f32 = 100.0;

/// Pixel dimensions of a rendered surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either axis is zero. Nothing may be sized against an empty surface.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub fn width_f32(self) -> f32 {
        self.width as f32
    }

    #[must_use]
    pub fn height_f32(self) -> f32 {
        self.height as f32
    }

    /// Whether a pixel point falls inside the surface
    #[must_use]
    pub fn contains(self, point: PixelPoint) -> bool {
        point.x >= 0.0
            && point.y >= 0.0
            && point.x < self.width_f32()
            && point.y < self.height_f32()
    }
}

impl std::fmt::Display for PixelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A position in surface pixels (origin top-left)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelPoint {
    pub x: f32,
    pub y: f32,
}

impl PixelPoint {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    #[must_use]
    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// A position in percent of the page extent, always within `[0, 100]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentPoint {
    pub x: f32,
    pub y: f32,
}

impl Default for PercentPoint {
    fn default() -> Self {
        Self::CENTER
    }
}

impl PercentPoint {
    /// Mid-page anchor used when no pointer position is known
    pub const CENTER: Self = Self { x: 50.0, y: 50.0 };

    /// Build a point, clamping both axes into `[0, 100]`
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_percent(x),
            y: clamp_percent(y),
        }
    }

    #[must_use]
    pub fn from_pixel(point: PixelPoint, size: PixelSize) -> Self {
        Self {
            x: to_percent(point.x, size.width_f32()),
            y: to_percent(point.y, size.height_f32()),
        }
    }

    #[must_use]
    pub fn to_pixel(self, size: PixelSize) -> PixelPoint {
        PixelPoint::new(
            to_pixel(self.x, size.width_f32()),
            to_pixel(self.y, size.height_f32()),
        )
    }

    /// Re-clamp after deserialization, where stored values are not trusted
    #[must_use]
    pub fn clamped(self) -> Self {
        Self::new(self.x, self.y)
    }
}

/// Clamp a percent value into `[0, 100]`. NaN collapses to 0.
#[must_use]
pub fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        PERCENT_MIN
    } else {
        value.clamp(PERCENT_MIN, PERCENT_MAX)
    }
}

/// Convert a pixel offset along an axis to percent of that axis.
///
/// The result is clamped; a non-positive or non-finite extent yields 0.
#[must_use]
pub fn to_percent(pixel_value: f32, axis_extent: f32) -> f32 {
    if !(axis_extent.is_finite() && axis_extent > 0.0) {
        return PERCENT_MIN;
    }
    clamp_percent(pixel_value / axis_extent * 100.0)
}

/// Convert a percent along an axis back to pixels
#[must_use]
pub fn to_pixel(percent: f32, axis_extent: f32) -> f32 {
    if !axis_extent.is_finite() || axis_extent <= 0.0 {
        return 0.0;
    }
    clamp_percent(percent) / 100.0 * axis_extent
}
