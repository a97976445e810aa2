//! Freehand ink: strokes, the per-page layer, rasterization, stored form

mod layer;
mod raster;
mod serialize;
mod stroke;

pub use layer::InkLayer;
pub use raster::{MarkerDot, compose_page, composite_over, rasterize};
pub use serialize::{INK_FORMAT_VERSION, SerializedInk, SerializedStroke};
pub use stroke::{Color, ColorParseError, Stroke, StrokeId, StrokeMode, StrokeStyle};
