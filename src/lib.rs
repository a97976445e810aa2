//! Paginated document annotation engine: page rendering, freehand ink layers
//! and percent-anchored markers kept in sync across pages and zoom levels.

pub mod audio;
pub mod document;
pub mod error;
pub mod geometry;
pub mod ink;
pub mod interaction;
pub mod markers;
pub mod notification;
pub mod persistence;
pub mod render;
pub mod settings;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use viewer::{HostSignal, Lifecycle, Viewer, ViewerConfig};
