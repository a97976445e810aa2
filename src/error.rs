//! Error taxonomy for the viewer boundaries
//!
//! Only [`DocumentLoadError`] blocks the viewer. Render, persistence and
//! audio failures are absorbed by the [`Viewer`](crate::viewer::Viewer) and
//! surfaced as non-blocking notices.

/// The external document could not be fetched or decoded
#[derive(Debug, thiserror::Error)]
pub enum DocumentLoadError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document has no pages: {0}")]
    Empty(String),

    #[error("I/O error while loading document: {0}")]
    Io(#[from] std::io::Error),
}

/// A specific page/scale rasterization failed
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("unknown document handle {0}")]
    UnknownDocument(u64),

    #[error("rasterizing page {page} failed: {detail}")]
    Raster { page: usize, detail: String },
}

impl RenderError {
    pub fn raster(page: usize, detail: impl Into<String>) -> Self {
        Self::Raster {
            page,
            detail: detail.into(),
        }
    }
}

/// Saving or loading ink layers or markers failed
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed stored data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Audio playback failed; never fatal to the viewer
#[derive(Debug, thiserror::Error)]
#[error("playing {audio_ref} failed: {detail}")]
pub struct AudioError {
    pub audio_ref: String,
    pub detail: String,
}

impl AudioError {
    pub fn new(audio_ref: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            audio_ref: audio_ref.into(),
            detail: detail.into(),
        }
    }
}
