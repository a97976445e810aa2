//! Render request and response types

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::{DocumentHandle, RasterizedPage};
use crate::error::{DocumentLoadError, RenderError};

/// Unique, monotonically increasing identifier for requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Parameters for rendering a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParams {
    /// Page number (1-based)
    pub page: usize,
    /// User-specified scale factor
    pub scale: f32,
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Load (or reload) a document
    Load { id: RequestId, reference: String },

    /// Rasterize one page
    Page {
        id: RequestId,
        handle: DocumentHandle,
        params: RenderParams,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    /// Document opened successfully
    Loaded {
        id: RequestId,
        handle: DocumentHandle,
        page_count: usize,
    },

    /// Document could not be opened
    LoadFailed {
        id: RequestId,
        error: DocumentLoadError,
    },

    /// Rasterized page
    Page {
        id: RequestId,
        params: RenderParams,
        data: Arc<RasterizedPage>,
    },

    /// Rasterization failed
    Error {
        id: RequestId,
        params: RenderParams,
        error: RenderError,
    },

    /// Request was superseded before the worker got to it
    Skipped(RequestId),
}

impl RenderResponse {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Loaded { id, .. }
            | Self::LoadFailed { id, .. }
            | Self::Page { id, .. }
            | Self::Error { id, .. }
            | Self::Skipped(id) => *id,
        }
    }
}

/// Shared "latest request" marker.
///
/// The coordinator advances it whenever a newer request supersedes older
/// ones; workers consult it to skip work nobody will look at.
#[derive(Clone, Debug, Default)]
pub struct RequestGate {
    latest: Arc<AtomicU64>,
}

impl RequestGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as the newest request; everything older becomes stale
    pub fn advance(&self, id: RequestId) {
        self.latest.fetch_max(id.0, Ordering::AcqRel);
    }

    #[must_use]
    pub fn is_stale(&self, id: RequestId) -> bool {
        id.0 < self.latest.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_marks_older_requests_stale() {
        let gate = RequestGate::new();
        let worker_view = gate.clone();

        gate.advance(RequestId::new(3));
        assert!(worker_view.is_stale(RequestId::new(2)));
        assert!(!worker_view.is_stale(RequestId::new(3)));
        assert!(!worker_view.is_stale(RequestId::new(4)));
    }

    #[test]
    fn gate_never_moves_backwards() {
        let gate = RequestGate::new();
        gate.advance(RequestId::new(5));
        gate.advance(RequestId::new(2));
        assert!(gate.is_stale(RequestId::new(4)));
    }
}
