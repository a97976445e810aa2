//! Fakes and helpers shared by unit and integration tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use flume::{Receiver, Sender};
use image::{Rgba, RgbaImage};

use crate::audio::AudioPlayer;
use crate::document::{DocumentHandle, DocumentService, RasterizedPage};
use crate::error::{AudioError, DocumentLoadError, RenderError};
use crate::geometry::{PixelPoint, PixelSize};
use crate::persistence::PersistenceGateway;
use crate::viewer::{Viewer, ViewerConfig};

/// Generous upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// Document service serving blank white pages of fixed sizes at scale 1.0
pub struct FakeDocumentService {
    pages: Vec<PixelSize>,
    failing_pages: HashSet<usize>,
    failing_references: HashSet<String>,
    fail_load: bool,
    next_id: AtomicU64,
    rasterized: AtomicUsize,
}

impl FakeDocumentService {
    pub fn uniform(count: usize, width: u32, height: u32) -> Self {
        Self::with_pages(vec![PixelSize::new(width, height); count])
    }

    pub fn with_pages(pages: Vec<PixelSize>) -> Self {
        Self {
            pages,
            failing_pages: HashSet::new(),
            failing_references: HashSet::new(),
            fail_load: false,
            next_id: AtomicU64::new(1),
            rasterized: AtomicUsize::new(0),
        }
    }

    pub fn failing_page(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }

    /// Every page of documents loaded from `reference` fails to rasterize
    pub fn failing_reference(mut self, reference: &str) -> Self {
        self.failing_references.insert(reference.to_string());
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Number of pages actually rasterized (cache hits excluded)
    pub fn rasterize_count(&self) -> usize {
        self.rasterized.load(Ordering::SeqCst)
    }
}

impl DocumentService for FakeDocumentService {
    fn load(&self, reference: &str) -> Result<DocumentHandle, DocumentLoadError> {
        if self.fail_load {
            return Err(DocumentLoadError::NotFound(reference.to_string()));
        }
        Ok(DocumentHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            reference: reference.to_string(),
        })
    }

    fn rasterize(
        &self,
        handle: &DocumentHandle,
        page: usize,
        scale: f32,
    ) -> Result<RasterizedPage, RenderError> {
        if page == 0 || page > self.pages.len() {
            return Err(RenderError::PageOutOfRange {
                page,
                page_count: self.pages.len(),
            });
        }
        if self.failing_pages.contains(&page) || self.failing_references.contains(&handle.reference)
        {
            return Err(RenderError::raster(page, "injected failure"));
        }
        self.rasterized.fetch_add(1, Ordering::SeqCst);

        let size = self.pages[page - 1];
        let width = (size.width_f32() * scale).round() as u32;
        let height = (size.height_f32() * scale).round() as u32;
        Ok(RasterizedPage::new(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        )))
    }

    fn page_count(&self, _handle: &DocumentHandle) -> usize {
        self.pages.len()
    }
}

/// Wraps a [`FakeDocumentService`] and holds rasterization of chosen pages
/// until the gate is opened
pub struct GatedDocumentService {
    inner: FakeDocumentService,
    gated: Mutex<HashSet<usize>>,
    opened: Condvar,
    blocked_tx: Sender<usize>,
    blocked_rx: Receiver<usize>,
}

impl GatedDocumentService {
    pub fn new(inner: FakeDocumentService) -> Self {
        let (blocked_tx, blocked_rx) = flume::unbounded();
        Self {
            inner,
            gated: Mutex::new(HashSet::new()),
            opened: Condvar::new(),
            blocked_tx,
            blocked_rx,
        }
    }

    pub fn gate_page(&self, page: usize) {
        self.gated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page);
    }

    pub fn open_gate(&self) {
        self.gated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.opened.notify_all();
    }

    /// Wait until a worker is parked on a gated page
    pub fn wait_until_blocked(&self, timeout: Duration) -> bool {
        self.blocked_rx.recv_timeout(timeout).is_ok()
    }
}

impl DocumentService for GatedDocumentService {
    fn load(&self, reference: &str) -> Result<DocumentHandle, DocumentLoadError> {
        self.inner.load(reference)
    }

    fn rasterize(
        &self,
        handle: &DocumentHandle,
        page: usize,
        scale: f32,
    ) -> Result<RasterizedPage, RenderError> {
        let mut gated = self.gated.lock().unwrap_or_else(PoisonError::into_inner);
        if gated.contains(&page) {
            let _ = self.blocked_tx.send(page);
            while gated.contains(&page) {
                gated = self
                    .opened
                    .wait(gated)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        drop(gated);
        self.inner.rasterize(handle, page, scale)
    }

    fn page_count(&self, handle: &DocumentHandle) -> usize {
        self.inner.page_count(handle)
    }
}

/// Audio player that records what it was asked to play
#[derive(Clone, Default)]
pub struct RecordingAudioPlayer {
    played: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingAudioPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, audio_ref: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(audio_ref.to_string());
    }

    pub fn played(&self) -> Vec<String> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AudioPlayer for RecordingAudioPlayer {
    fn play(&mut self, audio_ref: &str) -> Result<(), AudioError> {
        self.played
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(audio_ref.to_string());
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(audio_ref) {
            return Err(AudioError::new(audio_ref, "injected failure"));
        }
        Ok(())
    }
}

/// Viewer config without point throttling
pub fn test_config() -> ViewerConfig {
    ViewerConfig {
        min_point_interval: Duration::ZERO,
        ..ViewerConfig::default()
    }
}

/// A viewer for `user`, loaded with `document_id` and settled on page 1
pub fn loaded_viewer(
    service: Arc<dyn DocumentService>,
    store: Arc<dyn PersistenceGateway>,
    config: ViewerConfig,
    document_id: &str,
) -> Viewer {
    let mut viewer = Viewer::new(service, store, "student-1", config);
    viewer.load_document(document_id, document_id);
    assert!(viewer.wait_idle(WAIT), "viewer did not settle");
    viewer
}

/// Pointer-down, one move per intermediate point, pointer-up
pub fn drag_pointer(viewer: &mut Viewer, points: &[(f32, f32)]) {
    let Some((first, rest)) = points.split_first() else {
        return;
    };
    viewer.pointer_down(PixelPoint::new(first.0, first.1));
    for (x, y) in rest {
        viewer.pointer_move(PixelPoint::new(*x, *y));
    }
    let last = rest.last().unwrap_or(first);
    viewer.pointer_up(PixelPoint::new(last.0, last.1));
}
