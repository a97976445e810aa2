//! Render coordinator - owns the current page/scale and the request/response
//! cycle with the document service

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};

use super::cache::SurfaceCache;
use super::request::{RenderParams, RenderRequest, RenderResponse, RequestId};
use super::state::{Command, Effect, RenderState};
use super::surface::PageSurface;
use super::worker::{WorkerGates, render_worker};
use super::{DEFAULT_CACHE_SIZE, DEFAULT_WORKERS};
use crate::document::{DocumentHandle, DocumentService};
use crate::error::{DocumentLoadError, RenderError};

/// Construction parameters for [`RenderCoordinator`]
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub initial_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub cache_size: usize,
    pub workers: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            initial_scale: 1.0,
            min_scale: 0.25,
            max_scale: 5.0,
            cache_size: DEFAULT_CACHE_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Outcome of a response that is still current
#[derive(Debug)]
pub enum RenderEvent {
    DocumentLoaded {
        handle: DocumentHandle,
        page_count: usize,
    },
    DocumentFailed(DocumentLoadError),
    SurfaceReady(PageSurface),
    RenderFailed {
        page: usize,
        scale: f32,
        error: RenderError,
    },
}

#[derive(Debug)]
struct InFlight {
    id: RequestId,
    document: u64,
    params: RenderParams,
}

/// Sequences document loads and page renders against a [`DocumentService`].
///
/// Page changes and scale changes go through the same render path. A newer
/// request always supersedes older ones: their results are discarded, and
/// the last ready surface stays displayed until the new one is ready.
pub struct RenderCoordinator {
    state: RenderState,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    next_request_id: u64,
    pending_load: Option<RequestId>,
    in_flight: Option<InFlight>,
    pending_surface: Option<PageSurface>,
    displayed: Option<PageSurface>,
    gates: WorkerGates,
    cache: Arc<Mutex<SurfaceCache>>,
    num_workers: usize,
}

impl RenderCoordinator {
    #[must_use]
    pub fn new(service: Arc<dyn DocumentService>) -> Self {
        Self::with_config(service, RenderConfig::default())
    }

    #[must_use]
    pub fn with_config(service: Arc<dyn DocumentService>, config: RenderConfig) -> Self {
        let cache = Arc::new(Mutex::new(SurfaceCache::new(config.cache_size)));
        let gates = WorkerGates::default();

        // flume receivers can be cloned, so several workers can pull from one queue.
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let num_workers = config.workers.max(1);
        for _ in 0..num_workers {
            let service = Arc::clone(&service);
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let cache = Arc::clone(&cache);
            let gates = gates.clone();

            std::thread::spawn(move || {
                render_worker(service, rx, tx, cache, gates);
            });
        }

        Self {
            state: RenderState::new(config.initial_scale, config.min_scale, config.max_scale),
            request_tx,
            response_rx,
            next_request_id: 1,
            pending_load: None,
            in_flight: None,
            pending_surface: None,
            displayed: None,
            gates,
            cache,
            num_workers,
        }
    }

    /// Start loading a document. Supersedes any earlier load and any
    /// outstanding render.
    pub fn load_document(&mut self, reference: &str) -> RequestId {
        let id = self.next_id();
        self.gates.load.advance(id);
        self.gates.render.advance(id);
        self.in_flight = None;
        self.pending_surface = None;
        self.pending_load = Some(id);

        log::info!("Loading document {reference} ({id:?})");
        let _ = self.request_tx.send(RenderRequest::Load {
            id,
            reference: reference.to_string(),
        });
        id
    }

    /// Apply a command to the render state; returns the render request it
    /// triggered, if any
    pub fn apply_command(&mut self, cmd: Command) -> Option<RequestId> {
        let effects = self.state.apply(cmd);
        self.execute_effects(effects)
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) -> Option<RequestId> {
        let mut requested = None;
        for effect in effects {
            match effect {
                Effect::InvalidateCache => {
                    self.cache
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .invalidate_all();
                }
                Effect::RenderCurrentPage => {
                    requested = self.request_render();
                }
            }
        }
        requested
    }

    /// Request the current page at the current scale.
    ///
    /// Calling again with identical arguments while a render is in flight
    /// returns the in-flight request instead of stacking another one.
    pub fn request_render(&mut self) -> Option<RequestId> {
        let handle = self.state.handle.clone()?;
        let params = self.state.render_params();
        if params.page == 0 {
            return None;
        }

        if let Some(in_flight) = &self.in_flight {
            if in_flight.document == handle.id && in_flight.params == params {
                return Some(in_flight.id);
            }
        }

        let id = self.next_id();
        self.gates.render.advance(id);
        self.in_flight = Some(InFlight {
            id,
            document: handle.id,
            params,
        });
        self.pending_surface = Some(PageSurface::pending(handle.id, params.page, params.scale));

        log::debug!(
            "Requesting page {} at scale {} ({id:?})",
            params.page,
            params.scale
        );
        let _ = self
            .request_tx
            .send(RenderRequest::Page { id, handle, params });
        Some(id)
    }

    /// Drain completed responses, dropping superseded ones
    pub fn poll(&mut self) -> Vec<RenderEvent> {
        let mut events = vec![];
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response, &mut events);
        }
        events
    }

    /// Block until at least one current event arrives, nothing is
    /// outstanding, or the timeout elapses
    pub fn wait(&mut self, timeout: Duration) -> Vec<RenderEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.poll();

        while events.is_empty() && self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(response) => {
                    self.handle_response(response, &mut events);
                    events.extend(self.poll());
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        events
    }

    fn handle_response(&mut self, response: RenderResponse, events: &mut Vec<RenderEvent>) {
        match response {
            RenderResponse::Loaded {
                id,
                handle,
                page_count,
            } => {
                if self.pending_load != Some(id) {
                    log::debug!("Discarding superseded document load {id:?}");
                    return;
                }
                self.pending_load = None;

                if page_count == 0 {
                    self.close();
                    events.push(RenderEvent::DocumentFailed(DocumentLoadError::Empty(
                        handle.reference,
                    )));
                    return;
                }

                log::info!(
                    "Document {} loaded with {page_count} pages",
                    handle.reference
                );
                events.push(RenderEvent::DocumentLoaded {
                    handle: handle.clone(),
                    page_count,
                });
                let _ = self.apply_command(Command::SetDocument { handle, page_count });
            }

            RenderResponse::LoadFailed { id, error } => {
                if self.pending_load != Some(id) {
                    log::debug!("Discarding superseded document failure {id:?}: {error}");
                    return;
                }
                self.pending_load = None;
                self.close();
                events.push(RenderEvent::DocumentFailed(error));
            }

            RenderResponse::Page { id, params, data } => {
                if !self.is_current(id) {
                    log::debug!("Discarding stale render of page {} ({id:?})", params.page);
                    return;
                }
                let Some(finished) = self.in_flight.take() else {
                    return;
                };
                self.pending_surface = None;

                let surface =
                    PageSurface::ready(finished.document, params.page, params.scale, data);
                self.displayed = Some(surface.clone());
                events.push(RenderEvent::SurfaceReady(surface));
            }

            RenderResponse::Error { id, params, error } => {
                if !self.is_current(id) {
                    log::debug!("Discarding stale render failure ({id:?}): {error}");
                    return;
                }
                self.in_flight = None;
                if let Some(surface) = self.pending_surface.as_mut() {
                    surface.fail();
                }
                log::warn!(
                    "Rendering page {} at scale {} failed: {error}",
                    params.page,
                    params.scale
                );
                events.push(RenderEvent::RenderFailed {
                    page: params.page,
                    scale: params.scale,
                    error,
                });
            }

            RenderResponse::Skipped(id) => {
                log::debug!("Worker skipped superseded request {id:?}");
            }
        }
    }

    fn is_current(&self, id: RequestId) -> bool {
        self.in_flight.as_ref().is_some_and(|f| f.id == id)
    }

    fn close(&mut self) {
        let _ = self.apply_command(Command::CloseDocument);
        self.in_flight = None;
        self.pending_surface = None;
        self.displayed = None;
    }

    #[must_use]
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    #[must_use]
    pub fn handle(&self) -> Option<&DocumentHandle> {
        self.state.handle.as_ref()
    }

    /// The last surface that reached `Ready`; retained across failures
    #[must_use]
    pub fn displayed_surface(&self) -> Option<&PageSurface> {
        self.displayed.as_ref()
    }

    /// The displayed surface, but only when it belongs to the loaded
    /// document. A surface left over from the previous document stays on
    /// screen until the new one renders and is `None` here.
    #[must_use]
    pub fn current_surface(&self) -> Option<&PageSurface> {
        if self.is_loading() {
            return None;
        }
        let document = self.handle()?.id;
        self.displayed
            .as_ref()
            .filter(|surface| surface.document() == document)
    }

    /// The surface of the newest request, while it is pending or after it failed
    #[must_use]
    pub fn pending_surface(&self) -> Option<&PageSurface> {
        self.pending_surface.as_ref()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.is_loading() || self.is_rendering()
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.state.current_page
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.page_count
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.state.scale
    }

    /// Shutdown all workers
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
