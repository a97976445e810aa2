//! The viewer: owns the render coordinator, the live ink layer, the marker
//! overlay and the persistence queue, and keeps them in step

use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, TryRecvError};
use image::RgbaImage;

use super::{HostSignal, Lifecycle, ViewerConfig, ZOOM_STEP};
use crate::audio::{AudioPlayer, LogOnlyPlayer};
use crate::document::DocumentService;
use crate::geometry::{PercentPoint, PixelPoint, PixelSize};
use crate::ink::{Color, InkLayer, MarkerDot, SerializedInk, compose_page};
use crate::interaction::{InteractionMode, Tool};
use crate::markers::{AnswerEdit, Marker, MarkerId, MarkerOverlay, NewMarker};
use crate::notification::{NoticeTopic, Notification, NotificationManager};
use crate::persistence::{InkKey, InkLoad, MarkersLoad, PersistenceGateway, SaveQueue};
use crate::render::{Command, RenderCoordinator, RenderEvent, clamp_scale};

const AUDIO_DOT_COLOR: Color = Color::rgba(0x43, 0xA0, 0x47, 0xFF);

/// Longest single block inside [`Viewer::wait_idle`] before re-polling
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// The ink layer of the displayed page, sized to its surface
#[derive(Debug)]
pub(super) struct LiveInk {
    pub(super) page: usize,
    pub(super) layer: InkLayer,
    pub(super) dirty: bool,
}

struct PendingInk {
    page: usize,
    rx: InkLoad,
}

/// Annotation viewer for one user.
///
/// Everything runs on the caller's thread except rasterization and storage,
/// which are handed to background workers. Call [`Viewer::poll`] from the
/// host's event loop to pick up their results.
pub struct Viewer {
    pub(super) config: ViewerConfig,
    pub(super) render: RenderCoordinator,
    pub(super) audio: Box<dyn AudioPlayer>,
    user_id: String,
    document_id: Option<String>,
    pub(super) lifecycle: Lifecycle,
    pub(super) tool: Tool,
    pub(super) mode: InteractionMode,
    pub(super) ink: Option<LiveInk>,
    pending_ink: Option<PendingInk>,
    /// Stored ink of the current page, waiting for a usable surface
    staged_ink: Option<(usize, SerializedInk)>,
    pub(super) markers: MarkerOverlay,
    pending_markers: Option<MarkersLoad>,
    notifications: NotificationManager,
    signals: Vec<HostSignal>,
    // Dropped last, after pending saves were queued
    storage: SaveQueue,
}

impl Viewer {
    pub fn new(
        service: Arc<dyn DocumentService>,
        gateway: Arc<dyn PersistenceGateway>,
        user_id: impl Into<String>,
        config: ViewerConfig,
    ) -> Self {
        Self {
            render: RenderCoordinator::with_config(service, config.render.clone()),
            audio: Box::new(LogOnlyPlayer),
            user_id: user_id.into(),
            document_id: None,
            lifecycle: Lifecycle::Unloaded,
            tool: Tool::None,
            mode: InteractionMode::Idle,
            ink: None,
            pending_ink: None,
            staged_ink: None,
            markers: MarkerOverlay::new(config.marker_style),
            pending_markers: None,
            notifications: NotificationManager::with_default_duration(
                config.notification_duration,
            ),
            signals: Vec::new(),
            storage: SaveQueue::new(gateway),
            config,
        }
    }

    #[must_use]
    pub fn with_audio(mut self, player: impl AudioPlayer + 'static) -> Self {
        self.audio = Box::new(player);
        self
    }

    /// Open a document. Supersedes any load still in progress; the previous
    /// document's unsaved ink and markers are persisted first.
    pub fn load_document(&mut self, document_id: impl Into<String>, reference: &str) {
        self.commit_interaction();
        self.persist_live();

        let document_id = document_id.into();
        self.ink = None;
        self.pending_ink = None;
        self.staged_ink = None;
        self.markers = MarkerOverlay::new(self.config.marker_style);
        self.pending_markers = Some(self.storage.load_markers(document_id.clone()));
        self.document_id = Some(document_id);

        self.render.load_document(reference);
        self.lifecycle = Lifecycle::Loading;
        self.signals.push(HostSignal::Loading);
    }

    /// Apply finished background work without blocking
    pub fn poll(&mut self) {
        let events = self.render.poll();
        self.handle_render_events(events);
        self.poll_ink_load(None);
        self.poll_markers_load(None);
        self.report_save_failures();
        self.sync_ink();
        self.refresh_lifecycle();
        self.notifications.update();
    }

    /// Poll until nothing is outstanding or `timeout` elapses. Returns true
    /// when the viewer settled.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            if !self.is_busy() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }

            let slice = remaining.min(WAIT_SLICE);
            if self.render.is_busy() {
                let events = self.render.wait(slice);
                self.handle_render_events(events);
            } else if self.pending_ink.is_some() {
                self.poll_ink_load(Some(slice));
            } else {
                self.poll_markers_load(Some(slice));
            }
        }
    }

    /// Render, ink or marker loads still outstanding
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.render.is_busy() || self.pending_ink.is_some() || self.pending_markers.is_some()
    }

    fn handle_render_events(&mut self, events: Vec<RenderEvent>) {
        for event in events {
            match event {
                RenderEvent::DocumentLoaded { page_count, .. } => {
                    log::debug!("Lifecycle: loading -> ready(page=1)");
                    self.lifecycle = Lifecycle::Ready {
                        page: 1,
                        rendering: true,
                    };
                    self.begin_page(1);
                    self.signals.push(HostSignal::Ready {
                        page: 1,
                        page_count,
                    });
                }

                RenderEvent::DocumentFailed(error) => {
                    log::error!("Document load failed: {error}");
                    let message = error.to_string();
                    self.ink = None;
                    self.pending_ink = None;
                    self.staged_ink = None;
                    self.pending_markers = None;
                    self.markers = MarkerOverlay::new(self.config.marker_style);
                    self.document_id = None;
                    self.lifecycle = Lifecycle::Failed {
                        message: message.clone(),
                    };
                    self.signals.push(HostSignal::DocumentFailed {
                        message: message.clone(),
                    });
                    let notice = self.notifications.error(NoticeTopic::Document, message);
                    self.signals.push(HostSignal::Notice(notice));
                }

                RenderEvent::SurfaceReady(surface) => {
                    self.notifications.dismiss_topic(NoticeTopic::Render);
                    if let Some(size) = surface.size() {
                        log::debug!("Page {} ready at {size}", surface.page());
                        self.signals.push(HostSignal::SurfaceResized {
                            page: surface.page(),
                            size,
                        });
                    }
                }

                RenderEvent::RenderFailed { page, error, .. } => {
                    self.warn(
                        NoticeTopic::Render,
                        format!("Page {page} could not be rendered: {error}"),
                    );
                }
            }
        }
    }

    /// Start loading the stored ink of `page`
    fn begin_page(&mut self, page: usize) {
        let Some(document_id) = &self.document_id else {
            return;
        };
        let key = InkKey::new(document_id.clone(), page, self.user_id.clone());
        self.staged_ink = None;
        self.pending_ink = Some(PendingInk {
            page,
            rx: self.storage.load_ink(key),
        });
    }

    fn poll_ink_load(&mut self, wait: Option<Duration>) {
        let Some(pending) = &self.pending_ink else {
            return;
        };
        let page = pending.page;
        let Some(outcome) = receive(&pending.rx, wait) else {
            return;
        };
        self.pending_ink = None;

        let ink = match outcome.unwrap_or(Ok(None)) {
            Ok(Some(ink)) => ink,
            Ok(None) => SerializedInk::empty(),
            Err(e) => {
                log::warn!("Loading ink for page {page} failed, starting empty: {e}");
                SerializedInk::empty()
            }
        };
        if page == self.render.current_page() {
            self.staged_ink = Some((page, ink));
        }
    }

    fn poll_markers_load(&mut self, wait: Option<Duration>) {
        let Some(rx) = &self.pending_markers else {
            return;
        };
        let Some(outcome) = receive(rx, wait) else {
            return;
        };
        self.pending_markers = None;

        match outcome.unwrap_or_else(|| Ok(Vec::new())) {
            Ok(markers) => {
                log::debug!("Loaded {} markers", markers.len());
                self.markers.merge_loaded(markers);
            }
            Err(e) => log::warn!("Loading markers failed, starting empty: {e}"),
        }
        // Markers added while the load was in flight
        self.save_markers_if_dirty();
    }

    fn report_save_failures(&mut self) {
        for failure in self.storage.drain_failures() {
            self.warn(
                NoticeTopic::Persistence,
                format!("Could not save {}: {}", failure.target, failure.error),
            );
        }
    }

    /// Create or resize the ink layer once the current page has a ready,
    /// non-empty surface. Nothing is ever sized against a pending one.
    fn sync_ink(&mut self) {
        let Some(surface) = self.render.current_surface() else {
            return;
        };
        let page = surface.page();
        let Some(size) = surface.size().filter(|s| !s.is_empty()) else {
            return;
        };
        if page != self.render.current_page() {
            return;
        }

        if let Some(live) = self.ink.as_mut() {
            if live.page == page {
                if live.layer.size() != size {
                    live.layer.resize(size);
                }
                return;
            }
        }

        let staged_page = self.staged_ink.as_ref().map(|(p, _)| *p);
        if staged_page != Some(page) {
            return;
        }
        if let Some((_, stored)) = self.staged_ink.take() {
            let layer = InkLayer::from_serialized(&stored, size, self.config.min_point_interval);
            log::debug!(
                "Ink layer for page {page} ready at {size} with {} strokes",
                layer.len()
            );
            self.ink = Some(LiveInk {
                page,
                layer,
                dirty: false,
            });
        }
    }

    fn refresh_lifecycle(&mut self) {
        if let Lifecycle::Ready { page, rendering } = &mut self.lifecycle {
            *page = self.render.current_page();
            *rendering = self.render.is_rendering();
        }
    }

    /// Queue the live ink layer and markers for saving if they changed
    fn persist_live(&mut self) {
        let Some(document_id) = self.document_id.clone() else {
            return;
        };
        if let Some(live) = self.ink.as_mut() {
            if live.dirty {
                let key = InkKey::new(document_id, live.page, self.user_id.clone());
                self.storage.save_ink(key, live.layer.to_serialized());
                live.dirty = false;
            }
        }
        self.save_markers_if_dirty();
    }

    pub(super) fn save_markers_if_dirty(&mut self) {
        // Saving before the stored set arrived would overwrite it
        if !self.markers.is_dirty() || self.pending_markers.is_some() {
            return;
        }
        let Some(document_id) = &self.document_id else {
            return;
        };
        self.storage
            .save_markers(document_id.clone(), self.markers.persisted());
        self.markers.mark_clean();
    }

    pub(super) fn warn(&mut self, topic: NoticeTopic, message: String) -> Notification {
        let notice = self.notifications.warn(topic, message);
        self.signals.push(HostSignal::Notice(notice.clone()));
        notice
    }

    pub(super) fn set_mode(&mut self, mode: InteractionMode) {
        if self.mode != mode {
            log::debug!("Interaction mode {} -> {}", self.mode.name(), mode.name());
            self.mode = mode;
            self.signals.push(HostSignal::ModeChanged(mode));
        }
    }

    /// Finalize a stroke or drag in progress so no input is lost
    pub(super) fn commit_interaction(&mut self) {
        self.finish_stroke();
        if self.mode.is_dragging() {
            self.end_drag();
        }
    }

    pub(super) fn finish_stroke(&mut self) {
        if let Some(live) = self.ink.as_mut() {
            if live.layer.finish_stroke().is_some() {
                live.dirty = true;
            }
        }
    }

    // ---- navigation ----

    /// Switch pages. The outgoing page's ink is saved and the new page's
    /// stored ink is loaded; both go through the single render path.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        if !self.lifecycle.is_ready() {
            return false;
        }
        let target = page.clamp(1, self.render.page_count().max(1));
        if target == self.render.current_page() {
            return false;
        }

        self.commit_interaction();
        self.persist_live();
        self.ink = None;
        self.pending_ink = None;
        self.staged_ink = None;

        log::debug!("Lifecycle: page {} -> {target}", self.render.current_page());
        self.render.apply_command(Command::GoToPage(target));
        self.begin_page(target);
        self.refresh_lifecycle();
        true
    }

    pub fn next_page(&mut self) -> bool {
        self.go_to_page(self.render.current_page() + 1)
    }

    pub fn prev_page(&mut self) -> bool {
        self.go_to_page(self.render.current_page().saturating_sub(1))
    }

    /// Change the scale; returns false when the clamped scale is unchanged
    pub fn set_scale(&mut self, scale: f32) -> bool {
        let state = self.render.state();
        let clamped = clamp_scale(scale, state.min_scale, state.max_scale);
        if (clamped - state.scale).abs() <= f32::EPSILON {
            return false;
        }

        self.commit_interaction();
        self.render.apply_command(Command::SetScale(clamped));
        self.refresh_lifecycle();
        true
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_scale(self.render.scale() * ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_scale(self.render.scale() / ZOOM_STEP)
    }

    /// Render the current page again, e.g. after a failure
    pub fn retry_render(&mut self) -> bool {
        let requested = self.render.apply_command(Command::Rerender).is_some();
        self.refresh_lifecycle();
        requested
    }

    // ---- tools and ink ----

    pub fn select_tool(&mut self, tool: Tool) {
        self.commit_interaction();
        self.tool = tool;
        self.set_mode(InteractionMode::for_tool(tool));
    }

    /// Remove the last finished stroke on the current page
    pub fn undo(&mut self) -> bool {
        self.finish_stroke();
        let Some(live) = self.ink.as_mut() else {
            return false;
        };
        let undone = live.layer.undo().is_some();
        live.dirty |= undone;
        undone
    }

    /// Remove every stroke on the current page
    pub fn clear(&mut self) -> usize {
        let Some(live) = self.ink.as_mut() else {
            return 0;
        };
        let removed = live.layer.clear();
        live.dirty |= removed > 0;
        removed
    }

    // ---- markers ----

    /// Add a marker on `page` (default: the current page) at `anchor`
    /// (default: mid-page)
    pub fn add_marker(
        &mut self,
        kind: NewMarker,
        page: Option<usize>,
        anchor: Option<PercentPoint>,
    ) -> Option<Marker> {
        self.document_id.as_ref()?;
        let page = page.unwrap_or_else(|| self.render.current_page()).max(1);
        let marker = self.markers.add(kind, page, anchor);
        self.save_markers_if_dirty();
        Some(marker)
    }

    pub fn update_marker_position(&mut self, id: MarkerId, x: f32, y: f32) -> bool {
        let changed = self.markers.update_position(id, x, y);
        self.save_markers_if_dirty();
        changed
    }

    pub fn set_marker_visible(&mut self, id: MarkerId, visible: bool) -> bool {
        let changed = self.markers.set_visible(id, visible);
        self.save_markers_if_dirty();
        changed
    }

    pub fn update_answer(&mut self, id: MarkerId, edit: AnswerEdit) -> bool {
        let changed = self.markers.update_answer(id, edit);
        self.save_markers_if_dirty();
        changed
    }

    pub fn update_audio(
        &mut self,
        id: MarkerId,
        audio_ref: impl Into<String>,
        label: Option<String>,
    ) -> bool {
        let changed = self.markers.update_audio(id, audio_ref, label);
        self.save_markers_if_dirty();
        changed
    }

    pub fn move_answer_text(&mut self, id: MarkerId, x: f32, y: f32) -> bool {
        let changed = self.markers.move_text(id, x, y);
        self.save_markers_if_dirty();
        changed
    }

    pub fn remove_marker(&mut self, id: MarkerId) -> Option<Marker> {
        if let InteractionMode::DraggingMarker(drag) = self.mode {
            if drag.marker == id {
                self.end_drag();
            }
        }
        let removed = self.markers.remove(id);
        self.save_markers_if_dirty();
        removed
    }

    /// Play an audio trigger's clip. Playback errors become notices.
    pub fn play_audio(&mut self, id: MarkerId) -> bool {
        let Some(audio_ref) = self
            .markers
            .get(id)
            .and_then(Marker::as_audio)
            .map(|a| a.audio_ref.clone())
        else {
            return false;
        };
        match self.audio.play(&audio_ref) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{e}");
                self.warn(NoticeTopic::Audio, e.to_string());
                false
            }
        }
    }

    /// A marker's anchor in pixels of the displayed surface
    #[must_use]
    pub fn marker_pixel_position(&self, id: MarkerId) -> Option<PixelPoint> {
        self.markers.pixel_position(id, self.surface_size()?)
    }

    /// Where an answer's revealed text goes, in pixels of the displayed surface
    #[must_use]
    pub fn answer_text_pixel_position(&self, id: MarkerId) -> Option<PixelPoint> {
        let answer = self.markers.get(id)?.as_answer()?;
        let position = answer.text_position(self.config.marker_style.answer_text_offset);
        Some(position.to_pixel(self.surface_size()?))
    }

    // ---- output ----

    /// The displayed page with its ink and marker dots on top
    #[must_use]
    pub fn compose_current(&self) -> Option<RgbaImage> {
        let surface = self.render.current_surface()?;
        let image = surface.image()?;
        let size = surface.size()?;
        let page = surface.page();

        let blank;
        let ink = match &self.ink {
            Some(live) if live.page == page && live.layer.size() == size => &live.layer,
            _ => {
                blank = InkLayer::new(size);
                &blank
            }
        };
        let radius = self.config.marker_hit_radius / 2.0;
        let dots: Vec<MarkerDot> = self
            .markers
            .on_page(page)
            .map(|marker| MarkerDot {
                center: marker.anchor().to_pixel(size),
                radius,
                color: match marker {
                    Marker::Answer(answer) => answer.color,
                    Marker::Audio(_) => AUDIO_DOT_COLOR,
                },
            })
            .collect();
        Some(compose_page(image, ink, &dots))
    }

    /// Persist everything and wait until storage has it
    pub fn flush(&mut self) {
        self.commit_interaction();
        self.persist_live();
        self.storage.flush();
        self.report_save_failures();
    }

    pub fn drain_signals(&mut self) -> Vec<HostSignal> {
        std::mem::take(&mut self.signals)
    }

    // ---- accessors ----

    #[must_use]
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    #[must_use]
    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.render.current_page()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.render.page_count()
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.render.scale()
    }

    #[must_use]
    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Size of the displayed ready surface of the loaded document
    #[must_use]
    pub fn surface_size(&self) -> Option<PixelSize> {
        self.render.current_surface()?.size()
    }

    /// Page of the loaded document that is on screen. `None` while only a
    /// previous document's page is showing.
    #[must_use]
    pub fn displayed_page(&self) -> Option<usize> {
        self.render.current_surface().map(|s| s.page())
    }

    /// The current page's ink layer, once its surface is ready
    #[must_use]
    pub fn ink_layer(&self) -> Option<&InkLayer> {
        self.ink
            .as_ref()
            .filter(|live| live.page == self.render.current_page())
            .map(|live| &live.layer)
    }

    #[must_use]
    pub fn markers(&self) -> &MarkerOverlay {
        &self.markers
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationManager {
        &self.notifications
    }

    #[must_use]
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.commit_interaction();
        self.persist_live();
    }
}

/// Non-blocking or bounded receive. `None` while nothing arrived yet,
/// `Some(None)` when the sender is gone.
fn receive<T>(rx: &Receiver<T>, wait: Option<Duration>) -> Option<Option<T>> {
    let result = match wait {
        Some(timeout) => rx
            .recv_timeout(timeout)
            .map_err(|e| matches!(e, RecvTimeoutError::Disconnected)),
        None => rx
            .try_recv()
            .map_err(|e| matches!(e, TryRecvError::Disconnected)),
    };
    match result {
        Ok(value) => Some(Some(value)),
        Err(true) => Some(None),
        Err(false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_distinguishes_empty_from_disconnected() {
        let (tx, rx) = flume::bounded::<u32>(1);
        assert_eq!(receive(&rx, None), None);
        assert_eq!(receive(&rx, Some(Duration::from_millis(1))), None);

        tx.send(7).unwrap();
        assert_eq!(receive(&rx, None), Some(Some(7)));

        drop(tx);
        assert_eq!(receive(&rx, None), Some(None));
        assert_eq!(receive(&rx, Some(Duration::from_millis(1))), Some(None));
    }
}
