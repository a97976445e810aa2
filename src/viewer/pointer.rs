//! Pointer routing: markers first, then the active drawing tool

use super::controller::Viewer;
use crate::geometry::{PixelPoint, PixelSize};
use crate::ink::StrokeStyle;
use crate::interaction::{DragState, InteractionMode, Tool};
use crate::markers::{Marker, MarkerId};
use crate::notification::NoticeTopic;

impl Viewer {
    /// Page and size of the surface pointer input maps onto, if any.
    /// Input is ignored while the page is loading, rendering or empty.
    fn interactive_size(&self) -> Option<(usize, PixelSize)> {
        if !matches!(
            self.lifecycle,
            super::Lifecycle::Ready {
                rendering: false,
                ..
            }
        ) {
            return None;
        }
        let surface = self.render.current_surface()?;
        let size = surface.size().filter(|s| !s.is_empty())?;
        (surface.page() == self.render.current_page()).then_some((surface.page(), size))
    }

    /// Pointer pressed at `point` (pixels of the displayed surface). Returns
    /// true when the press was consumed.
    pub fn pointer_down(&mut self, point: PixelPoint) -> bool {
        let Some((page, size)) = self.interactive_size() else {
            return false;
        };

        let radius = self.config.marker_hit_radius;
        if let Some(id) = self.markers.hit_test(page, point, size, radius) {
            if self.config.editable {
                let Some(anchor) = self.markers.pixel_position(id, size) else {
                    return false;
                };
                self.finish_stroke();
                self.set_mode(InteractionMode::DraggingMarker(DragState {
                    marker: id,
                    grab_offset: (point.x - anchor.x, point.y - anchor.y),
                    start: point,
                    moved: false,
                }));
            } else {
                self.activate_marker(id);
            }
            return true;
        }

        let style = match self.mode {
            InteractionMode::DrawingPen => {
                StrokeStyle::pen(self.config.pen_color, self.config.pen_width * self.scale())
            }
            InteractionMode::DrawingEraser => {
                StrokeStyle::eraser(self.config.eraser_width * self.scale())
            }
            _ => return false,
        };
        let Some(live) = self
            .ink
            .as_mut()
            .filter(|live| live.page == page && live.layer.size() == size)
        else {
            return false;
        };
        live.layer.begin_stroke(point, style);
        live.dirty = true;
        true
    }

    pub fn pointer_move(&mut self, point: PixelPoint) -> bool {
        match self.mode {
            InteractionMode::DraggingMarker(mut drag) => {
                let Some((_, size)) = self.interactive_size() else {
                    return false;
                };
                if !drag.moved && drag.start.distance(point) > self.config.marker_hit_radius {
                    drag.moved = true;
                    self.mode = InteractionMode::DraggingMarker(drag);
                }
                if drag.moved {
                    self.markers
                        .drag_to(drag.marker, point, drag.grab_offset, size);
                }
                true
            }
            InteractionMode::DrawingPen | InteractionMode::DrawingEraser => self
                .ink
                .as_mut()
                .filter(|live| live.layer.is_drawing())
                .is_some_and(|live| live.layer.extend_stroke(point)),
            InteractionMode::Idle => false,
        }
    }

    pub fn pointer_up(&mut self, point: PixelPoint) -> bool {
        match self.mode {
            InteractionMode::DraggingMarker(drag) => {
                if drag.moved {
                    if let Some((_, size)) = self.interactive_size() {
                        self.markers
                            .drag_to(drag.marker, point, drag.grab_offset, size);
                    }
                } else {
                    self.activate_marker(drag.marker);
                }
                self.end_drag();
                true
            }
            InteractionMode::DrawingPen | InteractionMode::DrawingEraser => {
                let Some(live) = self.ink.as_mut().filter(|live| live.layer.is_drawing())
                else {
                    return false;
                };
                live.layer.extend_stroke(point);
                live.layer.finish_stroke();
                live.dirty = true;
                true
            }
            InteractionMode::Idle => false,
        }
    }

    /// Leave a drag: save the new position and fall back to no tool
    pub(super) fn end_drag(&mut self) {
        self.save_markers_if_dirty();
        self.tool = Tool::None;
        self.set_mode(InteractionMode::Idle);
    }

    /// Click on a marker: answers reveal or hide their text, audio triggers
    /// play. Reveals from a click are not saved.
    fn activate_marker(&mut self, id: MarkerId) {
        let Some(marker) = self.markers.get(id) else {
            return;
        };
        match marker {
            Marker::Answer(_) => {
                let visible = self.markers.toggle_revealed(id);
                log::debug!("Answer {id} visible: {visible:?}");
            }
            Marker::Audio(trigger) => {
                let audio_ref = trigger.audio_ref.clone();
                if let Err(e) = self.audio.play(&audio_ref) {
                    log::warn!("{e}");
                    self.warn(NoticeTopic::Audio, e.to_string());
                }
            }
        }
    }
}
