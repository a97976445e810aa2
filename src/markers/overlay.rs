//! Marker collection for one document

use std::collections::HashSet;

use super::{AnswerEdit, AnswerMarker, AudioTrigger, Marker, MarkerId, NewMarker, sanitize_font_size};
use crate::geometry::{PercentPoint, PixelPoint, PixelSize};
use crate::ink::Color;

/// Defaults applied to newly added answer markers
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerStyle {
    pub answer_color: Color,
    pub answer_font_size: f32,
    /// Percent the revealed text sits above its control by default
    pub answer_text_offset: f32,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            answer_color: Color::rgba(0x1E, 0x88, 0xE5, 0xFF),
            answer_font_size: 16.0,
            answer_text_offset: 10.0,
        }
    }
}

/// All markers of a document, stored in percent of their page's extent.
///
/// Pixel positions are never stored; they are computed on demand against
/// the surface size the caller passes in. Later markers sit on top of
/// earlier ones for hit-testing.
///
/// Answers revealed or hidden by a click are shown in this session only:
/// [`MarkerOverlay::persisted`] reports them with their stored state.
#[derive(Debug, Default)]
pub struct MarkerOverlay {
    markers: Vec<Marker>,
    style: MarkerStyle,
    dirty: bool,
    /// Answers whose `visible` differs from storage because of a click
    clicked: HashSet<MarkerId>,
}

impl MarkerOverlay {
    #[must_use]
    pub fn new(style: MarkerStyle) -> Self {
        Self {
            markers: Vec::new(),
            style,
            dirty: false,
            clicked: HashSet::new(),
        }
    }

    /// Merge markers read from storage underneath any added locally since
    /// the load started. Stored positions are re-clamped.
    pub fn merge_loaded(&mut self, loaded: Vec<Marker>) {
        let local = std::mem::take(&mut self.markers);
        self.markers = loaded
            .into_iter()
            .filter(|m| !local.iter().any(|l| l.id() == m.id()))
            .map(|mut m| {
                m.reclamp();
                m
            })
            .collect();
        self.dirty = !local.is_empty();
        self.markers.extend(local);
        let markers = &self.markers;
        self.clicked.retain(|id| markers.iter().any(|m| m.id() == *id));
    }

    /// Add a marker. Without a pointer position it is anchored mid-page.
    pub fn add(&mut self, kind: NewMarker, page: usize, anchor: Option<PercentPoint>) -> Marker {
        let id = MarkerId::new();
        let anchor = anchor.map_or(PercentPoint::CENTER, PercentPoint::clamped);
        let marker = match kind {
            NewMarker::Answer {
                text,
                color,
                font_size,
            } => Marker::Answer(AnswerMarker {
                id,
                page,
                anchor,
                text_anchor: None,
                text,
                color: color.unwrap_or(self.style.answer_color),
                font_size: sanitize_font_size(
                    font_size.unwrap_or(self.style.answer_font_size),
                    self.style.answer_font_size,
                ),
                visible: false,
            }),
            NewMarker::Audio { audio_ref, label } => Marker::Audio(AudioTrigger {
                id,
                page,
                anchor,
                audio_ref,
                label,
            }),
        };

        log::debug!("Added marker {id} on page {page}");
        self.markers.push(marker.clone());
        self.dirty = true;
        marker
    }

    /// Move a marker's anchor; out-of-range values are clamped
    pub fn update_position(&mut self, id: MarkerId, x: f32, y: f32) -> bool {
        let Some(marker) = self.get_mut(id) else {
            return false;
        };
        *marker.anchor_mut() = PercentPoint::new(x, y);
        self.dirty = true;
        true
    }

    /// Reveal or hide an answer. Returns false for audio triggers and
    /// unknown ids, which are left untouched.
    pub fn set_visible(&mut self, id: MarkerId, visible: bool) -> bool {
        let Some(Marker::Answer(answer)) = self.markers.iter_mut().find(|m| m.id() == id) else {
            return false;
        };
        let was_clicked = self.clicked.remove(&id);
        if answer.visible != visible || was_clicked {
            answer.visible = visible;
            self.dirty = true;
        }
        true
    }

    /// Flip an answer's reveal state, returning the new state
    pub fn toggle_visible(&mut self, id: MarkerId) -> Option<bool> {
        let visible = !self.get(id)?.as_answer()?.visible;
        self.set_visible(id, visible);
        Some(visible)
    }

    /// Flip an answer's reveal state for this session only. Never marks
    /// the collection dirty.
    pub fn toggle_revealed(&mut self, id: MarkerId) -> Option<bool> {
        let Some(Marker::Answer(answer)) = self.get_mut(id) else {
            return None;
        };
        answer.visible = !answer.visible;
        let visible = answer.visible;
        if !self.clicked.remove(&id) {
            self.clicked.insert(id);
        }
        Some(visible)
    }

    /// Markers as they should be stored, without session-only reveals
    #[must_use]
    pub fn persisted(&self) -> Vec<Marker> {
        self.markers
            .iter()
            .cloned()
            .map(|mut marker| {
                if let Marker::Answer(answer) = &mut marker {
                    if self.clicked.contains(&answer.id) {
                        answer.visible = !answer.visible;
                    }
                }
                marker
            })
            .collect()
    }

    pub fn update_answer(&mut self, id: MarkerId, edit: AnswerEdit) -> bool {
        let fallback_size = self.style.answer_font_size;
        let Some(Marker::Answer(answer)) = self.get_mut(id) else {
            return false;
        };
        if let Some(text) = edit.text {
            answer.text = text;
        }
        if let Some(color) = edit.color {
            answer.color = color;
        }
        if let Some(size) = edit.font_size {
            answer.font_size = sanitize_font_size(size, fallback_size);
        }
        if let Some(position) = edit.text_position {
            answer.text_anchor = Some(position.clamped());
        }
        self.dirty = true;
        true
    }

    pub fn update_audio(
        &mut self,
        id: MarkerId,
        audio_ref: impl Into<String>,
        label: Option<String>,
    ) -> bool {
        let Some(Marker::Audio(audio)) = self.get_mut(id) else {
            return false;
        };
        audio.audio_ref = audio_ref.into();
        audio.label = label;
        self.dirty = true;
        true
    }

    /// Set the revealed text position of an answer explicitly
    pub fn move_text(&mut self, id: MarkerId, x: f32, y: f32) -> bool {
        self.update_answer(
            id,
            AnswerEdit {
                text_position: Some(PercentPoint::new(x, y)),
                ..AnswerEdit::default()
            },
        )
    }

    pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        let index = self.markers.iter().position(|m| m.id() == id)?;
        self.dirty = true;
        self.clicked.remove(&id);
        Some(self.markers.remove(index))
    }

    pub fn on_page(&self, page: usize) -> impl Iterator<Item = &Marker> {
        self.markers.iter().filter(move |m| m.page() == page)
    }

    /// Anchor of a marker in pixels of a surface of `size`
    #[must_use]
    pub fn pixel_position(&self, id: MarkerId, size: PixelSize) -> Option<PixelPoint> {
        Some(self.get(id)?.anchor().to_pixel(size))
    }

    /// Topmost marker on `page` whose anchor is within `radius` pixels of
    /// `point`, with positions computed against `size`
    #[must_use]
    pub fn hit_test(
        &self,
        page: usize,
        point: PixelPoint,
        size: PixelSize,
        radius: f32,
    ) -> Option<MarkerId> {
        if size.is_empty() {
            return None;
        }
        self.markers
            .iter()
            .rev()
            .filter(|m| m.page() == page)
            .find(|m| m.anchor().to_pixel(size).distance(point) <= radius)
            .map(Marker::id)
    }

    /// Drag a marker so that its anchor follows `pointer` minus the offset
    /// at which it was grabbed. Returns the new, clamped anchor.
    pub fn drag_to(
        &mut self,
        id: MarkerId,
        pointer: PixelPoint,
        grab_offset: (f32, f32),
        size: PixelSize,
    ) -> Option<PercentPoint> {
        let target = pointer.offset(-grab_offset.0, -grab_offset.1);
        let anchor = PercentPoint::from_pixel(target, size);
        self.update_position(id, anchor.x, anchor.y)
            .then_some(anchor)
    }

    #[must_use]
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id() == id)
    }

    fn get_mut(&mut self, id: MarkerId) -> Option<&mut Marker> {
        self.markers.iter_mut().find(|m| m.id() == id)
    }

    #[must_use]
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    #[must_use]
    pub fn style(&self) -> &MarkerStyle {
        &self.style
    }

    /// Whether the collection changed since it was loaded or last saved
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlay() -> MarkerOverlay {
        MarkerOverlay::new(MarkerStyle::default())
    }

    #[test]
    fn new_marker_defaults_to_mid_page() {
        let mut overlay = overlay();
        let marker = overlay.add(NewMarker::answer("x = 4"), 1, None);
        assert_eq!(marker.anchor(), PercentPoint::CENTER);
        assert!(overlay.is_dirty());

        let answer = marker.as_answer().unwrap();
        assert!(!answer.visible);
        assert_eq!(answer.font_size, 16.0);
    }

    #[test]
    fn update_position_clamps() {
        let mut overlay = overlay();
        let id = overlay.add(NewMarker::audio("a.mp3"), 1, None).id();
        assert!(overlay.update_position(id, 130.0, -7.5));
        assert_eq!(
            overlay.get(id).unwrap().anchor(),
            PercentPoint { x: 100.0, y: 0.0 }
        );
    }

    #[test]
    fn drag_far_outside_the_page_stays_in_range() {
        let mut overlay = overlay();
        let id = overlay.add(NewMarker::answer("a"), 1, None).id();
        let size = PixelSize::new(800, 600);

        let pointers = [
            PixelPoint::new(-5000.0, -5000.0),
            PixelPoint::new(1e7, 250.0),
            PixelPoint::new(400.0, 1e9),
            PixelPoint::new(f32::MAX, f32::MIN),
            PixelPoint::new(f32::NAN, 12.0),
        ];
        for pointer in pointers {
            let anchor = overlay.drag_to(id, pointer, (3.0, -2.0), size).unwrap();
            assert!((0.0..=100.0).contains(&anchor.x), "{pointer:?} -> {anchor:?}");
            assert!((0.0..=100.0).contains(&anchor.y), "{pointer:?} -> {anchor:?}");
        }
    }

    #[test]
    fn pixel_position_follows_surface_size() {
        let mut overlay = overlay();
        let id = overlay
            .add(NewMarker::answer("a"), 1, Some(PercentPoint::new(50.0, 50.0)))
            .id();

        assert_eq!(
            overlay.pixel_position(id, PixelSize::new(800, 600)),
            Some(PixelPoint::new(400.0, 300.0))
        );
        assert_eq!(
            overlay.pixel_position(id, PixelSize::new(1600, 1200)),
            Some(PixelPoint::new(800.0, 600.0))
        );
    }

    #[test]
    fn visibility_toggle_ignores_audio_triggers() {
        let mut overlay = overlay();
        let answer = overlay.add(NewMarker::answer("a"), 1, None).id();
        let audio = overlay.add(NewMarker::audio("b.mp3"), 1, None).id();

        assert_eq!(overlay.toggle_visible(answer), Some(true));
        assert!(!overlay.set_visible(audio, true));
        assert_eq!(overlay.toggle_visible(audio), None);
        assert_eq!(overlay.get(audio).unwrap().as_audio().unwrap().audio_ref, "b.mp3");
    }

    #[test]
    fn click_reveals_stay_out_of_the_stored_state() {
        let mut overlay = overlay();
        let answer = overlay.add(NewMarker::answer("a"), 1, None).id();
        let shown = overlay.add(NewMarker::answer("b"), 1, None).id();
        overlay.set_visible(shown, true);

        assert_eq!(overlay.toggle_revealed(answer), Some(true));
        assert_eq!(overlay.toggle_revealed(shown), Some(false));
        assert!(overlay.get(answer).unwrap().as_answer().unwrap().visible);
        let stored = overlay.persisted();
        assert!(!stored[0].as_answer().unwrap().visible);
        assert!(stored[1].as_answer().unwrap().visible);

        // A second click puts it back; an explicit set is stored as given
        assert_eq!(overlay.toggle_revealed(answer), Some(false));
        assert!(overlay.set_visible(shown, false));
        let stored = overlay.persisted();
        assert!(!stored[0].as_answer().unwrap().visible);
        assert!(!stored[1].as_answer().unwrap().visible);
    }

    #[test]
    fn hit_test_prefers_the_topmost_marker_on_the_page() {
        let mut overlay = overlay();
        let size = PixelSize::new(1000, 1000);
        let at = Some(PercentPoint::new(10.0, 10.0));
        let lower = overlay.add(NewMarker::answer("lower"), 1, at).id();
        let upper = overlay.add(NewMarker::answer("upper"), 1, at).id();
        overlay.add(NewMarker::answer("other page"), 2, at);

        let hit = overlay.hit_test(1, PixelPoint::new(105.0, 95.0), size, 14.0);
        assert_eq!(hit, Some(upper));

        overlay.remove(upper);
        let hit = overlay.hit_test(1, PixelPoint::new(105.0, 95.0), size, 14.0);
        assert_eq!(hit, Some(lower));
        assert_eq!(
            overlay.hit_test(1, PixelPoint::new(300.0, 300.0), size, 14.0),
            None
        );
    }

    #[test]
    fn style_edits_apply_to_answers_only() {
        let mut overlay = overlay();
        let answer = overlay.add(NewMarker::answer("old"), 1, None).id();
        let audio = overlay.add(NewMarker::audio("a.mp3"), 1, None).id();

        let edit = AnswerEdit {
            text: Some("new".into()),
            font_size: Some(-3.0),
            text_position: Some(PercentPoint { x: 120.0, y: 20.0 }),
            ..AnswerEdit::default()
        };
        assert!(overlay.update_answer(answer, edit.clone()));
        assert!(!overlay.update_answer(audio, edit));

        let marker = overlay.get(answer).unwrap().as_answer().unwrap();
        assert_eq!(marker.text, "new");
        assert_eq!(marker.font_size, 16.0);
        assert_eq!(marker.text_anchor, Some(PercentPoint::new(100.0, 20.0)));

        assert!(overlay.update_audio(audio, "b.mp3", Some("Listen".into())));
        assert!(overlay.move_text(answer, 5.0, 5.0));
        assert!(!overlay.move_text(audio, 5.0, 5.0));
    }

    #[test]
    fn loaded_markers_are_reclamped_and_clean() {
        let mut overlay = overlay();
        let stored = Marker::Audio(AudioTrigger {
            id: MarkerId::new(),
            page: 1,
            anchor: PercentPoint { x: 140.0, y: -1.0 },
            audio_ref: "a.mp3".into(),
            label: None,
        });
        overlay.merge_loaded(vec![stored.clone()]);

        assert!(!overlay.is_dirty());
        assert_eq!(overlay.markers()[0].anchor(), PercentPoint::new(100.0, 0.0));

        // Markers added before the load finished stay on top
        let mut overlay = MarkerOverlay::new(MarkerStyle::default());
        let local = overlay.add(NewMarker::answer("local"), 1, None).id();
        overlay.merge_loaded(vec![stored]);
        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.markers()[1].id(), local);
        assert!(overlay.is_dirty());
    }
}
