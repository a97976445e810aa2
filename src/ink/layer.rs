//! The live ink layer for the displayed page

use std::time::{Duration, Instant};

use chrono::Utc;

use super::serialize::{INK_FORMAT_VERSION, SerializedInk, SerializedStroke};
use super::stroke::{Stroke, StrokeId, StrokeStyle};
use crate::geometry::{PercentPoint, PixelPoint, PixelSize, to_percent, to_pixel};

#[derive(Debug)]
struct ActiveStroke {
    stroke: Stroke,
    last_sample: Instant,
    /// Newest point that arrived inside the throttle window
    deferred: Option<PixelPoint>,
}

/// Strokes of one page, captured in pixels of the current surface.
///
/// The finalized stroke list doubles as the undo stack. Stored form is
/// percent-based (see [`SerializedInk`]); pixels are only used live.
#[derive(Debug)]
pub struct InkLayer {
    size: PixelSize,
    strokes: Vec<Stroke>,
    active: Option<ActiveStroke>,
    next_id: u64,
    min_point_interval: Duration,
}

impl InkLayer {
    #[must_use]
    pub fn new(size: PixelSize) -> Self {
        Self::with_point_interval(size, Duration::ZERO)
    }

    /// Points arriving closer together than `interval` are coalesced;
    /// the first and last point of a stroke are always kept.
    #[must_use]
    pub fn with_point_interval(size: PixelSize, interval: Duration) -> Self {
        Self {
            size,
            strokes: Vec::new(),
            active: None,
            next_id: 1,
            min_point_interval: interval,
        }
    }

    /// Rebuild a layer from its stored form onto a surface of `size`
    #[must_use]
    pub fn from_serialized(ink: &SerializedInk, size: PixelSize, interval: Duration) -> Self {
        let mut layer = Self::with_point_interval(size, interval);
        for stored in &ink.strokes {
            let stroke = Stroke {
                id: StrokeId(stored.id),
                points: stored.points.iter().map(|p| p.to_pixel(size)).collect(),
                style: StrokeStyle {
                    color: stored.color,
                    width: to_pixel(stored.width, size.width_f32()),
                    mode: stored.mode,
                },
            };
            layer.next_id = layer.next_id.max(stored.id + 1);
            layer.strokes.push(stroke);
        }
        layer
    }

    #[must_use]
    pub fn to_serialized(&self) -> SerializedInk {
        let size = self.size;
        SerializedInk {
            version: INK_FORMAT_VERSION,
            updated_at: Utc::now(),
            strokes: self
                .strokes
                .iter()
                .map(|stroke| SerializedStroke {
                    id: stroke.id.0,
                    mode: stroke.style.mode,
                    color: stroke.style.color,
                    width: to_percent(stroke.style.width, size.width_f32()),
                    points: stroke
                        .points
                        .iter()
                        .map(|p| PercentPoint::from_pixel(*p, size))
                        .collect(),
                })
                .collect(),
        }
    }

    /// Start a stroke; an unfinished stroke is finalized first
    pub fn begin_stroke(&mut self, point: PixelPoint, style: StrokeStyle) -> StrokeId {
        self.finish_stroke();

        let id = StrokeId(self.next_id);
        self.next_id += 1;
        self.active = Some(ActiveStroke {
            stroke: Stroke {
                id,
                points: vec![self.clamp_point(point)],
                style,
            },
            last_sample: Instant::now(),
            deferred: None,
        });
        id
    }

    /// Append a point to the active stroke. Returns false when there is no
    /// active stroke.
    pub fn extend_stroke(&mut self, point: PixelPoint) -> bool {
        self.extend_stroke_at(point, Instant::now())
    }

    pub fn extend_stroke_at(&mut self, point: PixelPoint, now: Instant) -> bool {
        let point = self.clamp_point(point);
        let interval = self.min_point_interval;
        let Some(active) = self.active.as_mut() else {
            return false;
        };

        if now.saturating_duration_since(active.last_sample) >= interval {
            active.stroke.points.push(point);
            active.last_sample = now;
            active.deferred = None;
        } else {
            active.deferred = Some(point);
        }
        true
    }

    /// Finalize the active stroke and push it onto the undo stack
    pub fn finish_stroke(&mut self) -> Option<StrokeId> {
        let ActiveStroke {
            mut stroke,
            deferred,
            ..
        } = self.active.take()?;

        if let Some(last) = deferred {
            stroke.points.push(last);
        }
        let id = stroke.id;
        self.strokes.push(stroke);
        Some(id)
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    /// Remove the most recently finalized stroke
    pub fn undo(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }

    /// Remove every stroke on this page, including one in progress
    pub fn clear(&mut self) -> usize {
        self.active = None;
        let removed = self.strokes.len();
        self.strokes.clear();
        removed
    }

    /// Re-anchor all strokes onto a surface of a different size
    pub fn resize(&mut self, new_size: PixelSize) {
        if new_size == self.size || new_size.is_empty() {
            return;
        }
        let old = self.size;
        if old.is_empty() {
            self.size = new_size;
            return;
        }

        let rescale = |stroke: &mut Stroke| {
            for point in &mut stroke.points {
                *point = PercentPoint::from_pixel(*point, old).to_pixel(new_size);
            }
            stroke.style.width = to_pixel(
                to_percent(stroke.style.width, old.width_f32()),
                new_size.width_f32(),
            );
        };

        self.strokes.iter_mut().for_each(rescale);
        if let Some(active) = self.active.as_mut() {
            rescale(&mut active.stroke);
            if let Some(deferred) = active.deferred.as_mut() {
                *deferred = PercentPoint::from_pixel(*deferred, old).to_pixel(new_size);
            }
        }
        log::debug!("Ink layer resized {old} -> {new_size}");
        self.size = new_size;
    }

    fn clamp_point(&self, point: PixelPoint) -> PixelPoint {
        let clamp = |v: f32, max: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, max) };
        PixelPoint::new(
            clamp(point.x, self.size.width_f32()),
            clamp(point.y, self.size.height_f32()),
        )
    }

    #[must_use]
    pub fn size(&self) -> PixelSize {
        self.size
    }

    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    #[must_use]
    pub fn active_stroke(&self) -> Option<&Stroke> {
        self.active.as_ref().map(|a| &a.stroke)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.active.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::stroke::{Color, StrokeMode};

    fn pen() -> StrokeStyle {
        StrokeStyle::pen(Color::BLACK, 4.0)
    }

    fn draw(layer: &mut InkLayer, from: (f32, f32), to: (f32, f32)) -> StrokeId {
        let id = layer.begin_stroke(PixelPoint::new(from.0, from.1), pen());
        layer.extend_stroke(PixelPoint::new(to.0, to.1));
        layer.finish_stroke();
        id
    }

    #[test]
    fn stroke_lifecycle() {
        let mut layer = InkLayer::new(PixelSize::new(600, 800));
        let id = layer.begin_stroke(PixelPoint::new(10.0, 10.0), pen());
        assert!(layer.is_drawing());
        assert!(layer.strokes().is_empty());

        layer.extend_stroke(PixelPoint::new(20.0, 20.0));
        assert_eq!(layer.finish_stroke(), Some(id));
        assert!(!layer.is_drawing());
        assert_eq!(layer.strokes()[0].points.len(), 2);
    }

    #[test]
    fn undo_on_empty_layer_changes_nothing() {
        let mut layer = InkLayer::new(PixelSize::new(100, 100));
        assert!(layer.undo().is_none());
        assert!(layer.is_empty());
        assert_eq!(layer.to_serialized().strokes, vec![]);
    }

    #[test]
    fn undo_removes_only_the_last_stroke() {
        let mut layer = InkLayer::new(PixelSize::new(100, 100));
        let first = draw(&mut layer, (1.0, 1.0), (5.0, 5.0));
        let second = draw(&mut layer, (10.0, 10.0), (50.0, 50.0));

        assert_eq!(layer.undo().map(|s| s.id), Some(second));
        assert_eq!(layer.strokes().len(), 1);
        assert_eq!(layer.strokes()[0].id, first);
    }

    #[test]
    fn throttle_keeps_start_and_end_points() {
        let mut layer =
            InkLayer::with_point_interval(PixelSize::new(100, 100), Duration::from_secs(3600));
        layer.begin_stroke(PixelPoint::new(1.0, 1.0), pen());
        let now = Instant::now();
        for i in 2..10 {
            layer.extend_stroke_at(PixelPoint::new(i as f32, i as f32), now);
        }
        layer.finish_stroke();

        let points = &layer.strokes()[0].points;
        assert_eq!(points.first(), Some(&PixelPoint::new(1.0, 1.0)));
        assert_eq!(points.last(), Some(&PixelPoint::new(9.0, 9.0)));
        assert!(points.len() < 9);
    }

    #[test]
    fn points_are_clamped_to_the_surface() {
        let mut layer = InkLayer::new(PixelSize::new(100, 50));
        draw(&mut layer, (-10.0, 20.0), (500.0, 500.0));
        let points = &layer.strokes()[0].points;
        assert_eq!(points[0], PixelPoint::new(0.0, 20.0));
        assert_eq!(points[1], PixelPoint::new(100.0, 50.0));
    }

    #[test]
    fn resize_reanchors_strokes() {
        let mut layer = InkLayer::new(PixelSize::new(800, 600));
        draw(&mut layer, (400.0, 300.0), (800.0, 600.0));

        layer.resize(PixelSize::new(1600, 1200));

        let stroke = &layer.strokes()[0];
        assert_eq!(stroke.points[0], PixelPoint::new(800.0, 600.0));
        assert_eq!(stroke.points[1], PixelPoint::new(1600.0, 1200.0));
        assert!((stroke.style.width - 8.0).abs() < 1e-3);
    }

    #[test]
    fn serialized_form_restores_onto_a_different_surface() {
        let mut layer = InkLayer::new(PixelSize::new(600, 800));
        draw(&mut layer, (150.0, 200.0), (300.0, 400.0));
        layer.begin_stroke(PixelPoint::new(1.0, 1.0), StrokeStyle::eraser(20.0));
        layer.finish_stroke();

        let stored = layer.to_serialized();
        assert!((stored.strokes[0].points[0].x - 25.0).abs() < 1e-4);

        let restored =
            InkLayer::from_serialized(&stored, PixelSize::new(1200, 1600), Duration::ZERO);
        assert_eq!(restored.strokes().len(), 2);
        let p = restored.strokes()[0].points[1];
        assert!((p.x - 600.0).abs() < 0.01 && (p.y - 800.0).abs() < 0.01);
        assert_eq!(restored.strokes()[1].mode(), StrokeMode::Eraser);

        // Ids continue after the restored ones
        let mut restored = restored;
        let next = restored.begin_stroke(PixelPoint::new(0.0, 0.0), pen());
        assert!(next.0 > stored.strokes[1].id);
    }

    #[test]
    fn clear_drops_everything_including_active_stroke() {
        let mut layer = InkLayer::new(PixelSize::new(100, 100));
        draw(&mut layer, (1.0, 1.0), (2.0, 2.0));
        layer.begin_stroke(PixelPoint::new(3.0, 3.0), pen());

        assert_eq!(layer.clear(), 1);
        assert!(layer.is_empty());
    }
}
