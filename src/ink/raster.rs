//! Software rasterization of ink layers and page composition
//!
//! The ink layer is drawn into its own transparent buffer. Pen strokes
//! blend source-over; eraser strokes are destination-out and only reduce the
//! alpha of ink already on the layer, so the page image underneath is never
//! touched. The layer buffer is then composited over the page.

use image::{Rgba, RgbaImage};

use super::layer::InkLayer;
use super::stroke::{Color, Stroke, StrokeMode};
use crate::geometry::{PixelPoint, PixelSize};

/// A filled circle drawn on top of the composed page, used for marker anchors
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerDot {
    pub center: PixelPoint,
    pub radius: f32,
    pub color: Color,
}

/// Rasterize every stroke of `layer`, in order, into a transparent buffer
#[must_use]
pub fn rasterize(layer: &InkLayer) -> RgbaImage {
    let size = layer.size();
    let mut canvas = RgbaImage::new(size.width, size.height);
    if size.is_empty() {
        return canvas;
    }

    for stroke in layer.strokes().iter().chain(layer.active_stroke()) {
        draw_stroke(&mut canvas, stroke);
    }
    canvas
}

/// Base page image with the ink layer and marker dots on top
#[must_use]
pub fn compose_page(base: &RgbaImage, ink: &InkLayer, dots: &[MarkerDot]) -> RgbaImage {
    let mut page = base.clone();
    let layer = rasterize(ink);
    if layer.dimensions() != page.dimensions() {
        log::warn!(
            "Ink layer is {}x{} but the page is {}x{}",
            layer.width(),
            layer.height(),
            page.width(),
            page.height()
        );
    }
    composite_over(&mut page, &layer);

    for dot in dots {
        let mask = Coverage::disc(dot.center, dot.radius, page_size(&page));
        mask.apply(&mut page, |dst, cov| blend_over(dst, dot.color, cov));
    }
    page
}

/// Source-over `overlay` onto `base`. Only the overlapping region is touched.
pub fn composite_over(base: &mut RgbaImage, overlay: &RgbaImage) {
    let width = base.width().min(overlay.width());
    let height = base.height().min(overlay.height());
    for y in 0..height {
        for x in 0..width {
            let src = overlay.get_pixel(x, y);
            if src.0[3] == 0 {
                continue;
            }
            let dst = base.get_pixel_mut(x, y);
            blend_over(dst, Color(src.0), 1.0);
        }
    }
}

fn page_size(image: &RgbaImage) -> PixelSize {
    PixelSize::new(image.width(), image.height())
}

fn draw_stroke(canvas: &mut RgbaImage, stroke: &Stroke) {
    let Some(mask) = Coverage::stroke(stroke, page_size(canvas)) else {
        return;
    };
    match stroke.mode() {
        StrokeMode::Pen => {
            let color = stroke.style.color;
            mask.apply(canvas, |dst, cov| blend_over(dst, color, cov));
        }
        StrokeMode::Eraser => mask.apply(canvas, erase),
    }
}

/// Per-stroke coverage over the stroke's bounding box.
///
/// Stamps take the maximum coverage, so overlapping dabs of one stroke do
/// not accumulate opacity.
struct Coverage {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl Coverage {
    fn stroke(stroke: &Stroke, bounds: PixelSize) -> Option<Self> {
        let radius = (stroke.style.width / 2.0).max(0.5);
        let first = stroke.first_point()?;
        let (mut min, mut max) = (first, first);
        for p in &stroke.points {
            min = PixelPoint::new(min.x.min(p.x), min.y.min(p.y));
            max = PixelPoint::new(max.x.max(p.x), max.y.max(p.y));
        }

        let mut mask = Self::covering(min, max, radius, bounds)?;
        mask.stamp(first, radius);
        for pair in stroke.points.windows(2) {
            mask.stamp_segment(pair[0], pair[1], radius);
        }
        Some(mask)
    }

    fn disc(center: PixelPoint, radius: f32, bounds: PixelSize) -> Self {
        match Self::covering(center, center, radius, bounds) {
            Some(mut mask) => {
                mask.stamp(center, radius);
                mask
            }
            None => Self {
                x0: 0,
                y0: 0,
                width: 0,
                height: 0,
                values: Vec::new(),
            },
        }
    }

    fn covering(min: PixelPoint, max: PixelPoint, radius: f32, bounds: PixelSize) -> Option<Self> {
        if bounds.is_empty() {
            return None;
        }
        let pad = radius + 1.0;
        let clamp_x = |v: f32| (v.max(0.0) as u32).min(bounds.width);
        let clamp_y = |v: f32| (v.max(0.0) as u32).min(bounds.height);
        let x0 = clamp_x((min.x - pad).floor());
        let y0 = clamp_y((min.y - pad).floor());
        let x1 = clamp_x((max.x + pad).ceil());
        let y1 = clamp_y((max.y + pad).ceil());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let (width, height) = (x1 - x0, y1 - y0);
        Some(Self {
            x0,
            y0,
            width,
            height,
            values: vec![0.0; (width * height) as usize],
        })
    }

    fn stamp_segment(&mut self, from: PixelPoint, to: PixelPoint, radius: f32) {
        let length = from.distance(to);
        let step = (radius * 0.25).max(0.5);
        let steps = (length / step).ceil().max(1.0) as u32;
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            let p = PixelPoint::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
            self.stamp(p, radius);
        }
    }

    fn stamp(&mut self, center: PixelPoint, radius: f32) {
        let reach = radius + 1.0;
        let lo_x = ((center.x - reach).floor().max(self.x0 as f32)) as u32;
        let lo_y = ((center.y - reach).floor().max(self.y0 as f32)) as u32;
        let hi_x = ((center.x + reach).ceil().max(0.0) as u32).min(self.x0 + self.width);
        let hi_y = ((center.y + reach).ceil().max(0.0) as u32).min(self.y0 + self.height);

        for y in lo_y..hi_y {
            for x in lo_x..hi_x {
                // Sample at the pixel centre; one pixel of anti-aliased edge
                let d = PixelPoint::new(x as f32 + 0.5, y as f32 + 0.5).distance(center);
                let cov = (radius + 0.5 - d).clamp(0.0, 1.0);
                if cov > 0.0 {
                    let idx = ((y - self.y0) * self.width + (x - self.x0)) as usize;
                    let slot = &mut self.values[idx];
                    *slot = slot.max(cov);
                }
            }
        }
    }

    fn apply(&self, image: &mut RgbaImage, mut op: impl FnMut(&mut Rgba<u8>, f32)) {
        for row in 0..self.height {
            for col in 0..self.width {
                let cov = self.values[(row * self.width + col) as usize];
                if cov > 0.0 {
                    op(image.get_pixel_mut(self.x0 + col, self.y0 + row), cov);
                }
            }
        }
    }
}

/// Straight-alpha source-over of `color` at `coverage` onto `dst`
fn blend_over(dst: &mut Rgba<u8>, color: Color, coverage: f32) {
    let src_a = f32::from(color.alpha()) / 255.0 * coverage;
    if src_a <= 0.0 {
        return;
    }
    let dst_a = f32::from(dst.0[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let s = f32::from(color.0[c]);
        let d = f32::from(dst.0[c]);
        out[c] = ((s * src_a + d * dst_a * (1.0 - src_a)) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    *dst = Rgba(out);
}

/// Destination-out: remove `coverage` of the existing alpha
fn erase(dst: &mut Rgba<u8>, coverage: f32) {
    let alpha = (f32::from(dst.0[3]) * (1.0 - coverage)).round();
    if alpha <= 0.0 {
        *dst = Rgba([0, 0, 0, 0]);
    } else {
        dst.0[3] = alpha as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::stroke::StrokeStyle;

    const RED: Color = Color::rgba(255, 0, 0, 255);

    fn line(layer: &mut InkLayer, style: StrokeStyle, from: (f32, f32), to: (f32, f32)) {
        layer.begin_stroke(PixelPoint::new(from.0, from.1), style);
        layer.extend_stroke(PixelPoint::new(to.0, to.1));
        layer.finish_stroke();
    }

    fn textured(size: PixelSize) -> RgbaImage {
        RgbaImage::from_fn(size.width, size.height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    #[test]
    fn pen_paints_along_the_path() {
        let mut layer = InkLayer::new(PixelSize::new(100, 100));
        line(&mut layer, StrokeStyle::pen(RED, 6.0), (10.0, 50.0), (90.0, 50.0));

        let image = rasterize(&layer);
        assert_eq!(image.get_pixel(50, 50), &Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(50, 10).0[3], 0);
    }

    #[test]
    fn eraser_after_pen_leaves_full_transparency() {
        let mut layer = InkLayer::new(PixelSize::new(100, 100));
        line(&mut layer, StrokeStyle::pen(RED, 6.0), (10.0, 50.0), (90.0, 50.0));
        line(&mut layer, StrokeStyle::eraser(20.0), (50.0, 20.0), (50.0, 80.0));

        let image = rasterize(&layer);
        assert_eq!(image.get_pixel(50, 50), &Rgba([0, 0, 0, 0]));
        // Ink outside the eraser path is untouched
        assert_eq!(image.get_pixel(20, 50), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn pen_after_eraser_paints_again() {
        let mut layer = InkLayer::new(PixelSize::new(60, 60));
        line(&mut layer, StrokeStyle::pen(RED, 4.0), (5.0, 30.0), (55.0, 30.0));
        line(&mut layer, StrokeStyle::eraser(30.0), (30.0, 0.0), (30.0, 60.0));
        line(&mut layer, StrokeStyle::pen(Color::BLACK, 4.0), (5.0, 30.0), (55.0, 30.0));

        let image = rasterize(&layer);
        assert_eq!(image.get_pixel(30, 30), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn erasing_never_reaches_the_page_image() {
        let size = PixelSize::new(80, 80);
        let base = textured(size);
        let mut layer = InkLayer::new(size);
        line(&mut layer, StrokeStyle::pen(RED, 8.0), (0.0, 40.0), (80.0, 40.0));
        line(&mut layer, StrokeStyle::eraser(24.0), (40.0, 0.0), (40.0, 80.0));

        let composed = compose_page(&base, &layer, &[]);
        assert_eq!(composed.get_pixel(40, 40), base.get_pixel(40, 40));
        assert_eq!(composed.get_pixel(10, 40), &Rgba([255, 0, 0, 255]));
        assert_eq!(composed.get_pixel(10, 10), base.get_pixel(10, 10));
    }

    #[test]
    fn eraser_on_empty_layer_is_a_no_op() {
        let size = PixelSize::new(40, 40);
        let base = textured(size);
        let mut layer = InkLayer::new(size);
        line(&mut layer, StrokeStyle::eraser(40.0), (0.0, 0.0), (40.0, 40.0));

        assert_eq!(compose_page(&base, &layer, &[]), base);
    }

    #[test]
    fn marker_dots_draw_on_top() {
        let size = PixelSize::new(50, 50);
        let base = RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 255]));
        let layer = InkLayer::new(size);
        let dot = MarkerDot {
            center: PixelPoint::new(25.0, 25.0),
            radius: 5.0,
            color: Color::rgba(0, 0, 255, 255),
        };

        let composed = compose_page(&base, &layer, &[dot]);
        assert_eq!(composed.get_pixel(25, 25), &Rgba([0, 0, 255, 255]));
        assert_eq!(composed.get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
    }
}
