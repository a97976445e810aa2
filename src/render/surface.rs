//! The rendered bitmap of one page

use std::sync::Arc;

use image::RgbaImage;

use crate::document::RasterizedPage;
use crate::geometry::PixelSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderStatus {
    Pending,
    Ready,
    Failed,
}

/// One rendered page at one scale.
///
/// A new surface is created for every page/scale change and supersedes the
/// previous one; surfaces are never mutated into a different page. Pixel
/// dimensions are only exposed once the surface is [`RenderStatus::Ready`].
#[derive(Clone)]
pub struct PageSurface {
    /// Handle id of the document this page belongs to
    document: u64,
    page: usize,
    scale: f32,
    status: RenderStatus,
    data: Option<Arc<RasterizedPage>>,
}

impl PageSurface {
    #[must_use]
    pub fn pending(document: u64, page: usize, scale: f32) -> Self {
        Self {
            document,
            page,
            scale,
            status: RenderStatus::Pending,
            data: None,
        }
    }

    #[must_use]
    pub fn ready(document: u64, page: usize, scale: f32, data: Arc<RasterizedPage>) -> Self {
        Self {
            document,
            page,
            scale,
            status: RenderStatus::Ready,
            data: Some(data),
        }
    }

    /// Mark this surface as failed, dropping any partial data
    pub fn fail(&mut self) {
        self.status = RenderStatus::Failed;
        self.data = None;
    }

    #[must_use]
    pub fn document(&self) -> u64 {
        self.document
    }

    /// Page number (1-based)
    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[must_use]
    pub fn status(&self) -> RenderStatus {
        self.status
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == RenderStatus::Ready
    }

    /// Pixel dimensions, or `None` while pending/failed
    #[must_use]
    pub fn size(&self) -> Option<PixelSize> {
        match (self.status, &self.data) {
            (RenderStatus::Ready, Some(data)) => Some(data.size),
            _ => None,
        }
    }

    #[must_use]
    pub fn image(&self) -> Option<&RgbaImage> {
        match (self.status, &self.data) {
            (RenderStatus::Ready, Some(data)) => Some(&data.image),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PageSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSurface")
            .field("document", &self.document)
            .field("page", &self.page)
            .field("scale", &self.scale)
            .field("status", &self.status)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;

    use super::*;

    #[test]
    fn pending_surface_hides_dimensions() {
        let surface = PageSurface::pending(1, 1, 1.0);
        assert_eq!(surface.size(), None);
        assert!(surface.image().is_none());
    }

    #[test]
    fn ready_surface_reports_dimensions() {
        let data = Arc::new(RasterizedPage::new(RgbaImage::new(600, 800)));
        let mut surface = PageSurface::ready(7, 2, 1.5, data);
        assert_eq!(surface.size(), Some(PixelSize::new(600, 800)));
        assert_eq!(surface.document(), 7);

        surface.fail();
        assert_eq!(surface.status(), RenderStatus::Failed);
        assert_eq!(surface.size(), None);
    }
}
