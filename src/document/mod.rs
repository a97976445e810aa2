//! Document service boundary
//!
//! Parsing and rasterizing documents is somebody else's job; the viewer only
//! talks to a [`DocumentService`]. [`ImageDirService`] is the bundled
//! implementation that treats a directory of page images as a document.

mod image_dir;

pub use image_dir::ImageDirService;

use image::RgbaImage;

use crate::error::{DocumentLoadError, RenderError};
use crate::geometry::PixelSize;

/// Opaque handle to a loaded document
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentHandle {
    /// Service-assigned identifier, unique per successful load
    pub id: u64,
    /// The reference the document was loaded from
    pub reference: String,
}

/// A rasterized page as returned by the document service
#[derive(Clone)]
pub struct RasterizedPage {
    pub size: PixelSize,
    pub image: RgbaImage,
}

impl RasterizedPage {
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self {
            size: PixelSize::new(image.width(), image.height()),
            image,
        }
    }
}

impl std::fmt::Debug for RasterizedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterizedPage")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// External service that loads documents and rasterizes their pages.
///
/// Pages are 1-based. Implementations are called from the render worker
/// thread, so they must be shareable across threads.
pub trait DocumentService: Send + Sync {
    fn load(&self, reference: &str) -> Result<DocumentHandle, DocumentLoadError>;

    fn rasterize(
        &self,
        handle: &DocumentHandle,
        page: usize,
        scale: f32,
    ) -> Result<RasterizedPage, RenderError>;

    fn page_count(&self, handle: &DocumentHandle) -> usize;
}
