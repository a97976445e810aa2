//! A document made of one image file per page

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops::FilterType;

use super::{DocumentHandle, DocumentService, RasterizedPage};
use crate::error::{DocumentLoadError, RenderError};

const PAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Serves a directory of page images (sorted by file name) as a document.
///
/// Rasterizing at scale 1.0 returns the image at its native size; other
/// scales resample it.
///
/// Only the newest load of each reference is kept; loading a directory again
/// retires the previous handle for it.
pub struct ImageDirService {
    next_id: AtomicU64,
    documents: Mutex<HashMap<u64, LoadedDocument>>,
}

struct LoadedDocument {
    reference: String,
    pages: Vec<PathBuf>,
}

impl Default for ImageDirService {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDirService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn page_paths(dir: &Path) -> Result<Vec<PathBuf>, DocumentLoadError> {
        if !dir.is_dir() {
            return Err(DocumentLoadError::NotFound(dir.display().to_string()));
        }

        let mut pages: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| PAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        pages.sort();
        Ok(pages)
    }

    fn page_path(&self, handle: &DocumentHandle, page: usize) -> Result<PathBuf, RenderError> {
        let documents = self
            .documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let pages = &documents
            .get(&handle.id)
            .ok_or(RenderError::UnknownDocument(handle.id))?
            .pages;

        if page == 0 || page > pages.len() {
            return Err(RenderError::PageOutOfRange {
                page,
                page_count: pages.len(),
            });
        }
        Ok(pages[page - 1].clone())
    }
}

impl DocumentService for ImageDirService {
    fn load(&self, reference: &str) -> Result<DocumentHandle, DocumentLoadError> {
        let pages = Self::page_paths(Path::new(reference))?;
        if pages.is_empty() {
            return Err(DocumentLoadError::Empty(reference.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        log::debug!("Loaded image document {reference} with {} pages", pages.len());
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        documents.retain(|_, loaded| loaded.reference != reference);
        documents.insert(
            id,
            LoadedDocument {
                reference: reference.to_string(),
                pages,
            },
        );

        Ok(DocumentHandle {
            id,
            reference: reference.to_string(),
        })
    }

    fn rasterize(
        &self,
        handle: &DocumentHandle,
        page: usize,
        scale: f32,
    ) -> Result<RasterizedPage, RenderError> {
        let path = self.page_path(handle, page)?;
        let source = image::open(&path)
            .map_err(|e| RenderError::raster(page, format!("{}: {e}", path.display())))?
            .to_rgba8();

        if (scale - 1.0).abs() <= f32::EPSILON {
            return Ok(RasterizedPage::new(source));
        }

        let width = ((source.width() as f32 * scale).round() as u32).max(1);
        let height = ((source.height() as f32 * scale).round() as u32).max(1);
        let scaled = image::imageops::resize(&source, width, height, FilterType::Triangle);
        Ok(RasterizedPage::new(scaled))
    }

    fn page_count(&self, handle: &DocumentHandle) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&handle.id)
            .map_or(0, |loaded| loaded.pages.len())
    }
}
