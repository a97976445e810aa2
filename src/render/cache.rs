//! LRU cache for rasterized pages

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::request::RenderParams;
use crate::document::{DocumentHandle, RasterizedPage};

/// Cache key for rasterized pages
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Document handle id
    pub document: u64,
    /// Page number (1-based)
    pub page: usize,
    /// Scale factor (stored as millionths for stable hashing)
    pub scale_millionths: u32,
}

impl CacheKey {
    #[must_use]
    pub fn from_params(handle: &DocumentHandle, params: &RenderParams) -> Self {
        Self {
            document: handle.id,
            page: params.page,
            scale_millionths: (params.scale * 1_000_000.0) as u32,
        }
    }
}

/// LRU cache for rasterized pages
pub struct SurfaceCache {
    cache: LruCache<CacheKey, Arc<RasterizedPage>>,
}

impl SurfaceCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached page, promoting it in the LRU order
    #[must_use]
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<RasterizedPage>> {
        self.cache.get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a page into the cache, returning an Arc to the data
    pub fn insert(&mut self, key: CacheKey, data: RasterizedPage) -> Arc<RasterizedPage> {
        let arc = Arc::new(data);
        self.cache.put(key, arc.clone());
        arc
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;

    use super::*;

    fn handle() -> DocumentHandle {
        DocumentHandle {
            id: 1,
            reference: "doc".to_string(),
        }
    }

    fn page(width: u32) -> RasterizedPage {
        RasterizedPage::new(RgbaImage::new(width, 10))
    }

    fn key(page: usize, scale: f32) -> CacheKey {
        CacheKey::from_params(&handle(), &RenderParams { page, scale })
    }

    #[test]
    fn scale_is_part_of_the_key() {
        let mut cache = SurfaceCache::new(4);
        cache.insert(key(1, 1.0), page(10));

        assert!(cache.contains(&key(1, 1.0)));
        assert!(!cache.contains(&key(1, 2.0)));
    }

    #[test]
    fn lru_eviction() {
        let mut cache = SurfaceCache::new(2);
        for i in 1..=3 {
            cache.insert(key(i, 1.0), page(10));
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&key(1, 1.0)));
        assert!(cache.contains(&key(3, 1.0)));
    }

    #[test]
    fn invalidate_all_empties_the_cache() {
        let mut cache = SurfaceCache::new(4);
        cache.insert(key(1, 1.0), page(10));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
