//! Bounded cache of textures created from sampler images.

use std::collections::VecDeque;

use image::RgbaImage;

use crate::error::EngineError;
use crate::gl::GraphicsApi;
use crate::recycle::RecycleBin;

pub const IMAGE_CACHE_CAPACITY: usize = 10;

/// Textures keyed by case-insensitive source path or image identity.
///
/// Lookups move an entry to the back. The cache may grow past capacity
/// while textures are bound; `trim` evicts from the front and queues the
/// evicted textures for deletion.
#[derive(Debug)]
pub struct ImageCache {
    entries: VecDeque<(String, u32)>,
    capacity: usize,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::with_capacity(IMAGE_CACHE_CAPACITY)
    }
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// The cached texture for `key`, refreshed to most recently used.
    pub fn get(&mut self, key: &str) -> Option<u32> {
        let key = key.to_lowercase();
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        let entry = self.entries.remove(index)?;
        let texture = entry.1;
        self.entries.push_back(entry);
        Some(texture)
    }

    /// Adds a texture as the most recently used entry.
    pub fn insert(&mut self, key: &str, texture: u32, bin: &mut RecycleBin) {
        let key = key.to_lowercase();
        if let Some(index) = self.entries.iter().position(|(k, _)| *k == key) {
            if let Some((_, old)) = self.entries.remove(index) {
                if old != texture {
                    bin.add_texture(old);
                }
            }
        }
        self.entries.push_back((key, texture));
    }

    /// Evicts the oldest entries beyond capacity and returns how many went.
    ///
    /// Only call this once no binding still refers to a cached texture.
    pub fn trim(&mut self, bin: &mut RecycleBin) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((key, texture)) = self.entries.pop_front() else {
                break;
            };
            log::debug!("evicting cached image '{key}'");
            bin.add_texture(texture);
            evicted += 1;
        }
        evicted
    }

    /// Returns the cached texture for `key`, loading and uploading the
    /// image on a miss.
    pub fn get_or_load(
        &mut self,
        key: &str,
        api: &dyn GraphicsApi,
        bin: &mut RecycleBin,
        load: impl FnOnce() -> Result<RgbaImage, EngineError>,
    ) -> Result<u32, EngineError> {
        if let Some(texture) = self.get(key) {
            return Ok(texture);
        }
        let image = load()?;
        let texture = api
            .create_texture_rgba8(image.width(), image.height(), image.as_raw())
            .map_err(EngineError::Graphics)?;
        self.insert(key, texture, bin);
        Ok(texture)
    }

    /// Queues every cached texture for deletion.
    pub fn clear(&mut self, bin: &mut RecycleBin) {
        for (_, texture) in self.entries.drain(..) {
            bin.add_texture(texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::fake::{Call, FakeGl};

    fn pixel() -> Result<RgbaImage, EngineError> {
        Ok(RgbaImage::new(1, 1))
    }

    #[test]
    fn eleventh_image_evicts_exactly_the_oldest() {
        let gl = FakeGl::new();
        let mut bin = RecycleBin::new();
        let mut cache = ImageCache::new();
        let first = cache
            .get_or_load("image-0.png", &gl, &mut bin, pixel)
            .unwrap();
        for i in 1..IMAGE_CACHE_CAPACITY {
            cache
                .get_or_load(&format!("image-{i}.png"), &gl, &mut bin, pixel)
                .unwrap();
        }
        assert!(bin.is_empty());

        cache.get_or_load("image-10.png", &gl, &mut bin, pixel).unwrap();
        assert_eq!(cache.len(), IMAGE_CACHE_CAPACITY + 1);
        assert!(bin.is_empty(), "eviction waits for trim");

        assert_eq!(cache.trim(&mut bin), 1);
        assert_eq!(cache.len(), IMAGE_CACHE_CAPACITY);
        assert_eq!(bin.pending(), 1);
        assert!(bin.contains_texture(first));
        assert!(!cache.contains("image-0.png"));
    }

    #[test]
    fn hit_does_not_reload_and_refreshes_recency() {
        let gl = FakeGl::new();
        let mut bin = RecycleBin::new();
        let mut cache = ImageCache::with_capacity(2);
        let a = cache.get_or_load("a.png", &gl, &mut bin, pixel).unwrap();
        cache.get_or_load("b.png", &gl, &mut bin, pixel).unwrap();

        let again = cache
            .get_or_load("A.PNG", &gl, &mut bin, || panic!("must not reload"))
            .unwrap();
        assert_eq!(again, a);

        cache.get_or_load("c.png", &gl, &mut bin, pixel).unwrap();
        cache.trim(&mut bin);
        assert!(cache.contains("a.png"), "a was used more recently than b");
        assert!(!cache.contains("b.png"));
        assert_eq!(gl.count(|c| matches!(c, Call::CreateTexture(_))), 3);
    }

    #[test]
    fn load_failure_caches_nothing() {
        let gl = FakeGl::new();
        let mut bin = RecycleBin::new();
        let mut cache = ImageCache::new();
        let result = cache.get_or_load("missing.png", &gl, &mut bin, || {
            Err(EngineError::Image("not found".into()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_queues_all_textures() {
        let gl = FakeGl::new();
        let mut bin = RecycleBin::new();
        let mut cache = ImageCache::new();
        cache.get_or_load("a", &gl, &mut bin, pixel).unwrap();
        cache.get_or_load("b", &gl, &mut bin, pixel).unwrap();
        cache.clear(&mut bin);
        assert!(cache.is_empty());
        assert_eq!(bin.pending(), 2);
    }

    #[test]
    fn trim_within_capacity_is_a_no_op() {
        let gl = FakeGl::new();
        let mut bin = RecycleBin::new();
        let mut cache = ImageCache::with_capacity(2);
        cache.get_or_load("a", &gl, &mut bin, pixel).unwrap();
        cache.get_or_load("b", &gl, &mut bin, pixel).unwrap();
        assert_eq!(cache.trim(&mut bin), 0);
        assert_eq!(cache.len(), 2);
        assert!(bin.is_empty());
    }
}
