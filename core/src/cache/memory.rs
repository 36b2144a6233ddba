//! Count-bounded LRU of decoded page images with explicit resource release.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use hashlink::LruCache;
use tracing::debug;

use crate::codec::DecodedImage;
use crate::types::PageKey;

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// A decoded, renderable page. The optional release hook runs exactly once
/// when the last owner lets go; the cache holds the primary reference and
/// hands out shared views through [`PageCache::get`].
pub struct PageResource {
    image: DecodedImage,
    release: Option<ReleaseHook>,
}

impl PageResource {
    pub fn new(image: DecodedImage) -> Self {
        Self { image, release: None }
    }

    /// Attach a hook invoked when the resource is dropped. Used by the
    /// renderer boundary to revoke whatever display handle backs the image.
    pub fn with_release(image: DecodedImage, hook: ReleaseHook) -> Self {
        Self { image, release: Some(hook) }
    }

    pub fn image(&self) -> &DecodedImage {
        &self.image
    }

    pub fn byte_size(&self) -> usize {
        self.image.byte_size()
    }
}

impl Drop for PageResource {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl fmt::Debug for PageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageResource")
            .field("dimensions", &self.image.dimensions)
            .field("bytes", &self.image.byte_size())
            .finish()
    }
}

/// Cached payload associated with a single page.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub resource: Arc<PageResource>,
    /// 1-based page number, used by windowed trimming.
    pub page_number: u32,
    pub inserted_at: Instant,
    pub approx_byte_size: usize,
}

impl CacheEntry {
    pub fn new(page_number: u32, resource: Arc<PageResource>) -> Self {
        let approx_byte_size = resource.byte_size();
        Self { resource, page_number, inserted_at: Instant::now(), approx_byte_size }
    }
}

/// LRU keyed by [`PageKey`], bounded by entry count.
///
/// Capacity changes take effect lazily: shrinking never evicts on the spot,
/// the next `put` above the new bound does. This keeps pressure responses
/// from stalling navigation with a burst of synchronous releases.
#[derive(Debug)]
pub struct PageCache {
    entries: LruCache<PageKey, CacheEntry>,
    capacity: usize,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self { entries: LruCache::new_unbounded(), capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }

    /// Retrieve a shared view of a cached page, refreshing its recency.
    pub fn get(&mut self, key: &PageKey) -> Option<Arc<PageResource>> {
        self.entries.get(key).map(|entry| Arc::clone(&entry.resource))
    }

    /// Membership test without touching recency ordering.
    pub fn has(&self, key: &PageKey) -> bool {
        self.entries.peek(key).is_some()
    }

    /// Insert or replace an entry.
    ///
    /// Replacing an existing key refreshes recency and never evicts. A new
    /// key first evicts least-recently-used entries until the insert fits,
    /// which is also where a lazily lowered capacity is enforced.
    pub fn put(&mut self, key: PageKey, entry: CacheEntry) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, entry);
            return;
        }

        while self.entries.len() + 1 > self.capacity {
            match self.entries.remove_lru() {
                Some((evicted, _)) => {
                    debug!(target: "cache", key = evicted.as_str(), "evicted page")
                }
                None => break,
            }
        }

        self.entries.insert(key, entry);
    }

    /// Release and remove every entry whose page number falls outside
    /// `[center - radius, center + radius]`. Returns the eviction count.
    pub fn evict_outside_window(&mut self, center: u32, radius: u32) -> usize {
        let keep_start = center.saturating_sub(radius);
        let keep_end = center.saturating_add(radius);

        let stale: Vec<PageKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.page_number < keep_start || entry.page_number > keep_end
            })
            .map(|(key, _)| key.clone())
            .collect();

        let count = stale.len();
        for key in stale {
            self.entries.remove(&key);
        }

        if count > 0 {
            debug!(target: "cache", count, center, radius, "trimmed pages outside window");
        }
        count
    }

    /// Release every entry. Must run on session teardown; each cached page
    /// backs a sizable decoded image.
    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            debug!(target: "cache", count, "drained page cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::types::ImageDimensions;

    fn image() -> DecodedImage {
        DecodedImage {
            dimensions: ImageDimensions { width: 2, height: 2 },
            pixels: vec![0; 16],
        }
    }

    fn entry(page_number: u32) -> CacheEntry {
        CacheEntry::new(page_number, Arc::new(PageResource::new(image())))
    }

    fn tracked_entry(page_number: u32, releases: &Arc<AtomicUsize>) -> CacheEntry {
        let releases = Arc::clone(releases);
        let resource = PageResource::with_release(
            image(),
            Box::new(move || {
                releases.fetch_add(1, Ordering::SeqCst);
            }),
        );
        CacheEntry::new(page_number, Arc::new(resource))
    }

    fn key(n: u32) -> PageKey {
        PageKey::new(format!("page-{n}"))
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut cache = PageCache::new(3);
        for n in 1..=20 {
            cache.put(key(n), entry(n));
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let mut cache = PageCache::new(3);
        cache.put(key(1), entry(1)); // A
        cache.put(key(2), entry(2)); // B
        cache.put(key(3), entry(3)); // C
        cache.put(key(4), entry(4)); // D evicts A

        assert!(!cache.has(&key(1)));
        assert!(cache.has(&key(2)));
        assert!(cache.has(&key(3)));
        assert!(cache.has(&key(4)));
    }

    #[test]
    fn access_refreshes_recency_and_changes_victim() {
        let mut cache = PageCache::new(3);
        cache.put(key(1), entry(1));
        cache.put(key(2), entry(2));
        cache.put(key(3), entry(3));

        // Touch B; C becomes the victim when D arrives.
        assert!(cache.get(&key(2)).is_some());
        cache.put(key(4), entry(4));

        assert!(!cache.has(&key(3)));
        assert!(cache.has(&key(2)));
        assert!(cache.has(&key(4)));
    }

    #[test]
    fn eviction_releases_resource_exactly_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut cache = PageCache::new(1);
        cache.put(key(1), tracked_entry(1, &releases));
        cache.put(key(2), tracked_entry(2, &releases));

        assert_eq!(releases.load(Ordering::SeqCst), 1);

        cache.clear();
        assert_eq!(releases.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn release_waits_for_outstanding_borrowers() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut cache = PageCache::new(1);
        cache.put(key(1), tracked_entry(1, &releases));

        let borrowed = cache.get(&key(1)).unwrap();
        cache.put(key(2), tracked_entry(2, &releases));

        // The evicted page is still alive for its borrower.
        assert_eq!(releases.load(Ordering::SeqCst), 0);
        drop(borrowed);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn replacing_a_key_does_not_evict_others() {
        let mut cache = PageCache::new(2);
        cache.put(key(1), entry(1));
        cache.put(key(2), entry(2));
        cache.put(key(1), entry(1));

        assert_eq!(cache.len(), 2);
        assert!(cache.has(&key(2)));
    }

    #[test]
    fn shrinking_capacity_evicts_lazily() {
        let mut cache = PageCache::new(5);
        for n in 1..=5 {
            cache.put(key(n), entry(n));
        }

        cache.set_capacity(2);
        assert_eq!(cache.len(), 5, "shrink alone must not evict");

        cache.put(key(6), entry(6));
        assert_eq!(cache.len(), 2);
        assert!(cache.has(&key(6)));
        assert!(cache.has(&key(5)));
    }

    #[test]
    fn windowed_trim_keeps_neighbourhood() {
        let mut cache = PageCache::new(50);
        for n in 1..=30 {
            cache.put(key(n), entry(n));
        }

        let removed = cache.evict_outside_window(15, 5);

        assert_eq!(removed, 19);
        assert!(cache.has(&key(10)));
        assert!(cache.has(&key(20)));
        assert!(!cache.has(&key(9)));
        assert!(!cache.has(&key(21)));
    }
}
