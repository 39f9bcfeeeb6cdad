//! Rendered page cache.

use std::sync::RwLock;

use bytes::Bytes;
use lru::LruCache;

use crate::domain::pages::PageType;

use super::config::CacheConfig;
use super::keys::PageKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::pages";

/// A rendered page as served to the browser.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl RenderedPage {
    pub fn html(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: body.into(),
        }
    }
}

pub struct PageCache {
    pages: RwLock<LruCache<PageKey, RenderedPage>>,
}

impl PageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            pages: RwLock::new(LruCache::new(config.page_limit_non_zero())),
        }
    }

    pub fn get(&self, key: &PageKey) -> Option<RenderedPage> {
        rw_write(&self.pages, SOURCE, "get").get(key).cloned()
    }

    /// Returns the key dropped to make room, if any.
    pub fn insert(&self, key: PageKey, page: RenderedPage) -> Option<PageKey> {
        let evicted = rw_write(&self.pages, SOURCE, "insert").push(key.clone(), page);
        evicted
            .map(|(evicted_key, _)| evicted_key)
            .filter(|evicted_key| *evicted_key != key)
    }

    /// Returns true if the key was cached.
    pub fn invalidate(&self, key: &PageKey) -> bool {
        rw_write(&self.pages, SOURCE, "invalidate")
            .pop(key)
            .is_some()
    }

    /// Drop every cached render of `page`. Returns the number removed.
    pub fn invalidate_page_type(&self, page: PageType) -> usize {
        let mut pages = rw_write(&self.pages, SOURCE, "invalidate_page_type");
        let doomed: Vec<PageKey> = pages
            .iter()
            .filter(|(key, _)| key.page == page)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            pages.pop(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.pages, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.pages, SOURCE, "clear").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(limit: usize) -> PageCache {
        PageCache::new(&CacheConfig {
            page_limit: limit,
            ..Default::default()
        })
    }

    #[test]
    fn insert_get_invalidate() {
        let cache = cache(8);
        let key = PageKey::entity(PageType::HotelDetail, "h1");
        assert!(cache.get(&key).is_none());

        assert!(
            cache
                .insert(key.clone(), RenderedPage::html("<h1>Hotel</h1>"))
                .is_none()
        );
        let cached = cache.get(&key).expect("cached page");
        assert_eq!(cached.status, 200);
        assert_eq!(cached.body, Bytes::from("<h1>Hotel</h1>"));

        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert!(cache.is_empty());
    }

    #[test]
    fn flushes_only_the_requested_page_type() {
        let cache = cache(8);
        cache.insert(PageKey::entity(PageType::HotelDetail, "h1"), RenderedPage::html("a"));
        cache.insert(PageKey::entity(PageType::HotelDetail, "h2"), RenderedPage::html("b"));
        cache.insert(PageKey::new(PageType::HotelDetail, None), RenderedPage::html("c"));
        cache.insert(PageKey::entity(PageType::CityLanding, "c1"), RenderedPage::html("d"));

        assert_eq!(cache.invalidate_page_type(PageType::HotelDetail), 3);
        assert_eq!(cache.len(), 1);
        assert!(
            cache
                .get(&PageKey::entity(PageType::CityLanding, "c1"))
                .is_some()
        );
    }

    #[test]
    fn reports_capacity_eviction() {
        let cache = cache(1);
        let first = PageKey::entity(PageType::UserProfile, "u1");
        cache.insert(first.clone(), RenderedPage::html("a"));
        let evicted = cache.insert(PageKey::entity(PageType::UserProfile, "u2"), RenderedPage::html("b"));
        assert_eq!(evicted, Some(first));
    }
}
