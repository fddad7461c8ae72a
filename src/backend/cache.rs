use image::DynamicImage;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::mangadex::{ChapterRef, PageServerInfo};

const MAX_MEMORY_PAGES: usize = 50;

/// Per-session lookups the reader can skip the network for: chapter lists per
/// manga, and page-server descriptors until their TTL runs out.
#[derive(Debug)]
pub struct SessionCache {
    chapters: HashMap<String, Vec<ChapterRef>>,
    servers: HashMap<String, (PageServerInfo, Instant)>,
    server_ttl: Duration,
}

impl SessionCache {
    pub fn new(server_ttl: Duration) -> Self {
        Self {
            chapters: HashMap::new(),
            servers: HashMap::new(),
            server_ttl,
        }
    }

    pub fn chapters(&self, manga_id: &str) -> Option<&[ChapterRef]> {
        self.chapters.get(manga_id).map(Vec::as_slice)
    }

    pub fn insert_chapters(&mut self, manga_id: String, chapters: Vec<ChapterRef>) {
        self.chapters.insert(manga_id, chapters);
    }

    /// Returns the descriptor only while it is younger than the TTL.
    pub fn page_server(&self, chapter_id: &str) -> Option<&PageServerInfo> {
        self.servers
            .get(chapter_id)
            .filter(|(_, stored)| stored.elapsed() < self.server_ttl)
            .map(|(info, _)| info)
    }

    pub fn insert_page_server(&mut self, chapter_id: String, info: PageServerInfo) {
        self.servers.retain(|_, (_, stored)| stored.elapsed() < self.server_ttl);
        self.servers.insert(chapter_id, (info, Instant::now()));
    }
}

/// Decoded page images, evicting the least recently used beyond a fixed count.
#[derive(Default)]
pub struct PageImageCache {
    pages: HashMap<String, DynamicImage>,
    access_order: Vec<String>,
}

impl PageImageCache {
    pub fn get(&mut self, url: &str) -> Option<DynamicImage> {
        let image = self.pages.get(url).cloned()?;
        self.access_order.retain(|k| k != url);
        self.access_order.push(url.to_string());
        Some(image)
    }

    pub fn insert(&mut self, url: String, image: DynamicImage) {
        if !self.pages.contains_key(&url) && self.pages.len() >= MAX_MEMORY_PAGES {
            if let Some(oldest) = self.access_order.first().cloned() {
                self.pages.remove(&oldest);
                self.access_order.remove(0);
            }
        }

        self.access_order.retain(|k| k != &url);
        self.access_order.push(url.clone());
        self.pages.insert(url, image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(hash: &str) -> PageServerInfo {
        PageServerInfo {
            base_url: "https://node".to_string(),
            hash: hash.to_string(),
            data: vec!["1.png".to_string()],
            data_saver: Vec::new(),
        }
    }

    #[test]
    fn fresh_page_server_is_served() {
        let mut cache = SessionCache::new(Duration::from_secs(300));
        cache.insert_page_server("c1".to_string(), info("h1"));
        assert_eq!(cache.page_server("c1").map(|i| i.hash.as_str()), Some("h1"));
        assert!(cache.page_server("c2").is_none());
    }

    #[test]
    fn expired_page_server_is_not_served() {
        let mut cache = SessionCache::new(Duration::ZERO);
        cache.insert_page_server("c1".to_string(), info("h1"));
        assert!(cache.page_server("c1").is_none());
    }

    #[test]
    fn image_cache_evicts_least_recently_used() {
        let mut cache = PageImageCache::default();
        for i in 0..MAX_MEMORY_PAGES {
            cache.insert(format!("p{i}"), DynamicImage::new_rgb8(1, 1));
        }
        // Touch the oldest so p1 becomes the eviction candidate.
        assert!(cache.get("p0").is_some());
        cache.insert("extra".to_string(), DynamicImage::new_rgb8(1, 1));

        assert!(cache.get("p1").is_none());
        assert!(cache.get("p0").is_some());
        assert!(cache.get("extra").is_some());
        assert_eq!(cache.pages.len(), MAX_MEMORY_PAGES);
    }
}
