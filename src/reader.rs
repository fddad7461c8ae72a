//! Reader pipeline: manga → chapter list → page server → page URLs.
//!
//! The pipeline never performs I/O itself. Every operation that needs the
//! catalog hands back a [`ReaderRequest`]; the caller runs it (see [`execute`])
//! and feeds the [`ReaderResponse`] back through [`ReaderPipeline::apply`].
//! Each request carries a [`Ticket`] and only a response for the most recent
//! ticket is applied, so overlapping navigation settles on the last request.

use crossterm::event::KeyCode;
use log::{debug, error, info, warn};
use std::time::Duration;

use crate::backend::cache::SessionCache;
use crate::backend::mangadex::{Catalog, ChapterRef, PageQuality, PageServerInfo};
use crate::backend::resume::{ResumeEntry, ResumeStore};
use crate::error::{CatalogError, ReaderError};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReaderState {
    #[default]
    Closed,
    LoadingChapterList,
    ChapterLoaded,
    LoadingPages,
    PagesLoaded,
    Error(ReaderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderRequest {
    Chapters { ticket: Ticket, manga_id: String },
    PageServer { ticket: Ticket, chapter_id: String },
}

#[derive(Debug)]
pub enum ReaderResponse {
    Chapters {
        ticket: Ticket,
        manga_id: String,
        result: Result<Vec<ChapterRef>, CatalogError>,
    },
    PageServer {
        ticket: Ticket,
        chapter_id: String,
        result: Result<PageServerInfo, CatalogError>,
    },
}

/// What a key press did while the reader was open.
#[derive(Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    Ignored,
    Unchanged,
    PageChanged,
    Closed,
    Request(ReaderRequest),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReaderSession {
    pub manga_id: String,
    pub chapters: Vec<ChapterRef>,
    pub chapter_index: usize,
    pub pages: Vec<String>,
    pub page_index: usize,
}

pub struct ReaderPipeline {
    state: ReaderState,
    session: Option<ReaderSession>,
    latest: u64,
    cache: SessionCache,
    resume: ResumeStore,
    quality: PageQuality,
    language: String,
    pending_resume: Option<ResumeEntry>,
    pending_page: usize,
}

impl ReaderPipeline {
    pub fn new(
        resume: ResumeStore,
        language: &str,
        quality: PageQuality,
        page_server_ttl: Duration,
    ) -> Self {
        Self {
            state: ReaderState::Closed,
            session: None,
            latest: 0,
            cache: SessionCache::new(page_server_ttl),
            resume,
            quality,
            language: language.to_string(),
            pending_resume: None,
            pending_page: 0,
        }
    }

    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    pub fn session(&self) -> Option<&ReaderSession> {
        self.session.as_ref()
    }

    pub fn resume(&self) -> &ResumeStore {
        &self.resume
    }

    pub fn is_open(&self) -> bool {
        self.state != ReaderState::Closed
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            ReaderState::LoadingChapterList | ReaderState::ChapterLoaded | ReaderState::LoadingPages
        )
    }

    pub fn manga_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.manga_id.as_str())
    }

    pub fn current_chapter(&self) -> Option<&ChapterRef> {
        let session = self.session.as_ref()?;
        session.chapters.get(session.chapter_index)
    }

    pub fn current_page_url(&self) -> Option<&str> {
        if self.state != ReaderState::PagesLoaded {
            return None;
        }
        let session = self.session.as_ref()?;
        session.pages.get(session.page_index).map(String::as_str)
    }

    /// 1-based page number and page count of the loaded chapter.
    pub fn page_position(&self) -> Option<(usize, usize)> {
        self.current_page_url()?;
        let session = self.session.as_ref()?;
        Some((session.page_index + 1, session.pages.len()))
    }

    pub fn can_next(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.chapter_index + 1 < s.chapters.len())
    }

    pub fn can_prev(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.chapters.is_empty() && s.chapter_index > 0)
    }

    fn issue(&mut self) -> Ticket {
        self.latest += 1;
        Ticket(self.latest)
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.latest
    }

    /// Opens the reader on the newest chapter of `manga_id`.
    pub fn open_manga(&mut self, manga_id: &str) -> Option<ReaderRequest> {
        self.pending_resume = None;
        self.start(manga_id)
    }

    /// Opens the reader at the chapter and page last recorded for `manga_id`,
    /// or at the newest chapter when there is no usable record.
    pub fn resume_manga(&mut self, manga_id: &str) -> Option<ReaderRequest> {
        self.pending_resume = self.resume.get(manga_id).cloned();
        self.start(manga_id)
    }

    fn start(&mut self, manga_id: &str) -> Option<ReaderRequest> {
        let ticket = self.issue();
        info!("opening reader for manga {manga_id}");
        self.session = Some(ReaderSession {
            manga_id: manga_id.to_string(),
            ..ReaderSession::default()
        });
        self.state = ReaderState::LoadingChapterList;

        if let Some(chapters) = self.cache.chapters(manga_id) {
            let chapters = chapters.to_vec();
            debug!("chapter list for {manga_id} served from cache");
            return self.chapters_ready(chapters);
        }
        Some(ReaderRequest::Chapters {
            ticket,
            manga_id: manga_id.to_string(),
        })
    }

    fn chapters_ready(&mut self, chapters: Vec<ChapterRef>) -> Option<ReaderRequest> {
        let pending_resume = self.pending_resume.take();
        let session = self.session.as_mut()?;

        if chapters.is_empty() {
            session.chapters.clear();
            self.state = ReaderState::Error(ReaderError::NoChaptersAvailable {
                language: self.language.clone(),
            });
            return None;
        }

        let (index, page) = pending_resume
            .and_then(|entry| {
                chapters
                    .iter()
                    .position(|c| c.id == entry.chapter_id)
                    .map(|idx| (idx, entry.page_index))
            })
            .unwrap_or((0, 0));

        session.chapters = chapters;
        session.chapter_index = index;
        self.state = ReaderState::ChapterLoaded;
        self.begin_chapter(index, page)
    }

    /// Loads the chapter at `index` of the current chapter list.
    pub fn load_chapter(&mut self, index: usize) -> Result<Option<ReaderRequest>, ReaderError> {
        let len = self.session.as_ref().map_or(0, |s| s.chapters.len());
        if index >= len {
            return Err(ReaderError::InvalidChapterIndex { index, len });
        }
        Ok(self.begin_chapter(index, 0))
    }

    fn begin_chapter(&mut self, index: usize, start_page: usize) -> Option<ReaderRequest> {
        let ticket = self.issue();
        let session = self.session.as_mut()?;
        let chapter_id = session.chapters.get(index)?.id.clone();

        session.chapter_index = index;
        session.pages.clear();
        session.page_index = 0;
        self.pending_page = start_page;
        self.state = ReaderState::LoadingPages;

        if let Some(info) = self.cache.page_server(&chapter_id).cloned() {
            debug!("page server for chapter {chapter_id} served from cache");
            self.pages_ready(&info);
            return None;
        }
        Some(ReaderRequest::PageServer { ticket, chapter_id })
    }

    fn pages_ready(&mut self, info: &PageServerInfo) {
        let urls = info.page_urls(self.quality);
        let pending_page = std::mem::take(&mut self.pending_page);
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.pages = urls;
        if session.pages.is_empty() {
            self.state = ReaderState::Error(ReaderError::NoPagesAvailable);
            return;
        }

        session.page_index = pending_page.min(session.pages.len() - 1);
        self.state = ReaderState::PagesLoaded;

        let chapter_id = &session.chapters[session.chapter_index].id;
        info!(
            "chapter {} of manga {} ready with {} pages",
            chapter_id,
            session.manga_id,
            session.pages.len()
        );
        self.resume
            .record(&session.manga_id, chapter_id, session.page_index);
    }

    /// Applies a finished request. Responses for superseded tickets are dropped.
    pub fn apply(&mut self, response: ReaderResponse) -> Option<ReaderRequest> {
        match response {
            ReaderResponse::Chapters {
                ticket,
                manga_id,
                result,
            } => {
                if !self.is_current(ticket) {
                    debug!("dropping stale chapter list for {manga_id}");
                    return None;
                }
                match result {
                    Ok(chapters) => {
                        if !chapters.is_empty() {
                            self.cache.insert_chapters(manga_id, chapters.clone());
                        }
                        self.chapters_ready(chapters)
                    }
                    Err(e) => {
                        warn!("{e}");
                        self.state = ReaderState::Error(ReaderError::ChapterFetchFailed {
                            language: self.language.clone(),
                        });
                        None
                    }
                }
            }
            ReaderResponse::PageServer {
                ticket,
                chapter_id,
                result,
            } => {
                if !self.is_current(ticket) {
                    debug!("dropping stale page server for chapter {chapter_id}");
                    return None;
                }
                match result {
                    Ok(info) => {
                        self.cache.insert_page_server(chapter_id, info.clone());
                        self.pages_ready(&info);
                    }
                    Err(e) => {
                        error!("{e}");
                        self.pending_page = 0;
                        self.state = ReaderState::Error(ReaderError::PageServerUnavailable);
                    }
                }
                None
            }
        }
    }

    /// Moves to the next (older) chapter. No-op on the last chapter.
    pub fn next(&mut self) -> Option<ReaderRequest> {
        if !self.can_next() {
            return None;
        }
        let index = self.session.as_ref()?.chapter_index + 1;
        self.begin_chapter(index, 0)
    }

    /// Moves to the previous (newer) chapter. No-op on the first chapter.
    pub fn prev(&mut self) -> Option<ReaderRequest> {
        if !self.can_prev() {
            return None;
        }
        let index = self.session.as_ref()?.chapter_index - 1;
        self.begin_chapter(index, 0)
    }

    pub fn next_page(&mut self) -> bool {
        if self.state != ReaderState::PagesLoaded {
            return false;
        }
        match self.session.as_mut() {
            Some(s) if s.page_index + 1 < s.pages.len() => {
                s.page_index += 1;
                true
            }
            _ => false,
        }
    }

    pub fn prev_page(&mut self) -> bool {
        if self.state != ReaderState::PagesLoaded {
            return false;
        }
        match self.session.as_mut() {
            Some(s) if s.page_index > 0 => {
                s.page_index -= 1;
                true
            }
            _ => false,
        }
    }

    /// Closes the reader, remembering the page that was on screen.
    pub fn close(&mut self) {
        self.issue();
        if self.state == ReaderState::PagesLoaded {
            if let Some(session) = &self.session {
                let chapter_id = &session.chapters[session.chapter_index].id;
                self.resume
                    .record(&session.manga_id, chapter_id, session.page_index);
            }
        }
        self.session = None;
        self.pending_resume = None;
        self.pending_page = 0;
        self.state = ReaderState::Closed;
    }

    fn jump_to(&mut self, index: usize) -> KeyOutcome {
        match self.load_chapter(index) {
            Ok(Some(request)) => KeyOutcome::Request(request),
            Ok(None) => KeyOutcome::PageChanged,
            Err(e) => {
                debug!("{e}");
                KeyOutcome::Unchanged
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyCode) -> KeyOutcome {
        if !self.is_open() {
            return KeyOutcome::Ignored;
        }
        let changed = |moved: bool| {
            if moved {
                KeyOutcome::PageChanged
            } else {
                KeyOutcome::Unchanged
            }
        };
        match key {
            KeyCode::Left => self.prev().map_or(KeyOutcome::Unchanged, KeyOutcome::Request),
            KeyCode::Right => self.next().map_or(KeyOutcome::Unchanged, KeyOutcome::Request),
            KeyCode::Esc => {
                self.close();
                KeyOutcome::Closed
            }
            KeyCode::Down | KeyCode::PageDown | KeyCode::Char('j') | KeyCode::Char(' ') => {
                changed(self.next_page())
            }
            KeyCode::Up | KeyCode::PageUp | KeyCode::Char('k') => changed(self.prev_page()),
            KeyCode::Home => self.jump_to(0),
            KeyCode::End => {
                let last = self.session.as_ref().map_or(0, |s| s.chapters.len().saturating_sub(1));
                self.jump_to(last)
            }
            _ => KeyOutcome::Ignored,
        }
    }
}

/// Runs one reader request against the catalog.
pub async fn execute(catalog: &dyn Catalog, request: ReaderRequest) -> ReaderResponse {
    match request {
        ReaderRequest::Chapters { ticket, manga_id } => {
            let result = catalog.fetch_chapters(&manga_id).await;
            ReaderResponse::Chapters {
                ticket,
                manga_id,
                result,
            }
        }
        ReaderRequest::PageServer { ticket, chapter_id } => {
            let result = catalog.resolve_page_server(&chapter_id).await;
            ReaderResponse::PageServer {
                ticket,
                chapter_id,
                result,
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mangadex::{MangaQuery, MangaSummary};
    use crate::error::FetchError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCatalog {
        chapters: HashMap<String, Vec<ChapterRef>>,
        failing_feeds: Vec<String>,
        servers: HashMap<String, PageServerInfo>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeCatalog {
        fn with_manga(mut self, manga_id: &str, chapter_ids: &[&str]) -> Self {
            let chapters = chapter_ids
                .iter()
                .map(|id| ChapterRef {
                    id: id.to_string(),
                    chapter: Some(id.trim_start_matches('c').to_string()),
                    title: None,
                    language: "en".to_string(),
                    volume: None,
                    pages: None,
                })
                .collect();
            self.chapters.insert(manga_id.to_string(), chapters);
            self
        }

        fn with_pages(mut self, chapter_id: &str, pages: usize) -> Self {
            self.servers.insert(
                chapter_id.to_string(),
                PageServerInfo {
                    base_url: "https://node".to_string(),
                    hash: format!("hash-{chapter_id}"),
                    data: (1..=pages).map(|p| format!("{p}.png")).collect(),
                    data_saver: Vec::new(),
                },
            );
            self
        }

        fn failing_feed(mut self, manga_id: &str) -> Self {
            self.failing_feeds.push(manga_id.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn unavailable() -> FetchError {
        FetchError::Status(StatusCode::SERVICE_UNAVAILABLE)
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn list_manga(
            &self,
            _query: &MangaQuery,
        ) -> Result<Vec<MangaSummary>, CatalogError> {
            Ok(Vec::new())
        }

        async fn fetch_chapters(&self, manga_id: &str) -> Result<Vec<ChapterRef>, CatalogError> {
            self.calls.lock().unwrap().push(format!("chapters:{manga_id}"));
            if self.failing_feeds.iter().any(|m| m == manga_id) {
                return Err(CatalogError::ChapterFetchFailed {
                    manga_id: manga_id.to_string(),
                    source: unavailable(),
                });
            }
            Ok(self.chapters.get(manga_id).cloned().unwrap_or_default())
        }

        async fn resolve_page_server(
            &self,
            chapter_id: &str,
        ) -> Result<PageServerInfo, CatalogError> {
            self.calls.lock().unwrap().push(format!("server:{chapter_id}"));
            self.servers
                .get(chapter_id)
                .cloned()
                .ok_or_else(|| CatalogError::PageServerUnavailable {
                    chapter_id: chapter_id.to_string(),
                    source: unavailable(),
                })
        }
    }

    /// Runs `request` and every follow-up it produces to completion.
    async fn drive(
        pipeline: &mut ReaderPipeline,
        catalog: &dyn Catalog,
        request: Option<ReaderRequest>,
    ) {
        let mut next = request;
        while let Some(request) = next {
            let response = execute(catalog, request).await;
            next = pipeline.apply(response);
        }
    }

    fn pipeline(ttl: Duration) -> ReaderPipeline {
        ReaderPipeline::new(ResumeStore::in_memory(), "en", PageQuality::Data, ttl)
    }

    fn two_chapter_catalog() -> FakeCatalog {
        FakeCatalog::default()
            .with_manga("m1", &["c2", "c1"])
            .with_pages("c2", 3)
            .with_pages("c1", 2)
    }

    fn current_id(reader: &ReaderPipeline) -> &str {
        &reader.current_chapter().unwrap().id
    }

    #[tokio::test]
    async fn open_next_prev_walks_between_boundaries() {
        let catalog = two_chapter_catalog();
        let mut reader = pipeline(Duration::ZERO);

        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;
        assert_eq!(reader.state(), &ReaderState::PagesLoaded);
        assert_eq!(current_id(&reader), "c2");
        assert!(!reader.can_prev());
        assert!(reader.can_next());

        let request = reader.next();
        assert!(request.is_some());
        drive(&mut reader, &catalog, request).await;
        assert_eq!(current_id(&reader), "c1");
        assert!(!reader.can_next());
        assert!(reader.next().is_none());
        assert_eq!(current_id(&reader), "c1");

        let request = reader.prev();
        drive(&mut reader, &catalog, request).await;
        assert_eq!(current_id(&reader), "c2");
        assert!(!reader.can_prev());
        assert!(reader.prev().is_none());

        assert_eq!(
            catalog.calls(),
            ["chapters:m1", "server:c2", "server:c1", "server:c2"]
        );
    }

    #[tokio::test]
    async fn pages_are_rebuilt_on_every_chapter_change() {
        let catalog = two_chapter_catalog();
        let mut reader = pipeline(Duration::from_secs(300));

        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;
        assert_eq!(
            reader.session().unwrap().pages,
            [
                "https://node/data/hash-c2/1.png",
                "https://node/data/hash-c2/2.png",
                "https://node/data/hash-c2/3.png",
            ]
        );
        assert!(reader.next_page());
        assert_eq!(reader.page_position(), Some((2, 3)));

        let request = reader.next();
        drive(&mut reader, &catalog, request).await;
        let session = reader.session().unwrap();
        assert_eq!(session.pages.len(), 2);
        assert_eq!(session.page_index, 0);
    }

    #[tokio::test]
    async fn page_navigation_is_bounded() {
        let catalog = two_chapter_catalog();
        let mut reader = pipeline(Duration::ZERO);
        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;

        assert!(!reader.prev_page());
        assert!(reader.next_page());
        assert!(reader.next_page());
        assert!(!reader.next_page());
        assert_eq!(
            reader.current_page_url(),
            Some("https://node/data/hash-c2/3.png")
        );
    }

    #[tokio::test]
    async fn empty_chapter_list_is_not_a_fetch_failure() {
        let catalog = FakeCatalog::default().with_manga("m1", &[]);
        let mut reader = pipeline(Duration::ZERO);

        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;

        let expected = ReaderError::NoChaptersAvailable {
            language: "en".to_string(),
        };
        assert_eq!(reader.state(), &ReaderState::Error(expected.clone()));
        assert_eq!(expected.user_message(), "No chapters available (EN)");
        assert!(!reader.can_next());
        assert!(!reader.can_prev());
        assert_eq!(catalog.calls(), ["chapters:m1"]);
    }

    #[tokio::test]
    async fn chapter_fetch_failure_stays_distinguishable() {
        let catalog = FakeCatalog::default().failing_feed("m1");
        let mut reader = pipeline(Duration::ZERO);

        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;

        let ReaderState::Error(err) = reader.state() else {
            panic!("expected an error state, got {:?}", reader.state());
        };
        assert!(matches!(err, ReaderError::ChapterFetchFailed { .. }));
        assert_eq!(err.user_message(), "No chapters available (EN)");

        assert!(catalog.get_chapters("m1").await.is_empty());
    }

    #[tokio::test]
    async fn missing_page_server_and_empty_pages_surface_as_errors() {
        let catalog = FakeCatalog::default()
            .with_manga("m1", &["c2", "c1"])
            .with_pages("c1", 0);
        let mut reader = pipeline(Duration::ZERO);

        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;
        assert_eq!(
            reader.state(),
            &ReaderState::Error(ReaderError::PageServerUnavailable)
        );
        assert!(reader.current_page_url().is_none());

        let request = reader.next();
        drive(&mut reader, &catalog, request).await;
        assert_eq!(
            reader.state(),
            &ReaderState::Error(ReaderError::NoPagesAvailable)
        );
    }

    #[tokio::test]
    async fn stale_responses_are_discarded() {
        let catalog = two_chapter_catalog().with_manga("m2", &["x1"]).with_pages("x1", 1);
        let mut reader = pipeline(Duration::ZERO);

        let first = reader.open_manga("m1").unwrap();
        let second = reader.open_manga("m2").unwrap();

        let stale = execute(&catalog, first).await;
        assert!(reader.apply(stale).is_none());
        assert_eq!(reader.state(), &ReaderState::LoadingChapterList);
        assert_eq!(reader.manga_id(), Some("m2"));

        drive(&mut reader, &catalog, Some(second)).await;
        assert_eq!(current_id(&reader), "x1");
    }

    #[tokio::test]
    async fn last_chapter_request_wins() {
        let catalog = two_chapter_catalog();
        let mut reader = pipeline(Duration::ZERO);
        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;

        let to_c1 = reader.next().unwrap();
        let back_to_c2 = reader.prev().unwrap();

        // The newer request finishes first; the older one must not override it.
        let newer = execute(&catalog, back_to_c2).await;
        reader.apply(newer);
        let older = execute(&catalog, to_c1).await;
        reader.apply(older);

        assert_eq!(current_id(&reader), "c2");
        assert_eq!(reader.page_position(), Some((1, 3)));
    }

    #[tokio::test]
    async fn fresh_page_servers_and_chapter_lists_are_reused() {
        let catalog = two_chapter_catalog();
        let mut reader = pipeline(Duration::from_secs(300));

        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;
        reader.close();
        assert_eq!(reader.state(), &ReaderState::Closed);
        assert!(reader.session().is_none());

        let request = reader.open_manga("m1");
        assert!(request.is_none());
        assert_eq!(reader.state(), &ReaderState::PagesLoaded);
        assert_eq!(catalog.calls(), ["chapters:m1", "server:c2"]);
    }

    #[tokio::test]
    async fn chapter_loads_record_resume_entries() {
        let catalog = two_chapter_catalog();
        let mut reader = pipeline(Duration::ZERO);

        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;
        assert_eq!(reader.resume().get("m1").unwrap().chapter_id, "c2");

        let request = reader.next();
        drive(&mut reader, &catalog, request).await;
        reader.next_page();
        reader.close();

        let entry = reader.resume().get("m1").unwrap();
        assert_eq!(entry.chapter_id, "c1");
        assert_eq!(entry.page_index, 1);
    }

    #[tokio::test]
    async fn resume_reopens_recorded_chapter_and_page() {
        let catalog = two_chapter_catalog();
        let mut resume = ResumeStore::in_memory();
        resume.record("m1", "c1", 1);
        let mut reader =
            ReaderPipeline::new(resume, "en", PageQuality::Data, Duration::ZERO);

        let request = reader.resume_manga("m1");
        drive(&mut reader, &catalog, request).await;
        assert_eq!(current_id(&reader), "c1");
        assert_eq!(reader.page_position(), Some((2, 2)));

        reader.close();
        let request = reader.resume_manga("unknown");
        drive(&mut reader, &catalog, request).await;
        assert!(matches!(reader.state(), ReaderState::Error(_)));
    }

    #[tokio::test]
    async fn load_chapter_rejects_out_of_range_index() {
        let catalog = two_chapter_catalog();
        let mut reader = pipeline(Duration::ZERO);
        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;

        assert_eq!(
            reader.load_chapter(2),
            Err(ReaderError::InvalidChapterIndex { index: 2, len: 2 })
        );
        assert_eq!(reader.state(), &ReaderState::PagesLoaded);

        let request = reader.load_chapter(1).unwrap();
        drive(&mut reader, &catalog, request).await;
        assert_eq!(current_id(&reader), "c1");
    }

    #[tokio::test]
    async fn arrow_keys_alias_chapter_navigation_only_while_open() {
        let catalog = two_chapter_catalog();
        let mut reader = pipeline(Duration::ZERO);
        assert_eq!(reader.handle_key(KeyCode::Right), KeyOutcome::Ignored);

        let request = reader.open_manga("m1");
        drive(&mut reader, &catalog, request).await;

        assert_eq!(reader.handle_key(KeyCode::Left), KeyOutcome::Unchanged);
        let KeyOutcome::Request(request) = reader.handle_key(KeyCode::Right) else {
            panic!("right arrow should load the next chapter");
        };
        drive(&mut reader, &catalog, Some(request)).await;
        assert_eq!(current_id(&reader), "c1");

        assert_eq!(reader.handle_key(KeyCode::Down), KeyOutcome::PageChanged);
        assert_eq!(reader.handle_key(KeyCode::Down), KeyOutcome::Unchanged);

        let KeyOutcome::Request(request) = reader.handle_key(KeyCode::Home) else {
            panic!("home should jump to the newest chapter");
        };
        drive(&mut reader, &catalog, Some(request)).await;
        assert_eq!(current_id(&reader), "c2");
        assert!(!reader.can_prev());

        assert_eq!(reader.handle_key(KeyCode::Esc), KeyOutcome::Closed);
        assert!(!reader.is_open());
        assert_eq!(reader.handle_key(KeyCode::Esc), KeyOutcome::Ignored);
    }
}
