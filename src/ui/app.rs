use image::DynamicImage;
use log::info;
use ratatui_image::{picker::Picker, protocol::StatefulProtocol};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::backend::bookmarks::{Bookmark, BookmarkStore};
use crate::backend::cache::PageImageCache;
use crate::backend::mangadex::MangaSummary;
use crate::config::{Config, SectionKind};
use crate::reader::{ReaderPipeline, ReaderState};
use crate::ui::theme::ThemeName;

pub const GRID_COLUMNS: usize = 6;
const LOGIN_CLOSE_DELAY: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SectionStatus {
    #[default]
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub status: SectionStatus,
    pub manga: Vec<MangaSummary>,
    pub selected: usize,
}

impl Section {
    pub fn selected_manga(&self) -> Option<&MangaSummary> {
        self.manga.get(self.selected)
    }

    fn fill(&mut self, result: Result<Vec<MangaSummary>, String>) {
        match result {
            Ok(manga) => {
                self.manga = manga;
                self.status = SectionStatus::Ready;
            }
            Err(message) => {
                self.manga.clear();
                self.status = SectionStatus::Failed(message);
            }
        }
        self.selected = 0;
    }

    fn move_by(&mut self, delta: isize) {
        if self.manga.is_empty() {
            return;
        }
        let max = self.manga.len() - 1;
        self.selected = self.selected.saturating_add_signed(delta).min(max);
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Focus {
    Search,
    #[default]
    Featured,
    PopularToday,
    Latest,
    Popular,
    Ranking,
    Bookmarks,
}

impl Focus {
    const ORDER: [Focus; 7] = [
        Focus::Search,
        Focus::Featured,
        Focus::PopularToday,
        Focus::Latest,
        Focus::Popular,
        Focus::Ranking,
        Focus::Bookmarks,
    ];

    fn position(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ORDER[(self.position() + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Self {
        Self::ORDER[(self.position() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }

    fn section(self) -> Option<SectionKind> {
        match self {
            Focus::Featured => Some(SectionKind::Featured),
            Focus::PopularToday => Some(SectionKind::PopularToday),
            Focus::Latest => Some(SectionKind::Latest),
            Focus::Popular => Some(SectionKind::Popular),
            Focus::Ranking => Some(SectionKind::Ranking),
            Focus::Search | Focus::Bookmarks => None,
        }
    }
}

/// What pressing Enter on the current focus asks the controller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    OpenReader(String),
    ResumeReader(String),
    OpenTitle(String),
    Search(String),
    Nothing,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum LoginField {
    #[default]
    Username,
    Password,
}

/// Mock login form; nothing is sent anywhere.
#[derive(Debug, Default)]
pub struct LoginForm {
    pub open: bool,
    pub username: String,
    pub password: String,
    pub field: LoginField,
    pub message: Option<String>,
    close_at: Option<Instant>,
}

impl LoginForm {
    pub fn open(&mut self) {
        self.open = true;
        self.message = None;
        self.close_at = None;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.close_at = None;
    }

    pub fn switch_field(&mut self) {
        self.field = match self.field {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        };
    }

    pub fn input(&mut self) -> &mut String {
        match self.field {
            LoginField::Username => &mut self.username,
            LoginField::Password => &mut self.password,
        }
    }

    pub fn submit(&mut self, now: Instant) {
        self.message = Some("Demo login: not connected to server. This is UI-only.".to_string());
        self.close_at = Some(now + LOGIN_CLOSE_DELAY);
    }

    /// Finishes a pending demo login once its delay has passed.
    pub fn tick(&mut self, now: Instant) {
        if self.close_at.is_some_and(|at| now >= at) {
            self.message = Some("Logged in (demo)".to_string());
            self.close();
        }
    }
}

pub struct App {
    pub theme: ThemeName,
    pub focus: Focus,
    sections: [Section; 5],
    pub search_results: Option<(String, Section)>,
    pub search_query: String,
    pub last_search_query: String,
    pub searching: bool,
    pub search_debounce: Option<Instant>,
    pub notice: Option<String>,
    pub featured_index: usize,
    pub last_carousel_step: Instant,
    pub bookmarks: BookmarkStore,
    pub bookmark_selected: usize,
    pub reader: ReaderPipeline,
    pub login: LoginForm,
    pub uploads_base: String,
    pub picker: Option<Picker>,
    pub cover_states: HashMap<String, StatefulProtocol>,
    pub page_state: Option<(String, StatefulProtocol)>,
    pub page_images: PageImageCache,
}

impl App {
    pub fn new(
        config: &Config,
        bookmarks: BookmarkStore,
        reader: ReaderPipeline,
        picker: Option<Picker>,
    ) -> Self {
        Self {
            theme: config.theme,
            focus: Focus::default(),
            sections: Default::default(),
            search_results: None,
            search_query: String::new(),
            last_search_query: String::new(),
            searching: false,
            search_debounce: None,
            notice: None,
            featured_index: 0,
            last_carousel_step: Instant::now(),
            bookmarks,
            bookmark_selected: 0,
            reader,
            login: LoginForm::default(),
            uploads_base: config.uploads_base.trim_end_matches('/').to_string(),
            picker,
            cover_states: HashMap::new(),
            page_state: None,
            page_images: PageImageCache::default(),
        }
    }

    pub fn section(&self, kind: SectionKind) -> &Section {
        &self.sections[kind as usize]
    }

    fn section_mut(&mut self, kind: SectionKind) -> &mut Section {
        &mut self.sections[kind as usize]
    }

    pub fn set_section(&mut self, kind: SectionKind, result: Result<Vec<MangaSummary>, String>) {
        self.section_mut(kind).fill(result);
        if kind == SectionKind::Featured {
            self.featured_index = 0;
            self.last_carousel_step = Instant::now();
        }
    }

    pub fn set_search_results(&mut self, query: String, result: Result<Vec<MangaSummary>, String>) {
        let mut section = Section::default();
        section.fill(result);
        self.search_results = Some((query, section));
        self.searching = false;
    }

    pub fn clear_search(&mut self) {
        self.search_results = None;
        self.search_query.clear();
        self.last_search_query.clear();
        self.search_debounce = None;
        self.searching = false;
    }

    /// The grid shows search results when there are any, the latest
    /// section otherwise.
    pub fn grid(&self) -> &Section {
        match &self.search_results {
            Some((_, section)) => section,
            None => self.section(SectionKind::Latest),
        }
    }

    fn grid_mut(&mut self) -> &mut Section {
        match &mut self.search_results {
            Some((_, section)) => section,
            None => &mut self.sections[SectionKind::Latest as usize],
        }
    }

    pub fn is_loading(&self) -> bool {
        self.searching
            || self.reader.is_loading()
            || self
                .sections
                .iter()
                .any(|s| s.status == SectionStatus::Loading)
    }

    pub fn featured(&self) -> Option<&MangaSummary> {
        self.section(SectionKind::Featured)
            .manga
            .get(self.featured_index)
    }

    /// Carousel step, wrapping at both ends.
    pub fn step_featured(&mut self, forward: bool) {
        let len = self.section(SectionKind::Featured).manga.len();
        if len == 0 {
            return;
        }
        self.featured_index = if forward {
            (self.featured_index + 1) % len
        } else {
            (self.featured_index + len - 1) % len
        };
        self.last_carousel_step = Instant::now();
    }

    pub fn tick_carousel(&mut self, interval: Duration) {
        if self.last_carousel_step.elapsed() >= interval {
            self.step_featured(true);
        }
    }

    pub fn selected_bookmark(&self) -> Option<&Bookmark> {
        self.bookmarks.list().get(self.bookmark_selected)
    }

    pub fn selected_manga(&self) -> Option<&MangaSummary> {
        match self.focus {
            Focus::Featured => self.featured(),
            Focus::Latest => self.grid().selected_manga(),
            focus => focus
                .section()
                .and_then(|kind| self.section(kind).selected_manga()),
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        match self.focus {
            Focus::Search => {}
            Focus::Featured => self.step_featured(delta > 0),
            Focus::Latest => self.grid_mut().move_by(delta),
            Focus::Bookmarks => {
                let max = self.bookmarks.len().saturating_sub(1);
                self.bookmark_selected = self.bookmark_selected.saturating_add_signed(delta).min(max);
            }
            focus => {
                if let Some(kind) = focus.section() {
                    self.section_mut(kind).move_by(delta);
                }
            }
        }
    }

    pub fn activate(&self) -> Activation {
        match self.focus {
            Focus::Search => Activation::Search(self.search_query.trim().to_string()),
            Focus::Featured | Focus::Latest => self
                .selected_manga()
                .map_or(Activation::Nothing, |m| Activation::OpenReader(m.id.clone())),
            Focus::PopularToday | Focus::Popular | Focus::Ranking => self
                .selected_manga()
                .map_or(Activation::Nothing, |m| Activation::OpenTitle(m.id.clone())),
            Focus::Bookmarks => self
                .selected_bookmark()
                .map_or(Activation::Nothing, |b| Activation::OpenReader(b.id.clone())),
        }
    }

    pub fn resume_selected(&self) -> Activation {
        match self.focus {
            Focus::Bookmarks => self
                .selected_bookmark()
                .map_or(Activation::Nothing, |b| Activation::ResumeReader(b.id.clone())),
            _ => self
                .selected_manga()
                .map_or(Activation::Nothing, |m| Activation::ResumeReader(m.id.clone())),
        }
    }

    /// Toggles the bookmark of whatever is selected. Returns the new
    /// membership, or `None` when nothing is selected.
    pub fn toggle_bookmark(&mut self) -> Option<bool> {
        let bookmark = match self.focus {
            Focus::Bookmarks => self.selected_bookmark().cloned()?,
            _ => Bookmark::snapshot(self.selected_manga()?, &self.uploads_base),
        };
        let title = bookmark.title.clone();
        let bookmarked = self.bookmarks.toggle(bookmark);
        info!("bookmark {} {}", title, if bookmarked { "added" } else { "removed" });

        let max = self.bookmarks.len().saturating_sub(1);
        self.bookmark_selected = self.bookmark_selected.min(max);
        Some(bookmarked)
    }

    /// Copies the loaded chapter label onto the manga's bookmark, if any.
    pub fn note_chapter_loaded(&mut self) {
        if self.reader.state() != &ReaderState::PagesLoaded {
            return;
        }
        let (Some(manga_id), Some(chapter)) = (self.reader.manga_id(), self.reader.current_chapter())
        else {
            return;
        };
        let (manga_id, label) = (manga_id.to_string(), chapter.label());
        self.bookmarks.set_last_chapter(&manga_id, &label);
    }

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
    }

    pub fn add_cover_image(&mut self, manga_id: &str, image: DynamicImage) {
        if let Some(ref picker) = self.picker {
            let protocol = picker.new_resize_protocol(image);
            self.cover_states.insert(manga_id.to_string(), protocol);
        }
    }

    /// Shows a downloaded page if it is still the one the reader is on.
    pub fn set_page_image(&mut self, url: String, image: DynamicImage) {
        self.page_images.insert(url.clone(), image.clone());
        if self.reader.current_page_url() != Some(url.as_str()) {
            return;
        }
        if let Some(ref picker) = self.picker {
            let protocol = picker.new_resize_protocol(image);
            self.page_state = Some((url, protocol));
        }
    }

    /// Drops the displayed page when the reader moved elsewhere.
    pub fn sync_page_state(&mut self) {
        let current = self.reader.current_page_url();
        if self.page_state.as_ref().map(|(url, _)| url.as_str()) != current {
            self.page_state = None;
        }
    }

    /// Cover URLs of everything on screen, keyed by manga id.
    pub fn cover_targets(&self) -> Vec<(String, String)> {
        let mut targets: Vec<(String, String)> = self
            .sections
            .iter()
            .chain(self.search_results.iter().map(|(_, s)| s))
            .flat_map(|s| s.manga.iter())
            .filter_map(|m| m.cover_url(&self.uploads_base).map(|url| (m.id.clone(), url)))
            .collect();
        targets.extend(
            self.bookmarks
                .list()
                .iter()
                .filter_map(|b| b.cover.clone().map(|url| (b.id.clone(), url))),
        );
        targets
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::mangadex::PageQuality;
    use crate::backend::resume::ResumeStore;
    use std::collections::BTreeMap;

    pub(crate) fn manga(id: &str) -> MangaSummary {
        MangaSummary {
            id: id.to_string(),
            titles: BTreeMap::from([("en".to_string(), format!("Title {id}"))]),
            description: BTreeMap::new(),
            status: Some("ongoing".to_string()),
            tags: Vec::new(),
            demographic: None,
            cover_file_name: Some("cover.jpg".to_string()),
        }
    }

    pub(crate) fn test_app(dir: &std::path::Path) -> App {
        let config = Config::default();
        let reader = ReaderPipeline::new(
            ResumeStore::in_memory(),
            "en",
            PageQuality::Data,
            Duration::ZERO,
        );
        App::new(&config, BookmarkStore::in_dir(dir), reader, None)
    }

    #[test]
    fn loader_stays_up_until_every_section_settles() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        assert!(app.is_loading());

        for kind in SectionKind::ALL {
            app.set_section(kind, Ok(vec![manga("m1")]));
        }
        app.set_section(SectionKind::Ranking, Err("Failed to load ranking".to_string()));
        assert!(!app.is_loading());
        assert_eq!(
            app.section(SectionKind::Ranking).status,
            SectionStatus::Failed("Failed to load ranking".to_string())
        );
    }

    #[test]
    fn carousel_wraps_in_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.set_section(SectionKind::Featured, Ok(vec![manga("a"), manga("b"), manga("c")]));

        app.step_featured(false);
        assert_eq!(app.featured().unwrap().id, "c");
        app.step_featured(true);
        assert_eq!(app.featured().unwrap().id, "a");

        app.last_carousel_step = Instant::now() - Duration::from_secs(7);
        app.tick_carousel(Duration::from_secs(6));
        assert_eq!(app.featured().unwrap().id, "b");
    }

    #[test]
    fn activation_follows_section_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.set_section(SectionKind::Latest, Ok(vec![manga("l1"), manga("l2")]));
        app.set_section(SectionKind::Ranking, Ok(vec![manga("r1")]));

        app.focus = Focus::Latest;
        app.move_selection(1);
        assert_eq!(app.activate(), Activation::OpenReader("l2".to_string()));
        app.move_selection(5);
        assert_eq!(app.activate(), Activation::OpenReader("l2".to_string()));

        app.focus = Focus::Ranking;
        assert_eq!(app.activate(), Activation::OpenTitle("r1".to_string()));

        app.focus = Focus::Bookmarks;
        assert_eq!(app.activate(), Activation::Nothing);
    }

    #[test]
    fn search_results_replace_the_grid_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.set_section(SectionKind::Latest, Ok(vec![manga("l1")]));

        app.searching = true;
        app.set_search_results("none".to_string(), Ok(Vec::new()));
        assert!(!app.searching);
        assert!(app.grid().manga.is_empty());
        assert_eq!(app.grid().status, SectionStatus::Ready);

        app.clear_search();
        assert_eq!(app.grid().manga[0].id, "l1");
    }

    #[test]
    fn bookmark_toggle_from_sections_and_bookmark_panel() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = test_app(dir.path());
        app.set_section(SectionKind::Popular, Ok(vec![manga("p1")]));

        app.focus = Focus::Popular;
        assert_eq!(app.toggle_bookmark(), Some(true));
        let bookmark = &app.bookmarks.list()[0];
        assert_eq!(bookmark.title, "Title p1");
        assert_eq!(
            bookmark.cover.as_deref(),
            Some("https://uploads.mangadex.org/covers/p1/cover.jpg")
        );

        app.focus = Focus::Bookmarks;
        assert_eq!(app.resume_selected(), Activation::ResumeReader("p1".to_string()));
        assert_eq!(app.toggle_bookmark(), Some(false));
        assert!(app.bookmarks.is_empty());
        assert_eq!(app.toggle_bookmark(), None);
    }

    #[test]
    fn demo_login_closes_after_delay() {
        let mut login = LoginForm::default();
        login.open();
        login.input().push_str("reader");
        login.switch_field();
        login.input().push_str("secret");
        assert_eq!(login.username, "reader");
        assert_eq!(login.password, "secret");

        let now = Instant::now();
        login.submit(now);
        login.tick(now);
        assert!(login.open);
        assert!(login.message.as_deref().unwrap().starts_with("Demo login"));

        login.tick(now + LOGIN_CLOSE_DELAY);
        assert!(!login.open);
        assert_eq!(login.message.as_deref(), Some("Logged in (demo)"));
    }

    #[test]
    fn focus_cycles_through_every_region() {
        let mut focus = Focus::Search;
        for _ in 0..Focus::ORDER.len() {
            focus = focus.next();
        }
        assert_eq!(focus, Focus::Search);
        assert_eq!(Focus::Search.prev(), Focus::Bookmarks);
    }
}
