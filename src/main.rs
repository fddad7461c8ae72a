mod backend;
mod cli;
mod config;
mod error;
mod reader;
mod ui;

use anyhow::{Context, Result};
use backend::bookmarks::BookmarkStore;
use backend::mangadex::{Catalog, MangaDex, MangaQuery, MangaSummary};
use backend::resume::ResumeStore;
use clap::Parser;
use cli::Cli;
use config::{Config, SectionKind};
use image::DynamicImage;
use log::{debug, error, info, warn};
use reader::{KeyOutcome, ReaderPipeline, ReaderRequest, ReaderResponse};
use ui::app::{Activation, App, Focus, GRID_COLUMNS};
use ui::ui::ui;

use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use ratatui_image::picker::Picker;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const DEBOUNCE: Duration = Duration::from_millis(300);

enum BackgroundTask {
    SectionLoaded {
        kind: SectionKind,
        result: Result<Vec<MangaSummary>, String>,
    },
    SearchResults {
        query: String,
        result: Result<Vec<MangaSummary>, String>,
    },
    CoverLoaded {
        manga_id: String,
        image: Option<DynamicImage>,
    },
    Reader(ReaderResponse),
    PageImageLoaded {
        url: String,
        image: Option<DynamicImage>,
    },
}

type TaskSender = mpsc::UnboundedSender<BackgroundTask>;

/// Spawns catalog work and remembers what is already in flight.
struct Tasks {
    api: Arc<MangaDex>,
    tx: TaskSender,
    pending_covers: HashSet<String>,
    pending_pages: HashSet<String>,
}

impl Tasks {
    fn new(api: Arc<MangaDex>, tx: TaskSender) -> Self {
        Self {
            api,
            tx,
            pending_covers: HashSet::new(),
            pending_pages: HashSet::new(),
        }
    }

    /// Fetches every home section concurrently; each settles on its own.
    fn load_sections(&self, config: &Config) {
        for kind in SectionKind::ALL {
            let query = config.section_query(kind);
            let api = Arc::clone(&self.api);
            let tx = self.tx.clone();

            tokio::spawn(async move {
                let result = api.list_manga(&query).await.map_err(|e| {
                    error!("{} section: {e}", kind.title());
                    format!("Failed to load {}", kind.title().to_lowercase())
                });
                let _ = tx.send(BackgroundTask::SectionLoaded { kind, result });
            });
        }
    }

    fn search(&self, query: String, request: MangaQuery) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = api.list_manga(&request).await.map_err(|e| {
                warn!("search for {query:?} failed: {e}");
                "Search failed".to_string()
            });
            let _ = tx.send(BackgroundTask::SearchResults { query, result });
        });
    }

    fn reader(&self, request: ReaderRequest) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let response = reader::execute(api.as_ref(), request).await;
            let _ = tx.send(BackgroundTask::Reader(response));
        });
    }

    fn covers(&mut self, app: &App) {
        if app.picker.is_none() {
            return;
        }
        for (manga_id, cover_url) in app.cover_targets() {
            if app.cover_states.contains_key(&manga_id) || !self.pending_covers.insert(manga_id.clone())
            {
                continue;
            }
            let api = Arc::clone(&self.api);
            let tx = self.tx.clone();

            tokio::spawn(async move {
                let image = api.fetch_cover_image(&cover_url).await;
                let _ = tx.send(BackgroundTask::CoverLoaded { manga_id, image });
            });
        }
    }

    fn page_image(&mut self, url: String) {
        if !self.pending_pages.insert(url.clone()) {
            return;
        }
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let image = api.fetch_page_image(&url).await;
            let _ = tx.send(BackgroundTask::PageImageLoaded { url, image });
        });
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let path = config.log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    // The terminal belongs to the UI, so log lines only go to the file.
    env_logger::Builder::new()
        .filter_level(config.log_filter())
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    init_logging(&config)?;
    info!(
        "starting mangaview (language {}, data dir {})",
        config.language,
        config.data_dir().display()
    );

    let api = Arc::new(MangaDex::new(&config).context("building HTTP client")?);
    let data_dir = config.data_dir();
    let bookmarks = BookmarkStore::in_dir(&data_dir);
    let reader = ReaderPipeline::new(
        ResumeStore::in_dir(&data_dir),
        &config.language,
        config.page_quality(),
        config.page_server_ttl(),
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let picker = Picker::from_query_stdio().ok();
    let mut app = App::new(&config, bookmarks, reader, picker);

    // Create channel for background tasks
    let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackgroundTask>();
    let mut tasks = Tasks::new(api, task_tx);
    tasks.load_sections(&config);
    tasks.covers(&app);

    let res = run_app(&mut terminal, &mut app, &config, &mut tasks, &mut task_rx).await;

    // Keeps the resume point of a chapter still on screen.
    app.reader.close();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("{err}");
        eprintln!("{err}");
    }
    info!("bye");
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    config: &Config,
    tasks: &mut Tasks,
    task_rx: &mut mpsc::UnboundedReceiver<BackgroundTask>,
) -> io::Result<()> {
    let mut event_stream = EventStream::new();
    let carousel_interval = config.carousel_interval();

    loop {
        terminal.draw(|f| ui(f, app))?;

        // Check if we need to trigger a debounced search
        if app.search_debounce.is_some_and(|at| at.elapsed() >= DEBOUNCE) {
            app.search_debounce = None;
            let query = app.search_query.trim();
            if !query.is_empty() && query != app.last_search_query {
                start_search(app, config, tasks);
            }
        }

        if !app.reader.is_open() {
            app.tick_carousel(carousel_interval);
        }

        let login_was_open = app.login.open;
        app.login.tick(Instant::now());
        if login_was_open && !app.login.open {
            app.notice = app.login.message.clone();
        }

        tokio::select! {
            // Timeout to check debounce and carousel timers
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}

            // Handle keyboard events
            Some(Ok(event)) = event_stream.next() => {
                if let Event::Key(key) = event {
                    if key.kind == KeyEventKind::Press && handle_key(app, key, config, tasks) {
                        return Ok(());
                    }
                }
            }

            // Handle background task results
            Some(task) = task_rx.recv() => handle_task(app, task, tasks),
        }
    }
}

fn handle_task(app: &mut App, task: BackgroundTask, tasks: &mut Tasks) {
    match task {
        BackgroundTask::SectionLoaded { kind, result } => {
            match &result {
                Ok(manga) => debug!("{} section loaded {} titles", kind.title(), manga.len()),
                Err(message) => debug!("{}: {message}", kind.title()),
            }
            app.set_section(kind, result);
            tasks.covers(app);
        }
        BackgroundTask::SearchResults { query, result } => {
            // Only the most recent query may fill the grid.
            if query != app.last_search_query {
                debug!("dropping results for superseded search {query:?}");
                return;
            }
            app.set_search_results(query, result);
            tasks.covers(app);
        }
        BackgroundTask::CoverLoaded { manga_id, image } => {
            tasks.pending_covers.remove(&manga_id);
            match image {
                Some(image) => app.add_cover_image(&manga_id, image),
                None => debug!("cover for {manga_id} could not be loaded"),
            }
        }
        BackgroundTask::Reader(response) => {
            if let Some(request) = app.reader.apply(response) {
                tasks.reader(request);
            }
            after_reader_change(app, tasks);
        }
        BackgroundTask::PageImageLoaded { url, image } => {
            tasks.pending_pages.remove(&url);
            match image {
                Some(image) => app.set_page_image(url, image),
                None => warn!("page image {url} could not be loaded"),
            }
        }
    }
}

/// Returns true when the app should quit.
fn handle_key(app: &mut App, key: KeyEvent, config: &Config, tasks: &mut Tasks) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    if app.login.open {
        handle_login_input(app, key.code);
    } else if app.reader.is_open() {
        handle_reader_input(app, key.code, tasks);
    } else if app.focus == Focus::Search {
        handle_search_input(app, key.code, config, tasks);
    } else {
        return handle_home_input(app, key.code, config, tasks);
    }
    false
}

fn handle_login_input(app: &mut App, key: KeyCode) {
    match key {
        KeyCode::Esc => app.login.close(),
        KeyCode::Tab | KeyCode::BackTab => app.login.switch_field(),
        KeyCode::Enter => app.login.submit(Instant::now()),
        KeyCode::Backspace => {
            app.login.input().pop();
        }
        KeyCode::Char(c) => app.login.input().push(c),
        _ => {}
    }
}

fn handle_reader_input(app: &mut App, key: KeyCode, tasks: &mut Tasks) {
    match app.reader.handle_key(key) {
        KeyOutcome::Request(request) => tasks.reader(request),
        KeyOutcome::Ignored => return,
        KeyOutcome::Unchanged | KeyOutcome::PageChanged | KeyOutcome::Closed => {}
    }
    after_reader_change(app, tasks);
}

fn handle_search_input(app: &mut App, key: KeyCode, config: &Config, tasks: &mut Tasks) {
    match key {
        KeyCode::Char(c) => {
            app.search_query.push(c);
            app.search_debounce = Some(Instant::now());
        }
        KeyCode::Backspace => {
            app.search_query.pop();
            if app.search_query.is_empty() {
                app.clear_search();
            } else {
                app.search_debounce = Some(Instant::now());
            }
        }
        KeyCode::Enter => {
            // Immediate search on Enter
            if let Activation::Search(_) = app.activate() {
                start_search(app, config, tasks);
            }
        }
        KeyCode::Esc => {
            app.clear_search();
            app.focus = Focus::Featured;
        }
        KeyCode::Down => app.focus = Focus::Latest,
        KeyCode::Tab => app.focus = app.focus.next(),
        KeyCode::BackTab => app.focus = app.focus.prev(),
        _ => {}
    }
}

/// Selection step for an arrow key; the grid moves a whole row vertically.
fn selection_delta(focus: Focus, key: KeyCode) -> Option<isize> {
    match (focus, key) {
        (Focus::Latest, KeyCode::Up) => Some(-(GRID_COLUMNS as isize)),
        (Focus::Latest, KeyCode::Down) => Some(GRID_COLUMNS as isize),
        (_, KeyCode::Left | KeyCode::Up) => Some(-1),
        (_, KeyCode::Right | KeyCode::Down) => Some(1),
        _ => None,
    }
}

fn handle_home_input(app: &mut App, key: KeyCode, config: &Config, tasks: &mut Tasks) -> bool {
    if let Some(delta) = selection_delta(app.focus, key) {
        app.move_selection(delta);
        return false;
    }
    match key {
        KeyCode::Char('q') => return true,
        KeyCode::Tab => app.focus = app.focus.next(),
        KeyCode::BackTab => app.focus = app.focus.prev(),
        KeyCode::Char('/') => app.focus = Focus::Search,
        KeyCode::Enter => {
            let activation = app.activate();
            run_activation(app, activation, config, tasks);
        }
        KeyCode::Char('r') => {
            let activation = app.resume_selected();
            run_activation(app, activation, config, tasks);
        }
        KeyCode::Char('b') => {
            app.notice = match app.toggle_bookmark() {
                Some(true) => Some("Bookmarked".to_string()),
                Some(false) => Some("Bookmark removed".to_string()),
                None => None,
            };
        }
        KeyCode::Char('t') => app.toggle_theme(),
        KeyCode::Char('L') => app.login.open(),
        KeyCode::Esc => {
            app.clear_search();
            app.notice = None;
        }
        _ => {}
    }
    false
}

fn run_activation(app: &mut App, activation: Activation, config: &Config, tasks: &mut Tasks) {
    match activation {
        Activation::OpenReader(manga_id) => {
            if let Some(request) = app.reader.open_manga(&manga_id) {
                tasks.reader(request);
            }
            after_reader_change(app, tasks);
        }
        Activation::ResumeReader(manga_id) => {
            if let Some(request) = app.reader.resume_manga(&manga_id) {
                tasks.reader(request);
            }
            after_reader_change(app, tasks);
        }
        Activation::OpenTitle(manga_id) => {
            let url = tasks.api.title_url(&manga_id);
            info!("opening {url}");
            if let Err(e) = webbrowser::open(&url) {
                warn!("could not open browser for {url}: {e}");
                app.notice = Some(format!("Could not open {url}"));
            }
        }
        Activation::Search(_) => start_search(app, config, tasks),
        Activation::Nothing => {}
    }
}

fn start_search(app: &mut App, config: &Config, tasks: &mut Tasks) {
    app.search_debounce = None;
    let query = app.search_query.trim().to_string();
    if query.is_empty() {
        app.notice = Some("Type a title to search.".to_string());
        return;
    }
    info!("searching for {query:?}");
    app.notice = None;
    app.searching = true;
    app.last_search_query = query.clone();
    tasks.search(query.clone(), config.search_query(&query));
}

/// Brings bookmarks and the displayed page in line with the reader.
fn after_reader_change(app: &mut App, tasks: &mut Tasks) {
    app.note_chapter_loaded();
    app.sync_page_state();
    if app.page_state.is_some() || app.picker.is_none() {
        return;
    }
    let Some(url) = app.reader.current_page_url().map(str::to_string) else {
        return;
    };
    match app.page_images.get(&url) {
        Some(image) => app.set_page_image(url, image),
        None => tasks.page_image(url),
    }
}
