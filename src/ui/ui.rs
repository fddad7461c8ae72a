use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use ratatui_image::{Resize, StatefulImage, protocol::StatefulProtocol};
use std::collections::HashMap;

use crate::backend::mangadex::MangaSummary;
use crate::config::SectionKind;
use crate::reader::ReaderState;
use crate::ui::app::{App, Focus, GRID_COLUMNS, LoginField, Section, SectionStatus};
use crate::ui::theme::Palette;

const CARD_WIDTH: u16 = 24;
const GRID_CARD_HEIGHT: u16 = 12;
const SUMMARY_CHARS: usize = 320;

type Covers = HashMap<String, StatefulProtocol>;

/// Draws the whole screen from `app`. Every call rebuilds every widget.
pub fn ui(f: &mut Frame, app: &mut App) {
    // Image protocols need `&mut` while the rest of the state is only read.
    let mut covers = std::mem::take(&mut app.cover_states);
    let mut page = app.page_state.take();

    draw_main_ui(f, app, &mut covers);
    if app.reader.is_open() {
        draw_reader(f, app, page.as_mut().map(|(_, p)| p));
    }
    if app.login.open {
        draw_login(f, app);
    }

    app.cover_states = covers;
    app.page_state = page;
}

fn draw_main_ui(f: &mut Frame, app: &App, covers: &mut Covers) {
    let palette = app.theme.palette();
    let area = f.area();
    f.render_widget(Block::default().style(palette.base()), area);

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header/search
            Constraint::Min(10),   // content (fills remaining space)
            Constraint::Length(3), // footer
        ])
        .split(area);

    draw_header(f, root[0], app, &palette);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(root[1]);

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(10),     // featured carousel
            Constraint::Percentage(40), // popular today
            Constraint::Min(6),         // latest grid / search results
        ])
        .split(columns[0]);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(33),
            Constraint::Percentage(34),
            Constraint::Percentage(33),
        ])
        .split(columns[1]);

    draw_hero(f, main[0], app, covers, &palette);
    draw_manga_section(
        f,
        main[1],
        SectionKind::PopularToday.title(),
        app.section(SectionKind::PopularToday),
        app.focus == Focus::PopularToday,
        covers,
        &palette,
    );
    draw_grid(f, main[2], app, covers, &palette);
    draw_manga_list(f, side[0], app, SectionKind::Popular, false, &palette);
    draw_manga_list(f, side[1], app, SectionKind::Ranking, true, &palette);
    draw_bookmarks(f, side[2], app, &palette);

    draw_footer(f, root[2], &palette);
}

fn spinner() -> &'static str {
    let spinner_frames = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let frame_idx = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
        / 100) as usize
        % spinner_frames.len();
    spinner_frames[frame_idx]
}

fn draw_header(f: &mut Frame, area: Rect, app: &App, palette: &Palette) {
    let focused = app.focus == Focus::Search;
    let block = Block::default()
        .borders(Borders::ALL)
        .title("MangaView")
        .border_style(palette.border(focused));

    let cursor = if focused { "▏" } else { "" };
    let mut spans = vec![
        Span::styled("Search: ", palette.muted()),
        Span::styled(format!("{}{}", app.search_query, cursor), palette.title()),
    ];
    if app.is_loading() {
        spans.push(Span::styled(
            format!("   {} Loading...", spinner()),
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        ));
    }
    if let Some(notice) = &app.notice {
        spans.push(Span::styled(format!("   {}", notice), palette.highlight()));
    }

    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

/// Static text shown in place of a section's content, if any.
fn placeholder(section: &Section, empty_text: &str) -> Option<String> {
    match &section.status {
        SectionStatus::Loading => Some("Loading...".to_string()),
        SectionStatus::Failed(message) => Some(message.clone()),
        SectionStatus::Ready if section.manga.is_empty() => Some(empty_text.to_string()),
        SectionStatus::Ready => None,
    }
}

fn render_placeholder(f: &mut Frame, area: Rect, text: String, palette: &Palette) {
    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(palette.muted());
    f.render_widget(paragraph, area);
}

fn draw_hero(f: &mut Frame, area: Rect, app: &App, covers: &mut Covers, palette: &Palette) {
    let focused = app.focus == Focus::Featured;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(SectionKind::Featured.title())
        .border_style(palette.border(focused))
        .style(palette.panel());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let section = app.section(SectionKind::Featured);
    let Some(manga) = app.featured() else {
        let text = placeholder(section, "No manga available").unwrap_or_default();
        render_placeholder(f, inner, text, palette);
        return;
    };

    let parts = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(16), Constraint::Min(10)])
        .split(inner);

    draw_cover(f, parts[0], &manga.id, covers, palette);

    let summary = truncate_summary(&manga.display_description(), SUMMARY_CHARS);
    let dots: Vec<Span> = (0..section.manga.len())
        .map(|i| {
            if i == app.featured_index {
                Span::styled("● ", palette.highlight())
            } else {
                Span::styled("○ ", palette.muted())
            }
        })
        .collect();
    let bookmark_hint = if app.bookmarks.is_bookmarked(&manga.id) {
        "[b] ★ Bookmarked"
    } else {
        "[b] Bookmark"
    };

    let mut hints = vec![
        Span::styled("★ ", palette.highlight()),
        Span::raw("[Enter] Read  "),
        Span::raw(bookmark_hint),
    ];
    if app.reader.resume().get(&manga.id).is_some() {
        hints.push(Span::raw("  [r] Resume"));
    }

    let lines = vec![
        Line::from(Span::styled(
            manga.display_title().to_uppercase(),
            palette.title(),
        )),
        Line::from(Span::styled(manga.meta_line(), Style::default().fg(palette.accent))),
        Line::from(Span::styled(summary, palette.muted())),
        Line::from(dots),
        Line::from(hints),
    ];
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
    f.render_widget(paragraph, parts[1]);
}

fn draw_cover(f: &mut Frame, area: Rect, manga_id: &str, covers: &mut Covers, palette: &Palette) {
    if let Some(state) = covers.get_mut(manga_id) {
        let image_widget = StatefulImage::new().resize(Resize::Scale(None));
        f.render_stateful_widget(image_widget, area, state);
    } else {
        // Placeholder when image not loaded
        let image_content = vec![
            Line::from(""),
            Line::from(Span::styled("📚", Style::default().fg(palette.accent))),
            Line::from(Span::styled("No Cover", palette.muted())),
        ];
        let image_paragraph = Paragraph::new(image_content).alignment(Alignment::Center);
        f.render_widget(image_paragraph, area);
    }
}

fn draw_manga_section(
    f: &mut Frame,
    area: Rect,
    title: &str,
    section: &Section,
    focused: bool,
    covers: &mut Covers,
    palette: &Palette,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(palette.border(focused));

    let inner = block.inner(area);
    f.render_widget(block, area);

    if let Some(text) = placeholder(section, "No manga available") {
        render_placeholder(f, inner, text, palette);
        return;
    }
    let mangas = &section.manga;

    // Calculate how many cards fit
    let cards_visible = (inner.width as usize / CARD_WIDTH as usize).max(1);
    let offset = (section.selected + 1).saturating_sub(cards_visible);

    // Draw manga cards horizontally
    let card_constraints: Vec<Constraint> = (0..cards_visible)
        .map(|_| Constraint::Length(CARD_WIDTH))
        .collect();

    let card_areas = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(card_constraints)
        .split(inner);

    for (i, card_area) in card_areas.iter().enumerate() {
        let manga_idx = offset + i;
        let Some(manga) = mangas.get(manga_idx) else {
            break;
        };
        let selected = focused && manga_idx == section.selected;
        draw_manga_card(f, *card_area, manga, selected, manga.status_label(), covers, palette);
    }

    // Draw scroll indicators
    if offset > 0 {
        let left_indicator = Paragraph::new("◀").style(palette.highlight());
        let left_area = Rect::new(inner.x, inner.y + inner.height / 2, 1, 1);
        f.render_widget(left_indicator, left_area);
    }

    if offset + cards_visible < mangas.len() {
        let right_indicator = Paragraph::new("▶").style(palette.highlight());
        let right_area = Rect::new(
            inner.x + inner.width.saturating_sub(1),
            inner.y + inner.height / 2,
            1,
            1,
        );
        f.render_widget(right_indicator, right_area);
    }
}

fn draw_manga_card(
    f: &mut Frame,
    area: Rect,
    manga: &MangaSummary,
    selected: bool,
    caption: &str,
    covers: &mut Covers,
    palette: &Palette,
) {
    let border_style = if selected {
        palette.highlight()
    } else {
        palette.muted()
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);

    let inner = block.inner(area);
    f.render_widget(block, area);

    if inner.height < 3 || inner.width < 5 {
        return;
    }

    // Layout: cover, title, caption
    let card_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // cover
            Constraint::Length(1), // title
            Constraint::Length(1), // status / type
        ])
        .split(inner);

    draw_cover(f, card_layout[0], &manga.id, covers, palette);

    // Title (truncated)
    let title = truncate_text(&manga.display_title(), inner.width as usize);
    let title_paragraph = Paragraph::new(title).style(palette.title());
    f.render_widget(title_paragraph, card_layout[1]);

    let caption_line = Line::from(vec![
        Span::styled("★ ", Style::default().fg(palette.focus)),
        Span::styled(caption.to_string(), Style::default().fg(palette.accent)),
    ]);
    f.render_widget(Paragraph::new(caption_line), card_layout[2]);
}

fn draw_grid(f: &mut Frame, area: Rect, app: &App, covers: &mut Covers, palette: &Palette) {
    let focused = app.focus == Focus::Latest;
    let (title, empty_text) = match &app.search_results {
        Some((query, _)) => (format!("Results for \"{}\"", query), "No results"),
        None => (SectionKind::Latest.title().to_string(), "No manga available"),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(palette.border(focused));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let section = app.grid();
    if let Some(text) = placeholder(section, empty_text) {
        render_placeholder(f, inner, text, palette);
        return;
    }

    let rows_visible = (inner.height / GRID_CARD_HEIGHT).max(1) as usize;
    let selected_row = section.selected / GRID_COLUMNS;
    let first_row = (selected_row + 1).saturating_sub(rows_visible);

    let row_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints((0..rows_visible).map(|_| Constraint::Length(GRID_CARD_HEIGHT)))
        .split(inner);

    for (r, row_area) in row_areas.iter().enumerate() {
        let cells = Layout::default()
            .direction(Direction::Horizontal)
            .constraints((0..GRID_COLUMNS).map(|_| Constraint::Ratio(1, GRID_COLUMNS as u32)))
            .split(*row_area);
        for (c, cell) in cells.iter().enumerate() {
            let idx = (first_row + r) * GRID_COLUMNS + c;
            let Some(manga) = section.manga.get(idx) else {
                return;
            };
            let selected = focused && idx == section.selected;
            let caption = manga.demographic_label();
            draw_manga_card(f, *cell, manga, selected, &caption, covers, palette);
        }
    }
}

fn draw_manga_list(
    f: &mut Frame,
    area: Rect,
    app: &App,
    kind: SectionKind,
    numbered: bool,
    palette: &Palette,
) {
    let focused = match kind {
        SectionKind::Popular => app.focus == Focus::Popular,
        SectionKind::Ranking => app.focus == Focus::Ranking,
        _ => false,
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(kind.title())
        .border_style(palette.border(focused));

    let section = app.section(kind);
    if let Some(text) = placeholder(section, "No manga available") {
        let inner = block.inner(area);
        f.render_widget(block, area);
        render_placeholder(f, inner, text, palette);
        return;
    }

    let items: Vec<ListItem> = section
        .manga
        .iter()
        .enumerate()
        .map(|(i, manga)| {
            let mut title = vec![];
            if numbered {
                title.push(Span::styled(format!("{:>2} ", i + 1), palette.highlight()));
            }
            title.push(Span::styled(manga.display_title(), palette.title()));
            ListItem::new(vec![
                Line::from(title),
                Line::from(Span::styled(
                    format!("   {}", manga.status_label()),
                    palette.muted(),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(focused.then_some(section.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_bookmarks(f: &mut Frame, area: Rect, app: &App, palette: &Palette) {
    let focused = app.focus == Focus::Bookmarks;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Bookmarks ({})", app.bookmarks.len()))
        .border_style(palette.border(focused));

    if app.bookmarks.is_empty() {
        let inner = block.inner(area);
        f.render_widget(block, area);
        render_placeholder(f, inner, "No bookmarks yet.".to_string(), palette);
        return;
    }

    let items: Vec<ListItem> = app
        .bookmarks
        .list()
        .iter()
        .map(|b| {
            ListItem::new(vec![
                Line::from(Span::styled(b.title.clone(), palette.title())),
                Line::from(Span::styled(
                    format!("   Last: {}", b.last_chapter.as_deref().unwrap_or("—")),
                    palette.muted(),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(focused.then_some(app.bookmark_selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn draw_reader(f: &mut Frame, app: &App, page: Option<&mut StatefulProtocol>) {
    let palette = app.theme.palette();
    let area = centered_rect(92, 92, f.area());
    f.render_widget(Clear, area);

    let reader = &app.reader;
    let title = match (reader.current_chapter(), reader.session()) {
        (Some(chapter), Some(session)) => format!(
            "Reader - {} ({}/{})",
            chapter.label(),
            session.chapter_index + 1,
            session.chapters.len()
        ),
        _ => "Reader".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(palette.border(true))
        .style(palette.panel());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(inner);

    match reader.state() {
        ReaderState::PagesLoaded => match page {
            Some(state) => {
                let image_widget = StatefulImage::new().resize(Resize::Scale(None));
                f.render_stateful_widget(image_widget, parts[0], state);
            }
            None => {
                let text = match reader.page_position() {
                    Some((page, _)) => format!("Loading page {}...", page),
                    None => "Loading...".to_string(),
                };
                render_placeholder(f, parts[0], text, &palette);
            }
        },
        ReaderState::Error(err) => {
            let paragraph = Paragraph::new(err.user_message())
                .alignment(Alignment::Center)
                .style(Style::default().fg(palette.error));
            f.render_widget(paragraph, parts[0]);
        }
        _ => render_placeholder(f, parts[0], format!("{} Loading...", spinner()), &palette),
    }

    let enabled = |on: bool| {
        if on {
            palette.highlight()
        } else {
            palette.muted()
        }
    };
    let position = reader
        .page_position()
        .map(|(page, total)| format!("Page {}/{}", page, total))
        .unwrap_or_default();
    let controls = Line::from(vec![
        Span::styled("◀ Prev chapter", enabled(reader.can_prev())),
        Span::raw("   "),
        Span::styled(position, palette.title()),
        Span::raw("   "),
        Span::styled("Next chapter ▶", enabled(reader.can_next())),
        Span::styled("   ↑/↓: page  Esc: close", palette.muted()),
    ]);
    f.render_widget(
        Paragraph::new(controls).alignment(Alignment::Center),
        parts[1],
    );
}

fn draw_login(f: &mut Frame, app: &App) {
    let palette = app.theme.palette();
    let area = centered_rect(50, 40, f.area());
    f.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Login")
        .border_style(palette.border(true))
        .style(palette.panel());

    let login = &app.login;
    let field_style = |field: LoginField| {
        if login.field == field {
            palette.highlight()
        } else {
            palette.base()
        }
    };
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Username: ", field_style(LoginField::Username)),
            Span::raw(login.username.clone()),
        ]),
        Line::from(vec![
            Span::styled("Password: ", field_style(LoginField::Password)),
            Span::raw("*".repeat(login.password.chars().count())),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "Tab: switch field  Enter: sign in  Esc: cancel",
            palette.muted(),
        )),
    ];
    if let Some(message) = &login.message {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(message.clone(), palette.highlight())));
    }

    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        format!(
            "{}...",
            text.chars()
                .take(max_len.saturating_sub(3))
                .collect::<String>()
        )
    }
}

fn truncate_summary(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}…", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

fn draw_footer(f: &mut Frame, area: Rect, palette: &Palette) {
    let key = |k: &'static str| Span::styled(k, palette.highlight());
    let text = Line::from(vec![
        key("Tab"),
        Span::raw(": section  "),
        key("←/→/↑/↓"),
        Span::raw(": move  "),
        key("Enter"),
        Span::raw(": open  "),
        key("r"),
        Span::raw(": resume  "),
        key("b"),
        Span::raw(": bookmark  "),
        key("/"),
        Span::raw(": search  "),
        key("t"),
        Span::raw(": theme  "),
        key("L"),
        Span::raw(": login  "),
        key("q"),
        Span::raw(": quit"),
    ]);

    let p = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(palette.border(false)),
        )
        .alignment(Alignment::Center);
    f.render_widget(p, area);
}
