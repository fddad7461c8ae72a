use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::mangadex::MangaSummary;
use super::storage;

pub const BOOKMARKS_FILE: &str = "bookmarks.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    pub cover: Option<String>,
    #[serde(rename = "lastChapter", default)]
    pub last_chapter: Option<String>,
}

impl Bookmark {
    /// Captures title and cover as they are right now; later catalog changes
    /// are not reflected.
    pub fn snapshot(manga: &MangaSummary, uploads_base: &str) -> Self {
        Bookmark {
            id: manga.id.clone(),
            title: manga.display_title(),
            cover: manga.cover_url(uploads_base),
            last_chapter: None,
        }
    }
}

/// Favorited manga, most recently added first, mirrored to disk on every change.
#[derive(Debug)]
pub struct BookmarkStore {
    path: PathBuf,
    entries: Vec<Bookmark>,
}

impl BookmarkStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut entries: Vec<Bookmark> = storage::load_or_default(&path);

        let mut seen = HashSet::new();
        entries.retain(|b| seen.insert(b.id.clone()));
        info!("loaded {} bookmarks from {}", entries.len(), path.display());

        Self { path, entries }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::load(dir.join(BOOKMARKS_FILE))
    }

    fn save(&self) {
        if let Err(e) = storage::write_json(&self.path, &self.entries) {
            error!("failed to save bookmarks to {}: {e}", self.path.display());
        }
    }

    pub fn is_bookmarked(&self, manga_id: &str) -> bool {
        self.entries.iter().any(|b| b.id == manga_id)
    }

    /// Removes the bookmark if present, otherwise inserts it at the front.
    /// Returns whether the manga is bookmarked afterwards.
    pub fn toggle(&mut self, bookmark: Bookmark) -> bool {
        let bookmarked = if let Some(idx) = self.entries.iter().position(|b| b.id == bookmark.id) {
            self.entries.remove(idx);
            false
        } else {
            self.entries.insert(0, bookmark);
            true
        };
        self.save();
        bookmarked
    }

    pub fn set_last_chapter(&mut self, manga_id: &str, label: &str) {
        let Some(entry) = self.entries.iter_mut().find(|b| b.id == manga_id) else {
            return;
        };
        if entry.last_chapter.as_deref() == Some(label) {
            return;
        }
        entry.last_chapter = Some(label.to_string());
        self.save();
    }

    pub fn list(&self) -> &[Bookmark] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
