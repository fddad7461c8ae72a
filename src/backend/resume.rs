use log::error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::storage;

pub const RESUME_FILE: &str = "resume.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeEntry {
    #[serde(rename = "chapterId")]
    pub chapter_id: String,
    #[serde(rename = "pageIndex")]
    pub page_index: usize,
    /// Unix time in milliseconds.
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

/// Last position read per manga.
#[derive(Debug)]
pub struct ResumeStore {
    path: Option<PathBuf>,
    entries: HashMap<String, ResumeEntry>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl ResumeStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = storage::load_or_default(&path);
        Self {
            path: Some(path),
            entries,
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::load(dir.join(RESUME_FILE))
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
        }
    }

    pub fn record(&mut self, manga_id: &str, chapter_id: &str, page_index: usize) {
        self.entries.insert(
            manga_id.to_string(),
            ResumeEntry {
                chapter_id: chapter_id.to_string(),
                page_index,
                updated_at: now_millis(),
            },
        );
        if let Some(path) = &self.path {
            if let Err(e) = storage::write_json(path, &self.entries) {
                error!("failed to save resume data to {}: {e}", path.display());
            }
        }
    }

    pub fn get(&self, manga_id: &str) -> Option<&ResumeEntry> {
        self.entries.get(manga_id)
    }
}
