use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::mangadex::{
    DEFAULT_API_BASE, DEFAULT_SITE_BASE, DEFAULT_UPLOADS_BASE, MangaQuery, OrderDirection,
    OrderField, PageQuality,
};
use crate::cli::Cli;
use crate::ui::theme::ThemeName;

const APP_DIR: &str = "mangaview";
const CONFIG_FILE: &str = "config.toml";

/// The five listing regions of the home screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Featured,
    PopularToday,
    Latest,
    Popular,
    Ranking,
}

impl SectionKind {
    pub const ALL: [SectionKind; 5] = [
        SectionKind::Featured,
        SectionKind::PopularToday,
        SectionKind::Latest,
        SectionKind::Popular,
        SectionKind::Ranking,
    ];

    pub fn title(self) -> &'static str {
        match self {
            SectionKind::Featured => "Featured",
            SectionKind::PopularToday => "Popular Today",
            SectionKind::Latest => "Latest Updates",
            SectionKind::Popular => "Popular",
            SectionKind::Ranking => "Ranking",
        }
    }

    fn default_query(self) -> MangaQuery {
        let (limit, field) = match self {
            SectionKind::Featured => (6, OrderField::Follows),
            SectionKind::PopularToday => (8, OrderField::UpdatedAt),
            SectionKind::Latest => (18, OrderField::CreatedAt),
            SectionKind::Popular => (8, OrderField::Follows),
            SectionKind::Ranking => (10, OrderField::Follows),
        };
        MangaQuery::ordered(limit, field, OrderDirection::Desc)
    }
}

/// Per-section overrides; unset keys keep the section's defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SectionConfig {
    pub limit: Option<u32>,
    pub order: Option<OrderField>,
    pub direction: Option<OrderDirection>,
    pub status: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SectionsConfig {
    pub featured: SectionConfig,
    pub popular_today: SectionConfig,
    pub latest: SectionConfig,
    pub popular: SectionConfig,
    pub ranking: SectionConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api_base: String,
    pub uploads_base: String,
    pub site_base: String,
    pub language: String,
    pub chapter_limit: u32,
    pub search_limit: u32,
    pub data_saver: bool,
    pub page_server_ttl_secs: u64,
    pub carousel_interval_secs: u64,
    pub theme: ThemeName,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub sections: SectionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            uploads_base: DEFAULT_UPLOADS_BASE.to_string(),
            site_base: DEFAULT_SITE_BASE.to_string(),
            language: "en".to_string(),
            chapter_limit: 500,
            search_limit: 24,
            data_saver: false,
            page_server_ttl_secs: 300,
            carousel_interval_secs: 6,
            theme: ThemeName::Dark,
            log_level: "info".to_string(),
            log_file: None,
            data_dir: None,
            sections: SectionsConfig::default(),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid config")
    }

    /// Reads the config at `path`, or the default location when it exists.
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(language) = &cli.language {
            self.language = language.clone();
        }
        if cli.data_saver {
            self.data_saver = true;
        }
        if let Some(log_file) = &cli.log_file {
            self.log_file = Some(log_file.clone());
        }
    }

    pub fn page_quality(&self) -> PageQuality {
        if self.data_saver {
            PageQuality::DataSaver
        } else {
            PageQuality::Data
        }
    }

    pub fn page_server_ttl(&self) -> Duration {
        Duration::from_secs(self.page_server_ttl_secs)
    }

    pub fn carousel_interval(&self) -> Duration {
        Duration::from_secs(self.carousel_interval_secs.max(1))
    }

    pub fn log_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("mangaview.log")
        })
    }

    fn section_overrides(&self, kind: SectionKind) -> &SectionConfig {
        match kind {
            SectionKind::Featured => &self.sections.featured,
            SectionKind::PopularToday => &self.sections.popular_today,
            SectionKind::Latest => &self.sections.latest,
            SectionKind::Popular => &self.sections.popular,
            SectionKind::Ranking => &self.sections.ranking,
        }
    }

    pub fn section_query(&self, kind: SectionKind) -> MangaQuery {
        let overrides = self.section_overrides(kind);
        let mut query = kind.default_query();
        if let Some(limit) = overrides.limit {
            query.limit = limit;
        }
        if let Some((field, direction)) = query.order.as_mut() {
            if let Some(order) = overrides.order {
                *field = order;
            }
            if let Some(dir) = overrides.direction {
                *direction = dir;
            }
        }
        query.status = overrides.status.clone();
        query
    }

    pub fn search_query(&self, title: &str) -> MangaQuery {
        MangaQuery::search(title, self.search_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            language = "es"
            data_saver = true
            theme = "light"

            [sections.latest]
            limit = 30
            status = ["ongoing"]
            "#,
        )
        .unwrap();

        assert_eq!(config.language, "es");
        assert_eq!(config.page_quality(), PageQuality::DataSaver);
        assert_eq!(config.theme, ThemeName::Light);
        assert_eq!(config.chapter_limit, 500);

        let latest = config.section_query(SectionKind::Latest);
        assert_eq!(
            latest.to_query_string(),
            "limit=30&order[createdAt]=desc&status[]=ongoing&includes[]=cover_art"
        );
        let ranking = config.section_query(SectionKind::Ranking);
        assert_eq!(
            ranking.to_query_string(),
            "limit=10&order[follows]=desc&includes[]=cover_art"
        );
    }

    #[test]
    fn section_order_can_be_overridden() {
        let config = Config::from_toml(
            r#"
            [sections.popular_today]
            order = "latestUploadedChapter"
            direction = "asc"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.section_query(SectionKind::PopularToday).order,
            Some((OrderField::LatestUploadedChapter, OrderDirection::Asc))
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("colour = \"blue\"").is_err());
    }

    #[test]
    fn cli_flags_override_file_values() {
        let mut config = Config::default();
        let cli = Cli {
            language: Some("fr".to_string()),
            data_saver: true,
            log_file: Some(PathBuf::from("/tmp/mv.log")),
            ..Cli::default()
        };
        config.apply_cli(&cli);

        assert_eq!(config.language, "fr");
        assert!(config.data_saver);
        assert_eq!(config.log_path(), PathBuf::from("/tmp/mv.log"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());

        let path = dir.path().join("config.toml");
        fs::write(&path, "search_limit = 12").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().search_limit, 12);
    }
}
