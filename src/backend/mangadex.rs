use async_trait::async_trait;
use image::DynamicImage;
use log::{debug, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::Cursor;

use crate::config::Config;
use crate::error::{CatalogError, FetchError};

pub const DEFAULT_API_BASE: &str = "https://api.mangadex.org";
pub const DEFAULT_UPLOADS_BASE: &str = "https://uploads.mangadex.org/covers";
pub const DEFAULT_SITE_BASE: &str = "https://mangadex.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderField {
    Follows,
    UpdatedAt,
    CreatedAt,
    LatestUploadedChapter,
    FollowedCount,
    Relevance,
}

impl OrderField {
    fn as_param(self) -> &'static str {
        match self {
            OrderField::Follows => "follows",
            OrderField::UpdatedAt => "updatedAt",
            OrderField::CreatedAt => "createdAt",
            OrderField::LatestUploadedChapter => "latestUploadedChapter",
            OrderField::FollowedCount => "followedCount",
            OrderField::Relevance => "relevance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    fn as_param(self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

/// Parameters for `GET /manga`. Cover art is always included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MangaQuery {
    pub limit: u32,
    pub order: Option<(OrderField, OrderDirection)>,
    pub title: Option<String>,
    pub status: Vec<String>,
}

impl MangaQuery {
    pub fn ordered(limit: u32, field: OrderField, direction: OrderDirection) -> Self {
        Self {
            limit,
            order: Some((field, direction)),
            ..Self::default()
        }
    }

    pub fn search(title: &str, limit: u32) -> Self {
        Self {
            limit,
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn to_query_string(&self) -> String {
        let mut params = vec![format!("limit={}", self.limit)];
        if let Some((field, direction)) = self.order {
            params.push(format!(
                "order[{}]={}",
                field.as_param(),
                direction.as_param()
            ));
        }
        if let Some(title) = &self.title {
            params.push(format!("title={}", urlencoding::encode(title)));
        }
        for status in &self.status {
            params.push(format!("status[]={}", urlencoding::encode(status)));
        }
        params.push("includes[]=cover_art".to_string());
        params.join("&")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MangaSummary {
    pub id: String,
    pub titles: BTreeMap<String, String>,
    pub description: BTreeMap<String, String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub demographic: Option<String>,
    pub cover_file_name: Option<String>,
}

impl MangaSummary {
    pub fn display_title(&self) -> String {
        pick_localized(&self.titles)
            .cloned()
            .unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn display_description(&self) -> String {
        pick_localized(&self.description).cloned().unwrap_or_default()
    }

    pub fn cover_url(&self, uploads_base: &str) -> Option<String> {
        self.cover_file_name
            .as_ref()
            .map(|file| format!("{}/{}/{}", uploads_base, self.id, file))
    }

    pub fn status_label(&self) -> &str {
        self.status.as_deref().unwrap_or("")
    }

    pub fn demographic_label(&self) -> String {
        self.demographic
            .as_deref()
            .unwrap_or("manga")
            .to_uppercase()
    }

    /// Hero metadata: demographic, then the first three tags (or the status).
    pub fn meta_line(&self) -> String {
        let demographic = self.demographic.as_deref().unwrap_or("").to_uppercase();
        let tags = self
            .tags
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let detail = if !tags.is_empty() {
            tags
        } else {
            self.status.clone().unwrap_or_else(|| "—".to_string())
        };
        format!("{} • {}", demographic, detail)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRef {
    pub id: String,
    pub chapter: Option<String>,
    pub title: Option<String>,
    pub language: String,
    pub volume: Option<String>,
    pub pages: Option<usize>,
}

impl ChapterRef {
    pub fn label(&self) -> String {
        let title = self.title.as_deref().filter(|t| !t.is_empty());
        match (&self.chapter, title) {
            (Some(number), Some(title)) => format!("Ch. {} - {}", number, title),
            (Some(number), None) => format!("Ch. {}", number),
            (None, Some(title)) => title.to_string(),
            (None, None) => "Oneshot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageQuality {
    #[default]
    Data,
    DataSaver,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageServerInfo {
    pub base_url: String,
    pub hash: String,
    pub data: Vec<String>,
    pub data_saver: Vec<String>,
}

impl PageServerInfo {
    /// Ordered page URLs for the requested quality, falling back to the
    /// other file list when the preferred one is empty.
    pub fn page_urls(&self, quality: PageQuality) -> Vec<String> {
        let use_saver = match quality {
            PageQuality::Data => self.data.is_empty() && !self.data_saver.is_empty(),
            PageQuality::DataSaver => !self.data_saver.is_empty() || self.data.is_empty(),
        };
        if use_saver {
            build_urls(&self.base_url, "data-saver", &self.hash, &self.data_saver)
        } else {
            build_page_urls(&self.base_url, &self.hash, &self.data)
        }
    }
}

pub fn build_page_urls(base_url: &str, hash: &str, files: &[String]) -> Vec<String> {
    build_urls(base_url, "data", hash, files)
}

fn build_urls(base_url: &str, segment: &str, hash: &str, files: &[String]) -> Vec<String> {
    files
        .iter()
        .map(|file| format!("{}/{}/{}/{}", base_url, segment, hash, file))
        .collect()
}

fn pick_localized(map: &BTreeMap<String, String>) -> Option<&String> {
    map.get("en").or_else(|| map.values().next())
}

/// The API sends an empty localized string as `[]` instead of `{}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Localized {
    Map(BTreeMap<String, String>),
    List(serde::de::IgnoredAny),
}

impl Default for Localized {
    fn default() -> Self {
        Localized::Map(BTreeMap::new())
    }
}

impl Localized {
    fn into_map(self) -> BTreeMap<String, String> {
        match self {
            Localized::Map(map) => map,
            Localized::List(_) => BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MangaResponse {
    #[serde(default)]
    data: Vec<MangaData>,
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
struct MangaAttributes {
    #[serde(default)]
    title: Localized,
    #[serde(default)]
    description: Option<Localized>,
    status: Option<String>,
    #[serde(default)]
    tags: Vec<TagData>,
    #[serde(rename = "publicationDemographic")]
    publication_demographic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagData {
    attributes: TagAttributes,
}

#[derive(Debug, Deserialize)]
struct TagAttributes {
    #[serde(default)]
    name: Localized,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(rename = "type")]
    rel_type: String,
    attributes: Option<RelationshipAttributes>,
}

#[derive(Debug, Deserialize)]
struct RelationshipAttributes {
    #[serde(rename = "fileName")]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterResponse {
    #[serde(default)]
    data: Vec<ChapterData>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
}

#[derive(Debug, Deserialize)]
struct ChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
    volume: Option<String>,
    pages: Option<usize>,
    #[serde(rename = "translatedLanguage")]
    translated_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtHomeResponse {
    #[serde(rename = "baseUrl")]
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
struct AtHomeChapter {
    hash: String,
    #[serde(default)]
    data: Vec<String>,
    #[serde(rename = "dataSaver", default)]
    data_saver: Vec<String>,
}

fn parse_manga_list(response: MangaResponse) -> Vec<MangaSummary> {
    response
        .data
        .into_iter()
        .map(|m| {
            let cover_file_name = m
                .relationships
                .iter()
                .find(|rel| rel.rel_type == "cover_art")
                .and_then(|rel| rel.attributes.as_ref())
                .and_then(|attrs| attrs.file_name.clone());

            let tags = m
                .attributes
                .tags
                .into_iter()
                .filter_map(|tag| pick_localized(&tag.attributes.name.into_map()).cloned())
                .collect();

            MangaSummary {
                id: m.id,
                titles: m.attributes.title.into_map(),
                description: m
                    .attributes
                    .description
                    .map(Localized::into_map)
                    .unwrap_or_default(),
                status: m.attributes.status,
                tags,
                demographic: m.attributes.publication_demographic,
                cover_file_name,
            }
        })
        .collect()
}

fn parse_chapter_list(response: ChapterResponse, language: &str) -> Vec<ChapterRef> {
    response
        .data
        .into_iter()
        .map(|c| ChapterRef {
            id: c.id,
            chapter: c.attributes.chapter,
            title: c.attributes.title,
            language: c
                .attributes
                .translated_language
                .unwrap_or_else(|| language.to_string()),
            volume: c.attributes.volume,
            pages: c.attributes.pages,
        })
        .collect()
}

impl From<AtHomeResponse> for PageServerInfo {
    fn from(response: AtHomeResponse) -> Self {
        PageServerInfo {
            base_url: response.base_url,
            hash: response.chapter.hash,
            data: response.chapter.data,
            data_saver: response.chapter.data_saver,
        }
    }
}

/// Read-only view of the manga catalog used by the reader and the home screen.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_manga(&self, query: &MangaQuery) -> Result<Vec<MangaSummary>, CatalogError>;

    async fn fetch_chapters(&self, manga_id: &str) -> Result<Vec<ChapterRef>, CatalogError>;

    async fn resolve_page_server(&self, chapter_id: &str)
    -> Result<PageServerInfo, CatalogError>;

    /// Chapter feed with failures folded into an empty list.
    async fn get_chapters(&self, manga_id: &str) -> Vec<ChapterRef> {
        match self.fetch_chapters(manga_id).await {
            Ok(chapters) => chapters,
            Err(e) => {
                warn!("{e}; treating as no chapters");
                Vec::new()
            }
        }
    }
}

#[derive(Clone)]
pub struct MangaDex {
    client: reqwest::Client,
    api_base: String,
    site_base: String,
    language: String,
    chapter_limit: u32,
}

fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("MangaView-TUI/", env!("CARGO_PKG_VERSION")))
        .build()
}

impl MangaDex {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            site_base: config.site_base.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            chapter_limit: config.chapter_limit,
        })
    }

    pub fn title_url(&self, manga_id: &str) -> String {
        format!("{}/title/{}", self.site_base, manga_id)
    }

    fn manga_url(&self, query: &MangaQuery) -> String {
        format!("{}/manga?{}", self.api_base, query.to_query_string())
    }

    fn feed_url(&self, manga_id: &str) -> String {
        format!(
            "{}/manga/{}/feed?limit={}&translatedLanguage[]={}&order[chapter]=desc",
            self.api_base, manga_id, self.chapter_limit, self.language
        )
    }

    fn at_home_url(&self, chapter_id: &str) -> String {
        format!("{}/at-home/server/{}", self.api_base, chapter_id)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.json().await?)
    }

    pub async fn fetch_cover_image(&self, cover_url: &str) -> Option<DynamicImage> {
        if cover_url.is_empty() {
            return None;
        }

        // Use thumbnail size (256px) for faster loading
        let thumb_url = format!("{}.256.jpg", cover_url);
        self.fetch_image(&thumb_url).await
    }

    pub async fn fetch_page_image(&self, page_url: &str) -> Option<DynamicImage> {
        self.fetch_image(page_url).await
    }

    async fn fetch_image(&self, url: &str) -> Option<DynamicImage> {
        let response = match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("image {url} responded with {}", response.status());
                return None;
            }
            Err(e) => {
                debug!("image {url} failed: {e}");
                return None;
            }
        };
        let bytes = response.bytes().await.ok()?;

        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .decode()
            .ok()
    }
}

#[async_trait]
impl Catalog for MangaDex {
    async fn list_manga(&self, query: &MangaQuery) -> Result<Vec<MangaSummary>, CatalogError> {
        let response: MangaResponse = self
            .get_json(&self.manga_url(query))
            .await
            .map_err(CatalogError::CatalogUnavailable)?;
        Ok(parse_manga_list(response))
    }

    async fn fetch_chapters(&self, manga_id: &str) -> Result<Vec<ChapterRef>, CatalogError> {
        let response: ChapterResponse = self
            .get_json(&self.feed_url(manga_id))
            .await
            .map_err(|source| CatalogError::ChapterFetchFailed {
                manga_id: manga_id.to_string(),
                source,
            })?;
        Ok(parse_chapter_list(response, &self.language))
    }

    async fn resolve_page_server(
        &self,
        chapter_id: &str,
    ) -> Result<PageServerInfo, CatalogError> {
        let response: AtHomeResponse = self
            .get_json(&self.at_home_url(chapter_id))
            .await
            .map_err(|source| CatalogError::PageServerUnavailable {
                chapter_id: chapter_id.to_string(),
                source,
            })?;
        Ok(response.into())
    }
}
