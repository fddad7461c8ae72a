use reqwest::StatusCode;
use thiserror::Error;

/// Why a single HTTP call against the catalog did not produce a usable body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("service responded with status {0}")]
    Status(StatusCode),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(#[source] FetchError),
    #[error("chapter feed for manga {manga_id} failed: {source}")]
    ChapterFetchFailed {
        manga_id: String,
        #[source]
        source: FetchError,
    },
    #[error("page server for chapter {chapter_id} unavailable: {source}")]
    PageServerUnavailable {
        chapter_id: String,
        #[source]
        source: FetchError,
    },
}

/// Failures the reader overlay can end up showing. Kept cloneable so the
/// reader state can hold on to the last one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    #[error("no chapters available in {language}")]
    NoChaptersAvailable { language: String },
    #[error("chapter list could not be fetched for {language}")]
    ChapterFetchFailed { language: String },
    #[error("page server unavailable")]
    PageServerUnavailable,
    #[error("no pages found for this chapter")]
    NoPagesAvailable,
    #[error("chapter index {index} out of range for {len} chapters")]
    InvalidChapterIndex { index: usize, len: usize },
}

impl ReaderError {
    /// Inline text shown in place of the reader pages.
    pub fn user_message(&self) -> String {
        match self {
            // A failed feed reads the same as an empty one to the user.
            ReaderError::NoChaptersAvailable { language }
            | ReaderError::ChapterFetchFailed { language } => {
                format!("No chapters available ({})", language.to_uppercase())
            }
            ReaderError::PageServerUnavailable => {
                "Failed loading chapter pages (server unavailable or missing data)".to_string()
            }
            ReaderError::NoPagesAvailable => "No pages found for this chapter.".to_string(),
            ReaderError::InvalidChapterIndex { .. } => "Reader error".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored data is corrupt: {0}")]
    StorageCorrupt(#[from] serde_json::Error),
    #[error("could not encode data for storage: {0}")]
    Encode(#[source] serde_json::Error),
}
