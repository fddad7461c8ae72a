pub mod bookmarks;
pub mod cache;
pub mod mangadex;
pub mod resume;
pub mod storage;
