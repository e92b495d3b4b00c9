mod cache;
mod download;

pub use cache::{CacheEntry, DEFAULT_MAX_ENTRIES, MediaCache};
pub use download::{download_media, partial_path};
