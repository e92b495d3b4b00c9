use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{CacheError, DownloadError};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

use super::download::download_media;

/// Number of files kept after eviction
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// A completed file in the cache directory
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Local copies of remote media, keyed by URL
///
/// Playback reads from these files so that downloads can go through the
/// configured proxy.
#[derive(Debug, Clone)]
pub struct MediaCache {
    dir: PathBuf,
    max_entries: usize,
}

impl MediaCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// `<cache dir>/feedcast/media`, if the platform has a cache dir
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("feedcast").join("media"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Where the media at `url` is stored once cached
    pub fn path_for(&self, url: &Url) -> PathBuf {
        let digest = Sha256::digest(url.as_str().as_bytes());
        let name = format!("{}.{}", hex::encode(&digest[..16]), media_extension(url));
        self.dir.join(name)
    }

    /// Return the cached file for `url`, downloading it first if needed
    pub async fn fetch<C: HttpClient + ?Sized>(
        &self,
        client: &C,
        url: &str,
        title: &str,
        reporter: &SharedProgressReporter,
    ) -> Result<PathBuf, DownloadError> {
        let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            source: e,
        })?;
        let path = self.path_for(&parsed);

        if path.exists() {
            touch(&path);
            reporter.report(ProgressEvent::CacheHit {
                title: title.to_string(),
                url: url.to_string(),
            });
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::CreateDirectoryFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        if let Err(e) = download_media(client, url, title, &path, reporter).await {
            reporter.report(ProgressEvent::DownloadFailed {
                title: title.to_string(),
                error: e.to_string(),
            });
            return Err(e);
        }

        Ok(path)
    }

    /// Completed entries, most recently used first
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let read_failed = |e| CacheError::ReadDirectoryFailed {
            path: self.dir.clone(),
            source: e,
        };

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(read_failed)? {
            let entry = entry.map_err(read_failed)?;
            let path = entry.path();
            if is_partial(&path) {
                continue;
            }

            let metadata = entry.metadata().map_err(read_failed)?;
            if !metadata.is_file() {
                continue;
            }

            entries.push(CacheEntry {
                path,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(entries)
    }

    /// Remove leftover partial files and every entry beyond the newest
    /// `max_entries`. Returns the number of files removed.
    pub fn evict(&self) -> Result<usize, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;

        let partials = std::fs::read_dir(&self.dir)
            .map_err(|e| CacheError::ReadDirectoryFailed {
                path: self.dir.clone(),
                source: e,
            })?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_partial(path));
        for path in partials {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        let entries = self.entries()?;
        for entry in entries.iter().skip(self.max_entries) {
            std::fs::remove_file(&entry.path).map_err(|e| CacheError::RemoveFailed {
                path: entry.path.clone(),
                source: e,
            })?;
            removed += 1;
        }

        tracing::debug!(dir = %self.dir.display(), removed, "Cache eviction finished");
        Ok(removed)
    }
}

fn is_partial(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "partial")
}

/// Mark an entry as recently used so eviction keeps it
fn touch(path: &Path) {
    let result = std::fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::now()));
    if let Err(e) = result {
        tracing::debug!(path = %path.display(), error = %e, "Could not refresh cache entry time");
    }
}

/// File extension for a media URL, defaulting to mp3
fn media_extension(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| is_valid_media_extension(ext))
        .unwrap_or_else(|| "mp3".to_string())
}

fn is_valid_media_extension(ext: &str) -> bool {
    matches!(
        ext,
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "wav" | "flac"
    )
}
