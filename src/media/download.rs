use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

static PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique in-progress path next to `output_path`
///
/// Concurrent downloads of the same URL never share a partial file.
pub fn partial_path(output_path: &Path) -> PathBuf {
    let n = PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = output_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}-{n}.partial", std::process::id()));
    output_path.with_file_name(name)
}

/// Download `url` to `output_path`
///
/// Streams the response body to a `.partial` sibling, reporting progress
/// through the reporter, and renames it into place once complete.
/// Returns the number of bytes downloaded on success.
pub async fn download_media<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    title: &str,
    output_path: &Path,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        title: title.to_string(),
        url: url.to_string(),
        content_length: response.content_length,
    });

    let partial = partial_path(output_path);
    let total_bytes = response.content_length;
    let result = stream_to_file(response.body, url, title, &partial, total_bytes, reporter).await;

    let bytes_downloaded = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    reporter.report(ProgressEvent::Finalizing {
        title: title.to_string(),
    });

    tokio::fs::rename(&partial, output_path)
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    reporter.report(ProgressEvent::DownloadCompleted {
        title: title.to_string(),
        bytes_downloaded,
    });

    Ok(bytes_downloaded)
}

async fn stream_to_file(
    mut stream: crate::http::ByteStream,
    url: &str,
    title: &str,
    path: &Path,
    total_bytes: Option<u64>,
    reporter: &SharedProgressReporter,
) -> Result<u64, DownloadError> {
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::DownloadProgress {
            title: title.to_string(),
            bytes_downloaded,
            total_bytes,
        });
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockHttpClient;
    use crate::progress::NoopReporter;
    use tempfile::tempdir;

    #[tokio::test]
    async fn download_writes_file() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("episode.mp3");
        let client = MockHttpClient::new(200, b"test audio content".to_vec());

        let bytes = download_media(
            &client,
            "https://example.com/episode.mp3",
            "Test Episode",
            &output_path,
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(bytes, 18); // "test audio content".len()
        let content = std::fs::read(&output_path).unwrap();
        assert_eq!(content, b"test audio content");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn download_fails_on_http_error() {
        let dir = tempdir().unwrap();
        let output_path = dir.path().join("episode.mp3");
        let client = MockHttpClient::new(404, b"Not Found".to_vec());

        let result = download_media(
            &client,
            "https://example.com/episode.mp3",
            "Test Episode",
            &output_path,
            &NoopReporter::shared(),
        )
        .await;

        match result.unwrap_err() {
            DownloadError::HttpStatus { status, .. } => assert_eq!(status, 404),
            _ => panic!("Expected HttpStatus error"),
        }
        assert!(!output_path.exists());
    }

    #[test]
    fn partial_paths_are_unique() {
        let target = Path::new("/tmp/cache/abc.mp3");
        let a = partial_path(target);
        let b = partial_path(target);

        assert_ne!(a, b);
        assert!(a.to_string_lossy().ends_with(".partial"));
        assert_eq!(a.parent(), target.parent());
    }
}
