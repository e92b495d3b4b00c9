use std::sync::Arc;

/// Events emitted while media is fetched into the local cache
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The requested media was already cached
    CacheHit { title: String, url: String },

    /// A download is starting
    DownloadStarting {
        title: String,
        url: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        title: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// Download is being finalized (renamed from .partial)
    Finalizing { title: String },

    /// A download completed successfully
    DownloadCompleted { title: String, bytes_downloaded: u64 },

    /// A download failed
    DownloadFailed { title: String, error: String },

    /// Old cache entries were removed
    CacheEvicted { removed: usize, kept: usize },
}

/// Trait for reporting progress events during media downloads.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Forwards milestones to `tracing`; per-chunk progress is dropped
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl TracingReporter {
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::CacheHit { title, url } => {
                tracing::debug!(%title, %url, "Media already cached");
            }
            ProgressEvent::DownloadStarting {
                title,
                url,
                content_length,
            } => {
                tracing::info!(%title, %url, ?content_length, "Downloading media");
            }
            ProgressEvent::DownloadProgress { .. } | ProgressEvent::Finalizing { .. } => {}
            ProgressEvent::DownloadCompleted {
                title,
                bytes_downloaded,
            } => {
                tracing::info!(%title, bytes = bytes_downloaded, "Media downloaded");
            }
            ProgressEvent::DownloadFailed { title, error } => {
                tracing::warn!(%title, %error, "Media download failed");
            }
            ProgressEvent::CacheEvicted { removed, kept } => {
                tracing::debug!(removed, kept, "Evicted cached media");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Collects every event for later assertions
    #[derive(Default)]
    pub struct RecordingReporter {
        pub events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_events() -> Vec<ProgressEvent> {
        vec![
            ProgressEvent::CacheHit {
                title: "Episode 1".to_string(),
                url: "https://example.com/1.mp3".to_string(),
            },
            ProgressEvent::DownloadStarting {
                title: "Episode 1".to_string(),
                url: "https://example.com/1.mp3".to_string(),
                content_length: Some(1024),
            },
            ProgressEvent::DownloadProgress {
                title: "Episode 1".to_string(),
                bytes_downloaded: 512,
                total_bytes: Some(1024),
            },
            ProgressEvent::Finalizing {
                title: "Episode 1".to_string(),
            },
            ProgressEvent::DownloadCompleted {
                title: "Episode 1".to_string(),
                bytes_downloaded: 1024,
            },
            ProgressEvent::DownloadFailed {
                title: "Episode 2".to_string(),
                error: "Connection timeout".to_string(),
            },
            ProgressEvent::CacheEvicted {
                removed: 2,
                kept: 10,
            },
        ]
    }

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter;
        for event in all_events() {
            reporter.report(event);
        }
    }

    #[test]
    fn tracing_reporter_handles_all_events() {
        let reporter = TracingReporter;
        for event in all_events() {
            reporter.report(event);
        }
    }
}
