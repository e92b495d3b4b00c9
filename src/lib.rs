pub mod error;
pub mod feed;
pub mod http;
pub mod media;
pub mod player;
pub mod progress;
pub mod proxy;
pub mod settings;

// Re-export main types for convenience
pub use error::{CacheError, DownloadError, EngineError, FeedError, SettingsError};
pub use feed::{Feed, FeedList, FeedQuery, FeedRepository, Labels, LoadState, TimeRange};
pub use http::{HttpClient, HttpRequest, HttpResponse, ProxyConfig, ReqwestClient};
pub use media::MediaCache;
pub use player::{
    MediaBackend, MediaEngine, MediaSession, PlaybackSnapshot, PlaybackState, PlayerHandle,
    PlayerService, RepeatMode,
};
pub use progress::{
    NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter, TracingReporter,
};
pub use proxy::{ProxyBridge, WebRequest, WebResponse};
pub use settings::{ResetScope, Settings, SettingsStore, ThemeMode};
