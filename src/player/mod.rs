mod controller;
mod engine;
mod playlist;
mod service;
mod session;
mod state;

pub use controller::{LoadRequest, PlayerController};
pub use engine::{EngineEvent, EngineEvents, EngineNotice, MediaBackend, MediaEngine};
pub use playlist::Playlist;
pub use service::{PlayerCommand, PlayerHandle, PlayerService};
pub use session::{
    MediaSession, NoopSession, SessionActions, SessionMetadata, SessionPlaybackState,
};
pub use state::{MAX_SPEED, MIN_SPEED, PlaybackSnapshot, PlaybackState, RepeatMode, clamp_speed};
