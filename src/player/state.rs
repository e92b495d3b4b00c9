use std::fmt;
use std::time::Duration;

use crate::feed::Feed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Media is being downloaded or prepared
    Buffering,
    Playing,
    Paused,
    Stopped,
    /// The last play request failed; inert until a new play action
    Error,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Buffering => "buffering",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    /// Stop after the last item
    #[default]
    Off,
    /// Wrap around to the first item
    All,
    /// Replay the current item
    One,
}

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 3.0;

/// Keep playback speed within what engines reliably support
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

/// Everything observers need to render the player
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub is_playing: bool,
    pub current: Option<Feed>,
    pub index: Option<usize>,
    pub playlist_len: usize,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub speed: f32,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub sleep_remaining: Option<Duration>,
    pub error: Option<String>,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            is_playing: false,
            current: None,
            index: None,
            playlist_len: 0,
            shuffle: false,
            repeat: RepeatMode::Off,
            speed: 1.0,
            position: Duration::ZERO,
            duration: None,
            sleep_remaining: None,
            error: None,
        }
    }
}
