use std::time::Duration;

use super::state::PlaybackState;

/// Track details shown on the lock screen and in notifications
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMetadata {
    pub media_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: Option<Duration>,
}

/// Transport controls the session should offer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionActions {
    pub play: bool,
    pub pause: bool,
    pub stop: bool,
    pub seek: bool,
    pub skip_to_next: bool,
    pub skip_to_previous: bool,
}

impl SessionActions {
    pub fn for_state(state: PlaybackState, playlist_len: usize) -> Self {
        let prepared = matches!(state, PlaybackState::Playing | PlaybackState::Paused);
        Self {
            play: state != PlaybackState::Playing && playlist_len > 0,
            pause: state == PlaybackState::Playing,
            stop: prepared || state == PlaybackState::Buffering,
            seek: prepared,
            skip_to_next: playlist_len > 1,
            skip_to_previous: playlist_len > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlaybackState {
    pub state: PlaybackState,
    pub position: Duration,
    pub speed: f32,
    pub actions: SessionActions,
    pub error: Option<String>,
}

/// The OS-level media session mirrored by the player
///
/// Button presses coming from the session are fed back through
/// [`PlayerHandle`](super::PlayerHandle).
pub trait MediaSession: Send {
    fn set_active(&mut self, active: bool);
    fn set_metadata(&mut self, metadata: &SessionMetadata);
    fn set_playback_state(&mut self, state: &SessionPlaybackState);
}

/// Session for hosts without system media controls
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSession;

impl MediaSession for NoopSession {
    fn set_active(&mut self, _active: bool) {}
    fn set_metadata(&mut self, _metadata: &SessionMetadata) {}
    fn set_playback_state(&mut self, _state: &SessionPlaybackState) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_follow_state() {
        let playing = SessionActions::for_state(PlaybackState::Playing, 3);
        assert!(playing.pause && !playing.play && playing.seek && playing.skip_to_next);

        let paused = SessionActions::for_state(PlaybackState::Paused, 1);
        assert!(paused.play && !paused.pause && !paused.skip_to_next);

        let idle = SessionActions::for_state(PlaybackState::Idle, 0);
        assert_eq!(idle, SessionActions::default());
    }
}
