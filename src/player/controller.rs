use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::feed::Feed;

use super::engine::{EngineEvent, EngineEvents, EngineNotice, MediaBackend, MediaEngine};
use super::playlist::Playlist;
use super::session::{MediaSession, SessionActions, SessionMetadata, SessionPlaybackState};
use super::state::{PlaybackSnapshot, PlaybackState, RepeatMode, clamp_speed};

/// Media that must be made available locally before playback can start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Identifies the play request; results for older generations are stale
    pub generation: u64,
    pub url: String,
    pub title: String,
}

/// Playback state machine over a playlist, one engine, and a media session
///
/// Operations that need media fetched return a [`LoadRequest`]. The caller
/// resolves it to a local file and reports back with [`media_ready`] or
/// [`media_failed`].
///
/// [`media_ready`]: PlayerController::media_ready
/// [`media_failed`]: PlayerController::media_failed
pub struct PlayerController<B, S> {
    backend: B,
    session: S,
    engine: Option<Box<dyn MediaEngine>>,
    playlist: Playlist,
    state: PlaybackState,
    repeat: RepeatMode,
    speed: f32,
    generation: u64,
    error: Option<String>,
    session_active: bool,
    /// Prepare the pending track without starting it
    hold_on_ready: bool,
    engine_events: mpsc::UnboundedSender<EngineNotice>,
}

impl<B: MediaBackend, S: MediaSession> PlayerController<B, S> {
    /// Engine notifications are delivered to `engine_events`; feed them back
    /// through [`on_engine_notice`](Self::on_engine_notice).
    pub fn new(backend: B, session: S, engine_events: mpsc::UnboundedSender<EngineNotice>) -> Self {
        Self {
            backend,
            session,
            engine: None,
            playlist: Playlist::default(),
            state: PlaybackState::Idle,
            repeat: RepeatMode::Off,
            speed: 1.0,
            generation: 0,
            error: None,
            session_active: false,
            hold_on_ready: false,
            engine_events,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// True only while an engine exists and has been started
    pub fn is_playing(&self) -> bool {
        self.engine.is_some() && self.state == PlaybackState::Playing
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn current(&self) -> Option<&Feed> {
        self.playlist.current()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Replace the queue and start playing at `start_index`
    pub fn set_playlist(&mut self, items: Vec<Feed>, start_index: usize) -> Option<LoadRequest> {
        let shuffle = self.playlist.is_shuffle();
        self.set_playlist_with(Playlist::new(items, start_index), shuffle)
    }

    /// Like [`set_playlist`](Self::set_playlist) with a prepared playlist
    pub fn set_playlist_with(
        &mut self,
        mut playlist: Playlist,
        shuffle: bool,
    ) -> Option<LoadRequest> {
        playlist.set_shuffle(shuffle);
        self.playlist = playlist;

        if self.playlist.is_empty() {
            tracing::debug!("Empty playlist, player idle");
            self.release_engine();
            self.generation += 1;
            self.error = None;
            self.set_state(PlaybackState::Idle);
            self.set_session_active(false);
            return None;
        }

        self.load_current()
    }

    pub fn play_index(&mut self, index: usize) -> Option<LoadRequest> {
        self.playlist.jump(index)?;
        self.load_current()
    }

    pub fn next(&mut self) -> Option<LoadRequest> {
        self.playlist.next()?;
        self.load_current()
    }

    pub fn previous(&mut self) -> Option<LoadRequest> {
        self.playlist.previous()?;
        self.load_current()
    }

    /// Valid only while playing. Returns whether playback was paused.
    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };

        match engine.pause() {
            Ok(()) => {
                self.set_state(PlaybackState::Paused);
                true
            }
            Err(e) => {
                self.fail(e.to_string());
                false
            }
        }
    }

    /// Valid only while paused with a prepared engine
    pub fn resume(&mut self) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };

        match engine.start() {
            Ok(()) => {
                self.set_state(PlaybackState::Playing);
                true
            }
            Err(e) => {
                self.fail(e.to_string());
                false
            }
        }
    }

    /// Play/pause button: pauses, resumes, or restarts the current item
    pub fn toggle_play_pause(&mut self) -> Option<LoadRequest> {
        match self.state {
            PlaybackState::Playing => {
                self.pause();
                None
            }
            PlaybackState::Paused => {
                self.resume();
                None
            }
            PlaybackState::Buffering => None,
            PlaybackState::Idle | PlaybackState::Stopped | PlaybackState::Error => {
                if self.playlist.is_empty() {
                    None
                } else {
                    self.load_current()
                }
            }
        }
    }

    /// Pause now, or once the buffering track is ready
    ///
    /// Returns false when there is nothing to pause.
    pub fn pause_or_hold(&mut self) -> bool {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Buffering => {
                tracing::debug!(generation = self.generation, "Holding track once ready");
                self.hold_on_ready = true;
                true
            }
            _ => false,
        }
    }

    /// Release the engine and invalidate any pending load
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Idle && self.engine.is_none() {
            return;
        }
        self.release_engine();
        self.generation += 1;
        self.set_state(PlaybackState::Stopped);
        self.set_session_active(false);
    }

    pub fn seek(&mut self, position: Duration) -> bool {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            return false;
        }
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };

        match engine.seek(position) {
            Ok(()) => {
                self.publish_playback_state();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Seek failed");
                false
            }
        }
    }

    /// Remember `speed` for this and later tracks
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = clamp_speed(speed);
        if let Some(engine) = self.engine.as_mut()
            && let Err(e) = engine.set_speed(self.speed)
        {
            tracing::warn!(error = %e, speed = self.speed, "Could not change playback speed");
        }
        self.publish_playback_state();
    }

    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.playlist.set_shuffle(shuffle);
    }

    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.repeat = repeat;
    }

    /// Local file for `generation` is ready: prepare an engine and start it
    pub fn media_ready(&mut self, generation: u64, path: &Path) {
        if generation != self.generation {
            tracing::debug!(generation, current = self.generation, "Discarding stale media");
            return;
        }
        if self.state != PlaybackState::Buffering {
            return;
        }

        let events = EngineEvents::new(generation, self.engine_events.clone());
        let mut engine = match self.backend.open(path, events) {
            Ok(engine) => engine,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };

        let hold = std::mem::take(&mut self.hold_on_ready);
        let started = engine.set_speed(self.speed).and_then(|()| {
            if hold { Ok(()) } else { engine.start() }
        });
        self.engine = Some(engine);

        if let Err(e) = started {
            self.fail(e.to_string());
            return;
        }

        self.publish_metadata();
        if hold {
            tracing::info!(path = %path.display(), "Track ready, held paused");
            self.set_state(PlaybackState::Paused);
        } else {
            tracing::info!(path = %path.display(), "Playback started");
            self.set_state(PlaybackState::Playing);
        }
    }

    /// Fetching media for `generation` failed
    pub fn media_failed(&mut self, generation: u64, error: &str) {
        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                "Ignoring stale download failure"
            );
            return;
        }
        self.fail(error.to_string());
    }

    /// Handle a notification raised by an engine
    pub fn on_engine_notice(&mut self, notice: EngineNotice) -> Option<LoadRequest> {
        if notice.generation != self.generation || self.engine.is_none() {
            return None;
        }

        match notice.event {
            EngineEvent::Completed => self.on_completion(),
            EngineEvent::Error(message) => {
                self.fail(message);
                None
            }
        }
    }

    /// The current item finished: replay, advance, or stop
    pub fn on_completion(&mut self) -> Option<LoadRequest> {
        if self.repeat == RepeatMode::One
            && let Some(engine) = self.engine.as_mut()
        {
            let restarted = engine
                .seek(Duration::ZERO)
                .and_then(|()| engine.start());
            match restarted {
                Ok(()) => self.set_state(PlaybackState::Playing),
                Err(e) => self.fail(e.to_string()),
            }
            return None;
        }

        match self.playlist.advance_on_completion(self.repeat) {
            Some(_) => self.load_current(),
            None => {
                tracing::info!("Reached end of playlist");
                self.stop();
                None
            }
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state,
            is_playing: self.is_playing(),
            current: self.playlist.current().cloned(),
            index: self.playlist.index(),
            playlist_len: self.playlist.len(),
            shuffle: self.playlist.is_shuffle(),
            repeat: self.repeat,
            speed: self.speed,
            position: self.position(),
            duration: self.engine.as_ref().and_then(|e| e.duration()),
            sleep_remaining: None,
            error: self.error.clone(),
        }
    }

    /// Release everything before the owner goes away
    pub fn shutdown(&mut self) {
        self.release_engine();
        self.generation += 1;
        self.set_session_active(false);
    }

    fn position(&self) -> Duration {
        self.engine
            .as_ref()
            .map(|e| e.position())
            .unwrap_or_default()
    }

    /// Tear down the previous engine and ask for the current item's media
    fn load_current(&mut self) -> Option<LoadRequest> {
        self.release_engine();
        self.generation += 1;
        self.error = None;
        self.hold_on_ready = false;

        let feed = self.playlist.current()?.clone();
        let url = feed.labels.podcast_url.trim().to_string();

        self.set_session_active(true);
        self.publish_metadata();

        if url.is_empty() {
            self.fail(format!("'{}' has no media URL", feed.labels.title));
            return None;
        }

        tracing::debug!(generation = self.generation, %url, "Buffering");
        self.set_state(PlaybackState::Buffering);

        Some(LoadRequest {
            generation: self.generation,
            url,
            title: feed.labels.title,
        })
    }

    fn release_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.release();
        }
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(error = %message, "Playback failed");
        self.release_engine();
        self.error = Some(message);
        self.set_state(PlaybackState::Error);
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Player state changed");
        }
        self.state = state;
        self.publish_playback_state();
    }

    fn set_session_active(&mut self, active: bool) {
        if self.session_active != active {
            self.session_active = active;
            self.session.set_active(active);
        }
    }

    fn publish_metadata(&mut self) {
        let Some(feed) = self.playlist.current() else {
            return;
        };
        let metadata = SessionMetadata {
            media_id: feed.key().to_string(),
            title: feed.labels.title.clone(),
            artist: feed.labels.source.clone(),
            album: feed.labels.category.clone(),
            duration: self.engine.as_ref().and_then(|e| e.duration()),
        };
        self.session.set_metadata(&metadata);
    }

    fn publish_playback_state(&mut self) {
        let state = SessionPlaybackState {
            state: self.state,
            position: self.position(),
            speed: self.speed,
            actions: SessionActions::for_state(self.state, self.playlist.len()),
            error: self.error.clone(),
        };
        self.session.set_playback_state(&state);
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::feed::Labels;

    type Controller = PlayerController<FakeBackend, FakeSession>;

    fn feeds(titles: &[&str]) -> Vec<Feed> {
        titles
            .iter()
            .map(|t| Feed {
                labels: Labels {
                    title: t.to_string(),
                    link: format!("https://example.com/{t}"),
                    podcast_url: format!("https://example.com/{t}.mp3"),
                    ..Labels::default()
                },
                time: None,
                is_read: false,
            })
            .collect()
    }

    type Harness = (Controller, SharedLog, mpsc::UnboundedReceiver<EngineNotice>);

    fn controller_with(backend: FakeBackend) -> Harness {
        let log = backend.log.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = FakeSession { log: log.clone() };
        (PlayerController::new(backend, session, tx), log, rx)
    }

    fn controller() -> Harness {
        controller_with(FakeBackend::default())
    }

    fn play(controller: &mut Controller, request: Option<LoadRequest>) {
        let request = request.expect("load request");
        let path = format!("/cache/{}.mp3", request.title);
        controller.media_ready(request.generation, Path::new(&path));
    }

    fn current_title(controller: &Controller) -> String {
        controller.current().unwrap().labels.title.clone()
    }

    #[test]
    fn set_playlist_buffers_then_plays() {
        let (mut c, log, _rx) = controller();

        let request = c.set_playlist(feeds(&["A", "B", "C"]), 1).unwrap();
        assert_eq!(c.state(), PlaybackState::Buffering);
        assert!(!c.is_playing());
        assert_eq!(request.url, "https://example.com/B.mp3");

        c.media_ready(request.generation, Path::new("/cache/b.mp3"));
        assert_eq!(c.state(), PlaybackState::Playing);
        assert!(c.is_playing());

        let log = log.lock().unwrap();
        assert!(log.session_active);
        assert_eq!(
            log.session_states,
            vec![PlaybackState::Buffering, PlaybackState::Playing]
        );
        assert_eq!(log.session_titles.last().unwrap(), "B");
    }

    #[test]
    fn next_and_previous_wrap() {
        let (mut c, _log, _rx) = controller();
        let request = c.set_playlist(feeds(&["A", "B", "C"]), 0);
        play(&mut c, request);

        let request = c.next();
        play(&mut c, request);
        let request = c.next();
        play(&mut c, request);
        assert_eq!(current_title(&c), "C");

        let request = c.next();
        play(&mut c, request);
        assert_eq!(current_title(&c), "A");

        let request = c.previous();
        play(&mut c, request);
        assert_eq!(current_title(&c), "C");
    }

    #[test]
    fn only_one_engine_is_alive() {
        let (mut c, log, _rx) = controller();
        let request = c.set_playlist(feeds(&["A", "B"]), 0);
        play(&mut c, request);
        let request = c.next();
        play(&mut c, request);

        assert_eq!(log.lock().unwrap().live_engines, 1);
        c.stop();
        assert_eq!(log.lock().unwrap().live_engines, 0);
    }

    #[test]
    fn stale_media_is_discarded() {
        let (mut c, log, _rx) = controller();
        let first = c.set_playlist(feeds(&["A", "B"]), 0).unwrap();
        let second = c.next().unwrap();

        c.media_ready(first.generation, Path::new("/cache/a.mp3"));
        assert_eq!(c.state(), PlaybackState::Buffering);
        assert!(log.lock().unwrap().opened.is_empty());

        c.media_failed(first.generation, "late failure");
        assert_eq!(c.state(), PlaybackState::Buffering);

        c.media_ready(second.generation, Path::new("/cache/b.mp3"));
        assert_eq!(c.state(), PlaybackState::Playing);
        assert_eq!(current_title(&c), "B");
    }

    #[test]
    fn pause_only_from_playing_and_resume_only_from_paused() {
        let (mut c, _log, _rx) = controller();
        assert!(!c.pause());
        assert!(!c.resume());

        let request = c.set_playlist(feeds(&["A"]), 0);
        assert!(!c.pause(), "cannot pause while buffering");
        play(&mut c, request);

        assert!(!c.resume());
        assert!(c.pause());
        assert_eq!(c.state(), PlaybackState::Paused);
        assert!(!c.is_playing());
        assert!(!c.pause());

        assert!(c.resume());
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn download_failure_enters_error_state() {
        let (mut c, _log, _rx) = controller();
        let request = c.set_playlist(feeds(&["A"]), 0).unwrap();

        c.media_failed(request.generation, "HTTP error 404");
        assert_eq!(c.state(), PlaybackState::Error);
        assert_eq!(c.error(), Some("HTTP error 404"));
        assert!(!c.is_playing());

        // Inert until a new play action.
        assert!(!c.resume());
        let request = c.toggle_play_pause();
        assert!(request.is_some());
        assert_eq!(c.state(), PlaybackState::Buffering);
        assert!(c.error().is_none());
    }

    #[test]
    fn prepare_failure_enters_error_state() {
        let backend = FakeBackend {
            fail_open: true,
            ..FakeBackend::default()
        };
        let (mut c, _log, _rx) = controller_with(backend);
        let request = c.set_playlist(feeds(&["A"]), 0);
        play(&mut c, request);

        assert_eq!(c.state(), PlaybackState::Error);
        assert!(c.error().unwrap().contains("unsupported format"));
    }

    #[test]
    fn start_failure_releases_engine() {
        let backend = FakeBackend {
            fail_start: true,
            ..FakeBackend::default()
        };
        let (mut c, log, _rx) = controller_with(backend);
        let request = c.set_playlist(feeds(&["A"]), 0);
        play(&mut c, request);

        assert_eq!(c.state(), PlaybackState::Error);
        assert_eq!(log.lock().unwrap().live_engines, 0);
    }

    #[test]
    fn feed_without_media_url_fails_immediately() {
        let (mut c, _log, _rx) = controller();
        let mut items = feeds(&["A"]);
        items[0].labels.podcast_url.clear();

        assert!(c.set_playlist(items, 0).is_none());
        assert_eq!(c.state(), PlaybackState::Error);
    }

    #[test]
    fn completion_advances_and_stops_at_end() {
        let (mut c, log, _rx) = controller();
        let request = c.set_playlist(feeds(&["A", "B"]), 0);
        play(&mut c, request);

        let request = c.on_completion();
        assert!(request.is_some());
        play(&mut c, request);
        assert_eq!(current_title(&c), "B");

        assert!(c.on_completion().is_none());
        assert_eq!(c.state(), PlaybackState::Stopped);
        assert!(!log.lock().unwrap().session_active);
    }

    #[test]
    fn repeat_all_wraps_on_completion() {
        let (mut c, _log, _rx) = controller();
        c.set_repeat(RepeatMode::All);
        let request = c.set_playlist(feeds(&["A", "B"]), 1);
        play(&mut c, request);

        let request = c.on_completion();
        play(&mut c, request);
        assert_eq!(current_title(&c), "A");
    }

    #[test]
    fn repeat_one_restarts_current_engine() {
        let (mut c, log, _rx) = controller();
        c.set_repeat(RepeatMode::One);
        let request = c.set_playlist(feeds(&["A", "B"]), 0);
        play(&mut c, request);

        assert!(c.on_completion().is_none());
        assert_eq!(c.state(), PlaybackState::Playing);
        assert_eq!(current_title(&c), "A");
        assert_eq!(log.lock().unwrap().opened.len(), 1);
        assert!(log.lock().unwrap().calls.contains(&"seek 0".to_string()));
    }

    #[test]
    fn engine_notices_drive_completion() {
        let (mut c, log, mut rx) = controller();
        let request = c.set_playlist(feeds(&["A", "B"]), 0);
        play(&mut c, request);

        log.lock().unwrap().events.as_ref().unwrap().completed();
        let notice = rx.try_recv().unwrap();
        assert!(c.on_engine_notice(notice).is_some());
        assert_eq!(current_title(&c), "B");
    }

    #[test]
    fn stale_engine_notices_are_ignored() {
        let (mut c, log, mut rx) = controller();
        let request = c.set_playlist(feeds(&["A", "B"]), 0);
        play(&mut c, request);
        let old_events = log.lock().unwrap().events.clone().unwrap();

        let request = c.next();
        play(&mut c, request);
        old_events.error("boom");

        let notice = rx.try_recv().unwrap();
        assert!(c.on_engine_notice(notice).is_none());
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn engine_error_notice_enters_error_state() {
        let (mut c, log, mut rx) = controller();
        let request = c.set_playlist(feeds(&["A"]), 0);
        play(&mut c, request);

        log.lock().unwrap().events.as_ref().unwrap().error("decode failed");
        c.on_engine_notice(rx.try_recv().unwrap());
        assert_eq!(c.state(), PlaybackState::Error);
        assert_eq!(c.error(), Some("decode failed"));
    }

    #[test]
    fn speed_carries_across_tracks() {
        let (mut c, log, _rx) = controller();
        c.set_speed(1.5);
        let request = c.set_playlist(feeds(&["A", "B"]), 0);
        play(&mut c, request);
        c.set_speed(9.0);
        assert_eq!(c.speed(), 3.0);

        let request = c.next();
        play(&mut c, request);

        let calls = log.lock().unwrap().calls.clone();
        assert!(calls.contains(&"speed 1.5".to_string()));
        assert_eq!(calls.iter().filter(|c| *c == "speed 3").count(), 2);
    }

    #[test]
    fn empty_playlist_goes_idle() {
        let (mut c, log, _rx) = controller();
        let request = c.set_playlist(feeds(&["A"]), 0);
        play(&mut c, request);

        assert!(c.set_playlist(Vec::new(), 0).is_none());
        assert_eq!(c.state(), PlaybackState::Idle);
        assert_eq!(log.lock().unwrap().live_engines, 0);
        assert!(c.snapshot().current.is_none());
    }

    #[test]
    fn snapshot_reflects_controller() {
        let (mut c, _log, _rx) = controller();
        c.set_repeat(RepeatMode::All);
        let request = c.set_playlist(feeds(&["A", "B"]), 1);
        play(&mut c, request);
        c.set_shuffle(true);
        c.seek(Duration::from_secs(12));

        let snapshot = c.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.index, Some(1));
        assert_eq!(snapshot.playlist_len, 2);
        assert!(snapshot.shuffle);
        assert_eq!(snapshot.repeat, RepeatMode::All);
        assert_eq!(snapshot.position, Duration::from_secs(12));
        assert_eq!(snapshot.duration, Some(Duration::from_secs(60)));
    }

    #[test]
    fn hold_while_buffering_prepares_without_starting() {
        let (mut c, log, _rx) = controller();
        let request = c.set_playlist(feeds(&["A", "B"]), 0).unwrap();

        assert!(c.pause_or_hold());
        assert_eq!(c.state(), PlaybackState::Buffering);

        c.media_ready(request.generation, Path::new("/cache/a.mp3"));
        assert_eq!(c.state(), PlaybackState::Paused);
        assert!(!log.lock().unwrap().calls.contains(&"start".to_string()));

        assert!(c.resume());
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn hold_is_dropped_by_a_new_track() {
        let (mut c, _log, _rx) = controller();
        c.set_playlist(feeds(&["A", "B"]), 0);
        assert!(c.pause_or_hold());

        let request = c.next();
        play(&mut c, request);
        assert_eq!(c.state(), PlaybackState::Playing);
    }

    #[test]
    fn hold_needs_something_to_pause() {
        let (mut c, _log, _rx) = controller();
        assert!(!c.pause_or_hold());

        let request = c.set_playlist(feeds(&["A"]), 0);
        play(&mut c, request);
        assert!(c.pause_or_hold());
        assert_eq!(c.state(), PlaybackState::Paused);
    }
}
