// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Long-running playback task.
//!
//! The service owns the [`PlayerController`] and is the only code that touches
//! it. Commands from the UI or the media session, engine notifications,
//! finished downloads, and the sleep timer are all handled on one task, in
//! arrival order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::feed::Feed;
use crate::http::HttpClient;
use crate::media::MediaCache;
use crate::progress::{ProgressEvent, SharedProgressReporter, TracingReporter};

use super::controller::{LoadRequest, PlayerController};
use super::engine::{EngineNotice, MediaBackend};
use super::session::MediaSession;
use super::state::{PlaybackSnapshot, PlaybackState, RepeatMode};

/// Requests accepted by the playback service
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    SetPlaylist { items: Vec<Feed>, start_index: usize },
    PlayIndex(usize),
    Next,
    Previous,
    Pause,
    Resume,
    TogglePlayPause,
    Stop,
    Seek(Duration),
    SetSpeed(f32),
    SetShuffle(bool),
    SetRepeat(RepeatMode),
    SetSleepTimer(Duration),
    CancelSleepTimer,
    Shutdown,
}

/// Cloneable front door to a running [`PlayerService`]
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    snapshots: watch::Receiver<PlaybackSnapshot>,
}

impl PlayerHandle {
    /// Queue a command. Returns false once the service has shut down.
    pub fn send(&self, command: PlayerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn set_playlist(&self, items: Vec<Feed>, start_index: usize) -> bool {
        self.send(PlayerCommand::SetPlaylist { items, start_index })
    }

    pub fn play_index(&self, index: usize) -> bool {
        self.send(PlayerCommand::PlayIndex(index))
    }

    pub fn next(&self) -> bool {
        self.send(PlayerCommand::Next)
    }

    pub fn previous(&self) -> bool {
        self.send(PlayerCommand::Previous)
    }

    pub fn pause(&self) -> bool {
        self.send(PlayerCommand::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(PlayerCommand::Resume)
    }

    pub fn toggle_play_pause(&self) -> bool {
        self.send(PlayerCommand::TogglePlayPause)
    }

    pub fn stop(&self) -> bool {
        self.send(PlayerCommand::Stop)
    }

    pub fn seek(&self, position: Duration) -> bool {
        self.send(PlayerCommand::Seek(position))
    }

    pub fn set_speed(&self, speed: f32) -> bool {
        self.send(PlayerCommand::SetSpeed(speed))
    }

    pub fn set_shuffle(&self, shuffle: bool) -> bool {
        self.send(PlayerCommand::SetShuffle(shuffle))
    }

    pub fn set_repeat(&self, repeat: RepeatMode) -> bool {
        self.send(PlayerCommand::SetRepeat(repeat))
    }

    pub fn set_sleep_timer(&self, after: Duration) -> bool {
        self.send(PlayerCommand::SetSleepTimer(after))
    }

    pub fn cancel_sleep_timer(&self) -> bool {
        self.send(PlayerCommand::CancelSleepTimer)
    }

    pub fn shutdown(&self) -> bool {
        self.send(PlayerCommand::Shutdown)
    }

    /// Latest published state
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every handled event
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.clone()
    }
}

type LoadResult = (u64, Result<PathBuf, String>);

/// Owns the controller and multiplexes everything that drives it
pub struct PlayerService<C, B, S> {
    controller: PlayerController<B, S>,
    client: Arc<C>,
    cache: MediaCache,
    reporter: SharedProgressReporter,
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    engine_events: mpsc::UnboundedReceiver<EngineNotice>,
    loads_tx: mpsc::UnboundedSender<LoadResult>,
    loads: mpsc::UnboundedReceiver<LoadResult>,
    download: Option<JoinHandle<()>>,
    sleep_deadline: Option<Instant>,
    snapshots: watch::Sender<PlaybackSnapshot>,
}

impl<C, B, S> PlayerService<C, B, S>
where
    C: HttpClient + 'static,
    B: MediaBackend + 'static,
    S: MediaSession + 'static,
{
    /// Build a service and the handle that controls it
    pub fn new(
        client: Arc<C>,
        cache: MediaCache,
        backend: B,
        session: S,
    ) -> (Self, PlayerHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (engine_tx, engine_events) = mpsc::unbounded_channel();
        let (loads_tx, loads) = mpsc::unbounded_channel();
        let (snapshots, snapshots_rx) = watch::channel(PlaybackSnapshot::default());

        let service = Self {
            controller: PlayerController::new(backend, session, engine_tx),
            client,
            cache,
            reporter: TracingReporter::shared(),
            commands,
            engine_events,
            loads_tx,
            loads,
            download: None,
            sleep_deadline: None,
            snapshots,
        };

        let handle = PlayerHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        };

        (service, handle)
    }

    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Start the service on the current runtime
    pub fn spawn(
        client: Arc<C>,
        cache: MediaCache,
        backend: B,
        session: S,
    ) -> (PlayerHandle, JoinHandle<()>) {
        let (service, handle) = Self::new(client, cache, backend, session);
        (handle, tokio::spawn(service.run()))
    }

    /// Handle events until shutdown, then release resources
    pub async fn run(mut self) {
        tracing::info!(cache = %self.cache.dir().display(), "Player service started");

        loop {
            let sleep_deadline = self.sleep_deadline;

            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(PlayerCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
                Some(notice) = self.engine_events.recv() => {
                    let request = self.controller.on_engine_notice(notice);
                    self.start_load(request);
                }
                Some((generation, result)) = self.loads.recv() => match result {
                    Ok(path) => self.controller.media_ready(generation, &path),
                    Err(error) => self.controller.media_failed(generation, &error),
                },
                _ = sleep_until(sleep_deadline), if sleep_deadline.is_some() => {
                    tracing::info!("Sleep timer fired");
                    self.sleep_deadline = None;
                    self.controller.pause_or_hold();
                }
            }

            self.publish();
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: PlayerCommand) {
        tracing::debug!(?command, "Player command");

        let request = match command {
            PlayerCommand::SetPlaylist { items, start_index } => {
                self.controller.set_playlist(items, start_index)
            }
            PlayerCommand::PlayIndex(index) => self.controller.play_index(index),
            PlayerCommand::Next => self.controller.next(),
            PlayerCommand::Previous => self.controller.previous(),
            PlayerCommand::TogglePlayPause => self.controller.toggle_play_pause(),
            PlayerCommand::Pause => {
                self.controller.pause();
                None
            }
            PlayerCommand::Resume => {
                self.controller.resume();
                None
            }
            PlayerCommand::Stop => {
                self.controller.stop();
                None
            }
            PlayerCommand::Seek(position) => {
                self.controller.seek(position);
                None
            }
            PlayerCommand::SetSpeed(speed) => {
                self.controller.set_speed(speed);
                None
            }
            PlayerCommand::SetShuffle(shuffle) => {
                self.controller.set_shuffle(shuffle);
                None
            }
            PlayerCommand::SetRepeat(repeat) => {
                self.controller.set_repeat(repeat);
                None
            }
            PlayerCommand::SetSleepTimer(after) => {
                self.sleep_deadline = Some(Instant::now() + after);
                None
            }
            PlayerCommand::CancelSleepTimer => {
                self.sleep_deadline = None;
                None
            }
            PlayerCommand::Shutdown => None,
        };

        self.start_load(request);
    }

    /// Fetch media for `request` in the background, abandoning older fetches
    ///
    /// Without a new request the running fetch is kept while the controller
    /// still waits for it.
    fn start_load(&mut self, request: Option<LoadRequest>) {
        let Some(request) = request else {
            if self.controller.state() != PlaybackState::Buffering {
                self.abort_download();
            }
            return;
        };
        self.abort_download();

        let client = self.client.clone();
        let cache = self.cache.clone();
        let reporter = self.reporter.clone();
        let loads = self.loads_tx.clone();

        self.download = Some(tokio::spawn(async move {
            let result = cache
                .fetch(client.as_ref(), &request.url, &request.title, &reporter)
                .await
                .map_err(|e| e.to_string());
            let _ = loads.send((request.generation, result));
        }));
    }

    fn abort_download(&mut self) {
        if let Some(previous) = self.download.take() {
            previous.abort();
        }
    }

    fn publish(&self) {
        let mut snapshot = self.controller.snapshot();
        snapshot.sleep_remaining = self
            .sleep_deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        self.snapshots.send_replace(snapshot);
    }

    fn teardown(&mut self) {
        self.abort_download();
        self.controller.shutdown();
        self.publish();

        match self.cache.evict() {
            Ok(removed) => {
                let kept = self.cache.entries().map(|e| e.len()).unwrap_or(0);
                self.reporter
                    .report(ProgressEvent::CacheEvicted { removed, kept });
                tracing::info!(removed, kept, "Player service stopped");
            }
            Err(e) => tracing::warn!(error = %e, "Cache eviction failed"),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
