use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::EngineError;

/// Asynchronous notifications raised by an engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The track played through to its end
    Completed,
    /// Decoding or output failed mid-playback
    Error(String),
}

/// An [`EngineEvent`] tagged with the play request it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineNotice {
    pub generation: u64,
    pub event: EngineEvent,
}

/// Handed to each engine instance so it can report back to the controller
#[derive(Debug, Clone)]
pub struct EngineEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<EngineNotice>,
}

impl EngineEvents {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<EngineNotice>) -> Self {
        Self { generation, tx }
    }

    pub fn completed(&self) {
        self.send(EngineEvent::Completed);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(EngineEvent::Error(message.into()));
    }

    fn send(&self, event: EngineEvent) {
        // The controller may already be gone during teardown.
        let _ = self.tx.send(EngineNotice {
            generation: self.generation,
            event,
        });
    }
}

/// A prepared single-track player
pub trait MediaEngine: Send {
    fn start(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn seek(&mut self, position: Duration) -> Result<(), EngineError>;
    fn set_speed(&mut self, speed: f32) -> Result<(), EngineError>;
    fn position(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;

    /// Free the underlying player. The instance is dropped right after.
    fn release(&mut self);
}

/// Creates engine instances; implemented by the host platform
pub trait MediaBackend: Send {
    /// Open and prepare `path` for playback
    fn open(
        &mut self,
        path: &Path,
        events: EngineEvents,
    ) -> Result<Box<dyn MediaEngine>, EngineError>;
}
