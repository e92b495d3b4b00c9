use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::feed::Feed;

use super::state::RepeatMode;

/// Ordered queue of feeds with a current position
///
/// The index is always within `0..len()` while the playlist is non-empty.
/// In shuffle mode `next` draws among items not yet played this round and
/// starts a fresh round once every item has been played.
#[derive(Debug, Clone)]
pub struct Playlist {
    items: Vec<Feed>,
    index: usize,
    shuffle: bool,
    played: Vec<bool>,
    history: Vec<usize>,
    rng: StdRng,
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new(Vec::new(), 0)
    }
}

impl Playlist {
    /// A playlist positioned at `start_index`, clamped into range
    pub fn new(items: Vec<Feed>, start_index: usize) -> Self {
        Self::with_rng(items, start_index, StdRng::from_os_rng())
    }

    /// Deterministic shuffle order, for tests and reproducible sessions
    pub fn with_seed(items: Vec<Feed>, start_index: usize, seed: u64) -> Self {
        Self::with_rng(items, start_index, StdRng::seed_from_u64(seed))
    }

    fn with_rng(items: Vec<Feed>, start_index: usize, rng: StdRng) -> Self {
        let index = start_index.min(items.len().saturating_sub(1));
        let mut playlist = Self {
            played: vec![false; items.len()],
            items,
            index,
            shuffle: false,
            history: Vec::new(),
            rng,
        };
        playlist.mark_played();
        playlist
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Feed] {
        &self.items
    }

    pub fn index(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.index)
    }

    pub fn current(&self) -> Option<&Feed> {
        self.items.get(self.index)
    }

    pub fn is_shuffle(&self) -> bool {
        self.shuffle
    }

    /// Toggle shuffle, starting a new round from the current item
    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.shuffle = shuffle;
        self.reset_round();
    }

    /// Move to `index` if it exists
    pub fn jump(&mut self, index: usize) -> Option<usize> {
        if index >= self.items.len() {
            return None;
        }
        if self.shuffle && index != self.index {
            self.remember(self.index);
        }
        self.index = index;
        self.mark_played();
        Some(index)
    }

    /// Advance one item, wrapping at the end
    pub fn next(&mut self) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }

        if self.shuffle {
            return Some(self.shuffle_next());
        }

        self.index = (self.index + 1) % self.items.len();
        self.mark_played();
        Some(self.index)
    }

    /// Step back one item, wrapping at the start
    ///
    /// In shuffle mode this retraces the shuffle history first.
    pub fn previous(&mut self) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }

        if self.shuffle
            && let Some(prev) = self.history.pop()
        {
            self.index = prev;
            return Some(prev);
        }

        let len = self.items.len();
        self.index = (self.index + len - 1) % len;
        self.mark_played();
        Some(self.index)
    }

    /// Item to play after the current one finishes, if any
    pub fn advance_on_completion(&mut self, repeat: RepeatMode) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }

        match repeat {
            RepeatMode::One => Some(self.index),
            RepeatMode::All => self.next(),
            RepeatMode::Off if self.shuffle => {
                if self.played.iter().all(|p| *p) {
                    None
                } else {
                    Some(self.shuffle_next())
                }
            }
            RepeatMode::Off => {
                if self.index + 1 < self.items.len() {
                    self.next()
                } else {
                    None
                }
            }
        }
    }

    fn shuffle_next(&mut self) -> usize {
        let len = self.items.len();
        let mut candidates: Vec<usize> = (0..len).filter(|i| !self.played[*i]).collect();

        if candidates.is_empty() {
            self.played.fill(false);
            candidates = (0..len).filter(|i| len == 1 || *i != self.index).collect();
        }

        let pick = candidates[self.rng.random_range(0..candidates.len())];
        self.remember(self.index);
        self.index = pick;
        self.mark_played();
        pick
    }

    /// Record `index` for `previous`, keeping at most one round of history
    fn remember(&mut self, index: usize) {
        if self.history.len() >= self.items.len() {
            self.history.remove(0);
        }
        self.history.push(index);
    }

    fn mark_played(&mut self) {
        if let Some(played) = self.played.get_mut(self.index) {
            *played = true;
        }
    }

    fn reset_round(&mut self) {
        self.played.fill(false);
        self.history.clear();
        self.mark_played();
    }
}
