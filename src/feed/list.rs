//! In-memory view model behind the feed list and detail screens.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::FeedError;
use crate::http::HttpClient;

use super::model::Feed;
use super::repository::FeedRepository;

/// Publication-time filter offered by the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    LastHour,
    Last6Hours,
    Last12Hours,
    #[default]
    Last24Hours,
    All,
}

impl TimeRange {
    /// Oldest publication time admitted by this range
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let hours = match self {
            TimeRange::LastHour => 1,
            TimeRange::Last6Hours => 6,
            TimeRange::Last12Hours => 12,
            TimeRange::Last24Hours => 24,
            TimeRange::All => return None,
        };
        Some(now - TimeDelta::hours(hours))
    }

    pub fn from_hours(hours: u32) -> Self {
        match hours {
            0 => TimeRange::All,
            1 => TimeRange::LastHour,
            2..=6 => TimeRange::Last6Hours,
            7..=12 => TimeRange::Last12Hours,
            13..=24 => TimeRange::Last24Hours,
            _ => TimeRange::All,
        }
    }
}

/// Whether the last fetch is in flight, succeeded, or failed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error(String),
}

/// Feeds from the most recent fetch plus the user's view state
#[derive(Debug, Default)]
pub struct FeedList {
    feeds: Vec<Feed>,
    read_keys: HashSet<String>,
    category: Option<String>,
    range: TimeRange,
    state: LoadState,
}

impl FeedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_error(&self) -> bool {
        matches!(self.state, LoadState::Error(_))
    }

    pub fn begin_loading(&mut self) {
        self.state = LoadState::Loading;
    }

    /// Replace the list with a fetch result
    ///
    /// A failed fetch keeps the previous feeds visible and flags the error.
    /// Read state survives a refresh for feeds that come back.
    pub fn apply_result(&mut self, result: Result<Vec<Feed>, FeedError>) {
        match result {
            Ok(mut feeds) => {
                for feed in &mut feeds {
                    feed.is_read = feed.is_read || self.read_keys.contains(feed.key());
                }
                self.feeds = feeds;
                self.state = LoadState::Loaded;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Keeping previous feeds after failed refresh");
                self.state = LoadState::Error(e.to_string());
            }
        }
    }

    /// Fetch from the repository and apply the result
    pub async fn refresh<C: HttpClient>(&mut self, repository: &FeedRepository<C>) {
        self.begin_loading();
        let result = repository.fetch().await;
        self.apply_result(result);
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Restrict the list to one category, or clear the filter with `None`
    pub fn set_category(&mut self, category: Option<String>) {
        self.category = category.filter(|c| !c.is_empty());
    }

    pub fn time_range(&self) -> TimeRange {
        self.range
    }

    pub fn set_time_range(&mut self, range: TimeRange) {
        self.range = range;
    }

    /// Distinct non-empty categories in sorted order
    pub fn categories(&self) -> Vec<String> {
        self.feeds
            .iter()
            .map(|f| f.labels.category.trim())
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Feeds passing the current category and time filters
    pub fn visible(&self, now: DateTime<Utc>) -> Vec<&Feed> {
        let cutoff = self.range.cutoff(now);

        self.feeds
            .iter()
            .filter(|f| {
                self.category
                    .as_deref()
                    .is_none_or(|c| f.labels.category.trim() == c)
            })
            .filter(|f| match cutoff {
                None => true,
                Some(cutoff) => f.published_at().is_some_and(|t| t >= cutoff),
            })
            .collect()
    }

    /// Visible feeds that carry a podcast, in list order
    pub fn podcasts(&self, now: DateTime<Utc>) -> Vec<Feed> {
        self.visible(now)
            .into_iter()
            .filter(|f| f.is_podcast())
            .cloned()
            .collect()
    }

    pub fn find(&self, key: &str) -> Option<&Feed> {
        self.feeds.iter().find(|f| f.key() == key)
    }

    /// Mark a feed as opened. Returns false if no feed has that key.
    pub fn mark_read(&mut self, key: &str) -> bool {
        self.set_read(key, true)
    }

    pub fn set_read(&mut self, key: &str, read: bool) -> bool {
        let Some(feed) = self.feeds.iter_mut().find(|f| f.key() == key) else {
            return false;
        };

        feed.is_read = read;
        if read {
            self.read_keys.insert(key.to_string());
        } else {
            self.read_keys.remove(key);
        }
        true
    }

    pub fn unread_count(&self) -> usize {
        self.feeds.iter().filter(|f| !f.is_read).count()
    }
}
