// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::FeedError;
use crate::http::{HttpClient, HttpRequest};
use crate::settings::Settings;

use super::model::Feed;

/// Trailing window queried when nothing else is configured
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Maximum number of rows requested from the backend
pub const DEFAULT_LIMIT: u32 = 500;

/// Body of a backend search request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedQuery {
    pub start: String,
    pub end: String,
    pub limit: u32,
    pub query: String,
    pub summarize: bool,
}

impl FeedQuery {
    /// Query everything published in the `window` leading up to `now`
    pub fn trailing(now: DateTime<Utc>, window: TimeDelta, limit: u32) -> Self {
        Self {
            start: format_timestamp(now - window),
            end: format_timestamp(now),
            limit,
            query: String::new(),
            summarize: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    feeds: Vec<Feed>,
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build `<backend>/api/query?backendUrl=<backend>`
pub fn query_url(backend_url: &str) -> Result<Url, FeedError> {
    let base = backend_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(FeedError::BackendNotConfigured);
    }

    let mut url = Url::parse(&format!("{base}/api/query"))?;
    url.query_pairs_mut().append_pair("backendUrl", base);
    Ok(url)
}

/// Run a single query against the backend and parse the returned feeds
pub async fn fetch_feeds<C: HttpClient + ?Sized>(
    client: &C,
    backend_url: &str,
    query: &FeedQuery,
) -> Result<Vec<Feed>, FeedError> {
    let url = query_url(backend_url)?;
    let request = HttpRequest::post_json(url.as_str(), query).map_err(FeedError::EncodeFailed)?;

    let response = client
        .send(request)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !response.is_success() {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let bytes = response.bytes().await.map_err(|e| FeedError::FetchFailed {
        url: url.to_string(),
        source: e,
    })?;

    let parsed: QueryResponse = serde_json::from_slice(&bytes).map_err(FeedError::ParseFailed)?;
    Ok(parsed.feeds)
}

/// Fetches the recent articles for the configured backend
#[derive(Debug, Clone)]
pub struct FeedRepository<C> {
    client: C,
    backend_url: String,
    window: TimeDelta,
    limit: u32,
    query: String,
    summarize: bool,
}

impl<C: HttpClient> FeedRepository<C> {
    pub fn new(client: C, backend_url: impl Into<String>) -> Self {
        Self {
            client,
            backend_url: backend_url.into(),
            window: TimeDelta::hours(DEFAULT_WINDOW_HOURS),
            limit: DEFAULT_LIMIT,
            query: String::new(),
            summarize: false,
        }
    }

    /// Repository parameterised by the persisted settings
    pub fn from_settings(client: C, settings: &Settings) -> Self {
        Self::new(client, settings.backend_url.clone())
            .with_window(TimeDelta::hours(i64::from(settings.feed_window_hours.max(1))))
            .with_query(settings.feed_query.clone())
            .with_summarize(settings.ai_summarize)
    }

    pub fn with_window(mut self, window: TimeDelta) -> Self {
        self.window = window;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_summarize(mut self, summarize: bool) -> Self {
        self.summarize = summarize;
        self
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    /// The request body that a fetch at `now` would send
    pub fn query_at(&self, now: DateTime<Utc>) -> FeedQuery {
        FeedQuery {
            query: self.query.clone(),
            summarize: self.summarize,
            ..FeedQuery::trailing(now, self.window, self.limit)
        }
    }

    /// Fetch articles published within the trailing window
    pub async fn fetch(&self) -> Result<Vec<Feed>, FeedError> {
        self.fetch_at(Utc::now()).await
    }

    pub async fn fetch_at(&self, now: DateTime<Utc>) -> Result<Vec<Feed>, FeedError> {
        let query = self.query_at(now);
        tracing::info!(
            backend = %self.backend_url,
            start = %query.start,
            limit = query.limit,
            "Querying feeds"
        );

        match fetch_feeds(&self.client, &self.backend_url, &query).await {
            Ok(feeds) => {
                tracing::info!(count = feeds.len(), "Fetched feeds");
                Ok(feeds)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Feed query failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Labels;
    use crate::http::ReqwestClient;
    use crate::http::mock::MockHttpClient;
    use reqwest::Method;

    const RESPONSE: &str = r#"{"feeds": [
        {"labels": {"title": "A", "link": "https://example.com/a"}, "time": "2024-01-01T11:00:00Z"},
        {"labels": {"title": "B", "link": "https://example.com/b", "podcastUrl": "https://example.com/b.mp3"}, "time": "2024-01-01T10:00:00Z"}
    ]}"#;

    fn noon() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn query_url_carries_backend_parameter() {
        let url = query_url("https://news.example.com/").unwrap();
        assert_eq!(
            url.as_str(),
            "https://news.example.com/api/query?backendUrl=https%3A%2F%2Fnews.example.com"
        );
    }

    #[test]
    fn query_url_rejects_empty_backend() {
        assert!(matches!(query_url("  "), Err(FeedError::BackendNotConfigured)));
        assert!(matches!(query_url("not a url"), Err(FeedError::InvalidUrl(_))));
    }

    #[test]
    fn trailing_query_spans_the_window() {
        let query = FeedQuery::trailing(noon(), TimeDelta::hours(24), 100);
        assert_eq!(query.start, "2023-12-31T12:00:00.000Z");
        assert_eq!(query.end, "2024-01-01T12:00:00.000Z");
        assert_eq!(query.limit, 100);
    }

    #[tokio::test]
    async fn fetch_posts_query_and_parses_feeds() {
        let client = MockHttpClient::new(200, RESPONSE);
        let repo = FeedRepository::new(&client, "https://news.example.com")
            .with_query("rust")
            .with_summarize(true);

        let feeds = repo.fetch_at(noon()).await.unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].labels.title, "A");
        assert!(feeds[1].is_podcast());

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);

        let body: serde_json::Value =
            serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["query"], "rust");
        assert_eq!(body["summarize"], true);
        assert_eq!(body["limit"], DEFAULT_LIMIT);
        assert_eq!(body["start"], "2023-12-31T12:00:00.000Z");
    }

    #[tokio::test]
    async fn rows_without_labels_do_not_sink_the_batch() {
        let body = r#"{"feeds": [
            {"labels": {"title": "A"}},
            {"time": "2024-01-01T11:00:00Z"},
            {"labels": null, "time": 1704110400000}
        ]}"#;
        let client = MockHttpClient::new(200, body);
        let repo = FeedRepository::new(&client, "https://news.example.com");

        let feeds = repo.fetch_at(noon()).await.unwrap();
        assert_eq!(feeds.len(), 3);
        assert_eq!(feeds[0].labels.title, "A");
        assert_eq!(feeds[1].labels, Labels::default());
        assert_eq!(feeds[2].labels, Labels::default());
        assert!(feeds[2].time.is_some());
    }

    #[tokio::test]
    async fn fetch_reports_http_status() {
        let client = MockHttpClient::new(502, "bad gateway");
        let repo = FeedRepository::new(&client, "https://news.example.com");

        match repo.fetch_at(noon()).await {
            Err(FeedError::HttpStatus { status, .. }) => assert_eq!(status, 502),
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_reports_malformed_body() {
        let client = MockHttpClient::new(200, "<html>");
        let repo = FeedRepository::new(&client, "https://news.example.com");
        assert!(matches!(
            repo.fetch_at(noon()).await,
            Err(FeedError::ParseFailed(_))
        ));
    }

    #[tokio::test]
    async fn fetch_without_backend_makes_no_request() {
        let client = MockHttpClient::new(200, RESPONSE);
        let repo = FeedRepository::new(&client, "");
        assert!(matches!(
            repo.fetch().await,
            Err(FeedError::BackendNotConfigured)
        ));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn fetch_fails_for_unreachable_backend() {
        let client =
            ReqwestClient::with_client(reqwest::Client::builder().no_proxy().build().unwrap());
        let repo = FeedRepository::new(client, "http://127.0.0.1:1");
        assert!(matches!(
            repo.fetch().await,
            Err(FeedError::FetchFailed { .. })
        ));
    }

    #[test]
    fn from_settings_uses_window_and_flags() {
        let settings = Settings {
            backend_url: "https://news.example.com".to_string(),
            feed_window_hours: 6,
            feed_query: "ai".to_string(),
            ai_summarize: true,
            ..Settings::default()
        };
        let repo = FeedRepository::from_settings(MockHttpClient::new(200, ""), &settings);
        let query = repo.query_at(noon());
        assert_eq!(query.start, "2024-01-01T06:00:00.000Z");
        assert_eq!(query.query, "ai");
        assert!(query.summarize);
        assert_eq!(repo.backend_url(), "https://news.example.com");
    }
}
