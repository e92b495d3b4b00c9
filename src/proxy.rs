// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Re-issues embedded browser requests through the app's HTTP client so they
//! pick up the configured proxy.

use bytes::Bytes;
use reqwest::{Method, StatusCode};
use url::Url;

use crate::http::{HttpClient, HttpRequest};

/// A resource request captured from the embedded browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl WebRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// Response handed back to the browser engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResponse {
    pub status: u16,
    pub reason: String,
    pub mime_type: String,
    pub encoding: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

// Describe the original message framing, which no longer matches the
// decoded body we hand back.
const DROPPED_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "content-encoding"];

pub struct ProxyBridge<C> {
    client: C,
}

impl<C: HttpClient> ProxyBridge<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Execute `request` through the shared client.
    ///
    /// Returns `None` when the request should be left to the browser: non
    /// HTTP(S) schemes, malformed input, or any transport failure.
    pub async fn intercept(&self, request: WebRequest) -> Option<WebResponse> {
        let url = Url::parse(&request.url).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        let method = match Method::from_bytes(request.method.to_ascii_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                tracing::debug!(method = %request.method, "Passing through unknown method");
                return None;
            }
        };

        let outgoing = HttpRequest {
            method,
            url: request.url.clone(),
            headers: request.headers,
            body: request.body,
        };

        let response = match self.client.send(outgoing).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Intercepted request failed");
                return None;
            }
        };

        let status = response.status;
        let (mime_type, encoding) = response
            .header("content-type")
            .map(parse_content_type)
            .unwrap_or_else(|| (DEFAULT_MIME_TYPE.to_string(), None));
        let headers: Vec<(String, String)> = response
            .headers
            .iter()
            .filter(|(name, _)| !DROPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()))
            .cloned()
            .collect();

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Reading intercepted body failed");
                return None;
            }
        };

        tracing::debug!(url = %request.url, status, bytes = body.len(), "Proxied request");

        Some(WebResponse {
            status,
            reason: reason_phrase(status),
            mime_type,
            encoding,
            headers,
            body,
        })
    }
}

fn reason_phrase(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("OK")
        .to_string()
}

/// Split a Content-Type value into MIME type and optional charset
fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let mime = parts
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_ascii_lowercase();

    let charset = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    });

    (mime, charset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ReqwestClient;
    use crate::http::mock::MockHttpClient;

    #[test]
    fn content_type_is_split() {
        assert_eq!(
            parse_content_type("text/html; charset=UTF-8"),
            ("text/html".to_string(), Some("UTF-8".to_string()))
        );
        assert_eq!(
            parse_content_type("Application/JSON"),
            ("application/json".to_string(), None)
        );
        assert_eq!(
            parse_content_type("text/plain; format=flowed; charset=\"iso-8859-1\""),
            ("text/plain".to_string(), Some("iso-8859-1".to_string()))
        );
        assert_eq!(parse_content_type(""), (DEFAULT_MIME_TYPE.to_string(), None));
    }

    #[test]
    fn reason_falls_back_to_ok() {
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(299), "OK");
    }

    #[tokio::test]
    async fn forwards_request_and_rebuilds_response() {
        let client = MockHttpClient::new(200, b"<p>hi</p>".to_vec())
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_header("Content-Length", "9")
            .with_header("Cache-Control", "no-cache");
        let bridge = ProxyBridge::new(&client);

        let mut request = WebRequest::get("https://example.com/page");
        request.method = "post".to_string();
        request.headers.push(("Accept".to_string(), "text/html".to_string()));
        request.body = Some(Bytes::from_static(b"q=1"));

        let response = bridge.intercept(request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.mime_type, "text/html");
        assert_eq!(response.encoding.as_deref(), Some("utf-8"));
        assert_eq!(&response.body[..], b"<p>hi</p>");
        assert!(response.headers.iter().any(|(n, _)| n == "Cache-Control"));
        assert!(!response.headers.iter().any(|(n, _)| n == "Content-Length"));

        let sent = client.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].url, "https://example.com/page");
        assert_eq!(sent[0].headers, vec![("Accept".to_string(), "text/html".to_string())]);
        assert_eq!(sent[0].body.as_deref(), Some(&b"q=1"[..]));
    }

    #[tokio::test]
    async fn error_statuses_are_passed_through() {
        let client = MockHttpClient::new(404, b"missing".to_vec());
        let bridge = ProxyBridge::new(&client);

        let response = bridge
            .intercept(WebRequest::get("http://example.com/x"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.reason, "Not Found");
        assert_eq!(response.mime_type, DEFAULT_MIME_TYPE);
    }

    #[tokio::test]
    async fn non_http_schemes_are_not_intercepted() {
        let client = MockHttpClient::new(200, b"".to_vec());
        let bridge = ProxyBridge::new(&client);

        for url in ["file:///etc/hosts", "data:text/plain,hi", "about:blank", "not a url"] {
            assert!(bridge.intercept(WebRequest::get(url)).await.is_none());
        }
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_returns_none() {
        let client =
            ReqwestClient::with_client(reqwest::Client::builder().no_proxy().build().unwrap());
        let bridge = ProxyBridge::new(client);

        assert!(
            bridge
                .intercept(WebRequest::get("http://127.0.0.1:1/"))
                .await
                .is_none()
        );
    }
}
