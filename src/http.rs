// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::Method;
use serde::Serialize;
use std::pin::Pin;

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// An outgoing HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// A bodyless GET request
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::GET,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// A POST request carrying `body` encoded as JSON
    pub fn post_json<T: Serialize>(url: &str, body: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(body)?;
        Ok(Self {
            method: Method::POST,
            url: url.to_string(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(Bytes::from(json)),
        })
    }

    /// Append a header
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// HTTP response with status, headers, content length, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

impl HttpResponse {
    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body stream into a single buffer
    pub async fn bytes(self) -> Result<Bytes, reqwest::Error> {
        let mut buffer = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

/// Proxy the shared client routes every request through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an arbitrary request and stream the response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error>;

    /// Get a streaming response for large downloads
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        self.send(HttpRequest::get(url)).await
    }

    /// Fetch the entire response body as bytes
    async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        self.get_stream(url).await?.bytes().await
    }
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for &T {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for std::sync::Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
        (**self).send(request).await
    }
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Create a client that routes all traffic through `proxy`, when given
    pub fn with_proxy(proxy: Option<&ProxyConfig>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();

        if let Some(config) = proxy {
            let mut proxy = reqwest::Proxy::all(config.url())?;
            if let Some(username) = &config.username {
                proxy = proxy.basic_auth(username, config.password.as_deref().unwrap_or(""));
            }
            tracing::debug!(proxy = %config.url(), "Routing HTTP traffic through proxy");
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body: ByteStream = Box::pin(response.bytes_stream());

        Ok(HttpResponse {
            status,
            headers,
            content_length,
            body,
        })
    }
}

/// In-memory client shared by the unit tests of every module
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    pub struct MockHttpClient {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub response_data: Vec<u8>,
        pub requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockHttpClient {
        pub fn new(status: u16, response_data: impl Into<Vec<u8>>) -> Self {
            Self {
                status,
                headers: Vec::new(),
                response_data: response_data.into(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with_header(mut self, name: &str, value: &str) -> Self {
            self.headers.push((name.to_string(), value.to_string()));
            self
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
            self.requests.lock().unwrap().push(request);

            let data = self.response_data.clone();
            let len = data.len() as u64;
            let body: ByteStream =
                Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));

            Ok(HttpResponse {
                status: self.status,
                headers: self.headers.clone(),
                content_length: Some(len),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockHttpClient;
    use super::*;

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new();
        let _client_default = ReqwestClient::default();
    }

    #[test]
    fn reqwest_client_accepts_proxy_with_credentials() {
        let proxy = ProxyConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
        };
        assert_eq!(proxy.url(), "http://127.0.0.1:8080");
        assert!(ReqwestClient::with_proxy(Some(&proxy)).is_ok());
        assert!(ReqwestClient::with_proxy(None).is_ok());
    }

    #[test]
    fn post_json_sets_content_type_and_body() {
        let request =
            HttpRequest::post_json("https://example.com", &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body.as_deref(), Some(&b"{\"a\":1}"[..]));
        assert!(
            request
                .headers
                .iter()
                .any(|(n, v)| n == "Content-Type" && v == "application/json")
        );
    }

    #[tokio::test]
    async fn get_bytes_collects_the_body() {
        let client = MockHttpClient::new(200, b"hello".to_vec());
        let bytes = client.get_bytes("https://example.com/a").await.unwrap();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(client.requests()[0].method, Method::GET);
    }

    #[tokio::test]
    async fn header_lookup_is_case_insensitive() {
        let client = MockHttpClient::new(200, Vec::new()).with_header("Content-Type", "text/html");
        let response = client.get_stream("https://example.com").await.unwrap();
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert!(response.is_success());
    }
}
