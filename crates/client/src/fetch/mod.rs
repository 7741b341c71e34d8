//! HTTP network transport.
//!
//! ### Transport contract
//! - Every completed HTTP exchange resolves to a response, whatever its
//!   status; statuses are never turned into errors here.
//! - Connection, DNS, TLS, timeout and body-read failures map to
//!   `Error::Network` so the interceptor can fall back to the cache.
//! - Max redirects: 5
//! - Request timeout: configurable (default 20s)

pub mod url;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};

use precache_core::{AppConfig, Error, NetworkTransport, Request, Response};

pub use url::{UrlError, canonicalize, resolve_target};

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User agent string (default: "precache/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { user_agent: "precache/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for TransportConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// reqwest-backed network transport.
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

fn to_reqwest_method(method: &precache_core::Method) -> Result<reqwest::Method, Error> {
    reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|e| Error::InvalidInput(format!("invalid method {method}: {e}")))
}

fn snapshot_headers(headers: &header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
        .collect()
}

#[async_trait]
impl NetworkTransport for HttpTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let mut builder = self.http.request(to_reqwest_method(&request.method)?, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} {}: {}", request.method, request.url, e)))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = snapshot_headers(response.headers());

        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response from {}: {}", final_url, e)))?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "network fetch"
        );

        Ok(Response { url: Some(final_url), status, headers, body })
    }
}
