//! Scraper module for fetching pages from the catalog site
//!
//! This module provides the HTTP fetch capability used by every other
//! component. `HttpFetch` is the seam; `Scraper` is the reqwest-backed
//! implementation with browser-like headers and user agent rotation.

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during fetch operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScraperError {
    /// Network-related errors (connection timeout, DNS failure, etc.)
    #[error("Failed to connect to server: {0}")]
    NetworkError(String),

    /// HTTP non-200 status code errors
    #[error("Server returned status {0}")]
    HttpError(u16),

    /// Error reading response body
    #[error("Failed to read response body: {0}")]
    ResponseError(String),
}

/// A single GET request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    /// Sent as `Referer` when present
    pub referer: Option<String>,
    /// Extra headers, applied after the default browser headers
    pub headers: Vec<(String, String)>,
    /// Overrides the client timeout for this request
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a successful page fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// The HTTP status code
    pub status: u16,
    /// The response body
    pub body: String,
    /// URL after following redirects
    pub final_url: String,
}

/// HTTP GET capability
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, ScraperError>;
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Default timeout for a whole request
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Whether to rotate user agents
    pub rotate_user_agent: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            rotate_user_agent: true,
        }
    }
}

/// List of realistic user agents for rotation
const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// reqwest-backed `HttpFetch`
pub struct Scraper {
    client: Client,
    config: ScraperConfig,
}

impl Scraper {
    /// Create a new Scraper with default configuration
    pub fn new() -> Result<Self, ScraperError> {
        Self::with_config(ScraperConfig::default())
    }

    /// Create a new Scraper with custom configuration
    pub fn with_config(config: ScraperConfig) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                ScraperError::NetworkError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Get a random user agent from the list
    fn get_user_agent(&self) -> &'static str {
        if self.config.rotate_user_agent {
            let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
            USER_AGENTS[idx]
        } else {
            USER_AGENTS[0]
        }
    }

    /// Get the client-hint headers that match the user agent
    fn get_sec_ch_ua(&self, user_agent: &str) -> (&'static str, &'static str, &'static str) {
        if user_agent.contains("Edg/") {
            (
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Microsoft Edge\";v=\"120\"",
                "?0",
                "\"Windows\"",
            )
        } else if user_agent.contains("Chrome/120") && user_agent.contains("Macintosh") {
            (
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
                "?0",
                "\"macOS\"",
            )
        } else if user_agent.contains("Chrome/120") {
            (
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
                "?0",
                "\"Windows\"",
            )
        } else if user_agent.contains("Chrome/119") {
            (
                "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"119\", \"Google Chrome\";v=\"119\"",
                "?0",
                "\"Windows\"",
            )
        } else {
            // Firefox doesn't send Sec-Ch-Ua headers
            ("", "", "")
        }
    }
}

#[async_trait]
impl HttpFetch for Scraper {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, ScraperError> {
        let user_agent = self.get_user_agent();
        let (sec_ch_ua, sec_ch_ua_mobile, sec_ch_ua_platform) = self.get_sec_ch_ua(user_agent);

        tracing::debug!("GET {}", request.url);

        let mut builder = self
            .client
            .get(&request.url)
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache");

        if !sec_ch_ua.is_empty() {
            builder = builder
                .header("Sec-Ch-Ua", sec_ch_ua)
                .header("Sec-Ch-Ua-Mobile", sec_ch_ua_mobile)
                .header("Sec-Ch-Ua-Platform", sec_ch_ua_platform);
        }

        if let Some(referer) = request.referer.as_deref().filter(|r| !r.is_empty()) {
            builder = builder.header("Referer", referer);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ScraperError::NetworkError("Connection timeout".to_string())
            } else if e.is_connect() {
                ScraperError::NetworkError("Failed to connect to server".to_string())
            } else {
                ScraperError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();

        if status != StatusCode::OK {
            tracing::warn!("GET {} returned {}", request.url, status);
            return Err(ScraperError::HttpError(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScraperError::ResponseError(e.to_string()))?;

        Ok(FetchResponse {
            status: status.as_u16(),
            body,
            final_url,
        })
    }
}
