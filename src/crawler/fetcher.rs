//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with a per-request timeout
//! - Sending the session user agent plus caller supplied headers
//! - Retry logic for transport failures and HTTP 429
//! - Error classification (404 and unreadable bodies are terminal)
//! - Logging each request as a reproducible curl command

use crate::config::CrawlerConfig;
use crate::{CrawlerError, Result};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Source of raw response bodies
///
/// The crawl engine only talks to the network through this trait, so tests
/// can hand it canned pages, assets and query responses.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Issues a GET for `url` with the extra `headers` and returns the body
    async fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>>;
}

/// When and how often a failed request is re-issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause before re-issuing after a transport failure or HTTP 429
    pub error_delay: Duration,

    /// Retries allowed after the first attempt, `None` for no limit
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            error_delay: config.error_delay(),
            max_retries: config.retry_limit(),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `timeout` - Timeout applied to every individual request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(timeout: Duration) -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetcher backed by a real HTTP client
pub struct HttpFetcher {
    client: Client,
    user_agent: String,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(client: Client, user_agent: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            policy,
        }
    }

    /// Builds a fetcher from the crawler settings and the session user agent
    pub fn from_config(config: &CrawlerConfig, user_agent: impl Into<String>) -> Result<Self> {
        let client = build_http_client(config.request_timeout())?;
        Ok(Self::new(client, user_agent, RetryPolicy::from_config(config)))
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    /// Fetches a URL with retry logic
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Connection failure / timeout | Sleep error delay, retry |
    /// | HTTP 429 | Sleep error delay, retry |
    /// | HTTP 404 | Immediate `NotFound` |
    /// | Body read failure | Immediate `UnreadableBody` |
    /// | Anything else | Return the body |
    ///
    /// Retries stop with `RetriesExhausted` once the policy budget is spent.
    async fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<u8>> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!("{}", curl_command(url, &self.user_agent, headers));

            let mut request = self.client.get(url).header(USER_AGENT, &self.user_agent);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            match request.send().await {
                Err(e) if e.is_builder() => {
                    return Err(CrawlerError::Request {
                        url: url.to_string(),
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::warn!("connection issue for \"{}\": {}", url, e);
                }
                Ok(response) => match response.status() {
                    StatusCode::TOO_MANY_REQUESTS => {
                        tracing::warn!("throttling \"{}\"", url);
                    }
                    StatusCode::NOT_FOUND => {
                        tracing::warn!("not found \"{}\"", url);
                        return Err(CrawlerError::NotFound {
                            url: url.to_string(),
                        });
                    }
                    _ => {
                        return match response.bytes().await {
                            Ok(body) => Ok(body.to_vec()),
                            Err(e) => {
                                tracing::warn!("failed to read body of \"{}\": {}", url, e);
                                Err(CrawlerError::UnreadableBody {
                                    url: url.to_string(),
                                })
                            }
                        };
                    }
                },
            }

            if let Some(max_retries) = self.policy.max_retries {
                if attempt > max_retries {
                    return Err(CrawlerError::RetriesExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                    });
                }
            }

            tokio::time::sleep(self.policy.error_delay).await;
        }
    }
}

/// Renders a GET request as an equivalent curl command line
pub fn curl_command(url: &str, user_agent: &str, headers: &[(&str, &str)]) -> String {
    let mut command = String::from("curl -X 'GET'");

    command.push_str(&format!(" -H {}", shell_quote(&format!("user-agent: {}", user_agent))));
    for (name, value) in headers {
        command.push_str(&format!(" -H {}", shell_quote(&format!("{}: {}", name, value))));
    }
    command.push(' ');
    command.push_str(&shell_quote(url));

    command
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'\''"#))
}
