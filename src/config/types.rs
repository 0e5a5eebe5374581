use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.instagram.com";
pub const DEFAULT_CONCURRENCY: u32 = 2;
pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5000;
pub const DEFAULT_ERROR_DELAY_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 20;

/// Main configuration structure for a crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

/// Which profile to crawl and how far back
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Profile username
    pub username: String,

    /// Cutoff unix timestamp; media taken at or before it is skipped (0 = no cutoff)
    #[serde(default)]
    pub after: i64,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of workers draining the work queues
    pub concurrency: u32,

    /// Media nodes requested per query page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Upper bound of the adaptive delay between query requests (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Pause before retrying after a transport failure or HTTP 429 (milliseconds)
    #[serde(rename = "error-delay-ms")]
    pub error_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Retries before giving up on a request (0 = retry forever)
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            error_delay_ms: DEFAULT_ERROR_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl CrawlerConfig {
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry budget, `None` when retries are unbounded
    pub fn retry_limit(&self) -> Option<u32> {
        match self.max_retries {
            0 => None,
            n => Some(n),
        }
    }
}

/// User agent sent with every request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserAgentConfig {
    /// Explicit user agent; a random browser user agent is used when absent
    pub value: Option<String>,
}

/// Site endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Scheme and host every page, asset and query URL is built from
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Config {
    /// Creates a configuration with defaults for everything but the username
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            target: TargetConfig {
                username: username.into(),
                after: 0,
            },
            crawler: CrawlerConfig::default(),
            user_agent: UserAgentConfig::default(),
            site: SiteConfig::default(),
        }
    }

    /// Overlays the values `other` sets explicitly onto this configuration
    ///
    /// Zero and absent values in `other` are treated as "not set", so a
    /// command line can refine a configuration file without clobbering it.
    pub fn merge(&mut self, other: &Config) -> &mut Self {
        if !other.target.username.is_empty() {
            self.target.username = other.target.username.clone();
        }

        if other.user_agent.value.is_some() {
            self.user_agent.value = other.user_agent.value.clone();
        }

        if other.crawler.concurrency != 0 {
            self.crawler.concurrency = other.crawler.concurrency;
        }

        if other.target.after != 0 {
            self.target.after = other.target.after;
        }

        self
    }

    /// Trimmed base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.site.base_url.trim_end_matches('/')
    }
}
