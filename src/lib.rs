//! ig-crawler: a media feed crawler for a single profile
//!
//! This crate impersonates a browser session against a profile page, reads the
//! embedded bootstrap payload, then paginates the site's query endpoint with a
//! small pool of workers to enumerate every photo and video newer than a cutoff.

pub mod config;
pub mod crawler;
pub mod resource;

use thiserror::Error;

/// Main error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("not found \"{url}\"")]
    NotFound { url: String },

    #[error("unable to read the response body of {url}")]
    UnreadableBody { url: String },

    #[error("gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("HTTP request error for {url}: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("couldn't find window._sharedData")]
    MissingPayload,

    #[error("couldn't find queryId")]
    MissingQueryId,

    #[error("couldn't find a profile entry in the page payload")]
    MissingProfile,

    #[error("couldn't find a post entry in the page payload")]
    MissingPost,

    #[error("\"{username}\" is private account")]
    PrivateAccount { username: String },

    #[error("couldn't find userId")]
    MissingUserId,

    #[error("couldn't find rhx-gis")]
    MissingSignatureSeed,

    #[error("profile image missing")]
    MissingProfileImage,

    #[error("invalid {context} json: {source}")]
    InvalidJson {
        context: &'static str,
        source: serde_json::Error,
    },

    #[error("crawl worker failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{fetch_profile_image, fetch_resources};
pub use resource::{Resource, ResourceStore};
