//! Configuration module for ig-crawler
//!
//! This module handles loading, parsing, merging and validating the crawl
//! configuration, and picking the user agent a session presents.
//!
//! # Example
//!
//! ```no_run
//! use ig_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawler.toml")).unwrap();
//! println!("Crawling {} with {} workers", config.target.username, config.crawler.concurrency);
//! ```

mod parser;
mod types;
mod user_agent;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, SiteConfig, TargetConfig, UserAgentConfig, DEFAULT_BASE_URL,
};
pub use user_agent::{random_user_agent, resolve_user_agent, BROWSER_USER_AGENTS};
pub use validation::validate;

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
