//! Crawler module for walking a profile's media feed
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - Bootstrap payload and query id extraction
//! - Adaptive pacing of paginated queries
//! - Work queues and the worker pool that drains them

mod coordinator;
mod fetcher;
mod governor;
mod parser;
mod payload;
mod queue;

pub use coordinator::{
    query_variables, request_signature, CrawlSession, Crawler, Prepared, SIGNATURE_HEADER,
};
pub use fetcher::{build_http_client, curl_command, Fetch, HttpFetcher, RetryPolicy};
pub use governor::{next_delay, RateGovernor};
pub use parser::{extract_embedded_payload, extract_query_id, find_query_script, resolve_query_id};
pub use payload::{MediaEdge, MediaKind, MediaNode, PageInfo, QueryPage, SharedData};
pub use queue::{PageCursor, PostRef, WorkItem, WorkQueues};

use crate::config::Config;
use crate::resource::Resource;
use crate::Result;

/// Crawls a profile and returns every resource newer than the configured cutoff
///
/// This is the main entry point for a crawl. It will:
/// 1. Fetch the profile page and resolve the session identifiers
/// 2. Seed the work queues from the first media page
/// 3. Drain the queues with the configured number of workers
/// 4. Return the resources in the order workers recorded them
///
/// # Example
///
/// ```no_run
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use ig_crawler::{fetch_resources, Config};
///
/// let resources = fetch_resources(&Config::new("someone")).await?;
/// println!("found {} resources", resources.len());
/// # Ok(())
/// # }
/// ```
pub async fn fetch_resources(config: &Config) -> Result<Vec<Resource>> {
    Crawler::new(config.clone())?.fetch_resources().await
}

/// Returns the high resolution profile picture URL of the configured profile
pub async fn fetch_profile_image(config: &Config) -> Result<String> {
    Crawler::new(config.clone())?.profile_image().await
}
