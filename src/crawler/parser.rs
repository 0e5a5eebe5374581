//! HTML parser for the site's bootstrap pages
//!
//! This module handles parsing HTML content to extract:
//! - The embedded `window._sharedData` JSON payload
//! - The script bundle that carries the media query identifier
//! - The query identifier itself, read out of that bundle

use crate::crawler::fetcher::Fetch;
use crate::{CrawlerError, Result};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Global assignment that opens the embedded payload script
pub const PAYLOAD_MARKER: &str = "window._sharedData";

/// Path fragment of the bundle that defines the profile page queries
pub const QUERY_SCRIPT_FRAGMENT: &str = "/static/bundles/base/ProfilePageContainer.js";

/// Zero-based position of the media query among the bundle's `queryId` literals
///
/// This depends on the internal layout of a third-party asset and breaks
/// silently whenever the site reorders its query definitions.
pub const QUERY_ID_POSITION: usize = 2;

fn query_id_regex() -> &'static Regex {
    static QUERY_ID: OnceLock<Regex> = OnceLock::new();
    QUERY_ID.get_or_init(|| Regex::new(r#"queryId:"([^"]+)""#).expect("valid queryId pattern"))
}

/// Extracts the embedded JSON payload from an HTML document
///
/// Scans `<script>` elements for one whose text starts with
/// `window._sharedData` and returns the assigned expression without the
/// trailing statement terminator.
///
/// # Example
///
/// ```
/// use ig_crawler::crawler::extract_embedded_payload;
///
/// let html = r#"<html><body><script>window._sharedData = {"a":1};</script></body></html>"#;
/// assert_eq!(extract_embedded_payload(html).unwrap(), r#"{"a":1}"#);
/// ```
pub fn extract_embedded_payload(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let script_selector =
        Selector::parse("script").map_err(|_| CrawlerError::MissingPayload)?;

    for element in document.select(&script_selector) {
        let text = element.text().collect::<String>();
        let Some(assignment) = text.trim_start().strip_prefix(PAYLOAD_MARKER) else {
            continue;
        };

        let Some(expression) = assignment.trim_start().strip_prefix('=') else {
            continue;
        };

        let expression = expression.trim();
        let expression = expression.strip_suffix(';').unwrap_or(expression).trim_end();
        if !expression.is_empty() {
            return Ok(expression.to_string());
        }
    }

    Err(CrawlerError::MissingPayload)
}

/// Finds the `src` of the script bundle that defines the profile queries
pub fn find_query_script(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let script_selector = Selector::parse("script[src]").ok()?;

    document
        .select(&script_selector)
        .filter_map(|element| element.value().attr("src"))
        .find(|src| src.contains(QUERY_SCRIPT_FRAGMENT))
        .map(str::to_string)
}

/// Reads the media query identifier out of a script bundle
pub fn extract_query_id(asset: &str) -> Result<String> {
    query_id_regex()
        .captures_iter(asset)
        .nth(QUERY_ID_POSITION)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(CrawlerError::MissingQueryId)
}

/// Locates, fetches and reads the query identifier referenced by a profile page
///
/// A missing script tag, a failed asset fetch or a bundle with too few
/// `queryId` literals all surface as [`CrawlerError::MissingQueryId`].
pub async fn resolve_query_id(fetcher: &dyn Fetch, base_url: &str, html: &str) -> Result<String> {
    let src = find_query_script(html).ok_or(CrawlerError::MissingQueryId)?;
    let script_url = Url::parse(base_url)?.join(&src)?;

    let asset = match fetcher.fetch(script_url.as_str(), &[]).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("failed to fetch query script {}: {}", script_url, e);
            return Err(CrawlerError::MissingQueryId);
        }
    };

    extract_query_id(&String::from_utf8_lossy(&asset))
}
