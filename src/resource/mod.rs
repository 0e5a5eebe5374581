//! Discovered media resources and the store that accumulates them during a crawl

use crate::crawler::Fetch;
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// A photo or video discovered on the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    /// Direct URL of the media file
    pub url: String,

    /// Unix timestamp (seconds) the parent post was taken at
    pub timestamp: i64,

    /// Whether the URL points at a video
    pub is_video: bool,
}

impl Resource {
    pub fn image(url: impl Into<String>, timestamp: i64) -> Self {
        Self {
            url: url.into(),
            timestamp,
            is_video: false,
        }
    }

    pub fn video(url: impl Into<String>, timestamp: i64) -> Self {
        Self {
            url: url.into(),
            timestamp,
            is_video: true,
        }
    }

    /// The post timestamp as a UTC date, if it is representable
    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp, 0).single()
    }

    /// Downloads the media file
    ///
    /// A missing file surfaces as [`CrawlerError::NotFound`](crate::CrawlerError::NotFound).
    pub async fn data(&self, fetcher: &dyn Fetch) -> Result<Vec<u8>> {
        fetcher.fetch(&self.url, &[]).await
    }

    /// Last path segment of the media URL, if it has one
    pub fn file_name(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()?
            .path_segments()?
            .last()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    }
}

/// Append-only collection of resources shared by all workers of one crawl
///
/// The lock is only held for the duration of a single append. Nothing reads
/// the collection until the crawl is over and the store is consumed.
#[derive(Debug, Default)]
pub struct ResourceStore {
    resources: Mutex<Vec<Resource>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resource under the store lock
    pub fn push(&self, resource: Resource) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resource);
    }

    /// Number of resources recorded so far
    pub fn len(&self) -> usize {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every recorded resource in append order, leaving the store empty
    pub fn take(&self) -> Vec<Resource> {
        std::mem::take(
            &mut *self
                .resources
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}
