//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives one crawl session through its states:
//! - Preparing: fetch the profile page, resolve the query id, decode the payload
//! - Seeding: turn the profile's first media page into work items
//! - Draining: run the worker pool until no work is pending
//! - Done or Failed: hand back the resources or the first error

use crate::config::{resolve_user_agent, validate, Config};
use crate::crawler::fetcher::{Fetch, HttpFetcher};
use crate::crawler::governor::RateGovernor;
use crate::crawler::parser::{extract_embedded_payload, resolve_query_id};
use crate::crawler::payload::{decode, MediaEdge, MediaKind, QueryPage, SharedData};
use crate::crawler::queue::{PageCursor, PostRef, WorkItem, WorkQueues};
use crate::resource::{Resource, ResourceStore};
use crate::{CrawlerError, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Header carrying the per-request signature of a query
pub const SIGNATURE_HEADER: &str = "x-instagram-gis";

/// Signs the variables of a query with the session seed
pub fn request_signature(seed: &str, variables: &str) -> String {
    format!("{:x}", md5::compute(format!("{}:{}", seed, variables)))
}

/// Variables document of a query page request
///
/// The user id is embedded as a bare literal; the server's signature check
/// is sensitive to the exact text.
pub fn query_variables(user_id: &str, page_size: u32, cursor: &str) -> String {
    format!(
        r#"{{"id":{},"first":{},"after":"{}"}}"#,
        user_id, page_size, cursor
    )
}

/// Everything learned from the profile page before crawling starts
#[derive(Debug, Clone)]
pub struct Prepared {
    pub query_id: String,
    pub shared: SharedData,
}

/// Entry point for crawling one profile
pub struct Crawler {
    config: Config,
    fetcher: Arc<dyn Fetch>,
}

impl Crawler {
    /// Creates a crawler that talks to the network over HTTP
    ///
    /// Validates the configuration and resolves the session user agent.
    pub fn new(config: Config) -> Result<Self> {
        validate(&config)?;

        let user_agent = resolve_user_agent(config.user_agent.value.as_deref());
        tracing::debug!("Using user agent: {}", user_agent);
        let fetcher = HttpFetcher::from_config(&config.crawler, user_agent)?;

        Ok(Self {
            config,
            fetcher: Arc::new(fetcher),
        })
    }

    /// Creates a crawler over an arbitrary fetcher
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        validate(&config)?;
        Ok(Self { config, fetcher })
    }

    fn profile_url(&self) -> String {
        format!("{}/{}/", self.config.base_url(), self.config.target.username)
    }

    /// Fetches the profile page and decodes its bootstrap payload
    ///
    /// Fails on a private account, or when the user id or signature seed
    /// is missing.
    pub async fn prepare(&self) -> Result<Prepared> {
        let profile_url = self.profile_url();
        tracing::info!("Preparing session for {}", self.config.target.username);

        let body = self.fetcher.fetch(&profile_url, &[]).await?;
        let html = String::from_utf8_lossy(&body);

        let json = extract_embedded_payload(&html)?;
        let query_id = resolve_query_id(self.fetcher.as_ref(), self.config.base_url(), &html).await?;
        let shared: SharedData = decode(&json, "main page")?;

        let user = shared.profile()?;
        if user.is_private {
            return Err(CrawlerError::PrivateAccount {
                username: self.config.target.username.clone(),
            });
        }
        if user.id.is_empty() {
            return Err(CrawlerError::MissingUserId);
        }
        if shared.rhx_gis.is_empty() {
            return Err(CrawlerError::MissingSignatureSeed);
        }

        tracing::debug!("Resolved user id {} and query id {}", user.id, query_id);
        Ok(Prepared { query_id, shared })
    }

    /// Returns the high resolution profile picture URL
    pub async fn profile_image(&self) -> Result<String> {
        let prepared = self.prepare().await?;
        let url = &prepared.shared.profile()?.profile_pic_url_hd;

        if url.is_empty() {
            return Err(CrawlerError::MissingProfileImage);
        }
        Ok(url.clone())
    }

    /// Crawls the whole feed and returns every resource newer than the cutoff
    pub async fn fetch_resources(&self) -> Result<Vec<Resource>> {
        let prepared = self.prepare().await?;
        let session = Arc::new(CrawlSession::new(&self.config, Arc::clone(&self.fetcher), prepared)?);

        let start_time = std::time::Instant::now();
        let resources = match session.run(self.config.crawler.concurrency).await {
            Ok(resources) => resources,
            Err(e) => {
                tracing::error!("Crawl of {} failed: {}", self.config.target.username, e);
                return Err(e);
            }
        };

        tracing::info!(
            "Done: {} resources for {} in {:.2}s",
            resources.len(),
            self.config.target.username,
            start_time.elapsed().as_secs_f64()
        );
        Ok(resources)
    }
}

/// State of one crawl, shared by its workers
pub struct CrawlSession {
    fetcher: Arc<dyn Fetch>,
    base_url: String,
    user_id: String,
    query_id: String,
    rhx_gis: String,
    after: i64,
    page_size: u32,
    initial_media: MediaEdge,
    governor: RateGovernor,
    queues: WorkQueues,
    store: ResourceStore,
}

impl CrawlSession {
    pub fn new(config: &Config, fetcher: Arc<dyn Fetch>, prepared: Prepared) -> Result<Self> {
        let user = prepared.shared.profile()?;

        Ok(Self {
            fetcher,
            base_url: config.base_url().to_string(),
            user_id: user.id.clone(),
            query_id: prepared.query_id,
            rhx_gis: prepared.shared.rhx_gis.clone(),
            after: config.target.after,
            page_size: config.crawler.page_size,
            initial_media: user.media.clone(),
            governor: RateGovernor::new(config.crawler.max_delay()),
            queues: WorkQueues::new(),
            store: ResourceStore::new(),
        })
    }

    /// Seeds the queues, drains them with `concurrency` workers and returns
    /// the recorded resources
    pub async fn run(self: Arc<Self>, concurrency: u32) -> Result<Vec<Resource>> {
        tracing::info!("Seeding from {} profile nodes", self.initial_media.edges.len());
        self.discover(&self.initial_media);

        tracing::info!(
            "Draining {} queued items with {} workers",
            self.queues.pending(),
            concurrency
        );

        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency.max(1) {
            let session = Arc::clone(&self);
            let cancel = cancel.clone();
            workers.spawn(async move { session.worker(worker_id, cancel).await });
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined
                .map_err(|e| CrawlerError::Worker(e.to_string()))
                .and_then(|result| result);

            if let Err(e) = outcome {
                cancel.cancel();
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(self.store.take()),
        }
    }

    async fn worker(&self, worker_id: u32, cancel: CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                tracing::debug!("Worker {} stopping: crawl cancelled", worker_id);
                return Ok(());
            }

            let notified = self.queues.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let item = match self.queues.pop() {
                Some(item) => item,
                None => {
                    if self.queues.is_drained() {
                        tracing::debug!("Worker {} finished", worker_id);
                        return Ok(());
                    }

                    tokio::select! {
                        _ = notified => {}
                        _ = cancel.cancelled() => return Ok(()),
                    }
                    continue;
                }
            };

            tracing::debug!("Worker {} handling {} item", worker_id, item.kind());
            let result = tokio::select! {
                result = self.handle(item) => result,
                _ = cancel.cancelled() => Ok(()),
            };
            self.queues.complete();

            if let Err(e) = result {
                cancel.cancel();
                return Err(e);
            }
        }
    }

    async fn handle(&self, item: WorkItem) -> Result<()> {
        match item {
            WorkItem::Resource(resource) => {
                self.store.push(resource);
                Ok(())
            }
            WorkItem::Gallery(post) => self.handle_gallery(&post).await,
            WorkItem::Video(post) => self.handle_video(&post).await,
            WorkItem::Page(cursor) => self.handle_page(&cursor).await,
        }
    }

    fn post_url(&self, shortcode: &str) -> String {
        format!("{}/p/{}", self.base_url, shortcode)
    }

    /// Builds the query endpoint URL for a page of the timeline
    pub fn query_url(&self, variables: &str) -> Result<Url> {
        let url = Url::parse_with_params(
            &format!("{}/graphql/query/", self.base_url),
            &[("query_hash", self.query_id.as_str()), ("variables", variables)],
        )?;
        Ok(url)
    }

    /// Turns a media page into work items
    ///
    /// Nodes at or before the cutoff are skipped and stop pagination of
    /// this edge, whatever the server reports.
    fn discover(&self, media: &MediaEdge) {
        let mut has_next_page = media.page_info.has_next_page;

        for node in media.nodes() {
            let timestamp = node.taken_at_timestamp;
            if timestamp <= self.after {
                has_next_page = false;
                continue;
            }

            match node.kind() {
                MediaKind::Image => {
                    self.queues
                        .push(WorkItem::Resource(Resource::image(node.display_url.clone(), timestamp)));
                }
                MediaKind::Gallery => {
                    self.queues.push(WorkItem::Gallery(PostRef {
                        url: self.post_url(&node.shortcode),
                        timestamp,
                    }));
                }
                MediaKind::Video => {
                    self.queues.push(WorkItem::Video(PostRef {
                        url: self.post_url(&node.shortcode),
                        timestamp,
                    }));
                }
                MediaKind::Other => {
                    tracing::debug!("Ignoring {} node {}", node.type_name, node.id);
                }
            }
        }

        if !has_next_page {
            return;
        }

        match media.page_info.cursor() {
            Some(cursor) => self.queues.push(WorkItem::Page(PageCursor {
                cursor: cursor.to_string(),
            })),
            None => tracing::warn!("Server reported a next page without a cursor, stopping"),
        }
    }

    async fn handle_page(&self, page: &PageCursor) -> Result<()> {
        let variables = query_variables(&self.user_id, self.page_size, &page.cursor);
        let url = self.query_url(&variables)?;
        let signature = request_signature(&self.rhx_gis, &variables);

        if RateGovernor::applies_to(url.as_str()) {
            self.governor.throttle().await;
        }

        let body = self
            .fetcher
            .fetch(url.as_str(), &[(SIGNATURE_HEADER, signature.as_str())])
            .await?;
        let page: QueryPage = decode(&String::from_utf8_lossy(&body), "graphql")?;

        self.discover(&page.data.user.media);
        Ok(())
    }

    async fn fetch_post(&self, post: &PostRef, context: &'static str) -> Result<SharedData> {
        let body = self.fetcher.fetch(&post.url, &[]).await?;
        let json = extract_embedded_payload(&String::from_utf8_lossy(&body))?;
        decode(&json, context)
    }

    async fn handle_gallery(&self, post: &PostRef) -> Result<()> {
        if post.timestamp <= self.after {
            return Ok(());
        }

        let shared = self.fetch_post(post, "gallery page").await?;
        for child in &shared.post()?.edge_sidecar_to_children.edges {
            let url = child.node.media_url().to_string();
            let resource = if child.node.is_video {
                Resource::video(url, post.timestamp)
            } else {
                Resource::image(url, post.timestamp)
            };
            self.queues.push(WorkItem::Resource(resource));
        }
        Ok(())
    }

    async fn handle_video(&self, post: &PostRef) -> Result<()> {
        if post.timestamp <= self.after {
            return Ok(());
        }

        let shared = self.fetch_post(post, "video page").await?;
        let video_url = shared.post()?.video_url.clone();
        self.queues
            .push(WorkItem::Resource(Resource::video(video_url, post.timestamp)));
        Ok(())
    }
}
