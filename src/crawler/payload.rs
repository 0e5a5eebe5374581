//! Typed views of the site's JSON payloads
//!
//! Only the fields the crawl engine reads are modelled; everything else in the
//! payloads is ignored. Missing fields fall back to their defaults so that the
//! engine, not serde, decides which absences are fatal.

use crate::{CrawlerError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Type tag of a single-image post
pub const TYPE_IMAGE: &str = "GraphImage";

/// Type tag of a multi-item gallery post
pub const TYPE_SIDECAR: &str = "GraphSidecar";

/// Decodes a JSON document, naming the payload in the error
pub fn decode<T: DeserializeOwned>(json: &str, context: &'static str) -> Result<T> {
    serde_json::from_str(json).map_err(|source| CrawlerError::InvalidJson { context, source })
}

/// `{"node": ...}` wrapper used by every edge list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

/// Root of the payload embedded in profile and post pages
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SharedData {
    pub entry_data: EntryData,

    /// Seed of the request signature
    pub rhx_gis: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntryData {
    #[serde(rename = "ProfilePage")]
    pub profile_page: Vec<ProfilePage>,

    #[serde(rename = "PostPage")]
    pub post_page: Vec<PostPage>,
}

impl SharedData {
    /// First profile entry, the one describing the crawled account
    pub fn profile(&self) -> Result<&ProfileUser> {
        self.entry_data
            .profile_page
            .first()
            .map(|page| &page.graphql.user)
            .ok_or(CrawlerError::MissingProfile)
    }

    /// First post entry of a post page
    pub fn post(&self) -> Result<&ShortcodeMedia> {
        self.entry_data
            .post_page
            .first()
            .map(|page| &page.graphql.shortcode_media)
            .ok_or(CrawlerError::MissingPost)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfilePage {
    pub graphql: ProfileGraph,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileGraph {
    pub user: ProfileUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUser {
    pub id: String,
    pub is_private: bool,
    pub profile_pic_url_hd: String,

    #[serde(rename = "edge_owner_to_timeline_media")]
    pub media: MediaEdge,
}

/// One page of a profile's timeline
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaEdge {
    pub count: u64,
    pub edges: Vec<Edge<MediaNode>>,
    pub page_info: PageInfo,
}

impl MediaEdge {
    pub fn nodes(&self) -> impl Iterator<Item = &MediaNode> {
        self.edges.iter().map(|edge| &edge.node)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaNode {
    #[serde(rename = "__typename")]
    pub type_name: String,
    pub id: String,
    pub is_video: bool,
    pub shortcode: String,
    pub taken_at_timestamp: i64,
    pub display_url: String,
}

/// What the engine does with a timeline node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Gallery,
    Video,
    Other,
}

impl MediaNode {
    pub fn kind(&self) -> MediaKind {
        if self.is_video {
            return MediaKind::Video;
        }

        match self.type_name.as_str() {
            TYPE_IMAGE => MediaKind::Image,
            TYPE_SIDECAR => MediaKind::Gallery,
            _ => MediaKind::Other,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Cursor of the next page, `None` when absent or empty
    pub fn cursor(&self) -> Option<&str> {
        self.end_cursor.as_deref().filter(|cursor| !cursor.is_empty())
    }
}

/// Response of the paginated query endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryPage {
    pub data: QueryData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryData {
    pub user: QueryUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryUser {
    #[serde(rename = "edge_owner_to_timeline_media")]
    pub media: MediaEdge,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostPage {
    pub graphql: PostGraph,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostGraph {
    pub shortcode_media: ShortcodeMedia,
}

/// A single post, either a gallery or a video
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShortcodeMedia {
    pub video_url: String,
    pub edge_sidecar_to_children: SidecarChildren,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SidecarChildren {
    pub edges: Vec<Edge<SidecarChild>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SidecarChild {
    pub is_video: bool,
    pub display_url: String,
    pub video_url: String,
}

impl SidecarChild {
    /// URL of the child's media, the video itself for video children
    pub fn media_url(&self) -> &str {
        if self.is_video {
            &self.video_url
        } else {
            &self.display_url
        }
    }
}
