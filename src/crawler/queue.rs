//! Work queues shared by the workers of one crawl session
//!
//! Four FIFO lanes hold the different kinds of work. A pending counter
//! tracks every item that has been enqueued but whose handler has not yet
//! returned, so an idle worker can tell "nothing queued right now" apart
//! from "the crawl is finished".

use crate::resource::Resource;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Opaque pagination token of the query endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub cursor: String,
}

/// A post that needs a second fetch to reveal its media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    /// Post page URL
    pub url: String,

    /// Timestamp of the timeline node the post was discovered on
    pub timestamp: i64,
}

/// A unit of work for the crawl engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Resource(Resource),
    Gallery(PostRef),
    Video(PostRef),
    Page(PageCursor),
}

impl WorkItem {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkItem::Resource(_) => "resource",
            WorkItem::Gallery(_) => "gallery",
            WorkItem::Video(_) => "video",
            WorkItem::Page(_) => "page",
        }
    }
}

#[derive(Debug, Default)]
struct Lanes {
    resources: VecDeque<Resource>,
    galleries: VecDeque<PostRef>,
    videos: VecDeque<PostRef>,
    pages: VecDeque<PageCursor>,
}

/// Queues plus pending-work accounting for one crawl session
#[derive(Debug, Default)]
pub struct WorkQueues {
    lanes: Mutex<Lanes>,
    pending: AtomicUsize,
    notify: Notify,
}

impl WorkQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues an item and wakes idle workers
    pub fn push(&self, item: WorkItem) {
        self.pending.fetch_add(1, Ordering::SeqCst);

        {
            let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
            match item {
                WorkItem::Resource(resource) => lanes.resources.push_back(resource),
                WorkItem::Gallery(post) => lanes.galleries.push_back(post),
                WorkItem::Video(post) => lanes.videos.push_back(post),
                WorkItem::Page(cursor) => lanes.pages.push_back(cursor),
            }
        }

        self.notify.notify_waiters();
    }

    /// Takes the next item, favouring resources, then galleries, videos and pages
    pub fn pop(&self) -> Option<WorkItem> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(resource) = lanes.resources.pop_front() {
            return Some(WorkItem::Resource(resource));
        }
        if let Some(post) = lanes.galleries.pop_front() {
            return Some(WorkItem::Gallery(post));
        }
        if let Some(post) = lanes.videos.pop_front() {
            return Some(WorkItem::Video(post));
        }
        lanes.pages.pop_front().map(WorkItem::Page)
    }

    /// Marks one popped item as handled
    ///
    /// Must be called after the handler has enqueued any follow-up work.
    /// Wakes every idle worker once the last pending item completes.
    pub fn complete(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "complete() without a matching push()");

        if previous == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Items enqueued but not yet completed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether every enqueued item has been handled
    pub fn is_drained(&self) -> bool {
        self.pending() == 0
    }

    /// Future resolved by the next push or by the final completion
    ///
    /// Enable it before checking the queues so a wake-up in between is not lost.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}
