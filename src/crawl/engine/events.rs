//! Crawl event stream
//!
//! Events are published on a bounded broadcast channel so the surrounding
//! job layer can relay them (SSE, websockets, a progress bar) without ever
//! blocking the engine. A consumer that falls behind loses oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::types::ProgressSnapshot;

/// Broadcast buffer size. Slow subscribers see `RecvError::Lagged` instead
/// of stalling the crawl.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How a URL entered the frontier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UrlSource {
    Seed,
    Discovered,
}

/// Events emitted during a crawl.
///
/// Each variant is serialized as internally-tagged JSON
/// (`"type": "variant_name"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    /// The engine started and the seed was queued.
    JobStarted {
        job_id: Uuid,
        seed_url: String,
        max_depth: u32,
        max_pages: usize,
    },

    /// A URL was admitted to the frontier.
    UrlQueued {
        job_id: Uuid,
        url: String,
        depth: u32,
        source: UrlSource,
    },

    /// A fetch was dispatched.
    UrlFetching {
        job_id: Uuid,
        url: String,
    },

    /// A URL was fetched and its bytes stored.
    UrlArchived {
        job_id: Uuid,
        url: String,
        local_path: String,
        content_type: String,
        bytes: u64,
        links_discovered: usize,
        duration_ms: u64,
    },

    /// A URL failed terminally.
    UrlFailed {
        job_id: Uuid,
        url: String,
        code: String,
        error: String,
        duration_ms: u64,
    },

    /// A URL was skipped (robots, abort).
    UrlSkipped {
        job_id: Uuid,
        url: String,
        reason: String,
    },

    /// Aggregate snapshot emitted after each completion.
    Progress {
        job_id: Uuid,
        snapshot: ProgressSnapshot,
    },

    /// The fetch phase finished; link rewriting began.
    RewriteStarted {
        job_id: Uuid,
        files: usize,
    },

    /// Terminal event: complete, failed, or cancelled.
    JobCompleted {
        job_id: Uuid,
        status: String,
        pages: u64,
        assets: u64,
        bytes: u64,
        errors: usize,
        duration_ms: u64,
    },
}

impl CrawlEvent {
    /// Stable event name, usable as an SSE `event:` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            CrawlEvent::JobStarted { .. } => "job_started",
            CrawlEvent::UrlQueued { .. } => "url_queued",
            CrawlEvent::UrlFetching { .. } => "url_fetching",
            CrawlEvent::UrlArchived { .. } => "url_archived",
            CrawlEvent::UrlFailed { .. } => "url_failed",
            CrawlEvent::UrlSkipped { .. } => "url_skipped",
            CrawlEvent::Progress { .. } => "progress",
            CrawlEvent::RewriteStarted { .. } => "rewrite_started",
            CrawlEvent::JobCompleted { .. } => "job_completed",
        }
    }
}

/// Publish an event, logging delivery without treating "no subscribers" as
/// an error.
pub fn emit(tx: &broadcast::Sender<CrawlEvent>, event: CrawlEvent) {
    let event_name = event.event_name();
    match tx.send(event) {
        Ok(n) => debug!("event {}: {} subscriber(s)", event_name, n),
        Err(_) => debug!("event {}: no subscribers connected", event_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_tagged() {
        let event = CrawlEvent::UrlQueued {
            job_id: Uuid::nil(),
            url: "https://example.test/".to_string(),
            depth: 1,
            source: UrlSource::Discovered,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "url_queued");
        assert_eq!(json["source"], "discovered");
        assert_eq!(event.event_name(), "url_queued");
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let (tx, rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        drop(rx);
        emit(
            &tx,
            CrawlEvent::UrlFetching {
                job_id: Uuid::nil(),
                url: "https://example.test/".to_string(),
            },
        );
    }
}
