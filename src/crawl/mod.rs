//! Offline-archive crawl core
//!
//! Data flow: seed URL -> frontier -> engine pops -> SSRF guard -> fetcher
//! -> storage under a registry-chosen local path -> HTML/CSS extraction
//! feeds the frontier -> when the frontier drains, stored HTML and CSS are
//! rewritten to relative local paths.
//!
//! Key components:
//! - `url_utils`: canonicalization, scope rules, and classification
//! - `SsrfGuard`: pre-fetch validation with DNS-rebinding defense
//! - `PathRegistry`: bijective canonical-URL <-> local-path map
//! - `Storage`: per-job sandbox with an aggregate size ceiling
//! - `RobotsRules`: crawl directives for the seed host
//! - `Frontier`: de-duplicated BFS queue with page/asset admission
//! - `Fetcher`: bounded-concurrency client with anti-detection policies
//! - `CrawlEngine`: orchestration, events, and the rewrite pass

pub mod engine;
pub mod extract;
pub mod fetcher;
pub mod frontier;
pub mod registry;
pub mod rewrite;
pub mod robots;
pub mod ssrf;
pub mod storage;
pub mod url_utils;

pub use engine::events::{CrawlEvent, UrlSource};
pub use engine::types::{CrawlErrorRecord, CrawlResult, EngineError, EngineState, ProgressSnapshot};
pub use engine::CrawlEngine;
pub use fetcher::{FetchError, FetchResult, Fetcher, FetcherConfig};
pub use frontier::{EntryKind, EntryStatus, Frontier, FrontierEntry, QueueStats};
pub use registry::PathRegistry;
pub use robots::RobotsRules;
pub use ssrf::{SsrfBlock, SsrfGuard};
pub use storage::{Storage, StorageError, StorageStats};
