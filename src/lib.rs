//! webmirror: browsable offline archives of websites
//!
//! A polite breadth-first crawler that downloads every asset a page needs
//! to render offline, maps each URL to a unique local path, and rewrites
//! all cross-references so the stored tree browses standalone:
//! - De-duplicated BFS frontier with scope and filter rules
//! - SSRF-guarded fetching with retries, rate-limit handling, and
//!   anti-detection headers
//! - HTML/CSS link extraction and relative-path rewriting
//! - Per-job sandboxed storage with size ceilings
//! - Progress events over a broadcast channel

pub mod config;
pub mod crawl;
pub mod util;

pub use config::Config;
pub use crawl::{CrawlEngine, CrawlResult, EngineState};
