//! Engine types: states, results, progress snapshots, and error records

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crawl::frontier::QueueStats;
use crate::crawl::registry::RegistryError;
use crate::crawl::storage::{StorageError, StorageStats};

/// Engine lifecycle. Transitions: pending -> running, running <-> paused,
/// running -> {complete, failed, cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Pending,
    Running,
    Paused,
    Complete,
    Failed,
    Cancelled,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Pending => "pending",
            EngineState::Running => "running",
            EngineState::Paused => "paused",
            EngineState::Complete => "complete",
            EngineState::Failed => "failed",
            EngineState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One per-URL failure, kept for the run's error history.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlErrorRecord {
    pub url: String,
    pub code: String,
    pub message: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// On-demand progress snapshot assembled from queue and storage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: EngineState,
    pub pages_processed: u64,
    pub total_pages: usize,
    pub assets_processed: u64,
    pub bytes_downloaded: u64,
    pub current_url: Option<String>,
    pub errors: usize,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub elapsed_ms: u64,
    pub queue: QueueStats,
    pub storage: StorageStats,
}

/// Terminal result of a crawl. `success` is true iff the run finished
/// without per-URL errors and was not cancelled.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub success: bool,
    pub cancelled: bool,
    pub pages: u64,
    pub assets: u64,
    pub bytes: u64,
    pub errors: Vec<CrawlErrorRecord>,
    pub duration: Duration,
}

/// Engine-fatal errors. Per-URL failures never surface here; they are
/// recorded and the crawl continues.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid seed URL '{0}'")]
    InvalidSeed(String),
    #[error("engine already started")]
    AlreadyStarted,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
