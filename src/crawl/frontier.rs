//! Crawl frontier: the de-duplicated BFS work queue
//!
//! Two admission predicates with different scope semantics: pages are
//! subject to scope, glob filters, and depth/page ceilings; assets are
//! admitted regardless of host (a small depth cushion covers `@import`
//! chains) so that CDN-hosted resources render offline. Entries are keyed
//! by canonical URL and never deleted during a run.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{CrawlConfig, FileCategory};
use crate::crawl::url_utils::{canonicalize, extension, in_scope, matches_pattern, mime_category};

/// Extra depth allowed for assets beyond `max_depth`, covering stylesheet
/// `@import` chains discovered below the page ceiling.
const ASSET_DEPTH_CUSHION: u32 = 5;

/// How a frontier entry participates in the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Page,
    Asset,
}

/// Processing status of a frontier entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
    Skipped,
}

/// One URL in the frontier with its full processing history.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    /// Stable handle used for status transitions
    pub id: usize,
    /// URL as discovered (original case and fragment preserved for display)
    pub url: String,
    /// Canonical key, unique across the frontier
    pub canonical: String,
    pub kind: EntryKind,
    pub depth: u32,
    /// URL of the page this entry was discovered on
    pub parent: Option<String>,
    pub status: EntryStatus,
    pub retries: u32,
    pub enqueued_at: Instant,
    pub processed_at: Option<Instant>,
    /// Terminal error, for Failed entries
    pub error: Option<String>,
}

/// Per-status counts, exposed through progress snapshots.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

/// FIFO frontier over canonical URLs. BFS ordering emerges because depth
/// only grows when the engine enqueues a page's discoveries.
#[derive(Debug)]
pub struct Frontier {
    entries: Vec<FrontierEntry>,
    by_canonical: HashMap<String, usize>,
    pending: VecDeque<usize>,
    seed: Url,
    config: CrawlConfig,
}

impl Frontier {
    pub fn new(seed: Url, config: CrawlConfig) -> Self {
        Self {
            entries: Vec::new(),
            by_canonical: HashMap::new(),
            pending: VecDeque::new(),
            seed,
            config,
        }
    }

    /// Admit a page URL. Applies dedup, depth/page ceilings, scope, the
    /// include/exclude glob filters, and the file-type switches, in that
    /// order. Returns whether the URL was enqueued.
    pub fn add_page(&mut self, url: &str, parent: Option<&str>, depth: u32) -> bool {
        let canonical = match canonicalize(url, None) {
            Some(c) => c,
            None => return false,
        };
        if self.by_canonical.contains_key(&canonical) {
            return false;
        }
        if !self.config.unlimited {
            if depth > self.config.max_depth || self.entries.len() >= self.config.max_pages {
                return false;
            }
        }

        let parsed = match Url::parse(&canonical) {
            Ok(u) => u,
            Err(_) => return false,
        };
        if !in_scope(&parsed, &self.seed, self.config.scope, &self.config.custom_domains) {
            return false;
        }

        if !self.config.include_paths.is_empty()
            && !self
                .config
                .include_paths
                .iter()
                .any(|p| matches_pattern(&canonical, p))
        {
            return false;
        }
        if self
            .config
            .exclude_paths
            .iter()
            .any(|p| matches_pattern(&canonical, p))
        {
            return false;
        }

        if !self.config.file_types.allows(category_of(&canonical, EntryKind::Page)) {
            return false;
        }

        self.push(url, canonical, EntryKind::Page, parent, depth);
        true
    }

    /// Admit an asset URL. No scope check: assets are fetched from any host
    /// so pages render faithfully against CDN-hosted resources.
    pub fn add_asset(&mut self, url: &str, parent: Option<&str>, depth: u32) -> bool {
        let canonical = match canonicalize(url, None) {
            Some(c) => c,
            None => return false,
        };
        if self.by_canonical.contains_key(&canonical) {
            return false;
        }
        if !self.config.unlimited {
            if depth > self.config.max_depth + ASSET_DEPTH_CUSHION
                || self.entries.len() >= self.config.max_pages
            {
                return false;
            }
        }

        if !self.config.file_types.allows(category_of(&canonical, EntryKind::Asset)) {
            return false;
        }

        self.push(url, canonical, EntryKind::Asset, parent, depth);
        true
    }

    fn push(
        &mut self,
        url: &str,
        canonical: String,
        kind: EntryKind,
        parent: Option<&str>,
        depth: u32,
    ) {
        let id = self.entries.len();
        self.entries.push(FrontierEntry {
            id,
            url: url.to_string(),
            canonical: canonical.clone(),
            kind,
            depth,
            parent: parent.map(|p| p.to_string()),
            status: EntryStatus::Pending,
            retries: 0,
            enqueued_at: Instant::now(),
            processed_at: None,
            error: None,
        });
        self.by_canonical.insert(canonical, id);
        self.pending.push_back(id);
    }

    /// Pop the oldest pending entry, marking it in progress. Stale queue
    /// slots (entries whose status changed while queued) are skipped.
    pub fn next(&mut self) -> Option<FrontierEntry> {
        while let Some(id) = self.pending.pop_front() {
            let entry = &mut self.entries[id];
            if entry.status != EntryStatus::Pending {
                continue;
            }
            entry.status = EntryStatus::InProgress;
            return Some(entry.clone());
        }
        None
    }

    pub fn complete(&mut self, id: usize) {
        self.transition(id, EntryStatus::Complete, None);
    }

    pub fn fail(&mut self, id: usize, reason: impl Into<String>) {
        self.transition(id, EntryStatus::Failed, Some(reason.into()));
    }

    pub fn skip(&mut self, id: usize, reason: impl Into<String>) {
        self.transition(id, EntryStatus::Skipped, Some(reason.into()));
    }

    /// Re-enqueue a failed or in-progress entry if its retry budget allows.
    pub fn retry(&mut self, id: usize, max_retries: u32) -> bool {
        let entry = match self.entries.get_mut(id) {
            Some(e) => e,
            None => return false,
        };
        if entry.retries >= max_retries {
            return false;
        }
        entry.retries += 1;
        entry.status = EntryStatus::Pending;
        entry.error = None;
        self.pending.push_back(id);
        true
    }

    fn transition(&mut self, id: usize, status: EntryStatus, error: Option<String>) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.status = status;
            entry.processed_at = Some(Instant::now());
            entry.error = error;
        }
    }

    /// True while there is queued or in-flight work.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
            || self
                .entries
                .iter()
                .any(|e| e.status == EntryStatus::InProgress)
    }

    pub fn get(&self, id: usize) -> Option<&FrontierEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.by_canonical.contains_key(canonical)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.entries.len(),
            ..QueueStats::default()
        };
        for entry in &self.entries {
            match entry.status {
                EntryStatus::Pending => stats.pending += 1,
                EntryStatus::InProgress => stats.in_progress += 1,
                EntryStatus::Complete => stats.complete += 1,
                EntryStatus::Failed => stats.failed += 1,
                EntryStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }
}

/// Category used for the file-type switch. Extensionless page URLs are
/// HTML-by-convention; extensionless assets fall into Other.
fn category_of(canonical: &str, kind: EntryKind) -> FileCategory {
    let ext = extension(canonical);
    if ext.is_empty() {
        return match kind {
            EntryKind::Page => FileCategory::Html,
            EntryKind::Asset => FileCategory::Other,
        };
    }
    mime_category(&ext)
}
