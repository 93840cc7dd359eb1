//! Crawl engine: orchestrates fetch -> store -> extract -> enqueue, then
//! the rewrite pass
//!
//! A single engine task owns the frontier, registry, and storage; fetches
//! run concurrently in a `JoinSet` bounded by the configured concurrency,
//! and each completion is folded back in serially. When the frontier
//! drains, every stored HTML and CSS file gets its references rewritten to
//! relative local paths.

pub mod events;
pub mod types;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::CrawlConfig;
use crate::crawl::extract::{css, html, LinkKind};
use crate::crawl::fetcher::{FetchError, FetchResult, Fetcher, FetcherConfig};
use crate::crawl::frontier::{EntryKind, Frontier, FrontierEntry};
use crate::crawl::registry::PathRegistry;
use crate::crawl::rewrite::rewrite_html;
use crate::crawl::robots::{self, RobotsRules};
use crate::crawl::storage::Storage;

use events::{emit, CrawlEvent, UrlSource, EVENT_CHANNEL_CAPACITY};
use types::{CrawlErrorRecord, CrawlResult, EngineError, EngineState, ProgressSnapshot};

/// Frontier-level re-enqueue budget for transient fetch failures (the
/// fetcher already retried transport errors internally).
const MAX_URL_RETRIES: u32 = 2;

/// One crawl job: seed, frozen config, and everything needed to drive it.
#[derive(Debug)]
pub struct CrawlEngine {
    job_id: Uuid,
    seed: Url,
    config: CrawlConfig,
    state: RwLock<EngineState>,
    frontier: Mutex<Frontier>,
    registry: Mutex<PathRegistry>,
    storage: Storage,
    fetcher: Arc<Fetcher>,
    robots: RwLock<Option<RobotsRules>>,
    events: broadcast::Sender<CrawlEvent>,
    errors: Mutex<Vec<CrawlErrorRecord>>,
    pages_processed: AtomicU64,
    assets_processed: AtomicU64,
    bytes_downloaded: AtomicU64,
    current_url: Mutex<Option<String>>,
    started_at: Mutex<Option<(chrono::DateTime<chrono::Utc>, Instant)>>,
    cancelled: AtomicBool,
}

impl CrawlEngine {
    /// Build an engine for one job. The configuration is validated and
    /// frozen here; an invalid config refuses to construct.
    pub fn new(
        job_id: Uuid,
        seed_url: &str,
        config: CrawlConfig,
        output_root: &Path,
    ) -> Result<Self, EngineError> {
        let seed =
            Url::parse(seed_url).map_err(|_| EngineError::InvalidSeed(seed_url.to_string()))?;
        if seed.host_str().is_none() {
            return Err(EngineError::InvalidSeed(seed_url.to_string()));
        }

        let probe = crate::config::Config {
            output_dir: output_root.to_path_buf(),
            crawl: config.clone(),
        };
        probe
            .validate()
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;

        let storage = Storage::new(output_root.join(job_id.to_string()), config.max_total_size);
        let fetcher = Fetcher::new(FetcherConfig::from_crawl(&config, seed.clone()))
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        let frontier = Frontier::new(seed.clone(), config.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            job_id,
            seed,
            config,
            state: RwLock::new(EngineState::Pending),
            frontier: Mutex::new(frontier),
            registry: Mutex::new(PathRegistry::new()),
            storage,
            fetcher: Arc::new(fetcher),
            robots: RwLock::new(None),
            events,
            errors: Mutex::new(Vec::new()),
            pages_processed: AtomicU64::new(0),
            assets_processed: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            current_url: Mutex::new(None),
            started_at: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }

    /// Post-run handle for the archive packager.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn errors(&self) -> Vec<CrawlErrorRecord> {
        self.errors.lock().clone()
    }

    /// Run the crawl to a terminal state. Per-URL failures are recorded and
    /// the crawl continues; only engine-fatal conditions (storage failure,
    /// traversal attempt) surface as `Err`.
    pub async fn start(&self) -> Result<CrawlResult, EngineError> {
        {
            let mut state = self.state.write();
            if *state != EngineState::Pending {
                return Err(EngineError::AlreadyStarted);
            }
            *state = EngineState::Running;
        }
        let started = Instant::now();
        *self.started_at.lock() = Some((chrono::Utc::now(), started));

        self.storage.init().await?;

        if self.config.respect_robots_txt {
            let ua = self
                .config
                .user_agent
                .clone()
                .unwrap_or_else(|| "webmirror".to_string());
            let client = reqwest::Client::new();
            let rules = robots::fetch_rules(&client, &self.seed, &ua).await;
            *self.robots.write() = Some(rules);
        }

        emit(
            &self.events,
            CrawlEvent::JobStarted {
                job_id: self.job_id,
                seed_url: self.seed.to_string(),
                max_depth: self.config.max_depth,
                max_pages: self.config.max_pages,
            },
        );

        if self.frontier.lock().add_page(self.seed.as_str(), None, 0) {
            emit(
                &self.events,
                CrawlEvent::UrlQueued {
                    job_id: self.job_id,
                    url: self.seed.to_string(),
                    depth: 0,
                    source: UrlSource::Seed,
                },
            );
        }

        if let Err(fatal) = self.run_loop().await {
            self.fetcher.abort();
            *self.state.write() = EngineState::Failed;
            self.emit_completed("failed", started);
            return Err(fatal);
        }

        if !self.is_cancelled() {
            if let Err(fatal) = self.rewrite_pass().await {
                *self.state.write() = EngineState::Failed;
                self.emit_completed("failed", started);
                return Err(fatal);
            }
        }

        let cancelled = self.is_cancelled();
        let errors = self.errors.lock().clone();
        let result = CrawlResult {
            success: !cancelled && errors.is_empty(),
            cancelled,
            pages: self.pages_processed.load(Ordering::Relaxed),
            assets: self.assets_processed.load(Ordering::Relaxed),
            bytes: self.bytes_downloaded.load(Ordering::Relaxed),
            errors,
            duration: started.elapsed(),
        };

        *self.state.write() = if cancelled {
            EngineState::Cancelled
        } else {
            EngineState::Complete
        };
        self.emit_completed(&self.state().to_string(), started);

        info!(
            job_id = %self.job_id,
            pages = result.pages,
            assets = result.assets,
            bytes = result.bytes,
            errors = result.errors.len(),
            cancelled,
            "crawl finished in {:?}",
            result.duration
        );
        Ok(result)
    }

    /// Pause pool admission. In-flight fetches finish naturally.
    pub fn pause(&self) {
        let mut state = self.state.write();
        if *state == EngineState::Running {
            *state = EngineState::Paused;
            self.fetcher.pause();
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.write();
        if *state == EngineState::Paused {
            *state = EngineState::Running;
            self.fetcher.resume();
        }
    }

    /// Abort the run: cancels the pool, interrupts in-flight requests at
    /// their next I/O boundary, and skips the rewrite pass.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.fetcher.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Snapshot assembled on demand from counters, queue, and storage.
    pub fn progress(&self) -> ProgressSnapshot {
        let queue = self.frontier.lock().stats();
        let storage = self.storage.stats();
        let started = *self.started_at.lock();
        ProgressSnapshot {
            status: self.state(),
            pages_processed: self.pages_processed.load(Ordering::Relaxed),
            total_pages: queue.total,
            assets_processed: self.assets_processed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            current_url: self.current_url.lock().clone(),
            errors: self.errors.lock().len(),
            started_at: started.map(|(wall, _)| wall),
            elapsed_ms: started
                .map(|(_, mono)| mono.elapsed().as_millis() as u64)
                .unwrap_or(0),
            queue,
            storage,
        }
    }

    async fn run_loop(&self) -> Result<(), EngineError> {
        let mut tasks: JoinSet<(FrontierEntry, Result<FetchResult, FetchError>, Instant)> =
            JoinSet::new();

        loop {
            if self.is_cancelled() {
                tasks.abort_all();
                break;
            }

            let paused = self.state() == EngineState::Paused;
            if !paused {
                self.dispatch(&mut tasks);
            }

            if tasks.is_empty() {
                if paused {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
                if !self.frontier.lock().has_pending() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }

            if let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((entry, result, task_started)) => {
                        self.handle_completion(entry, result, task_started).await?;
                        emit(
                            &self.events,
                            CrawlEvent::Progress {
                                job_id: self.job_id,
                                snapshot: self.progress(),
                            },
                        );
                    }
                    Err(join_err) if join_err.is_cancelled() => {}
                    Err(join_err) => warn!(job_id = %self.job_id, "fetch task panicked: {}", join_err),
                }
            }
        }
        Ok(())
    }

    /// Fill the pool up to `concurrency` in-flight fetches.
    fn dispatch(
        &self,
        tasks: &mut JoinSet<(FrontierEntry, Result<FetchResult, FetchError>, Instant)>,
    ) {
        while tasks.len() < self.config.concurrency {
            let entry = match self.frontier.lock().next() {
                Some(e) => e,
                None => break,
            };

            if entry.kind == EntryKind::Page && self.robots_forbids(&entry) {
                self.frontier
                    .lock()
                    .skip(entry.id, "disallowed by robots.txt");
                emit(
                    &self.events,
                    CrawlEvent::UrlSkipped {
                        job_id: self.job_id,
                        url: entry.url.clone(),
                        reason: "disallowed by robots.txt".to_string(),
                    },
                );
                continue;
            }

            *self.current_url.lock() = Some(entry.url.clone());
            emit(
                &self.events,
                CrawlEvent::UrlFetching {
                    job_id: self.job_id,
                    url: entry.url.clone(),
                },
            );

            let fetcher = Arc::clone(&self.fetcher);
            let url = entry.url.clone();
            let referer = entry.parent.clone();
            tasks.spawn(async move {
                let task_started = Instant::now();
                let result = fetcher.fetch(&url, referer.as_deref()).await;
                (entry, result, task_started)
            });
        }
    }

    /// robots directives apply to page fetches on the seed host only.
    fn robots_forbids(&self, entry: &FrontierEntry) -> bool {
        let robots = self.robots.read();
        let Some(rules) = robots.as_ref() else {
            return false;
        };
        let Ok(url) = Url::parse(&entry.canonical) else {
            return false;
        };
        if url.host_str() != self.seed.host_str() {
            return false;
        }
        !rules.is_allowed(url.path())
    }

    async fn handle_completion(
        &self,
        entry: FrontierEntry,
        result: Result<FetchResult, FetchError>,
        task_started: Instant,
    ) -> Result<(), EngineError> {
        let duration_ms = task_started.elapsed().as_millis() as u64;

        let fetch = match result {
            Ok(fetch) => fetch,
            Err(FetchError::Aborted) => {
                self.frontier.lock().skip(entry.id, "aborted");
                emit(
                    &self.events,
                    CrawlEvent::UrlSkipped {
                        job_id: self.job_id,
                        url: entry.url.clone(),
                        reason: "aborted".to_string(),
                    },
                );
                return Ok(());
            }
            Err(err) => {
                if err.retryable() && self.frontier.lock().retry(entry.id, MAX_URL_RETRIES) {
                    debug!(url = %entry.url, "re-enqueued after transient failure: {}", err);
                    return Ok(());
                }
                self.record_failure(&entry, err.code(), &err.to_string(), duration_ms);
                return Ok(());
            }
        };

        // Register the final URL; after a redirect, alias the original so
        // pre-redirect links rewrite to the same file. Intermediate hops
        // stay unregistered.
        let local = match self.registry.lock().register(fetch.final_url.as_str()) {
            Ok(path) => path,
            Err(err) => {
                self.record_failure(&entry, "UNKNOWN", &err.to_string(), duration_ms);
                return Ok(());
            }
        };
        if !fetch.redirect_chain.is_empty() {
            let _ = self.registry.lock().register_alias(&fetch.url, &local);
        }

        // Storage refusals (traversal, size ceiling, I/O) are engine-fatal
        self.storage.write(&local, &fetch.body).await?;
        self.bytes_downloaded
            .fetch_add(fetch.body.len() as u64, Ordering::Relaxed);

        let mut links_discovered = 0;
        if fetch.is_html() {
            let body = String::from_utf8_lossy(&fetch.body);
            let links = html::extract_links(&body, &fetch.final_url);
            links_discovered = links.len();

            let mut queued: Vec<(String, u32)> = Vec::new();
            {
                let mut frontier = self.frontier.lock();
                for link in &links {
                    let (admitted, depth) = match link.kind {
                        LinkKind::Page => (
                            frontier.add_page(
                                &link.url,
                                Some(fetch.final_url.as_str()),
                                entry.depth + 1,
                            ),
                            entry.depth + 1,
                        ),
                        LinkKind::Asset => (
                            frontier.add_asset(
                                &link.url,
                                Some(fetch.final_url.as_str()),
                                entry.depth,
                            ),
                            entry.depth,
                        ),
                    };
                    if admitted {
                        queued.push((link.url.clone(), depth));
                    }
                }
            }
            for (url, depth) in queued {
                emit(
                    &self.events,
                    CrawlEvent::UrlQueued {
                        job_id: self.job_id,
                        url,
                        depth,
                        source: UrlSource::Discovered,
                    },
                );
            }
            self.pages_processed.fetch_add(1, Ordering::Relaxed);
        } else if fetch.is_css() {
            let body = String::from_utf8_lossy(&fetch.body);
            let links = css::extract_urls(&body, &fetch.final_url);
            links_discovered = links.len();

            let mut queued: Vec<(String, u32)> = Vec::new();
            {
                let mut frontier = self.frontier.lock();
                for link in &links {
                    if frontier.add_asset(&link.url, Some(fetch.final_url.as_str()), entry.depth + 1)
                    {
                        queued.push((link.url.clone(), entry.depth + 1));
                    }
                }
            }
            for (url, depth) in queued {
                emit(
                    &self.events,
                    CrawlEvent::UrlQueued {
                        job_id: self.job_id,
                        url,
                        depth,
                        source: UrlSource::Discovered,
                    },
                );
            }
            self.assets_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.assets_processed.fetch_add(1, Ordering::Relaxed);
        }

        self.frontier.lock().complete(entry.id);
        emit(
            &self.events,
            CrawlEvent::UrlArchived {
                job_id: self.job_id,
                url: entry.url,
                local_path: local,
                content_type: fetch.content_type,
                bytes: fetch.body.len() as u64,
                links_discovered,
                duration_ms,
            },
        );
        Ok(())
    }

    fn record_failure(&self, entry: &FrontierEntry, code: &str, message: &str, duration_ms: u64) {
        warn!(job_id = %self.job_id, url = %entry.url, code, "fetch failed: {}", message);
        self.errors.lock().push(CrawlErrorRecord {
            url: entry.url.clone(),
            code: code.to_string(),
            message: message.to_string(),
            at: chrono::Utc::now(),
        });
        self.frontier.lock().fail(entry.id, message);
        emit(
            &self.events,
            CrawlEvent::UrlFailed {
                job_id: self.job_id,
                url: entry.url.clone(),
                code: code.to_string(),
                error: message.to_string(),
                duration_ms,
            },
        );
    }

    /// Rewrite every stored HTML and CSS file against the registry. Files
    /// whose lookups all miss are written back unchanged (i.e. skipped);
    /// parse failures degrade per file, never fatally.
    async fn rewrite_pass(&self) -> Result<(), EngineError> {
        let files = self.storage.list_files();
        emit(
            &self.events,
            CrawlEvent::RewriteStarted {
                job_id: self.job_id,
                files: files.len(),
            },
        );

        for rel in files {
            let ext = rel
                .rsplit('.')
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            let is_html = matches!(ext.as_str(), "html" | "htm");
            let is_css = ext == "css";
            if !is_html && !is_css {
                continue;
            }

            let bytes = self.storage.read(&rel).await?;
            let content = String::from_utf8_lossy(&bytes).into_owned();

            let page_url = self
                .registry
                .lock()
                .url_for_path(&rel)
                .and_then(|u| Url::parse(u).ok());
            let Some(page_url) = page_url else {
                continue;
            };

            let rewritten = {
                let registry = self.registry.lock();
                if is_html {
                    let lookup = |absolute: &str| registry.lookup(absolute).map(str::to_string);
                    match rewrite_html(&content, &page_url, &rel, &lookup) {
                        Ok(out) => out,
                        Err(err) => {
                            warn!(file = %rel, "HTML rewrite failed, keeping original: {}", err);
                            continue;
                        }
                    }
                } else {
                    css::rewrite_urls(&content, &page_url, &|absolute: &str| {
                        registry
                            .lookup(absolute)
                            .map(|local| PathRegistry::relative(&rel, local))
                    })
                }
            };

            if rewritten != content {
                self.storage.write(&rel, rewritten.as_bytes()).await?;
            }
        }
        Ok(())
    }

    fn emit_completed(&self, status: &str, started: Instant) {
        emit(
            &self.events,
            CrawlEvent::JobCompleted {
                job_id: self.job_id,
                status: status.to_string(),
                pages: self.pages_processed.load(Ordering::Relaxed),
                assets: self.assets_processed.load(Ordering::Relaxed),
                bytes: self.bytes_downloaded.load(Ordering::Relaxed),
                errors: self.errors.lock().len(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine_in(dir: &TempDir) -> CrawlEngine {
        let mut config = CrawlConfig::default();
        config.respect_robots_txt = false;
        config.delay_ms = 0;
        CrawlEngine::new(Uuid::new_v4(), "https://example.test/", config, dir.path()).unwrap()
    }

    #[test]
    fn test_invalid_seed_refused() {
        let dir = TempDir::new().unwrap();
        let err = CrawlEngine::new(
            Uuid::new_v4(),
            "not a url",
            CrawlConfig::default(),
            dir.path(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSeed(_)));
    }

    #[test]
    fn test_invalid_config_refused() {
        let dir = TempDir::new().unwrap();
        let mut config = CrawlConfig::default();
        config.concurrency = 0;
        let err = CrawlEngine::new(Uuid::new_v4(), "https://example.test/", config, dir.path())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_initial_state_and_progress() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        assert_eq!(engine.state(), EngineState::Pending);
        let snapshot = engine.progress();
        assert_eq!(snapshot.pages_processed, 0);
        assert_eq!(snapshot.queue.total, 0);
        assert!(snapshot.started_at.is_none());
    }

    #[test]
    fn test_pause_only_from_running() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        // Pending engines cannot pause
        engine.pause();
        assert_eq!(engine.state(), EngineState::Pending);
    }

    #[tokio::test]
    async fn test_cancelled_run_terminates_without_network() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.cancel();
        let result = engine.start().await.unwrap();
        assert!(result.cancelled);
        assert!(!result.success);
        assert_eq!(engine.state(), EngineState::Cancelled);
        assert_eq!(result.pages, 0);
    }

    #[tokio::test]
    async fn test_start_twice_refused() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        engine.cancel();
        let _ = engine.start().await.unwrap();
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyStarted));
    }

    #[test]
    fn test_robots_applies_to_seed_host_pages_only() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir);
        *engine.robots.write() = Some(RobotsRules::parse(
            "User-agent: *\nDisallow: /private/",
            "webmirror",
        ));

        let make_entry = |url: &str| FrontierEntry {
            id: 0,
            url: url.to_string(),
            canonical: url.to_string(),
            kind: EntryKind::Page,
            depth: 0,
            parent: None,
            status: crate::crawl::frontier::EntryStatus::InProgress,
            retries: 0,
            enqueued_at: Instant::now(),
            processed_at: None,
            error: None,
        };

        assert!(engine.robots_forbids(&make_entry("https://example.test/private/page")));
        assert!(!engine.robots_forbids(&make_entry("https://example.test/public")));
        // Other hosts are not robots-gated
        assert!(!engine.robots_forbids(&make_entry("https://cdn.test/private/asset")));
    }
}
