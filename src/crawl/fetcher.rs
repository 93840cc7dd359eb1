//! Bounded-concurrency HTTP client with anti-detection policies
//!
//! Redirects are driven manually so the SSRF guard re-validates every hop
//! and the Referer follows the chain. Rate-limit (429), forbidden (403),
//! and unavailable (503) responses are retried with per-status policies;
//! transport errors back off exponentially with User-Agent rotation. The
//! cookie jar honours Domain/Path attributes via reqwest's provider.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::StreamExt;
use rand::Rng;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::{CrawlConfig, FileCategory};
use crate::crawl::ssrf::{SsrfBlock, SsrfGuard};
use crate::crawl::url_utils::{content_type_token, extension, mime_category};

/// Retry budget shared by the challenge and transport policies.
const MAX_ATTEMPTS: u32 = 5;

/// Default throttle when a 429 carries no Retry-After header.
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(30);

/// Default wait for a 503 without Retry-After.
const DEFAULT_UNAVAILABLE_BACKOFF: Duration = Duration::from_secs(5);

/// How much of an HTML body the bot-interstitial probe inspects.
const BOT_PROBE_WINDOW: usize = 16 * 1024;

/// Rotation pool of realistic browser User-Agent strings.
const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.0.0",
];

/// Body phrases that mark a bot-check interstitial served with status 200.
const BOT_CHALLENGE_PHRASES: &[&str] = &[
    "cf-browser-verification",
    "checking your browser",
    "ddos-guard",
    "please wait while we verify",
    "just a moment",
    "access denied",
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch aborted")]
    Aborted,
    #[error("blocked by SSRF guard: {0}")]
    Ssrf(#[from] SsrfBlock),
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("forbidden or bot-challenged after {attempts} attempts")]
    Forbidden { attempts: u32 },
    #[error("service unavailable after {attempts} attempts")]
    ServiceUnavailable { attempts: u32 },
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("response too large: {size} bytes exceeds ceiling of {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("redirect chain exceeded {0} hops")]
    TooManyRedirects(u32),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
}

impl FetchError {
    /// Stable error code carried in failure records and log context.
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::RateLimited { .. } => "RATE_LIMITED",
            FetchError::Timeout(_) => "TIMEOUT",
            FetchError::Network(_) => "NETWORK",
            FetchError::Ssrf(_) => "SSRF",
            FetchError::TooLarge { .. } => "TOO_LARGE",
            _ => "UNKNOWN",
        }
    }

    /// Whether the frontier may re-enqueue the URL. Only transport-level
    /// failures are worth another pass; everything else already exhausted
    /// its in-fetcher budget or is permanent.
    pub fn retryable(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Network(_))
    }
}

/// A completed fetch: final URL, response metadata, and the full body.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL as requested
    pub url: String,
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: String,
    pub body: Vec<u8>,
    /// URLs of every followed redirect hop, oldest first
    pub redirect_chain: Vec<String>,
}

impl FetchResult {
    pub fn is_html(&self) -> bool {
        content_type_token(&self.content_type) == "text/html"
    }

    pub fn is_css(&self) -> bool {
        content_type_token(&self.content_type) == "text/css"
    }
}

/// Fetcher settings, derived from the crawl configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub concurrency: usize,
    pub delay: Duration,
    pub timeout: Duration,
    pub max_file_size: u64,
    pub follow_redirects: bool,
    pub max_redirects: u32,
    pub user_agent: Option<String>,
    pub allowed_protocols: Vec<String>,
    pub cookies: Option<String>,
    pub seed_url: Url,
}

impl FetcherConfig {
    pub fn from_crawl(config: &CrawlConfig, seed_url: Url) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            delay: Duration::from_millis(config.delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            max_file_size: config.max_file_size,
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            user_agent: config.user_agent.clone(),
            allowed_protocols: config.allowed_protocols.clone(),
            cookies: config.cookies.clone(),
            seed_url,
        }
    }
}

/// Bounded-concurrency fetch pool.
#[derive(Debug)]
pub struct Fetcher {
    client: reqwest::Client,
    config: FetcherConfig,
    guard: SsrfGuard,
    semaphore: Arc<Semaphore>,
    /// host -> earliest instant the next request to it may start
    host_gate: DashMap<String, Instant>,
    ua_index: AtomicUsize,
    aborted: AtomicBool,
    pause_tx: watch::Sender<bool>,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let jar = Arc::new(Jar::default());
        if let Some(cookies) = &config.cookies {
            for cookie in cookies.split(';') {
                let cookie = cookie.trim();
                if !cookie.is_empty() {
                    jar.add_cookie_str(cookie, &config.seed_url);
                }
            }
        }

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(jar)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let (pause_tx, _) = watch::channel(false);
        let guard = SsrfGuard::new(config.allowed_protocols.clone());

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            host_gate: DashMap::new(),
            ua_index: AtomicUsize::new(rand::thread_rng().gen_range(0..USER_AGENT_POOL.len())),
            aborted: AtomicBool::new(false),
            pause_tx,
            guard,
            config,
        })
    }

    /// Stop admitting new work. In-flight requests finish naturally.
    pub fn pause(&self) {
        let _ = self.pause_tx.send(true);
    }

    pub fn resume(&self) {
        let _ = self.pause_tx.send(false);
    }

    /// Abort everything: pending admissions fail immediately and in-flight
    /// requests stop at their next I/O boundary.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.semaphore.close();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Resolves when no fetch holds a pool slot.
    pub async fn drain(&self) {
        let _ = self
            .semaphore
            .acquire_many(self.config.concurrency as u32)
            .await;
    }

    fn current_user_agent(&self) -> String {
        match &self.config.user_agent {
            Some(ua) => ua.clone(),
            None => {
                let idx = self.ua_index.load(Ordering::Relaxed) % USER_AGENT_POOL.len();
                USER_AGENT_POOL[idx].to_string()
            }
        }
    }

    fn rotate_user_agent(&self) {
        if self.config.user_agent.is_none() {
            self.ua_index.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn wait_if_paused(&self) -> Result<(), FetchError> {
        let mut rx = self.pause_tx.subscribe();
        loop {
            if self.is_aborted() {
                return Err(FetchError::Aborted);
            }
            if !*rx.borrow() {
                return Ok(());
            }
            // Re-check the abort flag periodically while paused
            let _ = tokio::time::timeout(Duration::from_millis(100), rx.changed()).await;
        }
    }

    /// Fetch one URL through the pool. Applies the per-host throttle, the
    /// jittered inter-request delay, the SSRF guard, manual redirect
    /// handling, and the full retry taxonomy.
    pub async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<FetchResult, FetchError> {
        if self.is_aborted() {
            return Err(FetchError::Aborted);
        }
        self.wait_if_paused().await?;

        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        // Per-host throttle set by earlier 429 responses
        if let Some(host) = parsed.host_str() {
            let gate = self.host_gate.get(host).map(|entry| *entry.value());
            if let Some(ready_at) = gate {
                let now = Instant::now();
                if ready_at > now {
                    trace!(url, "host throttled, sleeping {:?}", ready_at - now);
                    tokio::time::sleep(ready_at - now).await;
                }
            }
        }

        tokio::time::sleep(jittered(self.config.delay)).await;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Aborted)?;

        self.guard.validate(&parsed).await?;

        self.fetch_with_retries(url, parsed, referer).await
    }

    async fn fetch_with_retries(
        &self,
        original_url: &str,
        start: Url,
        referer: Option<&str>,
    ) -> Result<FetchResult, FetchError> {
        let mut attempts: u32 = 0;
        let mut redirects: u32 = 0;
        let mut current = start;
        let mut redirect_chain: Vec<String> = Vec::new();
        let mut referer_value = referer
            .map(str::to_string)
            .unwrap_or_else(|| self.config.seed_url.to_string());

        'attempt: loop {
            if self.is_aborted() {
                return Err(FetchError::Aborted);
            }

            let request = self
                .client
                .get(current.clone())
                .headers(self.build_headers(&current, &referer_value))
                .timeout(self.config.timeout);

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    attempts += 1;
                    if attempts >= MAX_ATTEMPTS {
                        return Err(if e.is_timeout() {
                            FetchError::Timeout(e.to_string())
                        } else {
                            FetchError::Network(e.to_string())
                        });
                    }
                    self.transport_backoff(attempts, &current).await;
                    continue 'attempt;
                }
            };

            let status = response.status();
            match status.as_u16() {
                429 => {
                    attempts += 1;
                    let wait =
                        retry_after(response.headers()).unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
                    if let Some(host) = current.host_str() {
                        self.host_gate
                            .insert(host.to_string(), Instant::now() + wait);
                    }
                    if attempts >= MAX_ATTEMPTS {
                        return Err(FetchError::RateLimited { attempts });
                    }
                    debug!(url = %current, ?wait, "rate limited, backing off");
                    tokio::time::sleep(wait).await;
                    self.rotate_user_agent();
                    continue 'attempt;
                }
                403 => {
                    attempts += 1;
                    if attempts >= MAX_ATTEMPTS {
                        return Err(FetchError::Forbidden { attempts });
                    }
                    self.rotate_user_agent();
                    tokio::time::sleep(jittered(Duration::from_millis(750))).await;
                    continue 'attempt;
                }
                503 => {
                    attempts += 1;
                    if attempts >= MAX_ATTEMPTS {
                        return Err(FetchError::ServiceUnavailable { attempts });
                    }
                    let wait =
                        retry_after(response.headers()).unwrap_or(DEFAULT_UNAVAILABLE_BACKOFF);
                    tokio::time::sleep(wait).await;
                    continue 'attempt;
                }
                301 | 302 | 303 | 307 | 308 if self.config.follow_redirects => {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .ok_or_else(|| {
                            FetchError::Network("redirect without Location header".to_string())
                        })?;
                    let next = current.join(location).map_err(|e| {
                        FetchError::InvalidUrl(format!("redirect target '{}': {}", location, e))
                    })?;

                    // Every hop re-runs the guard: a safe host may redirect
                    // into a private range
                    self.guard.validate(&next).await?;

                    redirects += 1;
                    if redirects > self.config.max_redirects {
                        return Err(FetchError::TooManyRedirects(self.config.max_redirects));
                    }
                    redirect_chain.push(current.to_string());
                    referer_value = next.to_string();
                    current = next;
                    continue 'attempt;
                }
                _ => {
                    let final_url = response.url().clone();
                    let headers: Vec<(String, String)> = response
                        .headers()
                        .iter()
                        .map(|(k, v)| {
                            (k.to_string(), v.to_str().unwrap_or_default().to_string())
                        })
                        .collect();
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("application/octet-stream")
                        .to_string();

                    // Declared size first: skip the body entirely
                    if let Some(declared) = response.content_length() {
                        if declared > self.config.max_file_size {
                            return Err(FetchError::TooLarge {
                                size: declared,
                                limit: self.config.max_file_size,
                            });
                        }
                    }

                    // Stream the body with a running size check
                    let mut body: Vec<u8> = Vec::new();
                    let mut stream = response.bytes_stream();
                    while let Some(chunk) = stream.next().await {
                        if self.is_aborted() {
                            return Err(FetchError::Aborted);
                        }
                        let chunk = match chunk {
                            Ok(c) => c,
                            Err(e) => {
                                attempts += 1;
                                if attempts >= MAX_ATTEMPTS {
                                    return Err(if e.is_timeout() {
                                        FetchError::Timeout(e.to_string())
                                    } else {
                                        FetchError::Network(e.to_string())
                                    });
                                }
                                self.transport_backoff(attempts, &current).await;
                                continue 'attempt;
                            }
                        };
                        body.extend_from_slice(&chunk);
                        if body.len() as u64 > self.config.max_file_size {
                            return Err(FetchError::TooLarge {
                                size: body.len() as u64,
                                limit: self.config.max_file_size,
                            });
                        }
                    }

                    // Interstitials come back as 200 HTML; best-effort probe
                    if status == StatusCode::OK
                        && content_type_token(&content_type) == "text/html"
                        && looks_like_bot_challenge(&body)
                    {
                        attempts += 1;
                        if attempts >= MAX_ATTEMPTS {
                            return Err(FetchError::Forbidden { attempts });
                        }
                        warn!(url = %current, "bot interstitial detected, rotating user agent");
                        self.rotate_user_agent();
                        tokio::time::sleep(jittered(Duration::from_millis(750))).await;
                        continue 'attempt;
                    }

                    if !status.is_success() {
                        return Err(FetchError::HttpStatus(status.as_u16()));
                    }

                    return Ok(FetchResult {
                        url: original_url.to_string(),
                        final_url,
                        status: status.as_u16(),
                        headers,
                        content_type,
                        body,
                        redirect_chain,
                    });
                }
            }
        }
    }

    async fn transport_backoff(&self, attempt: u32, url: &Url) {
        let base = Duration::from_millis(1000u64.saturating_mul(1 << attempt.min(6)));
        let wait = jittered(base);
        debug!(url = %url, attempt, ?wait, "transport error, backing off");
        if attempt >= 2 {
            self.rotate_user_agent();
        }
        tokio::time::sleep(wait).await;
    }

    /// Browser-grade request headers, with Accept chosen by the URL's
    /// apparent resource type. The Cookie header is added by the jar.
    fn build_headers(&self, url: &Url, referer: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let category = mime_category(&extension(url.as_str()));

        let accept = match category {
            FileCategory::Html | FileCategory::Other => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
            }
            FileCategory::Css => "text/css,*/*;q=0.1",
            FileCategory::Images => "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
            FileCategory::Js | FileCategory::Fonts | FileCategory::Media
            | FileCategory::Documents => "*/*",
        };
        let sec_fetch_dest = match category {
            FileCategory::Html | FileCategory::Other => "document",
            FileCategory::Css => "style",
            FileCategory::Js => "script",
            FileCategory::Images => "image",
            FileCategory::Fonts => "font",
            FileCategory::Media => "video",
            FileCategory::Documents => "empty",
        };
        let is_document = matches!(category, FileCategory::Html | FileCategory::Other);

        let mut set = |name: &'static str, value: &str| {
            if let Ok(v) = HeaderValue::from_str(value) {
                headers.insert(name, v);
            }
        };

        set("user-agent", &self.current_user_agent());
        set("accept", accept);
        set("accept-language", "en-US,en;q=0.9");
        set("accept-encoding", "gzip, deflate, br");
        set("connection", "keep-alive");
        if is_document {
            set("upgrade-insecure-requests", "1");
            set("sec-fetch-mode", "navigate");
            set("sec-fetch-user", "?1");
        } else {
            set("sec-fetch-mode", "no-cors");
        }
        set("sec-fetch-dest", sec_fetch_dest);
        let same_site = Url::parse(referer)
            .ok()
            .and_then(|r| r.host_str().map(|h| h.to_string()))
            .map(|h| url.host_str() == Some(h.as_str()))
            .unwrap_or(false);
        set(
            "sec-fetch-site",
            if same_site { "same-origin" } else { "cross-site" },
        );
        set(
            "sec-ch-ua",
            "\"Not/A)Brand\";v=\"8\", \"Chromium\";v=\"126\", \"Google Chrome\";v=\"126\"",
        );
        set("sec-ch-ua-mobile", "?0");
        set("sec-ch-ua-platform", "\"Windows\"");
        set("dnt", "1");
        set("referer", referer);

        headers
    }
}

/// Uniform jitter on [0.5x, 1.5x) of the base duration.
fn jittered(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    base.mul_f64(factor)
}

/// Parse a Retry-After header: delta-seconds or an HTTP-date.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
    delta.to_std().ok()
}

/// Probe an HTML body for bot-interstitial phrases. Case-insensitive over
/// a bounded window; false positives are tolerated (the retry budget caps
/// the damage).
fn looks_like_bot_challenge(body: &[u8]) -> bool {
    let window = &body[..body.len().min(BOT_PROBE_WINDOW)];
    let text = String::from_utf8_lossy(window).to_lowercase();
    BOT_CHALLENGE_PHRASES.iter().any(|p| text.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FetcherConfig {
        FetcherConfig {
            concurrency: 2,
            delay: Duration::from_millis(0),
            timeout: Duration::from_secs(5),
            max_file_size: 1024,
            follow_redirects: true,
            max_redirects: 5,
            user_agent: None,
            allowed_protocols: vec!["http".to_string(), "https".to_string()],
            cookies: None,
            seed_url: Url::parse("https://example.test/").unwrap(),
        }
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let j = jittered(base);
            assert!(j >= Duration::from_millis(500));
            assert!(j < Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_retry_after_http_date() {
        let future = chrono::Utc::now() + chrono::Duration::seconds(30);
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_str(&future.to_rfc2822()).unwrap(),
        );
        let wait = retry_after(&headers).unwrap();
        assert!(wait <= Duration::from_secs(31));
        assert!(wait >= Duration::from_secs(25));
    }

    #[test]
    fn test_retry_after_missing() {
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn test_bot_challenge_probe() {
        assert!(looks_like_bot_challenge(
            b"<html><title>Just a Moment...</title></html>"
        ));
        assert!(looks_like_bot_challenge(
            b"<div class=\"cf-browser-verification\"></div>"
        ));
        assert!(!looks_like_bot_challenge(
            b"<html><body>Welcome to the archive</body></html>"
        ));
    }

    #[tokio::test]
    async fn test_ua_rotation_cycles_pool() {
        let fetcher = Fetcher::new(config()).unwrap();
        let first = fetcher.current_user_agent();
        fetcher.rotate_user_agent();
        let second = fetcher.current_user_agent();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_fixed_ua_never_rotates() {
        let mut cfg = config();
        cfg.user_agent = Some("ArchiveBot/1.0".to_string());
        let fetcher = Fetcher::new(cfg).unwrap();
        let first = fetcher.current_user_agent();
        fetcher.rotate_user_agent();
        assert_eq!(first, fetcher.current_user_agent());
        assert_eq!(first, "ArchiveBot/1.0");
    }

    #[tokio::test]
    async fn test_abort_fails_fast() {
        let fetcher = Fetcher::new(config()).unwrap();
        fetcher.abort();
        let err = fetcher.fetch("https://example.test/", None).await.unwrap_err();
        assert!(matches!(err, FetchError::Aborted));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let fetcher = Fetcher::new(config()).unwrap();
        let err = fetcher.fetch("not a url", None).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_ssrf_blocked_before_request() {
        let fetcher = Fetcher::new(config()).unwrap();
        let err = fetcher
            .fetch("http://169.254.169.254/latest/meta-data/", None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Ssrf(_)));
        assert_eq!(err.code(), "SSRF");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(FetchError::RateLimited { attempts: 5 }.code(), "RATE_LIMITED");
        assert_eq!(FetchError::Timeout("t".into()).code(), "TIMEOUT");
        assert_eq!(FetchError::Network("n".into()).code(), "NETWORK");
        assert_eq!(
            FetchError::TooLarge { size: 2, limit: 1 }.code(),
            "TOO_LARGE"
        );
        assert_eq!(FetchError::HttpStatus(404).code(), "UNKNOWN");
        assert!(FetchError::Timeout("t".into()).retryable());
        assert!(!FetchError::HttpStatus(404).retryable());
    }

    #[test]
    fn test_headers_by_resource_type() {
        let fetcher = Fetcher::new(config()).unwrap();
        let css = Url::parse("https://example.test/site.css").unwrap();
        let headers = fetcher.build_headers(&css, "https://example.test/");
        assert_eq!(headers.get("accept").unwrap(), "text/css,*/*;q=0.1");
        assert_eq!(headers.get("sec-fetch-dest").unwrap(), "style");
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "no-cors");
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "same-origin");

        let page = Url::parse("https://example.test/about").unwrap();
        let headers = fetcher.build_headers(&page, "https://other.test/");
        assert_eq!(headers.get("sec-fetch-dest").unwrap(), "document");
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "navigate");
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "cross-site");
        assert!(headers.get("upgrade-insecure-requests").is_some());
        assert!(headers.get("referer").is_some());
        assert!(headers.get("dnt").is_some());
    }
}
