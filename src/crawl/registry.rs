//! Path registry: the bijective map between canonical URLs and local paths
//!
//! Every stored byte lands at a path chosen here, and the rewrite pass
//! consults the same map in reverse. The registry owns three synchronized
//! structures: url -> path, path -> url, and the set of used paths. It
//! performs no I/O.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use url::Url;

use crate::crawl::url_utils::canonicalize;
use crate::util::short_digest;

/// Longest permitted path segment. Anything longer is replaced by a
/// truncated stem plus a content-derived digest plus the original extension.
const MAX_SEGMENT_LEN: usize = 200;

/// Numeric collision suffixes tried before falling back to a digest.
const MAX_COLLISION_SUFFIX: usize = 32;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot derive a local path for malformed URL '{0}'")]
    MalformedUrl(String),
}

/// Registry mapping canonical URLs to unique sandbox-relative local paths.
#[derive(Debug, Default)]
pub struct PathRegistry {
    url_to_path: HashMap<String, String>,
    path_to_url: HashMap<String, String>,
    used_paths: HashSet<String>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a URL, returning its local path. Idempotent: registering an
    /// already-known canonical URL returns the existing path.
    pub fn register(&mut self, url: &str) -> Result<String, RegistryError> {
        let canonical =
            canonicalize(url, None).ok_or_else(|| RegistryError::MalformedUrl(url.to_string()))?;

        if let Some(existing) = self.url_to_path.get(&canonical) {
            return Ok(existing.clone());
        }

        let parsed = Url::parse(&canonical)
            .map_err(|_| RegistryError::MalformedUrl(url.to_string()))?;
        let candidate = derive_path(&parsed);
        let path = self.resolve_collision(candidate, &canonical);

        self.url_to_path.insert(canonical.clone(), path.clone());
        self.path_to_url.insert(path.clone(), canonical);
        self.used_paths.insert(path.clone());
        Ok(path)
    }

    /// Map an additional URL onto an already-registered path. Used when a
    /// redirect makes two canonical URLs name the same content; the path
    /// keeps its original owner in the reverse map.
    pub fn register_alias(&mut self, url: &str, path: &str) -> Result<(), RegistryError> {
        let canonical =
            canonicalize(url, None).ok_or_else(|| RegistryError::MalformedUrl(url.to_string()))?;
        self.url_to_path.entry(canonical).or_insert_with(|| path.to_string());
        Ok(())
    }

    /// Look up the local path for a URL, if one was registered.
    pub fn lookup(&self, url: &str) -> Option<&str> {
        let canonical = canonicalize(url, None)?;
        self.url_to_path.get(&canonical).map(|s| s.as_str())
    }

    /// The canonical URL that owns a local path, if any.
    pub fn url_for_path(&self, path: &str) -> Option<&str> {
        self.path_to_url.get(path).map(|s| s.as_str())
    }

    /// Number of registered canonical URLs.
    pub fn len(&self) -> usize {
        self.url_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.url_to_path.is_empty()
    }

    /// Relative path from one local path to another: walk `from`'s parent
    /// directories and `to`'s segments to the longest common prefix, then
    /// emit `../` for what remains of `from` and the tail of `to`.
    pub fn relative(from: &str, to: &str) -> String {
        let from_dirs: Vec<&str> = {
            let mut segs: Vec<&str> = from.split('/').collect();
            segs.pop(); // drop the filename
            segs
        };
        let to_segs: Vec<&str> = to.split('/').collect();

        let common = from_dirs
            .iter()
            .zip(to_segs.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let ups = from_dirs.len() - common;
        let mut out = String::new();
        for _ in 0..ups {
            out.push_str("../");
        }
        out.push_str(&to_segs[common..].join("/"));
        out
    }

    fn resolve_collision(&self, candidate: String, canonical: &str) -> String {
        if !self.used_paths.contains(&candidate) {
            return candidate;
        }
        for i in 1..=MAX_COLLISION_SUFFIX {
            let alt = insert_before_extension(&candidate, &format!("_{}", i));
            if !self.used_paths.contains(&alt) {
                return alt;
            }
        }
        insert_before_extension(&candidate, &format!("_{}", short_digest(canonical)))
    }
}

/// Derive the candidate local path for a canonical URL (before collision
/// resolution). First segment is the host; directory-style paths become
/// `index.html`; extensionless files gain `.html`; queries are folded in as
/// a short digest before the extension.
fn derive_path(url: &Url) -> String {
    let host = url.host_str().unwrap_or("unknown-host");
    let host_segment = match url.port() {
        Some(port) => format!("{}_{}", host, port),
        None => host.to_string(),
    };

    let mut segments: Vec<String> = vec![clamp_segment(sanitize_segment(&host_segment))];

    let path = url.path();
    let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let directory_style = raw.is_empty() || path.ends_with('/');

    for seg in &raw {
        let cleaned = sanitize_segment(seg);
        if !cleaned.is_empty() {
            segments.push(cleaned);
        }
    }

    let mut filename = if directory_style || segments.len() <= 1 {
        "index.html".to_string()
    } else {
        segments.pop().expect("segments has more than the host")
    };

    if !filename.contains('.') {
        filename.push_str(".html");
    }

    if let Some(query) = url.query() {
        if !query.is_empty() {
            filename = insert_before_extension(&filename, &format!("_{}", short_digest(query)));
        }
    }

    segments.push(filename);
    segments
        .into_iter()
        .map(|s| clamp_segment(s))
        .collect::<Vec<_>>()
        .join("/")
}

/// Replace path-traversal fragments and characters illegal on common
/// filesystems, then trim leading/trailing dots and whitespace.
fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' => out.push('_'),
            c if (c as u32) < 0x20 => out.push('_'),
            c => out.push(c),
        }
    }
    while out.contains("..") {
        out = out.replace("..", "_");
    }
    out.trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// Enforce the segment length ceiling with a digest-preserving truncation.
fn clamp_segment(segment: String) -> String {
    if segment.len() <= MAX_SEGMENT_LEN {
        return segment;
    }
    let digest = short_digest(&segment);
    let (stem, ext) = match segment.rfind('.') {
        Some(idx) => (&segment[..idx], &segment[idx..]),
        None => (segment.as_str(), ""),
    };
    let keep = MAX_SEGMENT_LEN
        .saturating_sub(digest.len() + ext.len() + 1)
        .min(stem.len());
    let mut end = keep;
    while end > 0 && !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}_{}{}", &stem[..end], digest, ext)
}

/// Insert a suffix immediately before the final extension
/// (`logo.png` + `_1` -> `logo_1.png`; no extension appends).
fn insert_before_extension(path: &str, suffix: &str) -> String {
    // Only consider a dot inside the final segment
    let seg_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[seg_start..].rfind('.') {
        Some(rel_idx) => {
            let idx = seg_start + rel_idx;
            format!("{}{}{}", &path[..idx], suffix, &path[idx..])
        }
        None => format!("{}{}", path, suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut reg = PathRegistry::new();
        let a = reg.register("https://example.test/page").unwrap();
        let b = reg.register("https://EXAMPLE.test/page#frag").unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_host_is_first_segment() {
        let mut reg = PathRegistry::new();
        let path = reg.register("https://example.test/css/site.css").unwrap();
        assert_eq!(path, "example.test/css/site.css");
    }

    #[test]
    fn test_root_becomes_index_html() {
        let mut reg = PathRegistry::new();
        assert_eq!(reg.register("https://example.test/").unwrap(), "example.test/index.html");
    }

    #[test]
    fn test_directory_style_gets_index() {
        let mut reg = PathRegistry::new();
        // Canonicalization strips the trailing slash, so /docs/ registers as
        // an extensionless segment
        let path = reg.register("https://example.test/docs/").unwrap();
        assert_eq!(path, "example.test/docs.html");
    }

    #[test]
    fn test_extensionless_gains_html() {
        let mut reg = PathRegistry::new();
        let path = reg.register("https://example.test/about").unwrap();
        assert_eq!(path, "example.test/about.html");
    }

    #[test]
    fn test_query_folds_into_filename() {
        let mut reg = PathRegistry::new();
        let a = reg.register("https://example.test/img.png?v=1").unwrap();
        let b = reg.register("https://example.test/img.png?v=2").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("example.test/img_"));
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn test_collision_suffixes() {
        let mut reg = PathRegistry::new();
        // Same sanitized path from two distinct canonical URLs
        let a = reg.register("https://example.test/a|b.txt").unwrap();
        let b = reg.register("https://example.test/a*b.txt").unwrap();
        assert_eq!(a, "example.test/a_b.txt");
        assert_eq!(b, "example.test/a_b_1.txt");
        assert_ne!(a, b);
    }

    #[test]
    fn test_traversal_is_neutralized() {
        let mut reg = PathRegistry::new();
        let path = reg.register("https://example.test/%2e%2e/secret").unwrap();
        assert!(!path.contains(".."), "got {}", path);
    }

    #[test]
    fn test_long_segment_truncated_with_digest() {
        let mut reg = PathRegistry::new();
        let long = "a".repeat(400);
        let url = format!("https://example.test/{}.png", long);
        let path = reg.register(&url).unwrap();
        let filename = path.rsplit('/').next().unwrap();
        assert!(filename.len() <= 200);
        assert!(filename.ends_with(".png"));
    }

    #[test]
    fn test_alias_maps_to_same_path() {
        let mut reg = PathRegistry::new();
        let path = reg.register("https://a.test/q").unwrap();
        reg.register_alias("https://a.test/p", &path).unwrap();
        assert_eq!(reg.lookup("https://a.test/p"), Some(path.as_str()));
        assert_eq!(reg.lookup("https://a.test/q"), Some(path.as_str()));
    }

    #[test]
    fn test_malformed_url_errors() {
        let mut reg = PathRegistry::new();
        assert!(reg.register("not a url").is_err());
    }

    #[test]
    fn test_relative_paths() {
        assert_eq!(
            PathRegistry::relative("example.test/index.html", "example.test/s.css"),
            "s.css"
        );
        assert_eq!(
            PathRegistry::relative("example.test/index.html", "cdn.test/a.png"),
            "../cdn.test/a.png"
        );
        assert_eq!(
            PathRegistry::relative("example.test/docs/deep/page.html", "example.test/style.css"),
            "../../style.css"
        );
    }
}
