//! Crawl configuration: scope rules, limits, politeness, and file-type filters

use serde::{Deserialize, Serialize};

/// Admission predicate for page URLs, expressed over hostnames relative to
/// the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Exact hostname match against the seed
    SameHost,
    /// Registrable domain match (apex of the last two labels, or three when
    /// the penultimate label is a known second-level suffix)
    SameDomain,
    /// The seed's registrable domain and any subdomain of it
    Subdomains,
    /// Hosts listed in `custom_domains` only
    Custom,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::SameHost
    }
}

/// Resource category derived from a URL's extension or a response's
/// Content-Type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Html,
    Css,
    Js,
    Images,
    Fonts,
    Media,
    Documents,
    Other,
}

/// Per-category enable/disable switches. A category left unset is admitted;
/// only an explicit `false` rejects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileTypeFilter {
    pub html: Option<bool>,
    pub css: Option<bool>,
    pub js: Option<bool>,
    pub images: Option<bool>,
    pub fonts: Option<bool>,
    pub media: Option<bool>,
    pub documents: Option<bool>,
    pub other: Option<bool>,
}

impl FileTypeFilter {
    /// Whether the given category is admitted under this filter.
    pub fn allows(&self, category: FileCategory) -> bool {
        let flag = match category {
            FileCategory::Html => self.html,
            FileCategory::Css => self.css,
            FileCategory::Js => self.js,
            FileCategory::Images => self.images,
            FileCategory::Fonts => self.fonts,
            FileCategory::Media => self.media,
            FileCategory::Documents => self.documents,
            FileCategory::Other => self.other,
        };
        flag != Some(false)
    }
}

/// Web crawl configuration. Frozen at engine construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Admission predicate for page URLs
    #[serde(default)]
    pub scope: Scope,
    /// Host allow-list when scope is `custom`
    #[serde(default)]
    pub custom_domains: Vec<String>,
    /// Glob patterns page URLs must match (whitelist; empty = all)
    #[serde(default)]
    pub include_paths: Vec<String>,
    /// Glob patterns page URLs must not match (blacklist)
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    /// Disable depth and page-count ceilings
    #[serde(default)]
    pub unlimited: bool,
    /// Maximum crawl depth from the seed
    pub max_depth: u32,
    /// Maximum number of frontier entries
    pub max_pages: usize,
    /// Per-response byte ceiling; larger responses are dropped
    pub max_file_size: u64,
    /// Aggregate byte ceiling across storage
    pub max_total_size: u64,
    /// Per-category file type switches
    #[serde(default)]
    pub file_types: FileTypeFilter,
    /// Maximum in-flight fetches
    pub concurrency: usize,
    /// Baseline inter-request delay in milliseconds (jittered 0.5x-1.5x)
    pub delay_ms: u64,
    /// Per-request deadline in milliseconds
    pub timeout_ms: u64,
    /// Fixed User-Agent; when absent one is picked from a rotation pool
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Cookie header string ("name=value; other=value") scoped to the seed host
    #[serde(default)]
    pub cookies: Option<String>,
    /// Whether to consult robots.txt directives at the seed host
    pub respect_robots_txt: bool,
    /// Whether to follow HTTP redirects
    pub follow_redirects: bool,
    /// Redirect-chain ceiling
    pub max_redirects: u32,
    /// Protocol allow-list for the SSRF guard
    pub allowed_protocols: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            scope: Scope::SameHost,
            custom_domains: Vec::new(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            unlimited: false,
            max_depth: 5,
            max_pages: 500,
            max_file_size: 50 * 1024 * 1024,    // 50 MiB
            max_total_size: 2 * 1024 * 1024 * 1024, // 2 GiB
            file_types: FileTypeFilter::default(),
            concurrency: 4,
            delay_ms: 250,
            timeout_ms: 30_000,
            user_agent: None,
            cookies: None,
            respect_robots_txt: true,
            follow_redirects: true,
            max_redirects: 10,
            allowed_protocols: vec!["http".to_string(), "https".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_filter_defaults_admit() {
        let filter = FileTypeFilter::default();
        assert!(filter.allows(FileCategory::Html));
        assert!(filter.allows(FileCategory::Other));
    }

    #[test]
    fn test_file_type_filter_explicit_disable() {
        let filter = FileTypeFilter {
            images: Some(false),
            ..FileTypeFilter::default()
        };
        assert!(!filter.allows(FileCategory::Images));
        assert!(filter.allows(FileCategory::Css));
    }

    #[test]
    fn test_scope_serde_kebab_case() {
        let scope: Scope = serde_json::from_str("\"same-domain\"").unwrap();
        assert_eq!(scope, Scope::SameDomain);
    }
}
