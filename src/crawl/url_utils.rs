//! URL normalization, scope comparison, and classification predicates
//!
//! Every frontier and registry key in the crawler is a canonical URL
//! produced here. Canonicalization is idempotent: feeding a canonical URL
//! back through `canonicalize` yields the same string.

use url::Url;

use crate::config::{FileCategory, Scope};

/// Known second-level public suffixes (e.g. `example.co.uk` registers at
/// three labels, not two).
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "gov", "edu", "ac"];

/// Schemes and pseudo-URLs that never name a fetchable resource.
const SKIP_PREFIXES: &[&str] = &["data:", "blob:", "javascript:", "mailto:", "tel:", "sms:"];

/// Canonicalize a URL into its unique-key form.
///
/// - scheme and host lowercased (the `url` crate guarantees both)
/// - default ports dropped
/// - trailing `/` stripped from non-root paths
/// - query parameters sorted bytewise
/// - fragment removed
///
/// Relative inputs are resolved against `base` when supplied. Returns
/// `None` when the input cannot be parsed into an absolute URL.
pub fn canonicalize(input: &str, base: Option<&Url>) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut parsed = match base {
        Some(base) => base.join(trimmed).ok()?,
        None => Url::parse(trimmed).ok()?,
    };

    parsed.set_fragment(None);

    // Sort query parameters for a stable key
    if let Some(query) = parsed.query() {
        if query.is_empty() {
            parsed.set_query(None);
        } else {
            let mut params: Vec<&str> = query.split('&').collect();
            params.sort_unstable();
            let sorted = params.join("&");
            parsed.set_query(Some(&sorted));
        }
    }

    // Strip trailing slash from non-root paths
    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    Some(parsed.to_string())
}

/// The registrable domain of a hostname: the apex of the last two labels,
/// or the last three when the penultimate label is a known second-level
/// suffix (`example.co.uk` -> `example.co.uk`, `a.b.example.com` ->
/// `example.com`).
pub fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let take = if labels.len() >= 3 && SECOND_LEVEL_SUFFIXES.contains(&labels[labels.len() - 2]) {
        3
    } else {
        2
    };
    if labels.len() <= take {
        return labels.join(".");
    }
    labels[labels.len() - take..].join(".")
}

/// Scope admission predicate for page URLs.
///
/// `same-host` compares exact hostnames; `same-domain` compares registrable
/// domains; `subdomains` admits the seed's registrable domain and any
/// subdomain of it; `custom` admits hosts in `custom_domains` (and the seed
/// host itself).
pub fn in_scope(url: &Url, seed: &Url, scope: Scope, custom_domains: &[String]) -> bool {
    let host = match url.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return false,
    };
    let seed_host = match seed.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return false,
    };

    match scope {
        Scope::SameHost => host == seed_host,
        Scope::SameDomain => registrable_domain(&host) == registrable_domain(&seed_host),
        Scope::Subdomains => {
            let apex = registrable_domain(&seed_host);
            host == apex || host.ends_with(&format!(".{}", apex))
        }
        Scope::Custom => {
            host == seed_host
                || custom_domains
                    .iter()
                    .any(|d| d.to_ascii_lowercase() == host)
        }
    }
}

/// Match a URL against a glob pattern (`*` matches any run, `?` a single
/// character). Case-insensitive, anchored at both ends.
pub fn matches_pattern(url: &str, pattern: &str) -> bool {
    let mut translated = String::with_capacity(pattern.len() * 2);
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            c => translated.push_str(&regex::escape(&c.to_string())),
        }
    }
    let anchored = format!("^{}$", translated);
    match regex::RegexBuilder::new(&anchored)
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(url),
        Err(_) => false,
    }
}

/// The lowercased extension of a URL's path, or empty when the path has no
/// extension (or the final `.` precedes a `/`).
pub fn extension(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // Not an absolute URL; strip query/fragment by hand
        Err(_) => {
            let end = url.find(['?', '#']).unwrap_or(url.len());
            url[..end].to_string()
        }
    };
    match path.rfind('.') {
        Some(idx) if !path[idx..].contains('/') => path[idx + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Fixed extension-to-category table.
pub fn mime_category(ext: &str) -> FileCategory {
    match ext {
        "html" | "htm" | "xhtml" | "shtml" => FileCategory::Html,
        "css" => FileCategory::Css,
        "js" | "mjs" | "cjs" => FileCategory::Js,
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "bmp" | "avif" | "tif"
        | "tiff" | "apng" => FileCategory::Images,
        "woff" | "woff2" | "ttf" | "otf" | "eot" => FileCategory::Fonts,
        "mp4" | "webm" | "ogg" | "ogv" | "mp3" | "wav" | "m4a" | "m4v" | "flac" | "aac"
        | "mov" | "avi" => FileCategory::Media,
        "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "odp"
        | "txt" | "csv" | "rtf" => FileCategory::Documents,
        _ => FileCategory::Other,
    }
}

/// True for URLs that must never be fetched or enqueued: data/blob/
/// javascript/mailto/tel/sms schemes, pure fragments, and empty strings.
pub fn should_skip(url: &str) -> bool {
    let trimmed = url.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    SKIP_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// The leading token of a Content-Type header, lowercased
/// (`text/html; charset=utf-8` -> `text/html`).
pub fn content_type_token(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let c = canonicalize("HTTPS://Example.COM:443/Path/?b=2&a=1#frag", None).unwrap();
        assert_eq!(c, "https://example.com/Path?a=1&b=2");
    }

    #[test]
    fn test_canonicalize_root_keeps_slash() {
        let c = canonicalize("https://example.com/", None).unwrap();
        assert_eq!(c, "https://example.com/");
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let once = canonicalize("https://example.com/a/b/?z=1&y=2", None).unwrap();
        let twice = canonicalize(&once, None).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonicalize_relative_against_base() {
        let base = Url::parse("https://example.com/docs/index.html").unwrap();
        let c = canonicalize("../img/logo.png", Some(&base)).unwrap();
        assert_eq!(c, "https://example.com/img/logo.png");
    }

    #[test]
    fn test_canonicalize_rejects_garbage() {
        assert!(canonicalize("", None).is_none());
        assert!(canonicalize("not a url", None).is_none());
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("www.example.com"), "example.com");
        assert_eq!(registrable_domain("a.b.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("localhost"), "localhost");
    }

    #[test]
    fn test_in_scope_same_host() {
        let seed = Url::parse("https://www.example.com/").unwrap();
        let same = Url::parse("https://www.example.com/page").unwrap();
        let other = Url::parse("https://blog.example.com/page").unwrap();
        assert!(in_scope(&same, &seed, Scope::SameHost, &[]));
        assert!(!in_scope(&other, &seed, Scope::SameHost, &[]));
    }

    #[test]
    fn test_in_scope_same_domain_and_subdomains() {
        let seed = Url::parse("https://www.example.com/").unwrap();
        let sibling = Url::parse("https://blog.example.com/post").unwrap();
        let foreign = Url::parse("https://example.net/").unwrap();
        assert!(in_scope(&sibling, &seed, Scope::SameDomain, &[]));
        assert!(!in_scope(&foreign, &seed, Scope::SameDomain, &[]));
        assert!(in_scope(&sibling, &seed, Scope::Subdomains, &[]));
        let apex = Url::parse("https://example.com/").unwrap();
        assert!(in_scope(&apex, &seed, Scope::Subdomains, &[]));
    }

    #[test]
    fn test_in_scope_custom() {
        let seed = Url::parse("https://a.test/").unwrap();
        let listed = Url::parse("https://cdn.test/x").unwrap();
        let unlisted = Url::parse("https://other.test/x").unwrap();
        let domains = vec!["cdn.test".to_string()];
        assert!(in_scope(&listed, &seed, Scope::Custom, &domains));
        assert!(in_scope(&seed, &seed, Scope::Custom, &domains));
        assert!(!in_scope(&unlisted, &seed, Scope::Custom, &domains));
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("https://example.com/blog/post-1", "*/blog/*"));
        assert!(matches_pattern("https://EXAMPLE.com/a", "https://example.com/?"));
        assert!(!matches_pattern("https://example.com/shop", "*/blog/*"));
        // Regex metacharacters in the glob are literal
        assert!(matches_pattern("https://example.com/a.b", "*/a.b"));
        assert!(!matches_pattern("https://example.com/axb", "*/a.b"));
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("https://example.com/style.CSS?v=2"), "css");
        assert_eq!(extension("https://example.com/img/logo.png#x"), "png");
        assert_eq!(extension("https://example.com/page"), "");
        assert_eq!(extension("https://example.com/v1.2/resource"), "");
    }

    #[test]
    fn test_mime_category() {
        assert_eq!(mime_category("html"), FileCategory::Html);
        assert_eq!(mime_category("woff2"), FileCategory::Fonts);
        assert_eq!(mime_category("webm"), FileCategory::Media);
        assert_eq!(mime_category("wasm"), FileCategory::Other);
    }

    #[test]
    fn test_should_skip() {
        assert!(should_skip("javascript:void(0)"));
        assert!(should_skip("MAILTO:someone@example.com"));
        assert!(should_skip("data:image/png;base64,AAAA"));
        assert!(should_skip("#section"));
        assert!(should_skip("  "));
        assert!(!should_skip("https://example.com/"));
        assert!(!should_skip("/relative/path"));
    }

    #[test]
    fn test_content_type_token() {
        assert_eq!(content_type_token("text/HTML; charset=UTF-8"), "text/html");
        assert_eq!(content_type_token("text/css"), "text/css");
    }
}
