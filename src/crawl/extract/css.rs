//! CSS link extraction and rewriting
//!
//! Finds every URL-bearing construct in a stylesheet: `url(...)` in any
//! declaration value, `@import` with either form, and the entries of
//! `image-set(...)` / `-webkit-image-set(...)` / `cross-fade(...)`. The
//! same scan drives the rewrite pass. The primary scanner is comment- and
//! string-aware; when it fails on malformed input, a regex fallback scoped
//! strictly to `url(...)` and `@import` keeps the pipeline alive.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::crawl::url_utils::{canonicalize, should_skip};

/// Fallback for `url(...)` occurrences. Bounded quantifier prevents
/// catastrophic backtracking on adversarial stylesheets.
static URL_FUNC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(['"]?)([^'"()\s]{1,2000})['"]?\s*\)"#)
        .expect("URL_FUNC_RE: hardcoded regex is valid")
});

/// Fallback for bare-string `@import` occurrences.
static IMPORT_STRING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)@import\s+(['"])([^'"]{1,2000})['"]"#)
        .expect("IMPORT_STRING_RE: hardcoded regex is valid")
});

/// Functions whose direct string arguments are URLs.
const TRACKED_FUNCTIONS: &[&str] = &["image-set(", "-webkit-image-set(", "cross-fade("];

/// How a URL appears in the stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssLinkKind {
    /// Inside `url(...)` or an image-set/cross-fade entry
    Url,
    /// An `@import` target (either form)
    Import,
}

/// A URL extracted from a stylesheet, resolved to absolute form.
#[derive(Debug, Clone)]
pub struct CssLink {
    pub url: String,
    pub kind: CssLinkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OccKind {
    /// `url(...)` in a declaration value
    UrlFunc,
    /// `url(...)` directly after `@import`
    ImportUrlFunc,
    /// Quoted string directly after `@import`
    ImportString,
    /// Quoted string entry of a tracked function
    FuncString,
}

impl OccKind {
    fn link_kind(self) -> CssLinkKind {
        match self {
            OccKind::ImportUrlFunc | OccKind::ImportString => CssLinkKind::Import,
            OccKind::UrlFunc | OccKind::FuncString => CssLinkKind::Url,
        }
    }
}

/// One URL occurrence: the byte span to replace and the raw URL text.
#[derive(Debug, Clone)]
struct Occurrence {
    span: Range<usize>,
    url: String,
    kind: OccKind,
}

#[derive(Debug)]
enum ScanError {
    UnterminatedComment,
    UnterminatedString,
    UnterminatedUrl,
}

/// Extract every URL from a stylesheet, resolved against the stylesheet's
/// own URL so relative paths in imported sheets work. Skippable schemes are
/// dropped and duplicates removed by canonical URL.
pub fn extract_urls(css: &str, sheet_url: &Url) -> Vec<CssLink> {
    let occurrences = match scan(css) {
        Ok(occ) => occ,
        Err(_) => scan_fallback(css),
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for occ in occurrences {
        if should_skip(&occ.url) {
            continue;
        }
        let resolved = match sheet_url.join(occ.url.trim()) {
            Ok(u) => u.to_string(),
            Err(_) => continue,
        };
        let canonical = match canonicalize(&resolved, None) {
            Some(c) => c,
            None => continue,
        };
        if seen.insert(canonical) {
            links.push(CssLink {
                url: resolved,
                kind: occ.kind.link_kind(),
            });
        }
    }
    links
}

/// Rewrite mapped URLs in a stylesheet. `lookup` receives the resolved
/// absolute URL and returns the relative path to substitute when the
/// target was archived (callers derive it from the sheet's own local
/// path); mapped occurrences become `url('<relative>')` (imports keep
/// their bare-string form). Unmapped URLs are left untouched.
pub fn rewrite_urls(css: &str, sheet_url: &Url, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let occurrences = match scan(css) {
        Ok(occ) => occ,
        Err(_) => scan_fallback(css),
    };

    let mut out = css.to_string();
    // Replace back-to-front so earlier spans stay valid
    for occ in occurrences.iter().rev() {
        if should_skip(&occ.url) {
            continue;
        }
        let resolved = match sheet_url.join(occ.url.trim()) {
            Ok(u) => u.to_string(),
            Err(_) => continue,
        };
        let target = match lookup(&resolved) {
            Some(path) => path,
            None => continue,
        };
        let replacement = match occ.kind {
            OccKind::ImportString | OccKind::FuncString => format!("'{}'", target),
            OccKind::UrlFunc | OccKind::ImportUrlFunc => format!("url('{}')", target),
        };
        out.replace_range(occ.span.clone(), &replacement);
    }
    out
}

/// Structural scan: walks the stylesheet byte-by-byte, skipping comments
/// and non-URL strings, collecting url()/import/tracked-function entries.
fn scan(css: &str) -> Result<Vec<Occurrence>, ScanError> {
    let bytes = css.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    // Paren depths at which a tracked function's arguments live
    let mut tracked_depths: Vec<usize> = Vec::new();
    let mut depth = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = css[i + 2..]
                    .find("*/")
                    .ok_or(ScanError::UnterminatedComment)?;
                i += 2 + end + 2;
            }
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                if tracked_depths.last() == Some(&depth) {
                    tracked_depths.pop();
                }
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b'\'' | b'"' => {
                let quote = bytes[i];
                let (content, end) = read_string(bytes, i, quote)?;
                // Strings at a tracked function's argument level are URLs
                if tracked_depths.last() == Some(&depth) {
                    out.push(Occurrence {
                        span: i..end,
                        url: content,
                        kind: OccKind::FuncString,
                    });
                }
                i = end;
            }
            b'@' if starts_with_ci(&bytes[i..], b"@import") => {
                let after = i + "@import".len();
                let mut j = after;
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j < bytes.len() && (bytes[j] == b'\'' || bytes[j] == b'"') {
                    let quote = bytes[j];
                    let (content, end) = read_string(bytes, j, quote)?;
                    out.push(Occurrence {
                        span: j..end,
                        url: content,
                        kind: OccKind::ImportString,
                    });
                    i = end;
                } else if j < bytes.len() && starts_with_ci(&bytes[j..], b"url(") {
                    let (occ, end) = read_url_func(bytes, j, OccKind::ImportUrlFunc)?;
                    out.push(occ);
                    i = end;
                } else {
                    i = after;
                }
            }
            _ if starts_with_ci(&bytes[i..], b"url(") && !is_ident_char(prev_byte(bytes, i)) => {
                let (occ, end) = read_url_func(bytes, i, OccKind::UrlFunc)?;
                out.push(occ);
                i = end;
            }
            _ => {
                for func in TRACKED_FUNCTIONS {
                    if starts_with_ci(&bytes[i..], func.as_bytes())
                        && !is_ident_char(prev_byte(bytes, i))
                    {
                        depth += 1;
                        tracked_depths.push(depth);
                        i += func.len() - 1; // position on '(' already consumed
                        break;
                    }
                }
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Read a quoted string starting at `start` (which holds the quote).
/// Returns the content and the index just past the closing quote.
fn read_string(bytes: &[u8], start: usize, quote: u8) -> Result<(String, usize), ScanError> {
    let mut j = start + 1;
    while j < bytes.len() {
        if bytes[j] == b'\\' {
            j += 2;
            continue;
        }
        if bytes[j] == quote {
            let content = String::from_utf8_lossy(&bytes[start + 1..j]).into_owned();
            return Ok((content, j + 1));
        }
        j += 1;
    }
    Err(ScanError::UnterminatedString)
}

/// Read a `url(...)` function starting at `start`. Handles quoted and
/// unquoted forms. Returns the occurrence (span covering the whole call)
/// and the index just past the closing paren.
fn read_url_func(
    bytes: &[u8],
    start: usize,
    kind: OccKind,
) -> Result<(Occurrence, usize), ScanError> {
    let mut j = start + "url(".len();
    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }
    if j >= bytes.len() {
        return Err(ScanError::UnterminatedUrl);
    }

    let (content, mut after) = if bytes[j] == b'\'' || bytes[j] == b'"' {
        read_string(bytes, j, bytes[j])?
    } else {
        let close = bytes[j..]
            .iter()
            .position(|&b| b == b')')
            .ok_or(ScanError::UnterminatedUrl)?;
        let content = String::from_utf8_lossy(&bytes[j..j + close])
            .trim()
            .to_string();
        (content, j + close)
    };

    while after < bytes.len() && bytes[after] != b')' {
        if !bytes[after].is_ascii_whitespace() {
            return Err(ScanError::UnterminatedUrl);
        }
        after += 1;
    }
    if after >= bytes.len() {
        return Err(ScanError::UnterminatedUrl);
    }

    Ok((
        Occurrence {
            span: start..after + 1,
            url: content,
            kind,
        },
        after + 1,
    ))
}

/// Regex fallback: `url(...)` and bare-string `@import` only, so malformed
/// stylesheets still get their references found and substituted.
fn scan_fallback(css: &str) -> Vec<Occurrence> {
    let mut out = Vec::new();
    for caps in URL_FUNC_RE.captures_iter(css) {
        let whole = caps.get(0).expect("capture 0 always present");
        let url = caps.get(2).expect("capture 2 always present");
        out.push(Occurrence {
            span: whole.range(),
            url: url.as_str().to_string(),
            kind: OccKind::UrlFunc,
        });
    }
    for caps in IMPORT_STRING_RE.captures_iter(css) {
        let url = caps.get(2).expect("capture 2 always present");
        // Span covers only the quoted string, keeping the @import keyword
        let span = url.range().start - 1..url.range().end + 1;
        out.push(Occurrence {
            span,
            url: url.as_str().to_string(),
            kind: OccKind::ImportString,
        });
    }
    out.sort_by_key(|o| o.span.start);
    out.dedup_by(|a, b| overlaps(&a.span, &b.span));
    out
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn starts_with_ci(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

fn prev_byte(bytes: &[u8], i: usize) -> u8 {
    if i == 0 {
        b' '
    } else {
        bytes[i - 1]
    }
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}
