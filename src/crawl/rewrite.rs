//! Streaming HTML rewriting
//!
//! Replaces mapped URLs with relative local paths using lol_html, driven by
//! the same selector/attribute table the extractor walks. Attributes whose
//! URLs have no mapping (skipped, out of budget, failed) are left exactly
//! as they were.

use anyhow::{anyhow, Context, Result};
use lol_html::html_content::ContentType;
use lol_html::{element, text, HtmlRewriter, Settings};
use std::sync::LazyLock;
use url::Url;

use crate::crawl::extract::{
    attr_mode, css, rewrite_srcset, AttrMode, LAZY_ATTRIBUTES, SELECTOR_TABLE, SVG_REF_ATTRIBUTES,
};
use crate::crawl::registry::PathRegistry;
use crate::crawl::url_utils::should_skip;

/// First `<base href>` in the document; streaming rewriting cannot look
/// ahead, so the base is sniffed up front.
static BASE_HREF_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"(?i)<base\s[^>]*?href\s*=\s*["']([^"']{1,2000})["']"#)
        .expect("BASE_HREF_RE: hardcoded regex is valid")
});

/// Rewrite every mapped URL in an HTML document to a relative local path.
///
/// `lookup` maps an absolute URL to its registered local path, if any.
/// `page_local_path` is the document's own location in the sandbox;
/// substituted values are the relative path from it to the target, so a
/// same-host sibling rewrites to a bare filename rather than a
/// through-the-root round trip.
pub fn rewrite_html(
    html: &str,
    page_url: &Url,
    page_local_path: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<String> {
    let base = sniff_base(html, page_url);

    // Absolute-or-relative attribute value -> rewritten relative path
    let map_url = |raw: &str| -> Option<String> {
        let raw = raw.trim();
        if should_skip(raw) {
            return None;
        }
        let absolute = base.join(raw).ok()?;
        let local = lookup(absolute.as_str())?;
        Some(PathRegistry::relative(page_local_path, &local))
    };

    let mut handlers = Vec::new();

    for (selector, attr, _kind, mode) in SELECTOR_TABLE {
        let map_url = &map_url;
        handlers.push(element!(*selector, move |el| {
            if let Some(value) = el.get_attribute(attr) {
                match mode {
                    AttrMode::Single => {
                        if let Some(new_value) = map_url(&value) {
                            el.set_attribute(attr, &new_value)?;
                        }
                    }
                    AttrMode::Srcset => {
                        let new_value = rewrite_srcset(&value, map_url);
                        if new_value != value {
                            el.set_attribute(attr, &new_value)?;
                        }
                    }
                }
            }
            Ok(())
        }));
    }

    // Lazy-loading attributes, SVG references, and inline style attributes
    {
        let map_url = &map_url;
        let base = base.clone();
        handlers.push(element!("*", move |el| {
            for attr in LAZY_ATTRIBUTES {
                if let Some(value) = el.get_attribute(attr) {
                    match attr_mode(attr) {
                        AttrMode::Single => {
                            if let Some(new_value) = map_url(&value) {
                                el.set_attribute(attr, &new_value)?;
                            }
                        }
                        AttrMode::Srcset => {
                            let new_value = rewrite_srcset(&value, map_url);
                            if new_value != value {
                                el.set_attribute(attr, &new_value)?;
                            }
                        }
                    }
                }
            }

            if matches!(el.tag_name().as_str(), "image" | "use") {
                for attr in SVG_REF_ATTRIBUTES {
                    if let Some(value) = el.get_attribute(attr) {
                        if let Some(new_value) = map_url(&value) {
                            el.set_attribute(attr, &new_value)?;
                        }
                    }
                }
            }

            if let Some(style) = el.get_attribute("style") {
                let rewritten = css::rewrite_urls(&style, &base, &|absolute: &str| {
                    lookup(absolute).map(|local| PathRegistry::relative(page_local_path, &local))
                });
                if rewritten != style {
                    el.set_attribute("style", &rewritten)?;
                }
            }
            Ok(())
        }));
    }

    // <style> blocks arrive as text chunks; buffer until the final chunk,
    // then emit the rewritten stylesheet in one piece
    {
        let base = base.clone();
        let mut buffer = String::new();
        handlers.push(text!("style", move |chunk| {
            buffer.push_str(chunk.as_str());
            if chunk.last_in_text_node() {
                let rewritten = css::rewrite_urls(&buffer, &base, &|absolute: &str| {
                    lookup(absolute).map(|local| PathRegistry::relative(page_local_path, &local))
                });
                chunk.replace(&rewritten, ContentType::Html);
                buffer.clear();
            } else {
                chunk.remove();
            }
            Ok(())
        }));
    }

    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter
        .write(html.as_bytes())
        .map_err(|e| anyhow!("HTML rewrite error: {}", e))?;
    rewriter
        .end()
        .map_err(|e| anyhow!("HTML rewrite finalization error: {}", e))?;

    String::from_utf8(output).context("Invalid UTF-8 in rewritten HTML")
}

fn sniff_base(html: &str, page_url: &Url) -> Url {
    BASE_HREF_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|href| page_url.join(href.as_str().trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::crawl::url_utils::canonicalize;

    fn page() -> Url {
        Url::parse("https://example.test/").unwrap()
    }

    fn lookup_map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(url, path)| (canonicalize(url, None).unwrap(), path.to_string()))
            .collect()
    }

    fn lookup_fn(map: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
        move |url| {
            let canonical = canonicalize(url, None)?;
            map.get(&canonical).cloned()
        }
    }

    #[test]
    fn test_rewrites_mapped_leaves_unmapped() {
        let html = r#"<a href="/known">k</a><a href="/unknown">u</a>"#;
        let map = lookup_map(&[("https://example.test/known", "example.test/known.html")]);
        let out = rewrite_html(html, &page(), "example.test/index.html", &lookup_fn(&map)).unwrap();
        // Same-host sibling: a bare relative filename, no host round trip
        assert!(out.contains(r#"href="known.html""#));
        assert!(out.contains(r#"href="/unknown""#));
    }

    #[test]
    fn test_cross_host_target_climbs_to_its_host_dir() {
        let html = r#"<img src="https://cdn.test/a.png">"#;
        let map = lookup_map(&[("https://cdn.test/a.png", "cdn.test/a.png")]);
        let out = rewrite_html(
            html,
            &Url::parse("https://example.test/docs/deep").unwrap(),
            "example.test/docs/deep.html",
            &lookup_fn(&map),
        )
        .unwrap();
        assert!(out.contains(r#"src="../../cdn.test/a.png""#));
    }

    #[test]
    fn test_srcset_descriptors_preserved() {
        let html = r#"<img srcset="//cdn.test/a.png 1x, b.png 2x">"#;
        let map = lookup_map(&[("https://cdn.test/a.png", "cdn.test/a.png")]);
        let out = rewrite_html(html, &page(), "example.test/index.html", &lookup_fn(&map)).unwrap();
        assert!(out.contains("../cdn.test/a.png 1x, b.png 2x"));
    }

    #[test]
    fn test_inline_style_attribute() {
        let html = r#"<div style="background: url('/bg.jpg')"></div>"#;
        let map = lookup_map(&[("https://example.test/bg.jpg", "example.test/bg.jpg")]);
        let out = rewrite_html(html, &page(), "example.test/index.html", &lookup_fn(&map)).unwrap();
        assert!(out.contains("url('bg.jpg')"));
    }

    #[test]
    fn test_style_block() {
        let html = "<style>body { background: url(/bg.jpg); }</style>";
        let map = lookup_map(&[("https://example.test/bg.jpg", "example.test/bg.jpg")]);
        let out = rewrite_html(html, &page(), "example.test/index.html", &lookup_fn(&map)).unwrap();
        assert!(out.contains("url('bg.jpg')"));
    }

    #[test]
    fn test_lazy_attribute_rewritten() {
        let html = r#"<div data-bg="/hero.jpg"></div>"#;
        let map = lookup_map(&[("https://example.test/hero.jpg", "example.test/hero.jpg")]);
        let out = rewrite_html(html, &page(), "example.test/index.html", &lookup_fn(&map)).unwrap();
        assert!(out.contains(r#"data-bg="hero.jpg""#));
    }

    #[test]
    fn test_base_href_respected() {
        let html = r#"<base href="https://other.test/"><img src="pic.png">"#;
        let map = lookup_map(&[("https://other.test/pic.png", "other.test/pic.png")]);
        let out = rewrite_html(html, &page(), "example.test/index.html", &lookup_fn(&map)).unwrap();
        assert!(out.contains(r#"src="../other.test/pic.png""#));
    }

    #[test]
    fn test_other_attributes_untouched() {
        let html = r#"<a href="/known" class="btn" id="x" target="_blank">k</a>"#;
        let map = lookup_map(&[("https://example.test/known", "example.test/known.html")]);
        let out = rewrite_html(html, &page(), "example.test/index.html", &lookup_fn(&map)).unwrap();
        assert!(out.contains(r#"class="btn""#));
        assert!(out.contains(r#"id="x""#));
        assert!(out.contains(r#"target="_blank""#));
    }
}
