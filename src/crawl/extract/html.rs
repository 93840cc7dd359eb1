//! HTML link extraction
//!
//! One parse, several passes over the same document: the selector table,
//! the lazy-attribute sweep over every element, inline and block CSS, and
//! JSON-LD structured data. Candidates are resolved against the effective
//! base URL (`<base href>` when present), skip-filtered, and de-duplicated
//! by canonical URL within the call.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::trace;
use url::Url;

use super::css;
use super::{
    attr_mode, parse_srcset, AttrMode, ExtractedLink, LinkKind, JSON_LD_ASSET_KEYS,
    LAZY_ATTRIBUTES, SELECTOR_TABLE, SVG_REF_ATTRIBUTES,
};
use crate::crawl::url_utils::{canonicalize, should_skip};

/// Recursion ceiling for JSON-LD object graphs.
const JSON_LD_MAX_DEPTH: usize = 32;

static COMPILED_TABLE: LazyLock<Vec<(Selector, &'static str, LinkKind, AttrMode)>> =
    LazyLock::new(|| {
        SELECTOR_TABLE
            .iter()
            .filter_map(|(sel, attr, kind, mode)| {
                Selector::parse(sel).ok().map(|s| (s, *attr, *kind, *mode))
            })
            .collect()
    });

static ALL_ELEMENTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("*").expect("universal selector is valid"));
static BASE_HREF: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("base[href]").expect("base selector is valid"));
static STYLE_BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("style").expect("style selector is valid"));
static JSON_LD_SCRIPTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script[type=\"application/ld+json\"]").expect("json-ld selector is valid")
});

/// Ordered, de-duplicated URL candidates collected from one document.
struct Collector {
    base: Url,
    seen: HashSet<String>,
    links: Vec<ExtractedLink>,
}

impl Collector {
    fn add(&mut self, raw: &str, kind: LinkKind, tag: &str, attr: &str) {
        let raw = raw.trim();
        if should_skip(raw) {
            return;
        }
        let resolved = match self.base.join(raw) {
            Ok(u) => u,
            Err(_) => return,
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            return;
        }
        let canonical = match canonicalize(resolved.as_str(), None) {
            Some(c) => c,
            None => return,
        };
        if !self.seen.insert(canonical) {
            return;
        }
        self.links.push(ExtractedLink {
            url: resolved.to_string(),
            kind,
            source_tag: tag.to_string(),
            source_attr: attr.to_string(),
        });
    }
}

/// Extract every URL-bearing construct from an HTML document. `page_url` is
/// the URL the document was fetched from (post-redirect).
pub fn extract_links(html: &str, page_url: &Url) -> Vec<ExtractedLink> {
    let document = Html::parse_document(html);
    let base = effective_base(&document, page_url);

    let mut collector = Collector {
        base,
        seen: HashSet::new(),
        links: Vec::new(),
    };

    // Fixed selector/attribute table
    for (selector, attr, kind, mode) in COMPILED_TABLE.iter() {
        for element in document.select(selector) {
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            let tag = element.value().name();
            match mode {
                AttrMode::Single => collector.add(value, *kind, tag, attr),
                AttrMode::Srcset => {
                    for (url, _descriptor) in parse_srcset(value) {
                        collector.add(&url, *kind, tag, attr);
                    }
                }
            }
        }
    }

    // Lazy-loading attributes, SVG references, and inline style attributes
    // on any element
    for element in document.select(&ALL_ELEMENTS) {
        let tag = element.value().name();

        for attr in LAZY_ATTRIBUTES {
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            match attr_mode(attr) {
                AttrMode::Single => collector.add(value, LinkKind::Asset, tag, attr),
                AttrMode::Srcset => {
                    for (url, _) in parse_srcset(value) {
                        collector.add(&url, LinkKind::Asset, tag, attr);
                    }
                }
            }
        }

        if matches!(tag, "image" | "use") {
            for attr in SVG_REF_ATTRIBUTES {
                if let Some(value) = element.value().attr(attr) {
                    collector.add(value, LinkKind::Asset, tag, attr);
                }
            }
        }

        if let Some(style) = element.value().attr("style") {
            let base = collector.base.clone();
            for link in css::extract_urls(style, &base) {
                collector.add(&link.url, LinkKind::Asset, tag, "style");
            }
        }
    }

    // <style> blocks
    for element in document.select(&STYLE_BLOCKS) {
        let text: String = element.text().collect();
        let base = collector.base.clone();
        for link in css::extract_urls(&text, &base) {
            collector.add(&link.url, LinkKind::Asset, "style", "text");
        }
    }

    // JSON-LD structured data
    for element in document.select(&JSON_LD_SCRIPTS) {
        let text: String = element.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            trace!("ignoring unparseable JSON-LD block");
            continue;
        };
        let mut urls = Vec::new();
        collect_json_ld_urls(&value, 0, &mut urls);
        for url in urls {
            collector.add(&url, LinkKind::Asset, "script", "ld+json");
        }
    }

    collector.links
}

/// The document's effective base URL: a parseable `<base href>` wins,
/// otherwise the page URL itself.
fn effective_base(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE_HREF)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

/// Walk a JSON-LD value collecting asset URLs from the known keys. String
/// values and the `url` field of nested objects count; arrays and objects
/// are recursed with a depth ceiling.
fn collect_json_ld_urls(value: &Value, depth: usize, out: &mut Vec<String>) {
    if depth > JSON_LD_MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                if JSON_LD_ASSET_KEYS.contains(&key.as_str()) {
                    push_json_ld_value(val, out);
                }
                collect_json_ld_urls(val, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_json_ld_urls(item, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn push_json_ld_value(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get("url") {
                out.push(s.clone());
            }
        }
        Value::Array(items) => {
            for item in items {
                push_json_ld_value(item, out);
            }
        }
        _ => {}
    }
}
