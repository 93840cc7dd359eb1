//! Link extraction from fetched documents
//!
//! The HTML selector/attribute table lives here as plain data: both the
//! extractor (scraper-based, read-only) and the rewriter (lol_html,
//! streaming) consume the same table, so a construct is rewritten iff it
//! was extracted.

pub mod css;
pub mod html;

/// Navigational role of an extracted URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Anchor targets and framed documents; subject to scope rules
    Page,
    /// Everything required to render: stylesheets, scripts, images, fonts,
    /// media, documents; fetched regardless of host
    Asset,
}

/// How an attribute's value encodes URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrMode {
    /// The whole value is one URL
    Single,
    /// Comma-separated srcset list; each entry is a URL plus an optional
    /// size/density descriptor
    Srcset,
}

/// A URL found in a document, resolved to absolute form.
#[derive(Debug, Clone)]
pub struct ExtractedLink {
    pub url: String,
    pub kind: LinkKind,
    pub source_tag: String,
    pub source_attr: String,
}

/// The fixed selector/attribute table. `source[...]` rows deliberately
/// match both `picture > source` and media `source` children.
pub const SELECTOR_TABLE: &[(&str, &str, LinkKind, AttrMode)] = &[
    // Navigation
    ("a[href]", "href", LinkKind::Page, AttrMode::Single),
    ("iframe[src]", "src", LinkKind::Page, AttrMode::Single),
    ("frame[src]", "src", LinkKind::Page, AttrMode::Single),
    // Stylesheets
    ("link[rel=\"stylesheet\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    ("link[rel=\"preload\"][as=\"style\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    // Scripts
    ("script[src]", "src", LinkKind::Asset, AttrMode::Single),
    // Images
    ("img[src]", "src", LinkKind::Asset, AttrMode::Single),
    ("img[srcset]", "srcset", LinkKind::Asset, AttrMode::Srcset),
    ("source[srcset]", "srcset", LinkKind::Asset, AttrMode::Srcset),
    ("source[src]", "src", LinkKind::Asset, AttrMode::Single),
    ("input[type=\"image\"][src]", "src", LinkKind::Asset, AttrMode::Single),
    ("link[rel=\"preload\"][as=\"image\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    ("link[rel=\"preload\"][as=\"image\"][imagesrcset]", "imagesrcset", LinkKind::Asset, AttrMode::Srcset),
    // Icons and manifest
    ("link[rel=\"icon\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    ("link[rel=\"shortcut icon\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    ("link[rel=\"apple-touch-icon\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    ("link[rel=\"apple-touch-icon-precomposed\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    ("link[rel=\"mask-icon\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    ("link[rel=\"manifest\"][href]", "href", LinkKind::Asset, AttrMode::Single),
    // Media
    ("video[src]", "src", LinkKind::Asset, AttrMode::Single),
    ("video[poster]", "poster", LinkKind::Asset, AttrMode::Single),
    ("audio[src]", "src", LinkKind::Asset, AttrMode::Single),
    // Objects and embeds
    ("object[data]", "data", LinkKind::Asset, AttrMode::Single),
    ("embed[src]", "src", LinkKind::Asset, AttrMode::Single),
    // Social and structured-data meta
    ("meta[property=\"og:image\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[property=\"og:image:secure_url\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[property=\"og:video\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[property=\"og:audio\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[name=\"twitter:image\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[name=\"twitter:image:src\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[name=\"twitter:player\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[name=\"twitter:player:stream\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[itemprop=\"image\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[itemprop=\"thumbnailUrl\"][content]", "content", LinkKind::Asset, AttrMode::Single),
    ("meta[itemprop=\"contentUrl\"][content]", "content", LinkKind::Asset, AttrMode::Single),
];

/// Lazy-loading attributes used by image/content frameworks, mined on any
/// element. Names ending in `srcset` carry srcset lists.
pub const LAZY_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-srcset",
    "data-lazy-src",
    "data-lazy-srcset",
    "data-original",
    "data-lazy",
    "data-bg",
    "data-image",
    "data-full",
    "data-large",
    "data-hi-res",
    "data-zoom-image",
    "data-echo",
    "data-unveiled",
    "data-background",
    "data-background-image",
    "data-bg-src",
    "data-image-src",
    "data-thumb",
    "data-poster",
    "data-src-retina",
];

/// SVG reference attributes checked on `<image>` and `<use>` elements.
pub const SVG_REF_ATTRIBUTES: &[&str] = &["href", "xlink:href"];

/// JSON-LD object keys whose string values (or nested `url` fields) name
/// assets.
pub const JSON_LD_ASSET_KEYS: &[&str] = &[
    "image",
    "logo",
    "thumbnail",
    "thumbnailUrl",
    "photo",
    "primaryImageOfPage",
    "contentUrl",
];

/// Whether an attribute name carries a srcset-style value.
pub fn attr_mode(attr: &str) -> AttrMode {
    if attr.ends_with("srcset") {
        AttrMode::Srcset
    } else {
        AttrMode::Single
    }
}

/// Split a srcset value into (URL, descriptor) entries. The URL is the
/// leading non-whitespace run of each comma-separated segment; the
/// descriptor is whatever follows, retained verbatim for rewriting.
pub fn parse_srcset(value: &str) -> Vec<(String, Option<String>)> {
    value
        .split(',')
        .filter_map(|segment| {
            let segment = segment.trim();
            if segment.is_empty() {
                return None;
            }
            match segment.split_once(char::is_whitespace) {
                Some((url, descriptor)) => {
                    Some((url.to_string(), Some(descriptor.trim().to_string())))
                }
                None => Some((segment.to_string(), None)),
            }
        })
        .collect()
}

/// Rebuild a srcset value, mapping each URL through `f` (identity when `f`
/// returns `None`). Descriptors are preserved and entries rejoined with
/// `", "`.
pub fn rewrite_srcset(value: &str, f: &dyn Fn(&str) -> Option<String>) -> String {
    parse_srcset(value)
        .into_iter()
        .map(|(url, descriptor)| {
            let mapped = f(&url).unwrap_or(url);
            match descriptor {
                Some(d) => format!("{} {}", mapped, d),
                None => mapped,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srcset() {
        let entries = parse_srcset("a.png 1x, b.png 2x,c.png");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ("a.png".to_string(), Some("1x".to_string())));
        assert_eq!(entries[1], ("b.png".to_string(), Some("2x".to_string())));
        assert_eq!(entries[2], ("c.png".to_string(), None));
    }

    #[test]
    fn test_parse_srcset_width_descriptors() {
        let entries = parse_srcset("small.jpg 480w, large.jpg 1080w");
        assert_eq!(entries[0].1.as_deref(), Some("480w"));
        assert_eq!(entries[1].1.as_deref(), Some("1080w"));
    }

    #[test]
    fn test_rewrite_srcset_partial_mapping() {
        let out = rewrite_srcset("a.png 1x, b.png 2x", &|url| {
            if url == "a.png" {
                Some("../cdn.test/a.png".to_string())
            } else {
                None
            }
        });
        assert_eq!(out, "../cdn.test/a.png 1x, b.png 2x");
    }

    #[test]
    fn test_attr_mode() {
        assert_eq!(attr_mode("srcset"), AttrMode::Srcset);
        assert_eq!(attr_mode("data-lazy-srcset"), AttrMode::Srcset);
        assert_eq!(attr_mode("src"), AttrMode::Single);
    }
}
