//! Integration tests for webmirror
//!
//! These exercise the offline pipeline end-to-end without a network:
//! extract links from fixture HTML, register them, store bytes, and verify
//! the rewrite pass produces a self-contained local tree.

use tempfile::TempDir;
use url::Url;

use webmirror::config::CrawlConfig;
use webmirror::crawl::extract::{css, html, LinkKind};
use webmirror::crawl::rewrite::rewrite_html;
use webmirror::crawl::{Frontier, PathRegistry, Storage};

const FIXTURE_PAGE: &str = r#"<!doctype html>
<html>
<head>
  <link rel="stylesheet" href="/s.css">
  <style>body { background: url(/bg.jpg); }</style>
</head>
<body>
  <a href="/b">next page</a>
  <img src="//cdn.test/a.png">
</body>
</html>"#;

fn lookup_in(registry: &PathRegistry) -> impl Fn(&str) -> Option<String> + '_ {
    move |url| registry.lookup(url).map(str::to_string)
}

/// Scenario: a single page fans out into one stylesheet, one cross-host
/// image, one inline-CSS background, and one anchor. After registration
/// and rewriting, every mapped reference is relative and the anchor to the
/// unfetched page is untouched.
#[tokio::test]
async fn test_single_page_asset_fan_out() {
    let seed = Url::parse("https://example.test/").unwrap();
    let links = html::extract_links(FIXTURE_PAGE, &seed);

    let pages: Vec<_> = links.iter().filter(|l| l.kind == LinkKind::Page).collect();
    let assets: Vec<_> = links.iter().filter(|l| l.kind == LinkKind::Asset).collect();
    assert_eq!(pages.len(), 1);
    assert_eq!(assets.len(), 3);

    let mut registry = PathRegistry::new();
    let page_path = registry.register(seed.as_str()).unwrap();
    assert_eq!(page_path, "example.test/index.html");
    for asset in &assets {
        registry.register(&asset.url).unwrap();
    }
    // The anchor target was never fetched: no registration

    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("job"), 10 * 1024 * 1024);
    storage.init().await.unwrap();
    storage
        .write(&page_path, FIXTURE_PAGE.as_bytes())
        .await
        .unwrap();

    let stored = storage.read(&page_path).await.unwrap();
    let content = String::from_utf8(stored).unwrap();
    let rewritten = rewrite_html(&content, &seed, &page_path, &lookup_in(&registry)).unwrap();
    storage
        .write(&page_path, rewritten.as_bytes())
        .await
        .unwrap();

    let final_html = String::from_utf8(storage.read(&page_path).await.unwrap()).unwrap();
    // Same-host targets rewrite to bare siblings, the cross-host asset to
    // its own host directory
    assert!(final_html.contains(r#"href="s.css""#));
    assert!(final_html.contains(r#"src="../cdn.test/a.png""#));
    assert!(final_html.contains("url('bg.jpg')"));
    // Unfetched page link stays as-is
    assert!(final_html.contains(r#"href="/b""#));
}

/// Scenario: a redirect from /p to /q must leave both canonical URLs
/// mapped to the single file holding /q's content, so links to either
/// rewrite to the same place.
#[test]
fn test_redirect_preserves_linkability() {
    let mut registry = PathRegistry::new();
    let final_path = registry.register("https://a.test/q").unwrap();
    registry.register_alias("https://a.test/p", &final_path).unwrap();

    assert_eq!(registry.lookup("https://a.test/p"), Some(final_path.as_str()));
    assert_eq!(registry.lookup("https://a.test/q"), Some(final_path.as_str()));

    let second_page = r#"<a href="/p">old link</a><a href="/q">new link</a>"#;
    let page_url = Url::parse("https://a.test/other").unwrap();
    let out = rewrite_html(
        second_page,
        &page_url,
        "a.test/other.html",
        &lookup_in(&registry),
    )
    .unwrap();

    // Both anchors point at the single file holding /q's content, as a
    // same-host sibling reference
    assert_eq!(out.matches(r#"href="q.html""#).count(), 2);
}

/// Scenario: srcset rewriting is per-URL. A fetched entry is rewritten,
/// an unfetched one keeps its original URL, and both descriptors survive.
#[test]
fn test_srcset_fidelity_with_partial_mapping() {
    let mut registry = PathRegistry::new();
    registry.register("https://cdn.test/a.png").unwrap();

    let page = r#"<img srcset="//cdn.test/a.png 1x, //cdn.test/b.png 2x">"#;
    let page_url = Url::parse("https://example.test/").unwrap();
    let out = rewrite_html(page, &page_url, "example.test/index.html", &lookup_in(&registry)).unwrap();

    assert!(out.contains(r#"srcset="../cdn.test/a.png 1x, //cdn.test/b.png 2x""#));
}

/// Scenario: a cross-host anchor is rejected by the frontier while a
/// cross-host image is admitted.
#[test]
fn test_scope_gates_pages_but_not_assets() {
    let seed = Url::parse("https://a.test/").unwrap();
    let mut frontier = Frontier::new(seed, CrawlConfig::default());

    assert!(!frontier.add_page("https://b.test/", Some("https://a.test/"), 1));
    assert!(frontier.add_asset("https://b.test/logo.png", Some("https://a.test/"), 1));
}

/// A stylesheet fetched from its own URL resolves relative references
/// against itself, and rewritten targets are relative to the sheet's own
/// local path.
#[test]
fn test_css_roundtrip_resolves_against_sheet() {
    let sheet_url = Url::parse("https://example.test/css/site.css").unwrap();
    let sheet = "@import \"base.css\";\nbody { background: url(../img/bg.png); }";

    let found = css::extract_urls(sheet, &sheet_url);
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].url, "https://example.test/css/base.css");
    assert_eq!(found[1].url, "https://example.test/img/bg.png");

    let mut registry = PathRegistry::new();
    for link in &found {
        registry.register(&link.url).unwrap();
    }

    let sheet_path = "example.test/css/site.css";
    let lookup = |absolute: &str| {
        registry
            .lookup(absolute)
            .map(|local| PathRegistry::relative(sheet_path, local))
    };
    let out = css::rewrite_urls(sheet, &sheet_url, &lookup);
    assert!(out.contains("'base.css'"));
    assert!(out.contains("url('../img/bg.png')"));
}

/// Storage never exceeds its ceiling, and every stored file is listed
/// relative to the sandbox root.
#[tokio::test]
async fn test_storage_ceiling_and_listing() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("job"), 64);
    storage.init().await.unwrap();

    storage.write("a.test/index.html", &[b'x'; 40]).await.unwrap();
    assert!(storage.write("a.test/big.bin", &[b'y'; 40]).await.is_err());
    assert!(storage.stats().total_bytes <= 64);

    let files = storage.list_files();
    assert_eq!(files, vec!["a.test/index.html".to_string()]);
}

/// Registering the same canonical URL twice (here via case and fragment
/// variations) always yields the same local path.
#[test]
fn test_registry_idempotence_across_variants() {
    let mut registry = PathRegistry::new();
    let a = registry.register("https://Example.test/Page?b=2&a=1").unwrap();
    let b = registry.register("https://example.test/Page?a=1&b=2#sec").unwrap();
    assert_eq!(a, b);
    assert_eq!(registry.len(), 1);
}
