//! CLI command implementations

mod crawl;

pub use crawl::crawl_site;
