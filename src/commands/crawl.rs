//! Crawl command: run one archive job to completion in the foreground

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use webmirror::config::Config;
use webmirror::crawl::{CrawlEngine, CrawlEvent};
use webmirror::util::truncate_for_display;

pub async fn crawl_site(config: Config, seed: String, output: Option<PathBuf>) -> Result<()> {
    let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
    let job_id = Uuid::new_v4();

    info!("Starting crawl {} of {}", job_id, seed);

    let engine = Arc::new(
        CrawlEngine::new(job_id, &seed, config.crawl, &output_dir)
            .context("Failed to create crawl engine")?,
    );

    // Ctrl-C cancels the run; in-flight requests stop at the next I/O
    // boundary and the rewrite pass is skipped
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling crawl");
                engine.cancel();
            }
        });
    }

    // Progress line driven by the event stream
    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CrawlEvent::Progress { snapshot, .. }) => {
                    let current = snapshot
                        .current_url
                        .map(|u| truncate_for_display(&u, 60))
                        .unwrap_or_default();
                    print!(
                        "\r{} pages, {} assets, {} KiB, {} queued, {} errors  {}        ",
                        snapshot.pages_processed,
                        snapshot.assets_processed,
                        snapshot.bytes_downloaded / 1024,
                        snapshot.queue.pending,
                        snapshot.errors,
                        current,
                    );
                    let _ = std::io::stdout().flush();
                }
                Ok(CrawlEvent::JobCompleted { .. }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = engine.start().await.context("Crawl failed")?;
    let _ = printer.await;
    println!();

    println!(
        "Archived {} pages and {} assets ({} KiB) in {:.1?}",
        result.pages,
        result.assets,
        result.bytes / 1024,
        result.duration
    );
    println!("Archive root: {}", engine.storage().root().display());

    if result.cancelled {
        println!("Run was cancelled; the archive is incomplete and unrewritten.");
    }
    if !result.errors.is_empty() {
        println!("{} URL(s) failed:", result.errors.len());
        for record in result.errors.iter().take(10) {
            println!("  [{}] {}: {}", record.code, record.url, truncate_for_display(&record.message, 80));
        }
        if result.errors.len() > 10 {
            println!("  ... and {} more", result.errors.len() - 10);
        }
    }

    Ok(())
}
