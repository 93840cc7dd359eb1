//! webmirror: browsable offline archives of websites

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use webmirror::config::{Config, Scope};

mod commands;

#[derive(Parser)]
#[command(name = "webmirror")]
#[command(about = "Create browsable offline archives of websites")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "webmirror.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive a website starting from a seed URL
    Crawl {
        /// Seed URL (scheme optional; https is assumed)
        seed: String,

        /// Output directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Page scope: same-host, same-domain, subdomains, or custom
        #[arg(long)]
        scope: Option<String>,

        /// Allowed hosts when --scope custom
        #[arg(long)]
        domain: Vec<String>,

        /// Maximum crawl depth
        #[arg(long)]
        max_depth: Option<u32>,

        /// Maximum number of URLs to enqueue
        #[arg(long)]
        max_pages: Option<usize>,

        /// Concurrent fetches
        #[arg(long)]
        concurrency: Option<usize>,

        /// Baseline delay between requests in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Glob patterns page URLs must match
        #[arg(long)]
        include: Vec<String>,

        /// Glob patterns page URLs must not match
        #[arg(long)]
        exclude: Vec<String>,

        /// Disable depth and page-count ceilings
        #[arg(long)]
        unlimited: bool,

        /// Skip robots.txt directives
        #[arg(long)]
        no_robots: bool,

        /// Fixed User-Agent (default: rotation pool)
        #[arg(long)]
        user_agent: Option<String>,

        /// Cookies for the seed host ("name=value; other=value")
        #[arg(long)]
        cookies: Option<String>,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Crawl {
            seed,
            output,
            scope,
            domain,
            max_depth,
            max_pages,
            concurrency,
            delay_ms,
            include,
            exclude,
            unlimited,
            no_robots,
            user_agent,
            cookies,
        } => {
            let mut config = config;
            if let Some(scope) = scope {
                config.crawl.scope = parse_scope(&scope)?;
            }
            if !domain.is_empty() {
                config.crawl.custom_domains = domain;
            }
            if let Some(depth) = max_depth {
                config.crawl.max_depth = depth;
            }
            if let Some(pages) = max_pages {
                config.crawl.max_pages = pages;
            }
            if let Some(n) = concurrency {
                config.crawl.concurrency = n;
            }
            if let Some(delay) = delay_ms {
                config.crawl.delay_ms = delay;
            }
            if !include.is_empty() {
                config.crawl.include_paths = include;
            }
            if !exclude.is_empty() {
                config.crawl.exclude_paths = exclude;
            }
            if unlimited {
                config.crawl.unlimited = true;
            }
            if no_robots {
                config.crawl.respect_robots_txt = false;
            }
            if user_agent.is_some() {
                config.crawl.user_agent = user_agent;
            }
            if cookies.is_some() {
                config.crawl.cookies = cookies;
            }

            let seed = if seed.contains("://") {
                seed
            } else {
                format!("https://{}", seed)
            };

            commands::crawl_site(config, seed, output).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => {
                Config::write_default(&cli.config)?;
                println!("Wrote default configuration to {}", cli.config.display());
                Ok(())
            }
        },
    }
}

fn parse_scope(value: &str) -> Result<Scope> {
    match value {
        "same-host" => Ok(Scope::SameHost),
        "same-domain" => Ok(Scope::SameDomain),
        "subdomains" => Ok(Scope::Subdomains),
        "custom" => Ok(Scope::Custom),
        other => anyhow::bail!(
            "unknown scope '{}'; expected same-host, same-domain, subdomains, or custom",
            other
        ),
    }
}
