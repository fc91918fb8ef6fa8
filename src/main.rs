//! Quarry command-line entry point
//!
//! A thin driver over the library: load config, open the cache, then run
//! whichever maintenance steps and fetches were asked for.

use anyhow::{bail, Context};
use clap::Parser;
use quarry::cache::CacheStore;
use quarry::config::{load_config_with_hash, Config};
use quarry::scraper::{extract_title, ConcurrencyGovernor, ScrapeEngine, ScrapeOptions, Strategy};
use quarry::RateLimiter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

/// Quarry: stealth fetch-and-cache for product pages
#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(version)]
#[command(about = "Fetch and cache product pages", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to fetch (cache first)
    #[arg(value_name = "URLS")]
    urls: Vec<String>,

    /// Fetch method: auto, direct or remote
    #[arg(short, long, default_value = "auto")]
    method: Strategy,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show cache statistics
    #[arg(long)]
    stats: bool,

    /// Remove entries older than the configured retention
    #[arg(long)]
    sweep: bool,

    /// Seed the cache from the configured import source
    #[arg(long)]
    import: bool,

    /// With --import, overwrite entries that already exist
    #[arg(long, requires = "import")]
    force: bool,

    /// Write the cache index to a CSV file
    #[arg(long, value_name = "PATH")]
    export_manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let cache = Arc::new(CacheStore::open(&config.cache.directory)?);

    if cli.import {
        handle_import(&config, &cache, cli.force).await?;
    }
    if cli.sweep {
        handle_sweep(&config, &cache).await?;
    }
    if !cli.urls.is_empty() {
        handle_fetch(&config, cache.clone(), cli.urls, cli.method).await?;
    }
    if let Some(path) = &cli.export_manifest {
        let written = cache.export_manifest(path)?;
        println!("✓ Exported {} entries to {}", written, path.display());
    }
    if cli.stats {
        print_stats(&cache)?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("quarry=info,warn"),
            1 => EnvFilter::new("quarry=debug,info"),
            2 => EnvFilter::new("quarry=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn handle_import(config: &Config, cache: &CacheStore, force: bool) -> anyhow::Result<()> {
    let Some(source) = &config.cache.import_source else {
        bail!("--import needs cache.import-source in the config");
    };
    let imported = cache.import_from(source, force).await?;
    println!("✓ Imported {} pages from {}", imported, source.display());
    Ok(())
}

async fn handle_sweep(config: &Config, cache: &CacheStore) -> anyhow::Result<()> {
    let Some(days) = config.cache.retention_days else {
        bail!("--sweep needs cache.retention-days in the config");
    };
    let removed = cache.sweep(days).await?;
    println!("✓ Removed {} entries older than {} days", removed, days);
    Ok(())
}

async fn handle_fetch(
    config: &Config,
    cache: Arc<CacheStore>,
    urls: Vec<String>,
    strategy: Strategy,
) -> anyhow::Result<()> {
    let limiter = Arc::new(RateLimiter::from_overrides(&config.rate_limits));
    let governor = ConcurrencyGovernor::new(config.remote.max_concurrent);
    let engine = Arc::new(ScrapeEngine::from_config(config, limiter, governor)?);

    let mut tasks = JoinSet::new();
    for url in urls {
        let engine = engine.clone();
        let cache = cache.clone();
        tasks.spawn(async move {
            engine
                .fetch(&cache, &url, strategy, &ScrapeOptions::default())
                .await
        });
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.context("fetch task panicked")?;
        if outcome.success {
            let title = outcome
                .content
                .as_deref()
                .and_then(extract_title)
                .unwrap_or_default();
            println!(
                "✓ {} [{} {}] {:.1}s {}",
                outcome.url,
                outcome.final_method,
                outcome.status_code.unwrap_or_default(),
                outcome.scrape_time.as_secs_f64(),
                title
            );
        } else {
            failed += 1;
            println!(
                "✗ {} [{}] {}",
                outcome.url,
                outcome.final_method,
                outcome.error_reason.as_deref().unwrap_or("unknown error")
            );
        }
        for issue in &outcome.page_issues {
            tracing::debug!(url = %outcome.url, "Page issue: {}", issue.as_str());
        }
    }

    if failed > 0 {
        tracing::warn!("{} URL(s) could not be fetched", failed);
    }
    Ok(())
}

fn print_stats(cache: &CacheStore) -> anyhow::Result<()> {
    let stats = cache.stats(5)?;

    println!("=== Cache Statistics ===\n");
    println!("Directory: {}", cache.directory().display());
    println!("Entries: {}", stats.total_entries);
    println!("  Imported: {}", stats.imported_entries);
    println!("  Scraped: {}", stats.scraped_entries);
    println!("Total size: {} bytes", stats.total_bytes);
    println!("In memory: {}", stats.memory_entries);
    if let (Some(oldest), Some(newest)) = (stats.oldest_entry, stats.newest_entry) {
        println!("Oldest: {}", oldest.to_rfc3339());
        println!("Newest: {}", newest.to_rfc3339());
    }

    if !stats.most_accessed.is_empty() {
        println!("\nMost accessed:");
        for (url, count) in &stats.most_accessed {
            println!("  {:>5}  {}", count, url);
        }
    }

    Ok(())
}
