//! Scrape command implementation

use crate::browser::{BrowserDriver, ChromeDriver, ChromeOptions};
use crate::cache::{CachePolicy, ContentCache};
use crate::config::Config;
use crate::error::Result;
use crate::harvest::{
    listing_from_config, HarvestSettings, Harvester, LinkSource, Orchestrator, RunContext,
    RunSummary,
};
use crate::progress::harvest_progress_bar;
use crate::store::{RunStatus, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Options for a scrape run
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    /// Ignore cached records, still write fresh ones
    pub force_refresh: bool,
    /// Neither read nor write the cache
    pub no_cache: bool,
    /// Empty the cache before starting
    pub clear_cache: bool,
    /// Overrides `harvest.run_deadline_secs`
    pub deadline: Option<Duration>,
    /// Show the browser window
    pub headed: bool,
    /// Draw a progress bar
    pub progress: bool,
}

impl ScrapeOptions {
    pub fn cache_policy(&self, config: &Config) -> CachePolicy {
        if self.no_cache || !config.cache.enabled {
            CachePolicy::Disabled
        } else if self.force_refresh {
            CachePolicy::Refresh
        } else {
            CachePolicy::ReadWrite
        }
    }
}

/// Result of a scrape run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub run_id: String,
    pub status: RunStatus,
    pub summary: RunSummary,
}

/// Harvest every detail page and store the results.
///
/// Fails only when the listing cannot be read or the database cannot be
/// written at all; per-page problems are part of the report.
pub async fn scrape_and_store_details(
    config: &Config,
    store: &Store,
    driver: Arc<dyn BrowserDriver>,
    listing: &dyn LinkSource,
    ctx: &RunContext,
    options: &ScrapeOptions,
) -> Result<ScrapeReport> {
    let cache = ContentCache::new(&config.paths.cache_dir, options.cache_policy(config));
    if options.clear_cache {
        cache.clear()?;
        info!("Cleared cache at {:?}", cache.root());
    }

    let run = store.start_run().await?;
    info!(run_id = %run.id, policy = ?cache.policy(), "Starting harvest run");

    let harvester = Harvester::new(driver, cache, HarvestSettings::from_config(config));
    let mut orchestrator = Orchestrator::new(listing, &harvester, store, config.harvest.pacing());
    if options.progress {
        orchestrator = orchestrator.with_progress(harvest_progress_bar(0));
    }

    let summary = match orchestrator.run(ctx).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(run_id = %run.id, "Harvest run failed: {}", e);
            if let Err(mark_err) = store.fail_run(&run.id, &e.to_string()).await {
                warn!("Could not record run failure: {}", mark_err);
            }
            return Err(e);
        }
    };

    let status = summary.status();
    store.complete_run(&run.id, status, &summary).await?;

    Ok(ScrapeReport {
        run_id: run.id,
        status,
        summary,
    })
}

/// Run a full scrape with Chrome and the configured listing source
pub async fn cmd_scrape_details(config: &Config, options: ScrapeOptions) -> Result<ScrapeReport> {
    let store = Store::new(&config.paths.db_file).await?;

    let mut chrome = ChromeOptions::from_config(config);
    if options.headed {
        chrome.headless = false;
    }
    let driver: Arc<dyn BrowserDriver> = Arc::new(ChromeDriver::new(chrome));
    let listing = listing_from_config(config, driver.clone())?;

    let ctx = RunContext::with_deadline(
        options
            .deadline
            .unwrap_or_else(|| config.harvest.run_deadline()),
    );

    let result =
        scrape_and_store_details(config, &store, driver.clone(), listing.as_ref(), &ctx, &options)
            .await;
    driver.shutdown().await;
    result
}

/// Print a scrape report to console
pub fn print_scrape_report(report: &ScrapeReport) {
    let summary = &report.summary;
    let mark = match report.status {
        RunStatus::Completed => "✓",
        _ => "⚠",
    };

    println!("\n{} Harvest {} ({})", mark, report.status, report.run_id);
    println!("  Detail pages:   {}", summary.total);
    println!("  From cache:     {}", summary.from_cache);
    println!("  Newly scraped:  {}", summary.newly_scraped);
    println!("  Stored:         {}", summary.persisted);
    println!("  Errors:         {}", summary.errors);
    if summary.stat_errors > 0 {
        println!("  Stat errors:    {}", summary.stat_errors);
    }
    if summary.quality_warnings > 0 {
        println!("  Data warnings:  {}", summary.quality_warnings);
    }
    if summary.deadline_exceeded {
        println!(
            "  Deadline reached after {} of {} pages",
            summary.attempted, summary.total
        );
    }

    if !summary.failures.is_empty() {
        println!("\nFailed pages:");
        for failure in summary.failures.iter().take(20) {
            println!("  {} - {}", failure.url, failure.reason);
        }
        if summary.failures.len() > 20 {
            println!("  ... and {} more", summary.failures.len() - 20);
        }
    }
}
