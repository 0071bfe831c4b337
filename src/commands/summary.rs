//! Summary and status commands

use crate::browser::is_browser_available;
use crate::cache::{CachePolicy, ContentCache};
use crate::config::Config;
use crate::error::Result;
use crate::store::{DetailSummary, HarvestRun, Store};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Counts read back from the stored details
pub async fn cmd_summary(store: &Store) -> Result<DetailSummary> {
    info!("Reading detail summary");
    store.get_summary().await
}

/// Print the detail summary to console
pub fn print_summary(summary: &DetailSummary) {
    println!("\n🏫 Stored schools\n");
    println!("  Total:                      {}", summary.total_schools);
    println!(
        "  Entry after grade 4:        {}",
        summary.available_after_4th_grade
    );
    println!(
        "  No entry after grade 4:     {}",
        summary.not_available_after_4th_grade
    );
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub cache_dir: String,
    pub listing_url: String,
    pub cache_enabled: bool,
    pub cached_records: usize,
    pub browser_available: bool,
    pub summary: DetailSummary,
    pub last_run: Option<HarvestRun>,
}

/// Get system status
pub async fn cmd_status(config: &Config, store: &Store) -> Result<StatusInfo> {
    info!("Getting status");

    let cache = ContentCache::new(&config.paths.cache_dir, CachePolicy::ReadWrite);

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        cache_dir: config.paths.cache_dir.display().to_string(),
        listing_url: config.listing_url.clone(),
        cache_enabled: config.cache.enabled,
        cached_records: cache.entry_count(),
        browser_available: is_browser_available(),
        summary: store.get_summary().await?,
        last_run: store.latest_run().await?,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 schoolharvest Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Listing: {}", status.listing_url);

    println!("\nCache:");
    println!("  Directory: {}", status.cache_dir);
    println!(
        "  Status: {}",
        if status.cache_enabled { "enabled" } else { "disabled" }
    );
    println!("  Records: {}", status.cached_records);

    let browser = if status.browser_available {
        "✓ Built with Chrome support"
    } else {
        "✗ Built without the 'browser' feature"
    };
    println!("\nBrowser: {}", browser);

    println!("\nStored schools: {}", status.summary.total_schools);
    println!(
        "  Entry after grade 4: {}",
        status.summary.available_after_4th_grade
    );

    match &status.last_run {
        Some(run) => {
            println!("\nLast run: {} ({})", run.started_at, run.status);
            println!(
                "  Links: {}, cached: {}, scraped: {}, stored: {}, errors: {}",
                run.total_links, run.from_cache, run.newly_scraped, run.persisted, run.errors
            );
            if let Some(done) = &run.completed_at {
                println!("  Finished: {}", done);
            }
        }
        None => println!("\nNo harvest runs yet. Run 'schoolharvest scrape'."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SchoolRecord;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_on_fresh_install() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        let store = Store::new(&config.paths.db_file).await.unwrap();

        let status = cmd_status(&config, &store).await.unwrap();
        assert_eq!(status.cached_records, 0);
        assert_eq!(status.summary.total_schools, 0);
        assert!(status.last_run.is_none());
    }

    #[tokio::test]
    async fn test_summary_reflects_store() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(&tmp.path().join("schools.db")).await.unwrap();

        let mut record = SchoolRecord::new("https://example.com/a", Utc::now());
        record.school_number = "01A01".to_string();
        record.available_after_4th_grade = true;
        store.upsert_detail(&record).await.unwrap();

        let summary = cmd_summary(&store).await.unwrap();
        assert_eq!(summary.total_schools, 1);
        assert_eq!(summary.available_after_4th_grade, 1);
        assert_eq!(summary.not_available_after_4th_grade, 0);
    }
}
