//! Statistics portal command implementation

use crate::config::Config;
use crate::error::Result;
use crate::harvest::StatisticsSource;
use crate::store::{StatisticsSummary, Store};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of a statistics scrape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub url: String,
    pub scraped: usize,
    pub saved: usize,
    pub summary: StatisticsSummary,
}

/// Fetch the statistics grid and store every row in one batch
pub async fn scrape_and_store_statistics(
    store: &Store,
    source: &StatisticsSource,
) -> Result<StatisticsReport> {
    let rows = source.fetch().await?;
    let saved = store.upsert_statistics(&rows).await?;
    info!(scraped = rows.len(), saved, "Statistics stored");

    Ok(StatisticsReport {
        url: source.url().to_string(),
        scraped: rows.len(),
        saved,
        summary: store.statistics_summary().await?,
    })
}

pub async fn cmd_scrape_statistics(config: &Config) -> Result<StatisticsReport> {
    let store = Store::new(&config.paths.db_file).await?;
    let source = StatisticsSource::from_config(config)?;
    scrape_and_store_statistics(&store, &source).await
}

/// Print a statistics report to console
pub fn print_statistics_report(report: &StatisticsReport) {
    println!("\n✓ Statistics from {}", report.url);
    println!("  Rows scraped:  {}", report.scraped);
    println!("  Rows saved:    {}", report.saved);
    println!("  Rows stored:   {}", report.summary.total_rows);

    if !report.summary.by_year.is_empty() {
        println!("\nBy school year:");
        for year in &report.summary.by_year {
            println!("  {}: {}", year.school_year, year.count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_scrape_and_store_statistics() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(&tmp.path().join("schools.db")).await.unwrap();
        let server = MockServer::start().await;
        let html = r#"<html><body><table id="myDatagrid">
            <tr><td>BSN</td><td>Name</td><td>Schuljahr</td><td>Klassen</td></tr>
            <tr><td>01Y01</td><td>Gymnasium Alpha</td><td>2023/24</td><td>30</td></tr>
            <tr><td>02K03</td><td>Schule Beta</td><td>2023/24</td><td>16</td></tr>
        </table></body></html>"#;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html.as_bytes(), "text/html"))
            .mount(&server)
            .await;

        let source =
            StatisticsSource::new(&server.uri(), "test-agent", Duration::from_secs(5)).unwrap();

        let report = scrape_and_store_statistics(&store, &source).await.unwrap();
        assert_eq!(report.scraped, 2);
        assert_eq!(report.saved, 2);
        assert_eq!(report.summary.total_rows, 2);

        // a second run updates in place
        let report = scrape_and_store_statistics(&store, &source).await.unwrap();
        assert_eq!(report.summary.total_rows, 2);
        assert_eq!(
            store.statistics_for_school("01Y01").await.unwrap()[0].classes,
            "30"
        );
    }
}
