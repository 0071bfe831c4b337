//! Debugging helpers for single pages

use crate::browser::{BrowserDriver, ChromeDriver, ChromeOptions};
use crate::cache::{CachePolicy, ContentCache};
use crate::config::Config;
use crate::error::Result;
use crate::extract::{
    normalize_record, parse_table, probe_tables, quality_warnings, select_visible_table,
    DataQualityWarning, VisibilityStrategy,
};
use crate::harvest::{HarvestSettings, Harvester};
use crate::models::{RawTable, SchoolRecord, StatRecords};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One live page, as the harvester sees it
#[derive(Debug, Clone, Serialize)]
pub struct PageInspection {
    pub record: SchoolRecord,
    pub stats: Vec<StatRecords>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Scrape `url` live, bypassing the cache, without storing anything
pub async fn inspect_page(
    config: &Config,
    driver: Arc<dyn BrowserDriver>,
    url: &str,
) -> Result<PageInspection> {
    let cache = ContentCache::new(&config.paths.cache_dir, CachePolicy::Disabled);
    let harvester = Harvester::new(driver, cache, HarvestSettings::from_config(config));
    let record = harvester.scrape(url).await?;

    let stats = normalize_record(&record);
    let warnings = stats.iter().flat_map(quality_warnings).collect();
    Ok(PageInspection {
        record,
        stats,
        warnings,
    })
}

pub async fn cmd_inspect(config: &Config, url: &str, headed: bool) -> Result<PageInspection> {
    info!("Inspecting {}", url);

    let mut options = ChromeOptions::from_config(config);
    if headed {
        options.headless = false;
    }
    let driver: Arc<dyn BrowserDriver> = Arc::new(ChromeDriver::new(options));
    let result = inspect_page(config, driver.clone(), url).await;
    driver.shutdown().await;
    result
}

/// Print a page inspection to console
pub fn print_page_inspection(inspection: &PageInspection) {
    let record = &inspection.record;
    println!("\n🔎 {}\n", record.school_url);
    println!("Name:    {}", record.school_name);
    println!("Number:  {}", record.school_number);
    println!(
        "Entry after grade 4: {}",
        if record.available_after_4th_grade { "yes" } else { "no" }
    );

    let fields = [
        ("Languages", &record.languages),
        ("Courses", &record.courses),
        ("Offerings", &record.offerings),
        ("Notes", &record.additional_info),
        ("Equipment", &record.equipment),
        ("Clubs", &record.working_groups),
        ("Partners", &record.partners),
        ("Differentiation", &record.differentiation),
        ("Lunch", &record.lunch_info),
        ("Dual learning", &record.dual_learning),
    ];
    for (label, value) in fields {
        if !value.is_empty() {
            println!("{}: {}", label, value);
        }
    }

    println!("\nStatistics:");
    if inspection.stats.is_empty() {
        println!("  (none found)");
    }
    for stats in &inspection.stats {
        println!("  {}: {} rows", stats.category(), stats.len());
    }

    if !inspection.warnings.is_empty() {
        println!("\nData warnings:");
        for warning in &inspection.warnings {
            println!(
                "  [{}] {}: {}",
                warning.category, warning.subject, warning.message
            );
        }
    }
}

/// One `<table>` of a saved page
#[derive(Debug, Clone, Serialize)]
pub struct TableInspection {
    pub index: usize,
    pub offset_visible: bool,
    pub display: String,
    pub visibility: String,
    pub row_count: usize,
    pub table: Option<RawTable>,
}

/// Visibility decision over a saved page
#[derive(Debug, Clone, Serialize)]
pub struct HtmlInspection {
    pub tables: Vec<TableInspection>,
    pub selected: Option<usize>,
    pub strategy: Option<VisibilityStrategy>,
}

/// Run the static visibility probe and table parser over an HTML file
pub fn cmd_inspect_html(path: &Path) -> Result<HtmlInspection> {
    let html = std::fs::read_to_string(path)?;
    Ok(inspect_html(&html))
}

pub fn inspect_html(html: &str) -> HtmlInspection {
    let candidates = probe_tables(html);
    let selection = select_visible_table(&candidates);
    let selected = selection.map(|s| s.candidate.index);
    let strategy = selection.map(|s| s.strategy);

    let tables = candidates
        .iter()
        .map(|c| TableInspection {
            index: c.index,
            offset_visible: c.offset_visible,
            display: c.display.clone(),
            visibility: c.visibility.clone(),
            row_count: c.row_count,
            table: parse_table(&c.html),
        })
        .collect();

    HtmlInspection {
        tables,
        selected,
        strategy,
    }
}

/// Print an HTML inspection to console
pub fn print_html_inspection(inspection: &HtmlInspection) {
    println!("\nFound {} tables\n", inspection.tables.len());
    for table in &inspection.tables {
        let marker = if Some(table.index) == inspection.selected {
            "→"
        } else {
            " "
        };
        println!(
            "{} #{} rows={} offset_visible={} display={} visibility={}",
            marker,
            table.index,
            table.row_count,
            table.offset_visible,
            table.display,
            table.visibility
        );
        if let Some(raw) = &table.table {
            println!("    headers: {}", raw.headers.join(" | "));
            for row in raw.rows.iter().take(3) {
                println!("    {}", row.join(" | "));
            }
        }
    }

    match inspection.strategy {
        Some(strategy) => println!("\n✓ Selected by {:?}", strategy),
        None => println!("\n✗ No table qualifies"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeDriver, FakePage};
    use crate::browser::title_selector;
    use crate::harvest::DetailField;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_html_marks_visible_table() {
        let html = r#"<html><body>
            <div style="display:none"><table><tr><td>hidden</td></tr></table></div>
            <table><tr><th>Land</th><th>w</th><th>m</th><th>ges</th></tr>
                   <tr><td>Polen</td><td>1</td><td>2</td><td>3</td></tr></table>
        </body></html>"#;

        let inspection = inspect_html(html);
        assert_eq!(inspection.tables.len(), 2);
        assert_eq!(inspection.selected, Some(1));
        assert_eq!(
            inspection.strategy,
            Some(VisibilityStrategy::ByOffsetVisibility)
        );
        let table = inspection.tables[1].table.as_ref().unwrap();
        assert_eq!(table.rows, vec![vec!["Polen", "1", "2", "3"]]);
    }

    #[tokio::test]
    async fn test_inspect_page_bypasses_cache() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        config.harvest.tab_settle_ms = 0;
        config.harvest.category_settle_ms = 0;

        let url = "https://example.com/detail";
        let citizenship = probe_tables(
            "<table><tr><th>Land</th><th>w</th><th>m</th><th>ges</th></tr>\
             <tr><td>Polen</td><td>1</td><td>2</td><td>4</td></tr></table>",
        );
        let driver = FakeDriver::new().page(
            url,
            FakePage::new()
                .text(&DetailField::NameAndNumber.element_id(), "Alpha - 01A01")
                .panel(&title_selector("Staatsangehörigkeit"), citizenship),
        );

        let inspection = inspect_page(&config, Arc::new(driver), url).await.unwrap();
        assert_eq!(inspection.record.school_number, "01A01");
        assert_eq!(inspection.stats.len(), 1);
        assert_eq!(inspection.warnings.len(), 1);

        let cache = ContentCache::new(&config.paths.cache_dir, CachePolicy::ReadWrite);
        assert_eq!(cache.entry_count(), 0);
    }
}
