//! Harvesting school detail pages
//!
//! This module handles:
//! - Reading one detail page into a [`SchoolRecord`] (scalar fields first,
//!   then the four statistics tabs)
//! - Cache lookups and write-back around live scrapes
//! - Discovering detail pages from the listing ([`listing`])
//! - Driving a full run with pacing and a deadline ([`orchestrator`])
//! - The per-school grid of the statistics portal ([`statistics`])

pub mod listing;
pub mod orchestrator;
pub mod statistics;

pub use listing::*;
pub use orchestrator::*;
pub use statistics::*;

use crate::browser::{
    element_text_script, eval_json, eval_string, title_selector, with_page, BrowserDriver,
    PageSession,
};
use crate::cache::ContentCache;
use crate::config::Config;
use crate::error::{BrowserError, BrowserResult};
use crate::extract::{parse_table, select_visible_table, TableCandidate, TABLE_PROBE_SCRIPT};
use crate::models::{RawTable, SchoolRecord, StatCategory};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Phrase marking schools that take entrants after grade four
pub const AFTER_4TH_GRADE_MARKER: &str = "ab Jahrgangsstufe 5 beginnende";

/// Tab revealing the statistics panel
pub const STATISTICS_NAV_SELECTOR: &str = "#NaviSchuelerschaft";

/// Common prefix of the detail page's label ids
pub const FIELD_ID_PREFIX: &str = "ContentPlaceHolderMenuListe_";

/// Scalar fields on a detail page, in extraction order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailField {
    NameAndNumber,
    Languages,
    Courses,
    Offerings,
    AdditionalInfo,
    Equipment,
    WorkingGroups,
    Partners,
    Differentiation,
    Lunch,
    DualLearning,
}

impl DetailField {
    pub const ALL: [DetailField; 11] = [
        DetailField::NameAndNumber,
        DetailField::Languages,
        DetailField::Courses,
        DetailField::Offerings,
        DetailField::AdditionalInfo,
        DetailField::Equipment,
        DetailField::WorkingGroups,
        DetailField::Partners,
        DetailField::Differentiation,
        DetailField::Lunch,
        DetailField::DualLearning,
    ];

    fn label(&self) -> &'static str {
        match self {
            DetailField::NameAndNumber => "lblSchulname",
            DetailField::Languages => "lblSprachen",
            DetailField::Courses => "lblLeistungskurse",
            DetailField::Offerings => "lblAngebote",
            DetailField::AdditionalInfo => "lblBemerkungenSchulzweig",
            DetailField::Equipment => "lblAusstattung",
            DetailField::WorkingGroups => "lblAGs",
            DetailField::Partners => "lblPartner",
            DetailField::Differentiation => "lblDiff",
            DetailField::Lunch => "lblMittag",
            DetailField::DualLearning => "lblDualesLernen",
        }
    }

    /// Element id on the detail page
    pub fn element_id(&self) -> String {
        format!("{}{}", FIELD_ID_PREFIX, self.label())
    }

    fn assign(&self, record: &mut SchoolRecord, text: String) {
        match self {
            DetailField::NameAndNumber => {
                let (name, number) = split_name_and_number(&text);
                record.school_name = name;
                record.school_number = number;
            }
            DetailField::Languages => record.languages = text,
            DetailField::Courses => record.courses = text,
            DetailField::Offerings => record.offerings = text,
            DetailField::AdditionalInfo => record.additional_info = text,
            DetailField::Equipment => record.equipment = text,
            DetailField::WorkingGroups => record.working_groups = text,
            DetailField::Partners => record.partners = text,
            DetailField::Differentiation => record.differentiation = text,
            DetailField::Lunch => record.lunch_info = text,
            DetailField::DualLearning => record.dual_learning = text,
        }
    }
}

/// Split `"Name - 01Y01"` on the last `" - "`.
///
/// Without the delimiter the whole string is the name and the number is empty.
pub fn split_name_and_number(text: &str) -> (String, String) {
    match text.rsplit_once(" - ") {
        Some((name, number)) => (name.trim().to_string(), number.trim().to_string()),
        None => (text.trim().to_string(), String::new()),
    }
}

pub fn accepts_after_4th_grade(offerings: &str, additional_info: &str) -> bool {
    offerings.contains(AFTER_4TH_GRADE_MARKER) || additional_info.contains(AFTER_4TH_GRADE_MARKER)
}

/// Per-page timing
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub page_timeout: Duration,
    pub tab_settle: Duration,
    pub category_settle: Duration,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl HarvestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_timeout: config.harvest.page_timeout(),
            tab_settle: Duration::from_millis(config.harvest.tab_settle_ms),
            category_settle: Duration::from_millis(config.harvest.category_settle_ms),
        }
    }
}

/// Reads detail pages, consulting the content cache first
pub struct Harvester {
    driver: Arc<dyn BrowserDriver>,
    cache: ContentCache,
    settings: HarvestSettings,
}

impl Harvester {
    pub fn new(driver: Arc<dyn BrowserDriver>, cache: ContentCache, settings: HarvestSettings) -> Self {
        Self {
            driver,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    /// Cached record for `url`, if the policy allows reads
    pub fn cached(&self, url: &str) -> Option<SchoolRecord> {
        let record = self.cache.get(url)?;
        debug!(url = %url, "Cache hit");
        Some(record)
    }

    /// Scrape `url` live and write the result to the cache.
    ///
    /// Records without a school number are returned but not cached, so the
    /// page is visited again on the next run.
    pub async fn scrape(&self, url: &str) -> BrowserResult<SchoolRecord> {
        let scraped_at = Utc::now();
        let settings = self.settings.clone();
        let target = url.to_string();
        let cutoff = statistics_deadline(Instant::now(), self.settings.page_timeout);

        let record = with_page(
            self.driver.as_ref(),
            url,
            self.settings.page_timeout,
            move |page| {
                Box::pin(async move {
                    extract_record(page, &target, scraped_at, &settings, cutoff).await
                })
            },
        )
        .await?;

        info!(
            url = %url,
            school_number = %record.school_number,
            tables = record.table_count(),
            "Scraped detail page"
        );
        if record.school_number.is_empty() {
            warn!(url = %url, "No school number on page, not caching");
        } else {
            self.cache.put(url, &record);
        }
        Ok(record)
    }
}

/// Point at which the statistics phase is cut short.
///
/// The last tenth of the page budget is left for closing the page, so a
/// stalled tab ends the statistics phase before the visit itself times out.
fn statistics_deadline(started: Instant, page_timeout: Duration) -> Instant {
    started + page_timeout.saturating_sub(page_timeout / 10)
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Read every field of a loaded detail page.
///
/// A field whose script fails is left empty. Only when no field at all
/// could be read is the page reported as failed. Statistics never fail the
/// page: whatever tables were read before an error or `cutoff` are kept.
async fn extract_record(
    page: &mut dyn PageSession,
    url: &str,
    scraped_at: DateTime<Utc>,
    settings: &HarvestSettings,
    cutoff: Instant,
) -> BrowserResult<SchoolRecord> {
    let mut record = SchoolRecord::new(url, scraped_at);
    let mut failed = 0;

    for field in DetailField::ALL {
        match eval_string(page, &element_text_script(&field.element_id())).await {
            Ok(text) => field.assign(&mut record, text),
            Err(e) if e.is_page_fatal() => return Err(e),
            Err(e) => {
                debug!(url = %url, field = ?field, error = %e, "Field not readable");
                failed += 1;
            }
        }
    }

    if failed == DetailField::ALL.len() {
        return Err(BrowserError::ScriptError(format!(
            "no detail fields readable on {}",
            url
        )));
    }

    record.available_after_4th_grade =
        accepts_after_4th_grade(&record.offerings, &record.additional_info);

    let statistics = extract_statistics(page, &mut record, settings);
    if tokio::time::timeout_at(cutoff, statistics)
        .await
        .is_err()
    {
        warn!(
            url = %url,
            tables = record.table_count(),
            "Statistics ran out of time, keeping what was read"
        );
    }
    Ok(record)
}

async fn extract_statistics(
    page: &mut dyn PageSession,
    record: &mut SchoolRecord,
    settings: &HarvestSettings,
) {
    match page.click(STATISTICS_NAV_SELECTOR).await {
        Ok(true) => settle(settings.tab_settle).await,
        Ok(false) => debug!(url = %record.school_url, "No statistics panel"),
        Err(e) if e.is_page_fatal() => {
            warn!(url = %record.school_url, error = %e, "Statistics panel unreachable");
            return;
        }
        Err(e) => debug!(url = %record.school_url, error = %e, "Statistics panel click failed"),
    }

    for category in StatCategory::ALL {
        match extract_category(page, category, settings).await {
            Ok(table) => record.set_table(category, table),
            Err(e) => {
                warn!(
                    url = %record.school_url,
                    category = %category,
                    error = %e,
                    "Statistics table not extracted"
                );
                if e.is_page_fatal() {
                    return;
                }
            }
        }
    }
}

async fn extract_category(
    page: &mut dyn PageSession,
    category: StatCategory,
    settings: &HarvestSettings,
) -> BrowserResult<Option<RawTable>> {
    if !page.click(&title_selector(category.label())).await? {
        debug!(category = %category, "Category tab not present");
        return Ok(None);
    }
    settle(settings.category_settle).await;

    let candidates: Vec<TableCandidate> = eval_json(page, TABLE_PROBE_SCRIPT).await?;
    let Some(selection) = select_visible_table(&candidates) else {
        debug!(category = %category, "No visible table");
        return Ok(None);
    };

    debug!(
        category = %category,
        strategy = ?selection.strategy,
        index = selection.candidate.index,
        "Selected table"
    );
    Ok(parse_table(&selection.candidate.html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeDriver, FakePage};
    use crate::cache::CachePolicy;
    use crate::extract::probe_tables;
    use tempfile::TempDir;

    const URL: &str = "https://example.com/detail?IDSchulzweig=1";

    fn fast_settings() -> HarvestSettings {
        HarvestSettings {
            page_timeout: Duration::from_secs(5),
            tab_settle: Duration::ZERO,
            category_settle: Duration::ZERO,
        }
    }

    fn field(f: DetailField) -> String {
        f.element_id()
    }

    fn detail_page() -> FakePage {
        let residence = probe_tables(
            r#"<table style="display:none"><tr><td>stale</td></tr></table>
               <table><tr><th>Bezirk</th><th>Anzahl</th></tr>
                      <tr><td>Mitte</td><td>12</td></tr>
                      <tr><td>Insgesamt</td><td>12</td></tr></table>"#,
        );

        FakePage::new()
            .text(&field(DetailField::NameAndNumber), "Gymnasium Alpha - 01Y01")
            .text(&field(DetailField::Languages), "Englisch, Latein")
            .text(
                &field(DetailField::Offerings),
                "Schnelllernerklasse ab Jahrgangsstufe 5 beginnende",
            )
            .clickable(STATISTICS_NAV_SELECTOR)
            .panel(&title_selector("Wohnorte"), residence)
    }

    fn harvester(driver: FakeDriver, tmp: &TempDir) -> Harvester {
        Harvester::new(
            Arc::new(driver),
            ContentCache::new(tmp.path(), CachePolicy::ReadWrite),
            fast_settings(),
        )
    }

    #[test]
    fn test_split_name_and_number() {
        assert_eq!(
            split_name_and_number("Gymnasium Alpha - 01Y01"),
            ("Gymnasium Alpha".to_string(), "01Y01".to_string())
        );
        assert_eq!(
            split_name_and_number("NoDelimiterName"),
            ("NoDelimiterName".to_string(), String::new())
        );
        assert_eq!(
            split_name_and_number("Schule - Campus Nord - 02K03"),
            ("Schule - Campus Nord".to_string(), "02K03".to_string())
        );
    }

    #[test]
    fn test_marker_matches_either_field() {
        assert!(accepts_after_4th_grade("", "Zug ab Jahrgangsstufe 5 beginnende"));
        assert!(!accepts_after_4th_grade("ab Jahrgangsstufe 7", ""));
    }

    #[tokio::test]
    async fn test_scrape_reads_fields_and_tables() {
        let tmp = TempDir::new().unwrap();
        let driver = FakeDriver::new().page(URL, detail_page());
        let harvester = harvester(driver.clone(), &tmp);

        let record = harvester.scrape(URL).await.unwrap();

        assert_eq!(record.school_name, "Gymnasium Alpha");
        assert_eq!(record.school_number, "01Y01");
        assert_eq!(record.languages, "Englisch, Latein");
        assert!(record.available_after_4th_grade);
        assert_eq!(record.equipment, "");

        let residence = record.residence_table.as_ref().unwrap();
        assert_eq!(residence.headers, vec!["Bezirk", "Anzahl"]);
        assert_eq!(residence.rows.len(), 2);
        assert!(record.citizenship_table.is_none());
        assert!(record.absence_table.is_none());

        assert_eq!(driver.closed(), vec![URL.to_string()]);
        assert_eq!(harvester.cached(URL), Some(record));
    }

    #[tokio::test]
    async fn test_page_without_statistics_keeps_fields() {
        let tmp = TempDir::new().unwrap();
        let page = FakePage::new().text(&field(DetailField::NameAndNumber), "Schule - 03A01");
        let harvester = harvester(FakeDriver::new().page(URL, page), &tmp);

        let record = harvester.scrape(URL).await.unwrap();
        assert_eq!(record.school_number, "03A01");
        assert_eq!(record.table_count(), 0);
    }

    #[tokio::test]
    async fn test_total_extraction_failure_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let harvester = harvester(FakeDriver::new().page(URL, FakePage::broken_scripts()), &tmp);

        let result = harvester.scrape(URL).await;
        assert!(matches!(result, Err(BrowserError::ScriptError(_))));
        assert!(harvester.cached(URL).is_none());
    }

    #[tokio::test]
    async fn test_navigation_timeout_surfaces() {
        let tmp = TempDir::new().unwrap();
        let harvester = harvester(FakeDriver::new().page(URL, FakePage::timeout()), &tmp);

        let result = harvester.scrape(URL).await;
        assert!(matches!(result, Err(BrowserError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_stalled_statistics_tab_keeps_fields() {
        let tmp = TempDir::new().unwrap();
        let citizenship = probe_tables(
            "<table><tr><th>Land</th><th>w</th><th>m</th><th>ges</th></tr>\
             <tr><td>Polen</td><td>1</td><td>2</td><td>3</td></tr></table>",
        );
        let residence = probe_tables(
            "<table><tr><th>Bezirk</th><th>Anzahl</th></tr><tr><td>Mitte</td><td>3</td></tr></table>",
        );
        let page = FakePage::new()
            .text(&field(DetailField::NameAndNumber), "Gymnasium Alpha - 01Y01")
            .text(&field(DetailField::Languages), "Englisch")
            .clickable(STATISTICS_NAV_SELECTOR)
            .panel(&title_selector("Staatsangehörigkeit"), citizenship)
            .stalled_click(&title_selector("Nichtdeutsche Herkunftssprache"))
            .panel(&title_selector("Wohnorte"), residence);
        let settings = HarvestSettings {
            page_timeout: Duration::from_millis(200),
            ..fast_settings()
        };
        let harvester = Harvester::new(
            Arc::new(FakeDriver::new().page(URL, page)),
            ContentCache::new(tmp.path(), CachePolicy::ReadWrite),
            settings,
        );

        let record = harvester.scrape(URL).await.unwrap();
        assert_eq!(record.school_name, "Gymnasium Alpha");
        assert_eq!(record.school_number, "01Y01");
        assert_eq!(record.languages, "Englisch");
        assert!(record.citizenship_table.is_some());
        assert!(record.language_table.is_none());
        assert!(record.residence_table.is_none());
        assert_eq!(harvester.cached(URL), Some(record));
    }

    #[tokio::test]
    async fn test_record_without_number_not_cached() {
        let tmp = TempDir::new().unwrap();
        let page = FakePage::new().text(&field(DetailField::NameAndNumber), "");
        let harvester = harvester(FakeDriver::new().page(URL, page), &tmp);

        let record = harvester.scrape(URL).await.unwrap();
        assert_eq!(record.school_number, "");
        assert!(harvester.cached(URL).is_none());
        assert_eq!(harvester.cache().entry_count(), 0);
    }

    #[test]
    fn test_statistics_deadline_leaves_room_to_close() {
        let start = Instant::now();
        let deadline = statistics_deadline(start, Duration::from_millis(200));
        assert_eq!(deadline - start, Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_repeat_scrape_is_stable() {
        let tmp = TempDir::new().unwrap();
        let harvester = harvester(FakeDriver::new().page(URL, detail_page()), &tmp);

        let mut first = harvester.scrape(URL).await.unwrap();
        let second = harvester.scrape(URL).await.unwrap();
        first.scraped_at = second.scraped_at;
        assert_eq!(first, second);
    }
}
