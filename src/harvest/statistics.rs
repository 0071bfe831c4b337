//! School statistics from the education statistics portal
//!
//! A single page carries a grid (`#myDatagrid`) with one row per school and
//! school year. The first row holds the column titles; columns are matched
//! by title, so their order on the page does not matter.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::cell_text;
use crate::models::StatisticRow;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Grid holding the per-school rows
pub const STATISTICS_GRID_SELECTOR: &str = "#myDatagrid";

/// Background of the grid's title row
const HEADER_ROW_COLOR: &str = "#F39300";

/// Grid columns with a typed home in [`StatisticRow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticColumn {
    SchoolNumber,
    SchoolName,
    SchoolYear,
    Students,
    StudentsFemale,
    StudentsMale,
    Teachers,
    TeachersFemale,
    TeachersMale,
    District,
    SchoolType,
    Classes,
}

impl StatisticColumn {
    /// Match a column title, ignoring case and umlaut spelling
    pub fn from_header(header: &str) -> Option<Self> {
        let h = header
            .trim()
            .to_lowercase()
            .replace('ü', "ue")
            .replace('ä', "ae");

        let column = match h.as_str() {
            "bsn" => StatisticColumn::SchoolNumber,
            "name" => StatisticColumn::SchoolName,
            "schuljahr" => StatisticColumn::SchoolYear,
            "bezirk" | "district" => StatisticColumn::District,
            "schulart" | "school type" => StatisticColumn::SchoolType,
            "klassen" | "classes" => StatisticColumn::Classes,
            _ if h.contains("schueler (m/w/d)") => StatisticColumn::Students,
            _ if h.contains("schueler (w)") => StatisticColumn::StudentsFemale,
            _ if h.contains("schueler (m)") => StatisticColumn::StudentsMale,
            _ if h.contains("lehrkraefte (m,w,d)") => StatisticColumn::Teachers,
            _ if h.contains("lehrkraefte (w)") => StatisticColumn::TeachersFemale,
            _ if h.contains("lehrkraefte (m)") => StatisticColumn::TeachersMale,
            _ => return None,
        };
        Some(column)
    }

    fn assign(self, row: &mut StatisticRow, value: String) {
        let slot = match self {
            StatisticColumn::SchoolNumber => &mut row.school_number,
            StatisticColumn::SchoolName => &mut row.school_name,
            StatisticColumn::SchoolYear => &mut row.school_year,
            StatisticColumn::Students => &mut row.students,
            StatisticColumn::StudentsFemale => &mut row.students_female,
            StatisticColumn::StudentsMale => &mut row.students_male,
            StatisticColumn::Teachers => &mut row.teachers,
            StatisticColumn::TeachersFemale => &mut row.teachers_female,
            StatisticColumn::TeachersMale => &mut row.teachers_male,
            StatisticColumn::District => &mut row.district,
            StatisticColumn::SchoolType => &mut row.school_type,
            StatisticColumn::Classes => &mut row.classes,
        };
        *slot = value;
    }
}

fn is_header_row(index: usize, row: ElementRef<'_>) -> bool {
    index == 0
        || row
            .value()
            .attr("bgcolor")
            .is_some_and(|c| c.eq_ignore_ascii_case(HEADER_ROW_COLOR))
}

/// Parse every school row of the statistics grid.
///
/// Only the first title row is used. Rows without a school number are
/// dropped. A page without the grid yields no rows.
pub fn parse_statistics_grid(html: &str, scraped_at: DateTime<Utc>) -> Vec<StatisticRow> {
    let document = Html::parse_document(html);
    let (Ok(grid_selector), Ok(row_selector), Ok(cell_selector)) = (
        Selector::parse(STATISTICS_GRID_SELECTOR),
        Selector::parse("tr"),
        Selector::parse("td"),
    ) else {
        return Vec::new();
    };

    let Some(grid) = document.select(&grid_selector).next() else {
        warn!("No statistics grid on page");
        return Vec::new();
    };

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (index, tr) in grid.select(&row_selector).enumerate() {
        let cells: Vec<String> = tr.select(&cell_selector).map(cell_text).collect();

        if is_header_row(index, tr) {
            if headers.is_none() {
                debug!(columns = cells.len(), "Statistics grid headers: {:?}", cells);
                headers = Some(cells);
            }
            continue;
        }
        let Some(headers) = headers.as_ref() else {
            continue;
        };

        let mut row = StatisticRow::new(scraped_at);
        for (header, value) in headers.iter().zip(cells) {
            if !header.is_empty() {
                row.metadata.insert(header.clone(), value.clone());
            }
            if let Some(column) = StatisticColumn::from_header(header) {
                column.assign(&mut row, value);
            }
        }

        if !row.school_number.is_empty() {
            rows.push(row);
        }
    }

    if headers.as_ref().map_or(true, Vec::is_empty) {
        warn!("Statistics grid has no header row");
        return Vec::new();
    }

    debug!(rows = rows.len(), "Parsed statistics grid");
    rows
}

/// Fetches the statistics grid with a plain GET
pub struct StatisticsSource {
    client: Client,
    url: String,
}

impl StatisticsSource {
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.statistics_url,
            &config.harvest.user_agent,
            config.harvest.request_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the grid; an empty grid is an error
    pub async fn fetch(&self) -> Result<Vec<StatisticRow>> {
        info!("Fetching statistics: {}", self.url);
        let scraped_at = Utc::now();

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "de-DE,de;q=0.9,en;q=0.7")
            .send()
            .await
            .map_err(|e| Error::Statistics(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Statistics(format!("HTTP {}: {}", status, self.url)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::Statistics(format!("{}: {}", self.url, e)))?;

        let rows = parse_statistics_grid(&html, scraped_at);
        if rows.is_empty() {
            return Err(Error::Statistics(format!(
                "no statistics rows found at {}",
                self.url
            )));
        }

        info!("Parsed {} statistics rows", rows.len());
        Ok(rows)
    }
}
