//! Records flowing through the harvest pipeline.
//!
//! `SchoolRecord` is what a detail page yields and what the content cache
//! stores verbatim. The four statistic records are the typed rows derived
//! from its raw tables.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Generic header/row matrix lifted from one HTML table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

/// Everything harvested from one school detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    /// Natural key (BSN), e.g. `01Y01`
    pub school_number: String,
    pub school_name: String,
    pub school_url: String,
    pub languages: String,
    pub courses: String,
    pub offerings: String,
    pub available_after_4th_grade: bool,
    pub additional_info: String,
    pub equipment: String,
    pub working_groups: String,
    pub partners: String,
    pub differentiation: String,
    pub lunch_info: String,
    pub dual_learning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizenship_table: Option<RawTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_table: Option<RawTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residence_table: Option<RawTable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absence_table: Option<RawTable>,
    pub scraped_at: DateTime<Utc>,
}

impl SchoolRecord {
    /// Empty record for a page, stamped with the harvest start time
    pub fn new(url: &str, scraped_at: DateTime<Utc>) -> Self {
        Self {
            school_number: String::new(),
            school_name: String::new(),
            school_url: url.to_string(),
            languages: String::new(),
            courses: String::new(),
            offerings: String::new(),
            available_after_4th_grade: false,
            additional_info: String::new(),
            equipment: String::new(),
            working_groups: String::new(),
            partners: String::new(),
            differentiation: String::new(),
            lunch_info: String::new(),
            dual_learning: String::new(),
            citizenship_table: None,
            language_table: None,
            residence_table: None,
            absence_table: None,
            scraped_at,
        }
    }

    pub fn table(&self, category: StatCategory) -> Option<&RawTable> {
        match category {
            StatCategory::Citizenship => self.citizenship_table.as_ref(),
            StatCategory::Language => self.language_table.as_ref(),
            StatCategory::Residence => self.residence_table.as_ref(),
            StatCategory::Absence => self.absence_table.as_ref(),
        }
    }

    pub fn set_table(&mut self, category: StatCategory, table: Option<RawTable>) {
        match category {
            StatCategory::Citizenship => self.citizenship_table = table,
            StatCategory::Language => self.language_table = table,
            StatCategory::Residence => self.residence_table = table,
            StatCategory::Absence => self.absence_table = table,
        }
    }

    /// Number of statistic tables captured
    pub fn table_count(&self) -> usize {
        StatCategory::ALL
            .iter()
            .filter(|c| self.table(**c).is_some())
            .count()
    }
}

/// The four statistic tabs, in extraction order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatCategory {
    Citizenship,
    Language,
    Residence,
    Absence,
}

impl StatCategory {
    pub const ALL: [StatCategory; 4] = [
        StatCategory::Citizenship,
        StatCategory::Language,
        StatCategory::Residence,
        StatCategory::Absence,
    ];

    /// Tab title on the detail page
    pub fn label(&self) -> &'static str {
        match self {
            StatCategory::Citizenship => "Staatsangehörigkeit",
            StatCategory::Language => "Nichtdeutsche Herkunftssprache",
            StatCategory::Residence => "Wohnorte",
            StatCategory::Absence => "Fehlzeiten",
        }
    }

    /// Table holding the normalized rows
    pub fn table_name(&self) -> &'static str {
        match self {
            StatCategory::Citizenship => "school_citizenship_stats",
            StatCategory::Language => "school_language_stats",
            StatCategory::Residence => "school_residence_stats",
            StatCategory::Absence => "school_absence_stats",
        }
    }
}

impl std::fmt::Display for StatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatCategory::Citizenship => write!(f, "citizenship"),
            StatCategory::Language => write!(f, "language"),
            StatCategory::Residence => write!(f, "residence"),
            StatCategory::Absence => write!(f, "absence"),
        }
    }
}

impl FromStr for StatCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "citizenship" => Ok(StatCategory::Citizenship),
            "language" => Ok(StatCategory::Language),
            "residence" => Ok(StatCategory::Residence),
            "absence" => Ok(StatCategory::Absence),
            _ => Err(Error::Parse(format!("Unknown statistic category: {}", s))),
        }
    }
}

/// Students per citizenship group
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CitizenshipStat {
    pub school_number: String,
    pub citizenship: String,
    pub female_students: i64,
    pub male_students: i64,
    pub total: i64,
    pub scraped_at: String,
}

/// Non-German heritage language aggregate (one per school)
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct LanguageStat {
    pub school_number: String,
    pub total_students: i64,
    pub ndh_female_students: i64,
    pub ndh_male_students: i64,
    pub ndh_total: i64,
    pub ndh_percentage: f64,
    pub scraped_at: String,
}

/// Students living in one district
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ResidenceStat {
    pub school_number: String,
    pub district: String,
    pub student_count: i64,
    pub scraped_at: String,
}

/// Absence rates compared across four scopes (one per school)
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AbsenceStat {
    pub school_number: String,
    pub school_absence_rate: f64,
    pub school_unexcused_rate: f64,
    pub school_type_absence_rate: f64,
    pub school_type_unexcused_rate: f64,
    pub region_absence_rate: f64,
    pub region_unexcused_rate: f64,
    pub berlin_absence_rate: f64,
    pub berlin_unexcused_rate: f64,
    pub scraped_at: String,
}

/// Normalized rows for one category, ready to replace what is stored
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", content = "rows", rename_all = "lowercase")]
pub enum StatRecords {
    Citizenship(Vec<CitizenshipStat>),
    Language(Vec<LanguageStat>),
    Residence(Vec<ResidenceStat>),
    Absence(Vec<AbsenceStat>),
}

impl StatRecords {
    pub fn category(&self) -> StatCategory {
        match self {
            StatRecords::Citizenship(_) => StatCategory::Citizenship,
            StatRecords::Language(_) => StatCategory::Language,
            StatRecords::Residence(_) => StatCategory::Residence,
            StatRecords::Absence(_) => StatCategory::Absence,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StatRecords::Citizenship(rows) => rows.len(),
            StatRecords::Language(rows) => rows.len(),
            StatRecords::Residence(rows) => rows.len(),
            StatRecords::Absence(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One school and school year from the statistics portal grid.
///
/// Known columns land in typed fields; every non-empty header is also kept
/// in `metadata`. Values stay as displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticRow {
    pub school_number: String,
    pub school_name: String,
    pub district: String,
    pub school_type: String,
    pub school_year: String,
    pub students: String,
    pub students_male: String,
    pub students_female: String,
    pub teachers: String,
    pub teachers_male: String,
    pub teachers_female: String,
    pub classes: String,
    pub metadata: BTreeMap<String, String>,
    pub scraped_at: DateTime<Utc>,
}

impl StatisticRow {
    pub fn new(scraped_at: DateTime<Utc>) -> Self {
        Self {
            school_number: String::new(),
            school_name: String::new(),
            district: String::new(),
            school_type: String::new(),
            school_year: String::new(),
            students: String::new(),
            students_male: String::new(),
            students_female: String::new(),
            teachers: String::new(),
            teachers_male: String::new(),
            teachers_female: String::new(),
            classes: String::new(),
            metadata: BTreeMap::new(),
            scraped_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in StatCategory::ALL {
            let parsed: StatCategory = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("grades".parse::<StatCategory>().is_err());
    }

    #[test]
    fn test_record_omits_absent_tables() {
        let record = SchoolRecord::new("https://example.com/a", Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("citizenship_table").is_none());
        assert_eq!(json["school_url"], "https://example.com/a");
    }
}
