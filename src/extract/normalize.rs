//! Raw tables to typed statistic rows.
//!
//! Numbers on the detail pages use German formatting (`1.234`, `45,6 %`).
//! Parsing never fails: anything unreadable becomes zero. Suspicious rows
//! are reported through `tracing` as data-quality warnings and otherwise
//! passed through unchanged.

use crate::models::{
    AbsenceStat, CitizenshipStat, LanguageStat, RawTable, ResidenceStat, SchoolRecord,
    StatCategory, StatRecords,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

/// Label of the aggregate row in the residence table
pub const RESIDENCE_TOTAL_LABEL: &str = "Insgesamt";

/// Parse a German-formatted integer; unparseable input is 0
pub fn parse_int(s: &str) -> i64 {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '%' | '.' | ','))
        .collect();
    cleaned.parse().unwrap_or(0)
}

/// Parse a German-formatted decimal; unparseable input is 0.0
pub fn parse_float(s: &str) -> f64 {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '%'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// One row per citizenship group with a non-empty label
pub fn normalize_citizenship(
    school_number: &str,
    table: Option<&RawTable>,
    scraped_at: DateTime<Utc>,
) -> Vec<CitizenshipStat> {
    let Some(table) = table else {
        return Vec::new();
    };
    let stamp = scraped_at.to_rfc3339();

    table
        .rows
        .iter()
        .filter(|row| row.len() >= 4 && !row[0].trim().is_empty())
        .map(|row| CitizenshipStat {
            school_number: school_number.to_string(),
            citizenship: row[0].trim().to_string(),
            female_students: parse_int(&row[1]),
            male_students: parse_int(&row[2]),
            total: parse_int(&row[3]),
            scraped_at: stamp.clone(),
        })
        .collect()
}

/// Aggregate taken from the trailing total row
pub fn normalize_language(
    school_number: &str,
    table: Option<&RawTable>,
    scraped_at: DateTime<Utc>,
) -> Option<LanguageStat> {
    let table = table?;
    if table.rows.len() < 2 {
        return None;
    }
    let row = table.rows.last()?;
    if row.len() < 5 {
        return None;
    }

    Some(LanguageStat {
        school_number: school_number.to_string(),
        total_students: parse_int(&row[0]),
        ndh_female_students: parse_int(&row[1]),
        ndh_male_students: parse_int(&row[2]),
        ndh_total: parse_int(&row[3]),
        ndh_percentage: parse_float(&row[4]),
        scraped_at: scraped_at.to_rfc3339(),
    })
}

/// One row per district, skipping the total row
pub fn normalize_residence(
    school_number: &str,
    table: Option<&RawTable>,
    scraped_at: DateTime<Utc>,
) -> Vec<ResidenceStat> {
    let Some(table) = table else {
        return Vec::new();
    };
    let stamp = scraped_at.to_rfc3339();

    table
        .rows
        .iter()
        .filter(|row| row.len() >= 2)
        .filter(|row| {
            let label = row[0].trim();
            !label.is_empty() && label != RESIDENCE_TOTAL_LABEL
        })
        .map(|row| ResidenceStat {
            school_number: school_number.to_string(),
            district: row[0].trim().to_string(),
            student_count: parse_int(&row[1]),
            scraped_at: stamp.clone(),
        })
        .collect()
}

/// Absence scope a row label refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbsenceScope {
    School,
    SchoolType,
    Region,
    Berlin,
}

fn absence_scope(label: &str) -> Option<AbsenceScope> {
    let label = label.to_lowercase();
    if label.contains("schule") && !label.contains("schulart") {
        Some(AbsenceScope::School)
    } else if label.contains("schulart") {
        Some(AbsenceScope::SchoolType)
    } else if label.contains("region") {
        Some(AbsenceScope::Region)
    } else if label.contains("berlin") {
        Some(AbsenceScope::Berlin)
    } else {
        None
    }
}

/// Rates for the four comparison scopes, matched by row label
pub fn normalize_absence(
    school_number: &str,
    table: Option<&RawTable>,
    scraped_at: DateTime<Utc>,
) -> Option<AbsenceStat> {
    let table = table?;
    if table.rows.len() < 4 {
        return None;
    }

    let mut stat = AbsenceStat {
        school_number: school_number.to_string(),
        scraped_at: scraped_at.to_rfc3339(),
        ..Default::default()
    };

    for row in table.rows.iter().filter(|row| row.len() >= 3) {
        let total = parse_float(&row[1]);
        let unexcused = parse_float(&row[2]);
        match absence_scope(&row[0]) {
            Some(AbsenceScope::School) => {
                stat.school_absence_rate = total;
                stat.school_unexcused_rate = unexcused;
            }
            Some(AbsenceScope::SchoolType) => {
                stat.school_type_absence_rate = total;
                stat.school_type_unexcused_rate = unexcused;
            }
            Some(AbsenceScope::Region) => {
                stat.region_absence_rate = total;
                stat.region_unexcused_rate = unexcused;
            }
            Some(AbsenceScope::Berlin) => {
                stat.berlin_absence_rate = total;
                stat.berlin_unexcused_rate = unexcused;
            }
            None => {}
        }
    }

    Some(stat)
}

/// Normalized rows for every category whose raw table was captured.
///
/// Categories without a raw table are left out so that their stored rows
/// stay untouched.
pub fn normalize_record(record: &SchoolRecord) -> Vec<StatRecords> {
    let id = record.school_number.as_str();
    let at = record.scraped_at;

    StatCategory::ALL
        .iter()
        .filter_map(|category| {
            let table = record.table(*category)?;
            let rows = match category {
                StatCategory::Citizenship => {
                    StatRecords::Citizenship(normalize_citizenship(id, Some(table), at))
                }
                StatCategory::Language => StatRecords::Language(
                    normalize_language(id, Some(table), at).into_iter().collect(),
                ),
                StatCategory::Residence => {
                    StatRecords::Residence(normalize_residence(id, Some(table), at))
                }
                StatCategory::Absence => StatRecords::Absence(
                    normalize_absence(id, Some(table), at).into_iter().collect(),
                ),
            };
            Some(rows)
        })
        .collect()
}

/// A row that parsed but does not add up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityWarning {
    pub school_number: String,
    pub category: StatCategory,
    pub subject: String,
    pub message: String,
}

/// Check internal consistency of normalized rows
pub fn quality_warnings(records: &StatRecords) -> Vec<DataQualityWarning> {
    let mut warnings = Vec::new();

    match records {
        StatRecords::Citizenship(rows) => {
            for row in rows {
                if row.total != row.female_students + row.male_students {
                    warnings.push(DataQualityWarning {
                        school_number: row.school_number.clone(),
                        category: StatCategory::Citizenship,
                        subject: row.citizenship.clone(),
                        message: format!(
                            "total {} != female {} + male {}",
                            row.total, row.female_students, row.male_students
                        ),
                    });
                }
            }
        }
        StatRecords::Language(rows) => {
            for row in rows {
                if row.ndh_total != row.ndh_female_students + row.ndh_male_students {
                    warnings.push(DataQualityWarning {
                        school_number: row.school_number.clone(),
                        category: StatCategory::Language,
                        subject: "ndh_total".to_string(),
                        message: format!(
                            "ndh total {} != female {} + male {}",
                            row.ndh_total, row.ndh_female_students, row.ndh_male_students
                        ),
                    });
                }
                if row.ndh_total > row.total_students {
                    warnings.push(DataQualityWarning {
                        school_number: row.school_number.clone(),
                        category: StatCategory::Language,
                        subject: "total_students".to_string(),
                        message: format!(
                            "ndh total {} exceeds student total {}",
                            row.ndh_total, row.total_students
                        ),
                    });
                }
            }
        }
        StatRecords::Residence(_) => {}
        StatRecords::Absence(rows) => {
            for row in rows {
                let rates = [
                    ("school", row.school_absence_rate, row.school_unexcused_rate),
                    ("school_type", row.school_type_absence_rate, row.school_type_unexcused_rate),
                    ("region", row.region_absence_rate, row.region_unexcused_rate),
                    ("berlin", row.berlin_absence_rate, row.berlin_unexcused_rate),
                ];
                for (scope, total, unexcused) in rates {
                    if unexcused > total {
                        warnings.push(DataQualityWarning {
                            school_number: row.school_number.clone(),
                            category: StatCategory::Absence,
                            subject: scope.to_string(),
                            message: format!("unexcused rate {} exceeds total {}", unexcused, total),
                        });
                    }
                }
            }
        }
    }

    warnings
}

/// Emit data-quality warnings as structured log events
pub fn log_quality_warnings(records: &StatRecords) -> usize {
    let warnings = quality_warnings(records);
    for w in &warnings {
        warn!(
            school_number = %w.school_number,
            category = %w.category,
            subject = %w.subject,
            "Data quality: {}",
            w.message
        );
    }
    warnings.len()
}
