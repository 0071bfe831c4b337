//! School database using SQLite
//!
//! This module handles all persistent storage:
//! - School details (one row per school number, fully replaced on upsert)
//! - Normalized statistics (per category, replaced wholesale per school)
//! - Harvest runs (history and counters)

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use crate::extract::{log_quality_warnings, normalize_record};
use crate::harvest::{RecordSink, RunSummary, SinkReport};
use crate::models::{
    AbsenceStat, CitizenshipStat, LanguageStat, RawTable, ResidenceStat, SchoolRecord,
    StatRecords, StatisticRow,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Harvest run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    DeadlineExceeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::CompletedWithErrors => write!(f, "completed_with_errors"),
            RunStatus::DeadlineExceeded => write!(f, "deadline_exceeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "completed_with_errors" => Ok(RunStatus::CompletedWithErrors),
            "deadline_exceeded" => Ok(RunStatus::DeadlineExceeded),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Parse(format!("Unknown run status: {}", s))),
        }
    }
}

/// A stored school detail row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SchoolDetail {
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
    pub citizenship_data: Option<String>,
    pub language_data: Option<String>,
    pub residence_data: Option<String>,
    pub absence_data: Option<String>,
    pub scraped_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A harvest run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HarvestRun {
    pub id: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub total_links: i64,
    pub from_cache: i64,
    pub newly_scraped: i64,
    pub persisted: i64,
    pub errors: i64,
    pub errors_json: Option<String>,
}

impl HarvestRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            total_links: 0,
            from_cache: 0,
            newly_scraped: 0,
            persisted: 0,
            errors: 0,
            errors_json: None,
        }
    }

    pub fn get_status(&self) -> Result<RunStatus> {
        self.status.parse()
    }
}

impl Default for HarvestRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts over stored school details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSummary {
    pub total_schools: usize,
    pub available_after_4th_grade: usize,
    pub not_available_after_4th_grade: usize,
}

fn table_json(table: Option<&RawTable>) -> Result<Option<String>> {
    Ok(table.map(serde_json::to_string).transpose()?)
}

/// A stored row from the statistics portal
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SchoolStatistic {
    pub id: i64,
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
    /// Every grid column by title, as JSON
    pub metadata: String,
    pub scraped_at: String,
    pub created_at: String,
}

/// Rows stored for one school year
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct YearCount {
    pub school_year: String,
    pub count: i64,
}

/// Counts over the statistics portal rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSummary {
    pub total_rows: usize,
    pub by_year: Vec<YearCount>,
    pub latest_scrape: Option<String>,
}

/// School database handle
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the database without touching the schema
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Connect and create whatever part of the schema is missing
    pub async fn new(db_path: &Path) -> Result<Self> {
        let store = Self::connect(db_path).await?;
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize the database schema (every statement is idempotent)
    pub async fn init_schema(&self) -> Result<()> {
        debug!("Ensuring database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='school_details'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== School Detail Operations =====

    /// Insert or fully overwrite the detail row for the record's school number
    pub async fn upsert_detail(&self, record: &SchoolRecord) -> Result<()> {
        if record.school_number.trim().is_empty() {
            return Err(Error::MissingNaturalKey(record.school_url.clone()));
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO school_details (
                school_number, school_name, school_url, languages, courses, offerings,
                available_after_4th_grade, additional_info, equipment, working_groups,
                partners, differentiation, lunch_info, dual_learning,
                citizenship_data, language_data, residence_data, absence_data,
                scraped_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(school_number) DO UPDATE SET
                school_name = excluded.school_name,
                school_url = excluded.school_url,
                languages = excluded.languages,
                courses = excluded.courses,
                offerings = excluded.offerings,
                available_after_4th_grade = excluded.available_after_4th_grade,
                additional_info = excluded.additional_info,
                equipment = excluded.equipment,
                working_groups = excluded.working_groups,
                partners = excluded.partners,
                differentiation = excluded.differentiation,
                lunch_info = excluded.lunch_info,
                dual_learning = excluded.dual_learning,
                citizenship_data = excluded.citizenship_data,
                language_data = excluded.language_data,
                residence_data = excluded.residence_data,
                absence_data = excluded.absence_data,
                scraped_at = excluded.scraped_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.school_number)
        .bind(&record.school_name)
        .bind(&record.school_url)
        .bind(&record.languages)
        .bind(&record.courses)
        .bind(&record.offerings)
        .bind(record.available_after_4th_grade)
        .bind(&record.additional_info)
        .bind(&record.equipment)
        .bind(&record.working_groups)
        .bind(&record.partners)
        .bind(&record.differentiation)
        .bind(&record.lunch_info)
        .bind(&record.dual_learning)
        .bind(table_json(record.citizenship_table.as_ref())?)
        .bind(table_json(record.language_table.as_ref())?)
        .bind(table_json(record.residence_table.as_ref())?)
        .bind(table_json(record.absence_table.as_ref())?)
        .bind(record.scraped_at.to_rfc3339())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a school by its number
    pub async fn get_detail(&self, school_number: &str) -> Result<Option<SchoolDetail>> {
        let detail = sqlx::query_as::<_, SchoolDetail>(
            "SELECT * FROM school_details WHERE school_number = ?",
        )
        .bind(school_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(detail)
    }

    /// List all schools by name
    pub async fn list_details(&self) -> Result<Vec<SchoolDetail>> {
        let details =
            sqlx::query_as::<_, SchoolDetail>("SELECT * FROM school_details ORDER BY school_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(details)
    }

    /// Schools taking entrants after grade four
    pub async fn list_available_after_4th_grade(&self) -> Result<Vec<SchoolDetail>> {
        let details = sqlx::query_as::<_, SchoolDetail>(
            "SELECT * FROM school_details WHERE available_after_4th_grade = 1 ORDER BY school_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(details)
    }

    pub async fn count_details(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM school_details")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Remove every school and all of its statistics
    pub async fn delete_all_details(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "school_citizenship_stats",
            "school_language_stats",
            "school_residence_stats",
            "school_absence_stats",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM school_details")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        info!("Deleted {} school details", deleted);
        Ok(deleted)
    }

    // ===== Statistic Operations =====

    /// Replace all rows of one category for one school.
    ///
    /// Delete and insert share a transaction, so readers see either the old
    /// set or the new one.
    pub async fn replace_stats(&self, school_number: &str, records: &StatRecords) -> Result<usize> {
        let category = records.category();
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "DELETE FROM {} WHERE school_number = ?",
            category.table_name()
        ))
        .bind(school_number)
        .execute(&mut *tx)
        .await?;

        match records {
            StatRecords::Citizenship(rows) => {
                for row in rows {
                    insert_citizenship(&mut tx, school_number, row).await?;
                }
            }
            StatRecords::Language(rows) => {
                for row in rows {
                    insert_language(&mut tx, school_number, row).await?;
                }
            }
            StatRecords::Residence(rows) => {
                for row in rows {
                    insert_residence(&mut tx, school_number, row).await?;
                }
            }
            StatRecords::Absence(rows) => {
                for row in rows {
                    insert_absence(&mut tx, school_number, row).await?;
                }
            }
        }

        tx.commit().await?;
        debug!(
            school_number = %school_number,
            category = %category,
            rows = records.len(),
            "Replaced statistics"
        );
        Ok(records.len())
    }

    pub async fn citizenship_stats(&self, school_number: &str) -> Result<Vec<CitizenshipStat>> {
        let rows = sqlx::query_as::<_, CitizenshipStat>(
            r#"
            SELECT school_number, citizenship, female_students, male_students, total, scraped_at
            FROM school_citizenship_stats WHERE school_number = ? ORDER BY citizenship
            "#,
        )
        .bind(school_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn language_stat(&self, school_number: &str) -> Result<Option<LanguageStat>> {
        let row = sqlx::query_as::<_, LanguageStat>(
            r#"
            SELECT school_number, total_students, ndh_female_students, ndh_male_students,
                   ndh_total, ndh_percentage, scraped_at
            FROM school_language_stats WHERE school_number = ?
            "#,
        )
        .bind(school_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn residence_stats(&self, school_number: &str) -> Result<Vec<ResidenceStat>> {
        let rows = sqlx::query_as::<_, ResidenceStat>(
            r#"
            SELECT school_number, district, student_count, scraped_at
            FROM school_residence_stats WHERE school_number = ?
            ORDER BY student_count DESC
            "#,
        )
        .bind(school_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn absence_stat(&self, school_number: &str) -> Result<Option<AbsenceStat>> {
        let row = sqlx::query_as::<_, AbsenceStat>(
            r#"
            SELECT school_number, school_absence_rate, school_unexcused_rate,
                   school_type_absence_rate, school_type_unexcused_rate,
                   region_absence_rate, region_unexcused_rate,
                   berlin_absence_rate, berlin_unexcused_rate, scraped_at
            FROM school_absence_stats WHERE school_number = ?
            "#,
        )
        .bind(school_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Upsert the detail row, then replace each captured category.
    ///
    /// A failing category is logged and counted; it does not undo the
    /// detail row or the other categories.
    pub async fn persist_record(&self, record: &SchoolRecord) -> Result<SinkReport> {
        self.upsert_detail(record).await?;

        let mut report = SinkReport::default();
        for stats in normalize_record(record) {
            report.quality_warnings += log_quality_warnings(&stats);
            if let Err(e) = self.replace_stats(&record.school_number, &stats).await {
                warn!(
                    school_number = %record.school_number,
                    category = %stats.category(),
                    error = %e,
                    "Failed to store statistics"
                );
                report.stat_errors += 1;
            }
        }
        Ok(report)
    }

    // ===== Statistics Portal Operations =====

    /// Insert or update a batch of portal rows, keyed by school number and
    /// school year, in one transaction.
    ///
    /// A row the database rejects is logged and skipped; the return value
    /// counts rows actually written.
    pub async fn upsert_statistics(&self, rows: &[StatisticRow]) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut saved = 0;

        for row in rows {
            match insert_statistic(&mut tx, row, &now).await {
                Ok(()) => saved += 1,
                Err(e) => warn!(
                    school_number = %row.school_number,
                    school_year = %row.school_year,
                    error = %e,
                    "Skipping statistics row"
                ),
            }
        }

        tx.commit().await?;
        info!("Saved {} of {} statistics rows", saved, rows.len());
        Ok(saved)
    }

    /// All portal rows, newest school year first
    pub async fn list_statistics(&self) -> Result<Vec<SchoolStatistic>> {
        let rows = sqlx::query_as::<_, SchoolStatistic>(
            "SELECT * FROM school_statistics ORDER BY school_year DESC, school_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn statistics_for_school(&self, school_number: &str) -> Result<Vec<SchoolStatistic>> {
        let rows = sqlx::query_as::<_, SchoolStatistic>(
            "SELECT * FROM school_statistics WHERE school_number = ? ORDER BY school_year DESC",
        )
        .bind(school_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn statistics_for_year(&self, school_year: &str) -> Result<Vec<SchoolStatistic>> {
        let rows = sqlx::query_as::<_, SchoolStatistic>(
            "SELECT * FROM school_statistics WHERE school_year = ? ORDER BY school_name",
        )
        .bind(school_year)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Row count, per-year counts and the latest scrape time
    pub async fn statistics_summary(&self) -> Result<StatisticsSummary> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM school_statistics")
            .fetch_one(&self.pool)
            .await?;

        let by_year = sqlx::query_as::<_, YearCount>(
            r#"
            SELECT school_year, COUNT(*) AS count
            FROM school_statistics
            GROUP BY school_year
            ORDER BY school_year DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let latest_scrape: Option<String> =
            sqlx::query_scalar("SELECT MAX(scraped_at) FROM school_statistics")
                .fetch_one(&self.pool)
                .await?;

        Ok(StatisticsSummary {
            total_rows: total as usize,
            by_year,
            latest_scrape,
        })
    }

    // ===== Harvest Run Operations =====

    pub async fn start_run(&self) -> Result<HarvestRun> {
        let run = HarvestRun::new();
        sqlx::query(
            r#"
            INSERT INTO harvest_runs (id, started_at, status, total_links, from_cache, newly_scraped, persisted, errors)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.started_at)
        .bind(&run.status)
        .bind(run.total_links)
        .bind(run.from_cache)
        .bind(run.newly_scraped)
        .bind(run.persisted)
        .bind(run.errors)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    pub async fn complete_run(&self, id: &str, status: RunStatus, summary: &RunSummary) -> Result<()> {
        let errors: Vec<String> = summary
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.url, f.reason))
            .collect();
        let errors_json = if errors.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&errors)?)
        };

        sqlx::query(
            r#"
            UPDATE harvest_runs SET
                completed_at = ?,
                status = ?,
                total_links = ?,
                from_cache = ?,
                newly_scraped = ?,
                persisted = ?,
                errors = ?,
                errors_json = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(status.to_string())
        .bind(summary.total as i64)
        .bind(summary.from_cache as i64)
        .bind(summary.newly_scraped as i64)
        .bind(summary.persisted as i64)
        .bind(summary.errors as i64)
        .bind(errors_json)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a run that never produced a summary
    pub async fn fail_run(&self, id: &str, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE harvest_runs SET completed_at = ?, status = ?, errors_json = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(RunStatus::Failed.to_string())
        .bind(serde_json::to_string(&[reason])?)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_run(&self) -> Result<Option<HarvestRun>> {
        let run = sqlx::query_as::<_, HarvestRun>(
            "SELECT * FROM harvest_runs ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }

    // ===== Statistics =====

    /// Counts split by the grade-four flag
    pub async fn get_summary(&self) -> Result<DetailSummary> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM school_details")
            .fetch_one(&self.pool)
            .await?;

        let available: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM school_details WHERE available_after_4th_grade = 1",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DetailSummary {
            total_schools: total as usize,
            available_after_4th_grade: available as usize,
            not_available_after_4th_grade: (total - available) as usize,
        })
    }
}

async fn insert_citizenship(
    tx: &mut Transaction<'_, Sqlite>,
    school_number: &str,
    row: &CitizenshipStat,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO school_citizenship_stats
            (school_number, citizenship, female_students, male_students, total, scraped_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(school_number)
    .bind(&row.citizenship)
    .bind(row.female_students)
    .bind(row.male_students)
    .bind(row.total)
    .bind(&row.scraped_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_language(
    tx: &mut Transaction<'_, Sqlite>,
    school_number: &str,
    row: &LanguageStat,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO school_language_stats
            (school_number, total_students, ndh_female_students, ndh_male_students,
             ndh_total, ndh_percentage, scraped_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(school_number)
    .bind(row.total_students)
    .bind(row.ndh_female_students)
    .bind(row.ndh_male_students)
    .bind(row.ndh_total)
    .bind(row.ndh_percentage)
    .bind(&row.scraped_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_residence(
    tx: &mut Transaction<'_, Sqlite>,
    school_number: &str,
    row: &ResidenceStat,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO school_residence_stats (school_number, district, student_count, scraped_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(school_number)
    .bind(&row.district)
    .bind(row.student_count)
    .bind(&row.scraped_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_absence(
    tx: &mut Transaction<'_, Sqlite>,
    school_number: &str,
    row: &AbsenceStat,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO school_absence_stats
            (school_number, school_absence_rate, school_unexcused_rate,
             school_type_absence_rate, school_type_unexcused_rate,
             region_absence_rate, region_unexcused_rate,
             berlin_absence_rate, berlin_unexcused_rate, scraped_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(school_number)
    .bind(row.school_absence_rate)
    .bind(row.school_unexcused_rate)
    .bind(row.school_type_absence_rate)
    .bind(row.school_type_unexcused_rate)
    .bind(row.region_absence_rate)
    .bind(row.region_unexcused_rate)
    .bind(row.berlin_absence_rate)
    .bind(row.berlin_unexcused_rate)
    .bind(&row.scraped_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_statistic(
    tx: &mut Transaction<'_, Sqlite>,
    row: &StatisticRow,
    now: &str,
) -> Result<()> {
    let metadata = serde_json::to_string(&row.metadata)?;
    sqlx::query(
        r#"
        INSERT INTO school_statistics (
            school_number, school_name, district, school_type, school_year,
            students, students_male, students_female,
            teachers, teachers_male, teachers_female,
            classes, metadata, scraped_at, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(school_number, school_year) DO UPDATE SET
            school_name = excluded.school_name,
            district = excluded.district,
            school_type = excluded.school_type,
            students = excluded.students,
            students_male = excluded.students_male,
            students_female = excluded.students_female,
            teachers = excluded.teachers,
            teachers_male = excluded.teachers_male,
            teachers_female = excluded.teachers_female,
            classes = excluded.classes,
            metadata = excluded.metadata,
            scraped_at = excluded.scraped_at
        "#,
    )
    .bind(&row.school_number)
    .bind(&row.school_name)
    .bind(&row.district)
    .bind(&row.school_type)
    .bind(&row.school_year)
    .bind(&row.students)
    .bind(&row.students_male)
    .bind(&row.students_female)
    .bind(&row.teachers)
    .bind(&row.teachers_male)
    .bind(&row.teachers_female)
    .bind(&row.classes)
    .bind(metadata)
    .bind(row.scraped_at.to_rfc3339())
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl RecordSink for Store {
    async fn accept(&self, record: &SchoolRecord) -> Result<SinkReport> {
        self.persist_record(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawTable;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Store, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Store::connect(&tmp.path().join("test.db")).await.unwrap();
        store.init_schema().await.unwrap();
        (store, tmp)
    }

    fn record(number: &str, name: &str) -> SchoolRecord {
        let mut record = SchoolRecord::new(&format!("https://example.com/{}", number), Utc::now());
        record.school_number = number.to_string();
        record.school_name = name.to_string();
        record
    }

    fn citizenship(number: &str, labels: &[&str]) -> StatRecords {
        let stamp = Utc::now().to_rfc3339();
        StatRecords::Citizenship(
            labels
                .iter()
                .map(|label| CitizenshipStat {
                    school_number: number.to_string(),
                    citizenship: label.to_string(),
                    female_students: 1,
                    male_students: 2,
                    total: 3,
                    scraped_at: stamp.clone(),
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_upsert_overwrites_every_field() {
        let (store, _tmp) = setup_test_db().await;

        let mut first = record("01Y01", "Gymnasium Alpha");
        first.languages = "Englisch".to_string();
        first.available_after_4th_grade = true;
        first.citizenship_table = Some(RawTable::default());
        store.upsert_detail(&first).await.unwrap();

        let mut second = record("01Y01", "Gymnasium Alpha (neu)");
        second.languages = String::new();
        store.upsert_detail(&second).await.unwrap();

        let loaded = store.get_detail("01Y01").await.unwrap().unwrap();
        assert_eq!(loaded.school_name, "Gymnasium Alpha (neu)");
        assert_eq!(loaded.languages, "");
        assert!(!loaded.available_after_4th_grade);
        assert!(loaded.citizenship_data.is_none());
        assert_eq!(store.count_details().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_missing_school_number() {
        let (store, _tmp) = setup_test_db().await;
        let result = store.upsert_detail(&record("", "Nameless")).await;
        assert!(matches!(result, Err(Error::MissingNaturalKey(_))));
        assert_eq!(store.count_details().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_stats_replaces_only_that_school() {
        let (store, _tmp) = setup_test_db().await;

        store
            .replace_stats("X", &citizenship("X", &["A", "B", "C", "D", "E"]))
            .await
            .unwrap();
        store
            .replace_stats("Y", &citizenship("Y", &["A", "B"]))
            .await
            .unwrap();
        assert_eq!(store.citizenship_stats("X").await.unwrap().len(), 5);

        store
            .replace_stats("X", &citizenship("X", &["F", "G", "H"]))
            .await
            .unwrap();

        let x: Vec<String> = store
            .citizenship_stats("X")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.citizenship)
            .collect();
        assert_eq!(x, vec!["F", "G", "H"]);
        assert_eq!(store.citizenship_stats("Y").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_singleton_stats_replace() {
        let (store, _tmp) = setup_test_db().await;
        let stamp = Utc::now().to_rfc3339();
        let absence = |rate: f64| AbsenceStat {
            school_number: "X".to_string(),
            school_absence_rate: rate,
            scraped_at: stamp.clone(),
            ..Default::default()
        };

        store
            .replace_stats("X", &StatRecords::Absence(vec![absence(7.5)]))
            .await
            .unwrap();
        store
            .replace_stats("X", &StatRecords::Absence(vec![absence(8.0)]))
            .await
            .unwrap();
        assert_eq!(
            store.absence_stat("X").await.unwrap().unwrap().school_absence_rate,
            8.0
        );

        store
            .replace_stats("X", &StatRecords::Absence(Vec::new()))
            .await
            .unwrap();
        assert!(store.absence_stat("X").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_record_normalizes_tables() {
        let (store, _tmp) = setup_test_db().await;

        let mut rec = record("01Y01", "Gymnasium Alpha");
        rec.residence_table = Some(RawTable {
            headers: vec!["Bezirk".into(), "Anzahl".into()],
            rows: vec![
                vec!["Mitte".into(), "12".into()],
                vec!["Pankow".into(), "1.050".into()],
                vec!["Insgesamt".into(), "1.062".into()],
            ],
        });
        rec.language_table = Some(RawTable {
            headers: vec!["ges".into()],
            rows: vec![
                vec!["x".into()],
                vec!["500".into(), "40".into(), "45".into(), "85".into(), "17,0".into()],
            ],
        });

        let report = store.persist_record(&rec).await.unwrap();
        assert_eq!(report.stat_errors, 0);

        let residence = store.residence_stats("01Y01").await.unwrap();
        assert_eq!(residence.len(), 2);
        assert_eq!(residence[0].district, "Pankow");

        let language = store.language_stat("01Y01").await.unwrap().unwrap();
        assert_eq!(language.ndh_total, 85);
        assert_eq!(language.ndh_percentage, 17.0);

        // absent tables leave earlier rows alone
        assert!(store.citizenship_stats("01Y01").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let (store, _tmp) = setup_test_db().await;

        let mut a = record("01A01", "Alpha");
        a.available_after_4th_grade = true;
        store.upsert_detail(&a).await.unwrap();
        store.upsert_detail(&record("01B01", "Beta")).await.unwrap();
        store.upsert_detail(&record("01C01", "Gamma")).await.unwrap();

        let summary = store.get_summary().await.unwrap();
        assert_eq!(summary.total_schools, 3);
        assert_eq!(summary.available_after_4th_grade, 1);
        assert_eq!(summary.not_available_after_4th_grade, 2);

        let names: Vec<String> = store
            .list_details()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.school_name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(store.list_available_after_4th_grade().await.unwrap().len(), 1);

        store.delete_all_details().await.unwrap();
        assert_eq!(store.count_details().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let (store, _tmp) = setup_test_db().await;
        let run = store.start_run().await.unwrap();

        let mut summary = RunSummary {
            total: 3,
            newly_scraped: 2,
            ..Default::default()
        };
        summary.record_failure("https://example.com/c", "timed out");
        store
            .complete_run(&run.id, summary.status(), &summary)
            .await
            .unwrap();

        let latest = store.latest_run().await.unwrap().unwrap();
        assert_eq!(latest.id, run.id);
        assert_eq!(latest.get_status().unwrap(), RunStatus::CompletedWithErrors);
        assert_eq!(latest.errors, 1);
        assert!(latest.errors_json.unwrap().contains("timed out"));
    }

    fn statistic(number: &str, year: &str, students: &str) -> StatisticRow {
        let mut row = StatisticRow::new(Utc::now());
        row.school_number = number.to_string();
        row.school_name = format!("Schule {}", number);
        row.school_year = year.to_string();
        row.students = students.to_string();
        row.metadata.insert("BSN".to_string(), number.to_string());
        row
    }

    #[tokio::test]
    async fn test_schema_init_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = Store::connect(&tmp.path().join("test.db")).await.unwrap();
        assert!(!store.is_initialized().await.unwrap());

        store.init_schema().await.unwrap();
        store.init_schema().await.unwrap();
        assert!(store.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_statistics_by_school_and_year() {
        let (store, _tmp) = setup_test_db().await;

        let saved = store
            .upsert_statistics(&[
                statistic("01Y01", "2022/23", "800"),
                statistic("01Y01", "2023/24", "812"),
                statistic("02K03", "2023/24", "400"),
            ])
            .await
            .unwrap();
        assert_eq!(saved, 3);

        // same school and year updates in place
        store
            .upsert_statistics(&[statistic("01Y01", "2023/24", "820")])
            .await
            .unwrap();

        let alpha = store.statistics_for_school("01Y01").await.unwrap();
        assert_eq!(alpha.len(), 2);
        assert_eq!(alpha[0].school_year, "2023/24");
        assert_eq!(alpha[0].students, "820");
        assert!(alpha[0].metadata.contains("\"BSN\":\"01Y01\""));

        assert_eq!(store.statistics_for_year("2023/24").await.unwrap().len(), 2);
        assert_eq!(store.list_statistics().await.unwrap().len(), 3);

        let summary = store.statistics_summary().await.unwrap();
        assert_eq!(summary.total_rows, 3);
        assert_eq!(
            summary.by_year,
            vec![
                YearCount {
                    school_year: "2023/24".to_string(),
                    count: 2
                },
                YearCount {
                    school_year: "2022/23".to_string(),
                    count: 1
                },
            ]
        );
        assert!(summary.latest_scrape.is_some());
    }

    #[tokio::test]
    async fn test_statistics_summary_when_empty() {
        let (store, _tmp) = setup_test_db().await;
        let summary = store.statistics_summary().await.unwrap();
        assert_eq!(summary.total_rows, 0);
        assert!(summary.by_year.is_empty());
        assert!(summary.latest_scrape.is_none());
    }
}
