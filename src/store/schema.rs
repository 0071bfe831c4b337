//! SQLite schema definition

/// SQL schema for the school database
pub const SCHEMA_SQL: &str = r#"
-- School details: one row per school, keyed by school number
CREATE TABLE IF NOT EXISTS school_details (
    school_number TEXT PRIMARY KEY,
    school_name TEXT NOT NULL,
    school_url TEXT NOT NULL,
    languages TEXT NOT NULL DEFAULT '',
    courses TEXT NOT NULL DEFAULT '',
    offerings TEXT NOT NULL DEFAULT '',
    available_after_4th_grade INTEGER NOT NULL DEFAULT 0,
    additional_info TEXT NOT NULL DEFAULT '',
    equipment TEXT NOT NULL DEFAULT '',
    working_groups TEXT NOT NULL DEFAULT '',
    partners TEXT NOT NULL DEFAULT '',
    differentiation TEXT NOT NULL DEFAULT '',
    lunch_info TEXT NOT NULL DEFAULT '',
    dual_learning TEXT NOT NULL DEFAULT '',
    citizenship_data TEXT,
    language_data TEXT,
    residence_data TEXT,
    absence_data TEXT,
    scraped_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Citizenship: one row per citizenship group
CREATE TABLE IF NOT EXISTS school_citizenship_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    school_number TEXT NOT NULL,
    citizenship TEXT NOT NULL,
    female_students INTEGER NOT NULL DEFAULT 0,
    male_students INTEGER NOT NULL DEFAULT 0,
    total INTEGER NOT NULL DEFAULT 0,
    scraped_at TEXT NOT NULL
);

-- Non-German heritage language: one row per school
CREATE TABLE IF NOT EXISTS school_language_stats (
    school_number TEXT PRIMARY KEY,
    total_students INTEGER NOT NULL DEFAULT 0,
    ndh_female_students INTEGER NOT NULL DEFAULT 0,
    ndh_male_students INTEGER NOT NULL DEFAULT 0,
    ndh_total INTEGER NOT NULL DEFAULT 0,
    ndh_percentage REAL NOT NULL DEFAULT 0,
    scraped_at TEXT NOT NULL
);

-- Residence: one row per district
CREATE TABLE IF NOT EXISTS school_residence_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    school_number TEXT NOT NULL,
    district TEXT NOT NULL,
    student_count INTEGER NOT NULL DEFAULT 0,
    scraped_at TEXT NOT NULL
);

-- Absence rates: one row per school
CREATE TABLE IF NOT EXISTS school_absence_stats (
    school_number TEXT PRIMARY KEY,
    school_absence_rate REAL NOT NULL DEFAULT 0,
    school_unexcused_rate REAL NOT NULL DEFAULT 0,
    school_type_absence_rate REAL NOT NULL DEFAULT 0,
    school_type_unexcused_rate REAL NOT NULL DEFAULT 0,
    region_absence_rate REAL NOT NULL DEFAULT 0,
    region_unexcused_rate REAL NOT NULL DEFAULT 0,
    berlin_absence_rate REAL NOT NULL DEFAULT 0,
    berlin_unexcused_rate REAL NOT NULL DEFAULT 0,
    scraped_at TEXT NOT NULL
);

-- Statistics portal: one row per school and school year
CREATE TABLE IF NOT EXISTS school_statistics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    school_number TEXT NOT NULL,
    school_name TEXT NOT NULL DEFAULT '',
    district TEXT NOT NULL DEFAULT '',
    school_type TEXT NOT NULL DEFAULT '',
    school_year TEXT NOT NULL DEFAULT '',
    students TEXT NOT NULL DEFAULT '',
    students_male TEXT NOT NULL DEFAULT '',
    students_female TEXT NOT NULL DEFAULT '',
    teachers TEXT NOT NULL DEFAULT '',
    teachers_male TEXT NOT NULL DEFAULT '',
    teachers_female TEXT NOT NULL DEFAULT '',
    classes TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    scraped_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(school_number, school_year)
);

-- Harvest runs: tracking history
CREATE TABLE IF NOT EXISTS harvest_runs (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    total_links INTEGER DEFAULT 0,
    from_cache INTEGER DEFAULT 0,
    newly_scraped INTEGER DEFAULT 0,
    persisted INTEGER DEFAULT 0,
    errors INTEGER DEFAULT 0,
    errors_json TEXT
);

-- Indexes for common queries
CREATE INDEX IF NOT EXISTS idx_school_details_after4 ON school_details(available_after_4th_grade);
CREATE INDEX IF NOT EXISTS idx_citizenship_school ON school_citizenship_stats(school_number);
CREATE INDEX IF NOT EXISTS idx_residence_school ON school_residence_stats(school_number);
CREATE INDEX IF NOT EXISTS idx_school_statistics_year ON school_statistics(school_year);
CREATE INDEX IF NOT EXISTS idx_harvest_runs_started ON harvest_runs(started_at);
"#;
