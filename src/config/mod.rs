//! Configuration management for schoolharvest
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable that overrides the database location
pub const DB_PATH_ENV: &str = "SCHOOLHARVEST_DB_PATH";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listing page enumerating all detail pages
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Statistics portal page holding the per-school grid
    #[serde(default = "default_statistics_url")]
    pub statistics_url: String,

    /// Explicit database file (overrides `<base>/schools.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Harvest timing and pacing
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Headless browser settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Content cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Harvest timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Hard per-page timeout in seconds
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    /// Delay after body readiness before extraction (milliseconds)
    #[serde(default = "default_page_settle")]
    pub page_settle_ms: u64,

    /// Delay after opening the statistics panel (milliseconds)
    #[serde(default = "default_tab_settle")]
    pub tab_settle_ms: u64,

    /// Delay after switching a category tab (milliseconds)
    #[serde(default = "default_category_settle")]
    pub category_settle_ms: u64,

    /// Minimum gap between live scrapes (milliseconds)
    #[serde(default = "default_pacing")]
    pub pacing_ms: u64,

    /// Deadline for a whole run in seconds
    #[serde(default = "default_run_deadline")]
    pub run_deadline_secs: u64,

    /// User agent for the listing request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Listing request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How the listing page is read
    #[serde(default)]
    pub listing_mode: ListingMode,
}

/// Source of the detail-page links
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingMode {
    /// Plain HTTP GET, links parsed from the static markup
    #[default]
    Http,
    /// Render the listing in the browser and read the resolved hrefs
    Browser,
}

/// Headless browser configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run without a visible window
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Chrome sandbox (disable for Docker/CI environments)
    #[serde(default = "default_sandbox")]
    pub sandbox: bool,

    /// Explicit Chrome/Chromium executable
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
}

/// Content cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether harvested records are cached on disk
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Cache root (defaults to `<base>/cache/school-details`)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for schoolharvest data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Root of the content cache
    pub cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            statistics_url: default_statistics_url(),
            database_path: None,
            harvest: HarvestConfig::default(),
            browser: BrowserConfig::default(),
            cache: CacheConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: default_page_timeout(),
            page_settle_ms: default_page_settle(),
            tab_settle_ms: default_tab_settle(),
            category_settle_ms: default_category_settle(),
            pacing_ms: default_pacing(),
            run_deadline_secs: default_run_deadline(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            listing_mode: ListingMode::default(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            sandbox: default_sandbox(),
            chrome_path: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            dir: None,
        }
    }
}

impl HarvestConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Get the default base directory (~/.schoolharvest)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".schoolharvest")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Resolve all derived paths from a base directory
    fn resolve_paths(&mut self, base: PathBuf, config_file: PathBuf) {
        let db_file = std::env::var(DB_PATH_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| self.database_path.clone())
            .unwrap_or_else(|| base.join("schools.db"));
        let cache_dir = self
            .cache
            .dir
            .clone()
            .unwrap_or_else(|| base.join("cache").join("school-details"));

        self.paths = PathsConfig {
            base_dir: base,
            config_file,
            db_file,
            cache_dir,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.resolve_paths(base, config_path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        let config_file = base.join("config.toml");

        let mut config = if config_file.exists() {
            debug!("Loading config from {:?}", config_file);
            let content = std::fs::read_to_string(&config_file)?;
            toml::from_str(&content)?
        } else {
            debug!("No config file found, using defaults");
            Config::default()
        };

        config.resolve_paths(base, config_file);
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if a config file has been written
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.harvest.page_timeout_secs == 0 {
            return Err(Error::Config(
                "harvest.page_timeout_secs must be positive".to_string(),
            ));
        }

        if self.harvest.run_deadline_secs == 0 {
            return Err(Error::Config(
                "harvest.run_deadline_secs must be positive".to_string(),
            ));
        }

        for (key, value) in [
            ("listing_url", &self.listing_url),
            ("statistics_url", &self.statistics_url),
        ] {
            let parsed = url::Url::parse(value)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "{} must be http(s), got '{}'",
                    key,
                    parsed.scheme()
                )));
            }
        }

        Ok(())
    }
}
