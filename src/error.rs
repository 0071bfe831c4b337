//! Custom error types for schoolharvest

use std::time::Duration;
use thiserror::Error;

/// Main error type for schoolharvest operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Listing fetch failed: {0}")]
    Listing(String),

    #[error("Statistics fetch failed: {0}")]
    Statistics(String),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Record for {0} has no school number")]
    MissingNaturalKey(String),

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),
}

/// Result type alias for schoolharvest
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single browser call
///
/// Every driver primitive returns this instead of panicking or bubbling a
/// transport error, so call sites have to decide between "skip this field"
/// and "abandon this page".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("Timed out after {after:?} on {url}")]
    Timeout { url: String, after: Duration },

    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Script error: {0}")]
    ScriptError(String),
}

impl BrowserError {
    /// True when the page as a whole must be abandoned
    pub fn is_page_fatal(&self) -> bool {
        !matches!(self, BrowserError::ScriptError(_))
    }
}

/// Result type for browser primitives
pub type BrowserResult<T> = std::result::Result<T, BrowserError>;
