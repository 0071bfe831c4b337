//! Default values for configuration

/// Listing page of the Berlin school directory
pub fn default_listing_url() -> String {
    std::env::var("SCHOOLHARVEST_LISTING_URL").unwrap_or_else(|_| {
        "https://www.bildung.berlin.de/Schulverzeichnis/SchulListe.aspx".to_string()
    })
}

/// Per-school grid of the education statistics portal
pub fn default_statistics_url() -> String {
    std::env::var("SCHOOLHARVEST_STATISTICS_URL").unwrap_or_else(|_| {
        "https://www.bildungsstatistik.berlin.de/statistik/ListGen/SVZ_Fakt5.aspx".to_string()
    })
}

/// Hard wall-clock limit for one detail page (seconds)
pub fn default_page_timeout() -> u64 {
    120
}

/// Settle delay after the body becomes ready (milliseconds)
pub fn default_page_settle() -> u64 {
    1000
}

/// Pause after revealing the statistics panel (milliseconds)
pub fn default_tab_settle() -> u64 {
    2000
}

/// Pause after switching a statistics category tab (milliseconds)
pub fn default_category_settle() -> u64 {
    1000
}

/// Gap enforced between consecutive live scrapes (milliseconds)
pub fn default_pacing() -> u64 {
    2000
}

/// Overall run deadline (seconds), four hours
pub fn default_run_deadline() -> u64 {
    4 * 60 * 60
}

/// User agent for the listing fetch
pub fn default_user_agent() -> String {
    format!(
        "schoolharvest/{} (school directory harvester)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Listing request timeout in seconds
pub fn default_request_timeout() -> u64 {
    30
}

/// Default: run Chrome headless
pub fn default_headless() -> bool {
    true
}

/// Default: keep the Chrome sandbox on
pub fn default_sandbox() -> bool {
    true
}

/// Default: cache enabled
pub fn default_cache_enabled() -> bool {
    true
}
