//! Cache command implementation

use crate::cache::{CachePolicy, ContentCache};
use crate::config::Config;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of clearing the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCacheInfo {
    pub cache_dir: String,
    pub removed_entries: usize,
}

/// Delete every cached detail record
pub fn cmd_clear_cache(config: &Config) -> Result<ClearCacheInfo> {
    let cache = ContentCache::new(&config.paths.cache_dir, CachePolicy::ReadWrite);
    let removed_entries = cache.entry_count();
    cache.clear()?;
    info!("Removed {} cached records", removed_entries);

    Ok(ClearCacheInfo {
        cache_dir: config.paths.cache_dir.display().to_string(),
        removed_entries,
    })
}
