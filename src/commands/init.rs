//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Paths written by `init`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitInfo {
    pub base_dir: String,
    pub config_path: String,
    pub db_path: String,
    pub cache_dir: String,
}

/// Write a default config and create the database schema
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitInfo> {
    let config = Config::load_from(base_dir)?;

    if config.is_initialized() && !force {
        return Err(Error::AlreadyInitialized(
            config.paths.config_file.display().to_string(),
        ));
    }

    std::fs::create_dir_all(&config.paths.base_dir)?;
    config.save()?;
    info!("Created config at {:?}", config.paths.config_file);

    let store = Store::new(&config.paths.db_file).await?;
    store.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    std::fs::create_dir_all(&config.paths.cache_dir)?;

    Ok(InitInfo {
        base_dir: config.paths.base_dir.display().to_string(),
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        cache_dir: config.paths.cache_dir.display().to_string(),
    })
}

/// Print init results to console
pub fn print_init(info: &InitInfo) {
    println!("✓ Initialized schoolharvest at {}", info.base_dir);
    println!("\nConfiguration: {}", info.config_path);
    println!("Database: {}", info.db_path);
    println!("Cache: {}", info.cache_dir);
    println!("\nNext steps:");
    println!("  schoolharvest scrape      # Harvest all detail pages");
    println!("  schoolharvest summary     # Count stored schools");
}
