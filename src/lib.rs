//! schoolharvest - harvester for the Berlin school directory
//!
//! This crate provides:
//! - A cache-aware, paced harvester that drives a headless browser through
//!   every school detail page
//! - Table extraction and normalization of the per-school statistics
//! - Idempotent persistence into SQLite, keyed by school number

pub mod browser;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod models;
pub mod progress;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
