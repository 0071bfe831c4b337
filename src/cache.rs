//! Filesystem cache of harvested detail records.
//!
//! Entries are keyed by the SHA-256 of the page URL and sharded by the
//! first two hex characters: `<root>/ab/ab12...ef.json`. A missing or
//! unreadable entry is a miss, never an error.

use crate::error::Result;
use crate::models::SchoolRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How a run uses the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Replay hits, write fresh captures
    #[default]
    ReadWrite,
    /// Ignore existing entries but overwrite them with fresh captures
    Refresh,
    /// Neither read nor write
    Disabled,
}

impl CachePolicy {
    pub fn reads(&self) -> bool {
        matches!(self, CachePolicy::ReadWrite)
    }

    pub fn writes(&self) -> bool {
        !matches!(self, CachePolicy::Disabled)
    }
}

/// Content-addressed store of `SchoolRecord`s
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
    policy: CachePolicy,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>, policy: CachePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Same cache root under a different policy
    pub fn with_policy(&self, policy: CachePolicy) -> Self {
        Self {
            root: self.root.clone(),
            policy,
        }
    }

    /// Hex SHA-256 of the exact URL string
    pub fn key_for(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    /// Location of the entry for `url`
    pub fn entry_path(&self, url: &str) -> PathBuf {
        let key = Self::key_for(url);
        self.root.join(&key[..2]).join(format!("{}.json", key))
    }

    /// Cached record for `url`, if one exists and the policy allows reads
    pub fn get(&self, url: &str) -> Option<SchoolRecord> {
        if !self.policy.reads() {
            return None;
        }

        let path = self.entry_path(url);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => {
                debug!(url = %url, "Cache hit");
                Some(record)
            }
            Err(e) => {
                warn!(url = %url, path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Store `record` under `url`; failures are logged and reported as `false`
    pub fn put(&self, url: &str, record: &SchoolRecord) -> bool {
        if !self.policy.writes() {
            return false;
        }

        match self.try_put(url, record) {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to write cache entry");
                false
            }
        }
    }

    fn try_put(&self, url: &str, record: &SchoolRecord) -> Result<()> {
        let path = self.entry_path(url);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        debug!(url = %url, path = %path.display(), "Cached record");
        Ok(())
    }

    /// Remove the whole cache tree
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }

    /// Number of cached entries on disk
    pub fn entry_count(&self) -> usize {
        let Ok(shards) = std::fs::read_dir(&self.root) else {
            return 0;
        };

        shards
            .filter_map(|shard| shard.ok())
            .filter_map(|shard| std::fs::read_dir(shard.path()).ok())
            .flat_map(|entries| entries.filter_map(|e| e.ok()))
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawTable;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_record(url: &str) -> SchoolRecord {
        let mut record = SchoolRecord::new(url, Utc::now());
        record.school_number = "01Y01".to_string();
        record.school_name = "Gymnasium Alpha".to_string();
        record.languages = "Englisch, Französisch".to_string();
        record.citizenship_table = Some(RawTable {
            headers: vec!["Staatsangehörigkeit".into(), "w".into(), "m".into(), "ges".into()],
            rows: vec![vec!["Deutschland".into(), "10".into(), "12".into(), "22".into()]],
        });
        record
    }

    #[test]
    fn test_key_is_sha256_hex() {
        let key = ContentCache::key_for("https://example.com/a");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, ContentCache::key_for("https://example.com/b"));
    }

    #[test]
    fn test_entry_is_sharded() {
        let cache = ContentCache::new("/tmp/cache", CachePolicy::ReadWrite);
        let url = "https://example.com/a";
        let key = ContentCache::key_for(url);
        let expected = PathBuf::from("/tmp/cache").join(&key[..2]).join(format!("{}.json", key));
        assert_eq!(cache.entry_path(url), expected);
    }

    #[test]
    fn test_put_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let cache = ContentCache::new(tmp.path().join("cache"), CachePolicy::ReadWrite);
        let url = "https://example.com/school?IDSchulzweig=1";
        let record = sample_record(url);

        assert!(cache.put(url, &record));
        assert_eq!(cache.get(url), Some(record));
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_unknown_url_is_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = ContentCache::new(tmp.path(), CachePolicy::ReadWrite);
        assert!(cache.get("https://example.com/never").is_none());
    }

    #[test]
    fn test_corrupted_entry_is_absent() {
        let tmp = TempDir::new().unwrap();
        let cache = ContentCache::new(tmp.path(), CachePolicy::ReadWrite);
        let url = "https://example.com/broken";
        assert!(cache.put(url, &sample_record(url)));

        std::fs::write(cache.entry_path(url), "{ not json").unwrap();
        assert!(cache.get(url).is_none());
    }

    #[test]
    fn test_refresh_skips_reads_but_writes() {
        let tmp = TempDir::new().unwrap();
        let url = "https://example.com/a";
        let refresh = ContentCache::new(tmp.path(), CachePolicy::Refresh);

        assert!(refresh.put(url, &sample_record(url)));
        assert!(refresh.get(url).is_none());
        assert!(refresh.with_policy(CachePolicy::ReadWrite).get(url).is_some());
    }

    #[test]
    fn test_disabled_never_touches_disk() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let cache = ContentCache::new(&root, CachePolicy::Disabled);
        let url = "https://example.com/a";

        assert!(!cache.put(url, &sample_record(url)));
        assert!(!root.exists());
    }

    #[test]
    fn test_clear_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");
        let cache = ContentCache::new(&root, CachePolicy::ReadWrite);
        cache.put("https://example.com/a", &sample_record("https://example.com/a"));
        cache.put("https://example.com/b", &sample_record("https://example.com/b"));

        cache.clear().unwrap();
        assert!(!root.exists());
        assert_eq!(cache.entry_count(), 0);
        // clearing twice is fine
        cache.clear().unwrap();
    }
}
