//! Reset command implementation

use crate::error::Result;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetInfo {
    pub deleted_details: u64,
}

/// Drop every stored school and its statistics. Run history is kept.
pub async fn cmd_reset(store: &Store) -> Result<ResetInfo> {
    warn!("Deleting all stored school details");
    let deleted_details = store.delete_all_details().await?;
    Ok(ResetInfo { deleted_details })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResidenceStat, SchoolRecord, StatRecords};
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reset_clears_details_and_stats() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(&tmp.path().join("schools.db")).await.unwrap();

        let mut record = SchoolRecord::new("https://example.com/a", Utc::now());
        record.school_number = "01A01".to_string();
        store.upsert_detail(&record).await.unwrap();
        store
            .replace_stats(
                "01A01",
                &StatRecords::Residence(vec![ResidenceStat {
                    school_number: "01A01".to_string(),
                    district: "Mitte".to_string(),
                    student_count: 4,
                    scraped_at: Utc::now().to_rfc3339(),
                }]),
            )
            .await
            .unwrap();
        store.start_run().await.unwrap();

        let info = cmd_reset(&store).await.unwrap();
        assert_eq!(info.deleted_details, 1);
        assert_eq!(store.count_details().await.unwrap(), 0);
        assert!(store.residence_stats("01A01").await.unwrap().is_empty());
        assert!(store.latest_run().await.unwrap().is_some());
    }
}
