use tokio::sync::Mutex;

use saathi_core::{CallRecord, CallStats};

use super::{CallRecordRepository, RepositoryError};

/// In-memory sink used by tests and by deployments that have not wired a
/// database yet.
#[derive(Default)]
pub struct InMemoryCallRecordRepository {
    records: Mutex<Vec<CallRecord>>,
}

impl InMemoryCallRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<CallRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl CallRecordRepository for InMemoryCallRecordRepository {
    async fn insert(&self, record: CallRecord) -> Result<(), RepositoryError> {
        self.records.lock().await.push(record);
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<CallRecord>, RepositoryError> {
        let records = self.records.lock().await;
        let mut rows: Vec<CallRecord> = records.clone();
        rows.sort_by(|a, b| b.ts_end.cmp(&a.ts_end));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn stats(&self) -> Result<CallStats, RepositoryError> {
        let records = self.records.lock().await;
        Ok(CallStats {
            total_calls: records.len() as i64,
            crisis_calls: records.iter().filter(|record| record.crisis_flag).count() as i64,
            kb_calls: records.iter().filter(|record| record.kb_used).count() as i64,
        })
    }
}
