use async_trait::async_trait;
use thiserror::Error;

use saathi_core::{CallRecord, CallStats};

pub mod call_record;
pub mod memory;

pub use call_record::SqlCallRecordRepository;
pub use memory::InMemoryCallRecordRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persistence sink for terminal call metadata plus the admin read-side.
/// The orchestrator writes fire-and-forget; reads serve the dashboard only.
#[async_trait]
pub trait CallRecordRepository: Send + Sync {
    async fn insert(&self, record: CallRecord) -> Result<(), RepositoryError>;
    async fn recent(&self, limit: u32) -> Result<Vec<CallRecord>, RepositoryError>;
    async fn stats(&self) -> Result<CallStats, RepositoryError>;
}
