use chrono::{DateTime, Utc};
use sqlx::Row;

use saathi_core::{CallRecord, CallStats, Language};

use super::{CallRecordRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCallRecordRepository {
    pool: DbPool,
}

impl SqlCallRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CallRecordRepository for SqlCallRecordRepository {
    async fn insert(&self, record: CallRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO call_records \
             (call_id, ts_start, ts_end, duration_s, lang, crisis_flag, kb_used, kb_count, end_reason) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.call_id)
        .bind(record.ts_start.to_rfc3339())
        .bind(record.ts_end.to_rfc3339())
        .bind(record.duration_s)
        .bind(record.lang.as_str())
        .bind(record.crisis_flag)
        .bind(record.kb_used)
        .bind(i64::from(record.kb_count))
        .bind(&record.end_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<CallRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT call_id, ts_start, ts_end, duration_s, lang, crisis_flag, kb_used, kb_count, end_reason \
             FROM call_records ORDER BY ts_end DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_row).collect()
    }

    async fn stats(&self) -> Result<CallStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_calls, \
             COALESCE(SUM(crisis_flag), 0) AS crisis_calls, \
             COALESCE(SUM(kb_used), 0) AS kb_calls \
             FROM call_records",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CallStats {
            total_calls: row.get::<i64, _>("total_calls"),
            crisis_calls: row.get::<i64, _>("crisis_calls"),
            kb_calls: row.get::<i64, _>("kb_calls"),
        })
    }
}

fn decode_row(row: sqlx::sqlite::SqliteRow) -> Result<CallRecord, RepositoryError> {
    let lang_raw: String = row.get("lang");
    let lang = Language::parse(&lang_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown language `{lang_raw}`")))?;

    Ok(CallRecord {
        call_id: row.get("call_id"),
        ts_start: decode_timestamp(row.get("ts_start"))?,
        ts_end: decode_timestamp(row.get("ts_end"))?,
        duration_s: row.get("duration_s"),
        lang,
        crisis_flag: row.get("crisis_flag"),
        kb_used: row.get("kb_used"),
        kb_count: row.get::<i64, _>("kb_count") as u32,
        end_reason: row.get("end_reason"),
    })
}

fn decode_timestamp(raw: String) -> Result<DateTime<Utc>, RepositoryError> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}
