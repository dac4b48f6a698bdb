//! Read-only admin surface over persisted call records. No auth here; the
//! deployment fronts these routes with its own access control.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::error;

use saathi_core::{CallRecord, CallStats};
use saathi_db::CallRecordRepository;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct AdminState {
    records: Arc<dyn CallRecordRepository>,
}

pub fn router(records: Arc<dyn CallRecordRepository>) -> Router {
    Router::new()
        .route("/admin/calls", get(recent_calls))
        .route("/admin/stats", get(stats))
        .with_state(AdminState { records })
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentCallsQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RecentCallsResponse {
    pub calls: Vec<CallRecord>,
}

#[derive(Debug, Serialize)]
pub struct AdminError {
    pub error: &'static str,
}

pub async fn recent_calls(
    State(state): State<AdminState>,
    Query(query): Query<RecentCallsQuery>,
) -> Result<Json<RecentCallsResponse>, (StatusCode, Json<AdminError>)> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let calls = state.records.recent(limit).await.map_err(storage_error)?;
    Ok(Json(RecentCallsResponse { calls }))
}

pub async fn stats(
    State(state): State<AdminState>,
) -> Result<Json<CallStats>, (StatusCode, Json<AdminError>)> {
    let stats = state.records.stats().await.map_err(storage_error)?;
    Ok(Json(stats))
}

fn storage_error(error: saathi_db::RepositoryError) -> (StatusCode, Json<AdminError>) {
    error!(event_name = "admin.query_failed", error = %error, "call record query failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(AdminError { error: "storage_unavailable" }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use chrono::{Duration, Utc};

    use saathi_core::{CallRecord, Language, Session};
    use saathi_db::{CallRecordRepository, InMemoryCallRecordRepository};

    use super::{recent_calls, stats, AdminState, RecentCallsQuery};

    async fn seeded_state() -> AdminState {
        let repo = Arc::new(InMemoryCallRecordRepository::new());
        let base = Utc::now();
        for index in 0..3 {
            let mut session = Session::new(format!("c{index}"), Language::Auto);
            if index == 0 {
                session.flag_crisis();
            }
            if index == 1 {
                session.record_kb_use(base.timestamp_millis());
            }
            repo.insert(CallRecord::from_session(
                &session,
                base + Duration::seconds(index),
                None,
                None,
                None,
            ))
            .await
            .expect("insert");
        }
        AdminState { records: repo }
    }

    #[tokio::test]
    async fn recent_calls_defaults_and_orders_newest_first() {
        let state = seeded_state().await;

        let response = recent_calls(State(state), Query(RecentCallsQuery::default()))
            .await
            .expect("recent calls");

        assert_eq!(response.0.calls.len(), 3);
        assert_eq!(response.0.calls[0].call_id, "c2");
    }

    #[tokio::test]
    async fn recent_calls_clamps_the_limit() {
        let state = seeded_state().await;

        let response = recent_calls(State(state), Query(RecentCallsQuery { limit: Some(1) }))
            .await
            .expect("recent calls");

        assert_eq!(response.0.calls.len(), 1);
    }

    #[tokio::test]
    async fn stats_counts_crisis_and_kb_calls() {
        let state = seeded_state().await;

        let response = stats(State(state)).await.expect("stats");

        assert_eq!(response.0.total_calls, 3);
        assert_eq!(response.0.crisis_calls, 1);
        assert_eq!(response.0.kb_calls, 1);
    }
}
