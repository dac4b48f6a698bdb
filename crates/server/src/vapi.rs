//! Vendor-facing HTTP surface: the unified webhook plus the direct
//! lifecycle endpoints some deployments point the vendor at instead.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use saathi_core::OrchestratorError;
use saathi_telephony::normalize;

use crate::orchestrator::{
    CallEndRequest, CallOrchestrator, CallStartRequest, EscalateRequest, HandlerReply,
    ToolCallRequest, UserInputRequest,
};

const SECRET_HEADER: &str = "x-vapi-secret";
const ORCHESTRATOR_HEADER: &str = "x-orchestrator";
const ORCHESTRATOR_NAME: &str = "saathi";

#[derive(Clone)]
pub struct VapiState {
    pub orchestrator: Arc<CallOrchestrator>,
    /// Absent secret disables verification; the vendor sandbox sends no
    /// header at all.
    pub webhook_secret: Option<SecretString>,
    /// Epoch ms of the most recent webhook delivery, 0 before the first.
    pub last_event_at_ms: Arc<AtomicI64>,
}

impl VapiState {
    pub fn new(orchestrator: Arc<CallOrchestrator>, webhook_secret: Option<SecretString>) -> Self {
        Self { orchestrator, webhook_secret, last_event_at_ms: Arc::new(AtomicI64::new(0)) }
    }
}

pub fn router(state: VapiState) -> Router {
    Router::new()
        .route("/vapi/webhook", post(webhook))
        .route("/vapi/call-start", post(call_start))
        .route("/vapi/user-input", post(user_input))
        .route("/vapi/tool-call", post(tool_call))
        .route("/vapi/call-end", post(call_end))
        .route("/vapi/last-event", get(last_event))
        .route("/escalate", post(escalate))
        .with_state(state)
}

async fn webhook(
    State(state): State<VapiState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> ([(&'static str, &'static str); 1], HandlerReply) {
    let tagged = |reply: HandlerReply| ([(ORCHESTRATOR_HEADER, ORCHESTRATOR_NAME)], reply);

    if let Some(secret) = &state.webhook_secret {
        let provided = headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
        if provided != Some(secret.expose_secret()) {
            warn!(event_name = "ingress.webhook.rejected", "bad or missing webhook secret");
            return tagged(HandlerReply::refusal(&OrchestratorError::Unauthorized));
        }
    }

    state.last_event_at_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);

    let event = normalize(&payload);
    info!(
        event_name = "ingress.webhook.received",
        kind = ?event.kind(),
        call_id = event.call_id().unwrap_or("unknown"),
        "webhook delivered"
    );
    tagged(state.orchestrator.dispatch(event).await)
}

async fn call_start(
    State(state): State<VapiState>,
    Json(request): Json<CallStartRequest>,
) -> HandlerReply {
    state.orchestrator.call_start(request).await
}

async fn user_input(
    State(state): State<VapiState>,
    Json(request): Json<UserInputRequest>,
) -> HandlerReply {
    state.orchestrator.user_input(request).await
}

async fn tool_call(
    State(state): State<VapiState>,
    Json(request): Json<ToolCallRequest>,
) -> HandlerReply {
    state.orchestrator.tool_call(request).await
}

async fn call_end(
    State(state): State<VapiState>,
    Json(request): Json<CallEndRequest>,
) -> HandlerReply {
    state.orchestrator.call_end(request).await
}

async fn escalate(
    State(state): State<VapiState>,
    Json(request): Json<EscalateRequest>,
) -> HandlerReply {
    state.orchestrator.escalate(request).await
}

#[derive(Debug, Serialize)]
struct LastEventBody {
    last_event_at_ms: Option<i64>,
    last_event_at: Option<DateTime<Utc>>,
}

/// Liveness probe for the vendor integration: when did the webhook last fire.
async fn last_event(State(state): State<VapiState>) -> (StatusCode, Json<LastEventBody>) {
    let at_ms = state.last_event_at_ms.load(Ordering::Relaxed);
    let body = if at_ms == 0 {
        LastEventBody { last_event_at_ms: None, last_event_at: None }
    } else {
        LastEventBody {
            last_event_at_ms: Some(at_ms),
            last_event_at: DateTime::<Utc>::from_timestamp_millis(at_ms),
        }
    };
    (StatusCode::OK, Json(body))
}
