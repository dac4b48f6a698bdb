//! Call lifecycle state machine. Every vendor event funnels through here,
//! whether it arrived on the unified webhook or a direct endpoint.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use saathi_core::{
    detect_crisis, CallRecord, KbAccessDecision, KbAccessPolicy, Language, OrchestratorError,
    Session, SessionStore, OPT_IN_INTENT,
};
use saathi_db::CallRecordRepository;
use saathi_kb::{KbClient, KbSearchRequest};
use saathi_telephony::{TelephonyAdapter, VendorEvent};

/// Wire shape of every orchestrator reply: `ok` always, `error` on refusals,
/// `result` on tool responses.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// Status plus body, kept as data so tests can assert on replies without
/// dismantling an HTTP response.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerReply {
    pub status: StatusCode,
    pub body: ApiResponse,
}

impl HandlerReply {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            body: ApiResponse { ok: true, error: None, result: None },
        }
    }

    pub fn with_result(result: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: ApiResponse { ok: true, error: None, result: Some(result) },
        }
    }

    pub fn refusal(error: &OrchestratorError) -> Self {
        let status = match error {
            OrchestratorError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::Unauthorized => StatusCode::UNAUTHORIZED,
        };
        Self {
            status,
            body: ApiResponse { ok: false, error: Some(error.error_code()), result: None },
        }
    }
}

impl IntoResponse for HandlerReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CallStartRequest {
    #[serde(alias = "callId")]
    pub call_id: Option<String>,
    pub lang: Option<Language>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserInputRequest {
    #[serde(alias = "callId")]
    pub call_id: Option<String>,
    pub intent: Option<String>,
    pub transcript: Option<String>,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ToolCallRequest {
    #[serde(alias = "callId")]
    pub call_id: Option<String>,
    pub tool: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CallEndRequest {
    #[serde(alias = "callId")]
    pub call_id: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub ts_start: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_duration")]
    pub duration_s: Option<i64>,
    #[serde(alias = "end_reason")]
    pub reason: Option<String>,
}

/// Direct call-end bodies degrade like webhook payloads: timing fields that
/// fail to parse become absent and take the record fallbacks, rather than
/// failing JSON extraction.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(|raw| raw.parse::<DateTime<Utc>>().ok()))
}

fn lenient_duration<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EscalateRequest {
    #[serde(alias = "callId")]
    pub call_id: Option<String>,
}

pub struct CallOrchestrator {
    store: SessionStore,
    policy: KbAccessPolicy,
    kb: Arc<dyn KbClient>,
    telephony: Arc<dyn TelephonyAdapter>,
    records: Arc<dyn CallRecordRepository>,
    hotline_number: String,
    kb_max_passages: u8,
}

impl CallOrchestrator {
    pub fn new(
        kb: Arc<dyn KbClient>,
        telephony: Arc<dyn TelephonyAdapter>,
        records: Arc<dyn CallRecordRepository>,
        hotline_number: impl Into<String>,
        kb_max_passages: u8,
    ) -> Self {
        Self {
            store: SessionStore::new(),
            policy: KbAccessPolicy::default(),
            kb,
            telephony,
            records,
            hotline_number: hotline_number.into(),
            kb_max_passages,
        }
    }

    /// Routes one canonical event to its lifecycle handler. The reply is
    /// exactly what the matching direct endpoint would have produced.
    pub async fn dispatch(&self, event: VendorEvent) -> HandlerReply {
        match event {
            VendorEvent::CallStarted { call_id } => {
                self.call_start(CallStartRequest { call_id: Some(call_id), lang: None }).await
            }
            VendorEvent::UserInput { call_id, intent, transcript, latency_ms } => {
                self.user_input(UserInputRequest {
                    call_id: Some(call_id),
                    intent,
                    transcript,
                    latency_ms,
                })
                .await
            }
            VendorEvent::ToolCall { call_id, tool, query } => {
                self.tool_call(ToolCallRequest { call_id: Some(call_id), tool, query }).await
            }
            VendorEvent::CallEnded { call_id, ts_start, duration_s, reason } => {
                self.call_end(CallEndRequest {
                    call_id: Some(call_id),
                    ts_start,
                    duration_s,
                    reason,
                })
                .await
            }
            VendorEvent::Unrecognized { event_type } => {
                warn!(
                    event_name = "ingress.event.unrecognized",
                    event_type = %event_type,
                    "acknowledging unrecognized event"
                );
                HandlerReply::ok()
            }
        }
    }

    pub async fn call_start(&self, request: CallStartRequest) -> HandlerReply {
        let call_id = request.call_id.unwrap_or_else(minted_call_id);
        let lang = request.lang.unwrap_or_default();
        self.store.create(&call_id, lang);
        info!(
            event_name = "call.started",
            call_id = %call_id,
            lang = %lang,
            active_sessions = self.store.len(),
            "session opened"
        );
        HandlerReply::ok()
    }

    pub async fn user_input(&self, request: UserInputRequest) -> HandlerReply {
        let Some(handle) = request.call_id.as_deref().and_then(|id| self.store.get(id)) else {
            return self.reject_absent("user_input", request.call_id.as_deref());
        };

        let mut session = handle.lock().await;
        session.turn_count += 1;
        if let Some(latency) = request.latency_ms {
            session.metrics.last_turn_latency_ms = Some(latency);
        }
        if request.intent.as_deref() == Some(OPT_IN_INTENT) {
            session.kb_opt_in = true;
            info!(event_name = "kb.opt_in", call_id = %session.call_id, "caller opted in");
        }
        if let Some(transcript) = request.transcript.as_deref() {
            if detect_crisis(transcript) && !session.crisis {
                session.flag_crisis();
                warn!(
                    event_name = "crisis.flagged",
                    call_id = %session.call_id,
                    "crisis language detected; kb suppressed for the rest of the call"
                );
            }
        }
        HandlerReply::ok()
    }

    pub async fn tool_call(&self, request: ToolCallRequest) -> HandlerReply {
        let Some(handle) = request.call_id.as_deref().and_then(|id| self.store.get(id)) else {
            return self.reject_absent("tool_call", request.call_id.as_deref());
        };

        // Lock held across the KB await: concurrent events for the same call
        // serialize here, while other calls proceed untouched.
        let mut session = handle.lock().await;
        match request.tool.as_deref() {
            Some("kb_search") => {
                self.kb_search(&mut session, request.query.unwrap_or_default()).await
            }
            Some("crisis_signal") => {
                // Echoes the session's standing flag; the heuristic already
                // ran on the transcripts.
                let assessment = if session.crisis {
                    json!({"risk_level": "high", "reason": "heuristic", "confidence": 0.7})
                } else {
                    json!({"risk_level": "none", "reason": "none", "confidence": 0.9})
                };
                HandlerReply::with_result(assessment)
            }
            other => {
                debug!(
                    event_name = "tool.unknown",
                    call_id = %session.call_id,
                    tool = other.unwrap_or("<missing>"),
                    "acknowledging unknown tool"
                );
                HandlerReply::with_result(json!({}))
            }
        }
    }

    async fn kb_search(&self, session: &mut Session, query: String) -> HandlerReply {
        let now_ms = Utc::now().timestamp_millis();
        if let KbAccessDecision::Deny { reason } = self.policy.evaluate(session, now_ms) {
            info!(
                event_name = "kb.denied",
                call_id = %session.call_id,
                reason = reason.as_str(),
                kb_uses = session.kb_uses,
                "kb access denied"
            );
            return HandlerReply::with_result(json!({"passages": []}));
        }

        let request = KbSearchRequest { query, lang: session.lang, k: self.kb_max_passages };
        match self.kb.search(&request, session.crisis).await {
            Ok(response) => {
                session.record_kb_use(Utc::now().timestamp_millis());
                let body = serde_json::to_value(&response)
                    .unwrap_or_else(|_| json!({"passages": []}));
                HandlerReply::with_result(body)
            }
            Err(error) => {
                warn!(
                    event_name = "kb.search_failed",
                    call_id = %session.call_id,
                    error = %error,
                    "kb unreachable; failing open with zero passages"
                );
                HandlerReply::with_result(json!({"passages": []}))
            }
        }
    }

    pub async fn call_end(&self, request: CallEndRequest) -> HandlerReply {
        let Some(handle) = request.call_id.as_deref().and_then(|id| self.store.remove(id)) else {
            // Already-ended or never-started calls acknowledge without a
            // second record.
            debug!(
                event_name = "call.end.noop",
                call_id = request.call_id.as_deref().unwrap_or("unknown"),
                "no live session to close"
            );
            return HandlerReply::ok();
        };

        let session = handle.lock().await;
        let record = CallRecord::from_session(
            &session,
            Utc::now(),
            request.ts_start,
            request.duration_s,
            request.reason,
        );
        info!(
            event_name = "call.ended",
            call_id = %record.call_id,
            duration_s = record.duration_s,
            crisis = record.crisis_flag,
            kb_count = record.kb_count,
            reason = %record.end_reason,
            "session closed"
        );

        // Fire-and-forget: the caller never waits on the database.
        let records = Arc::clone(&self.records);
        tokio::spawn(async move {
            if let Err(error) = records.insert(record).await {
                warn!(
                    event_name = "call.record.persist_failed",
                    error = %error,
                    "dropping call record"
                );
            }
        });
        HandlerReply::ok()
    }

    pub async fn escalate(&self, request: EscalateRequest) -> HandlerReply {
        // No session lookup: bridging to the hotline must work even for
        // calls this process never tracked.
        let call_id = request.call_id.unwrap_or_else(|| "unknown".to_owned());
        warn!(
            event_name = "call.escalated",
            call_id = %call_id,
            hotline = %self.hotline_number,
            "bridging caller to hotline"
        );
        if let Err(error) = self.telephony.escalate(&call_id, &self.hotline_number).await {
            warn!(
                event_name = "call.escalate_failed",
                call_id = %call_id,
                error = %error,
                "telephony bridge failed"
            );
        }
        HandlerReply::ok()
    }

    pub fn active_sessions(&self) -> usize {
        self.store.len()
    }

    fn reject_absent(&self, operation: &'static str, call_id: Option<&str>) -> HandlerReply {
        let error = OrchestratorError::SessionNotFound {
            call_id: call_id.unwrap_or("unknown").to_owned(),
        };
        debug!(
            event_name = "call.session.missing",
            operation,
            error = %error,
            "rejecting event for absent session"
        );
        HandlerReply::refusal(&error)
    }

    #[cfg(test)]
    pub(crate) fn session(&self, call_id: &str) -> Option<saathi_core::SharedSession> {
        self.store.get(call_id)
    }
}

fn minted_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}
