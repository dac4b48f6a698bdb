use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Field names tried, in order, when classifying a webhook payload. The
/// vendor has shipped all three spellings across webhook revisions.
const TYPE_FIELDS: &[&str] = &["type", "event", "event_type"];
/// Field names tried, in order, when extracting the call identifier.
const ID_FIELDS: &[&str] = &["callId", "call_id", "id"];

/// Closed set of canonical vendor events. Everything the webhook can carry
/// maps onto exactly one of these; unknown shapes land in `Unrecognized`
/// and are acknowledged without further processing.
#[derive(Clone, Debug, PartialEq)]
pub enum VendorEvent {
    CallStarted {
        call_id: String,
    },
    UserInput {
        call_id: String,
        intent: Option<String>,
        transcript: Option<String>,
        latency_ms: Option<u64>,
    },
    ToolCall {
        call_id: String,
        tool: Option<String>,
        query: Option<String>,
    },
    CallEnded {
        call_id: String,
        ts_start: Option<DateTime<Utc>>,
        duration_s: Option<i64>,
        reason: Option<String>,
    },
    Unrecognized {
        event_type: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VendorEventKind {
    CallStarted,
    UserInput,
    ToolCall,
    CallEnded,
    Unrecognized,
}

impl VendorEvent {
    pub fn kind(&self) -> VendorEventKind {
        match self {
            Self::CallStarted { .. } => VendorEventKind::CallStarted,
            Self::UserInput { .. } => VendorEventKind::UserInput,
            Self::ToolCall { .. } => VendorEventKind::ToolCall,
            Self::CallEnded { .. } => VendorEventKind::CallEnded,
            Self::Unrecognized { .. } => VendorEventKind::Unrecognized,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::CallStarted { call_id }
            | Self::UserInput { call_id, .. }
            | Self::ToolCall { call_id, .. }
            | Self::CallEnded { call_id, .. } => Some(call_id),
            Self::Unrecognized { .. } => None,
        }
    }
}

/// Classifies an arbitrary vendor webhook payload into one canonical event.
/// Total: never fails, never panics — a shape we cannot place becomes
/// `Unrecognized` so the webhook can still be acknowledged.
pub fn normalize(payload: &Value) -> VendorEvent {
    let Some(event_type) = first_string(payload, TYPE_FIELDS) else {
        return VendorEvent::Unrecognized { event_type: "<missing>".to_owned() };
    };

    match event_type.as_str() {
        "call.started" | "on_call_start" => VendorEvent::CallStarted {
            // Only call-start may mint an id; other kinds answer per their
            // absent-session rules when the vendor omits one.
            call_id: first_string(payload, ID_FIELDS).unwrap_or_else(generated_call_id),
        },
        "user.input" | "on_user_input" | "transcript.partial" => VendorEvent::UserInput {
            call_id: call_id_or_unknown(payload),
            intent: string_field(payload, "intent"),
            transcript: string_field(payload, "transcript"),
            latency_ms: payload.get("latency_ms").and_then(Value::as_u64),
        },
        "tool.call" | "on_tool_call" => VendorEvent::ToolCall {
            call_id: call_id_or_unknown(payload),
            tool: tool_name(payload),
            query: tool_query(payload),
        },
        "call.ended" | "on_call_end" => VendorEvent::CallEnded {
            call_id: call_id_or_unknown(payload),
            ts_start: string_field(payload, "ts_start")
                .and_then(|raw| raw.parse::<DateTime<Utc>>().ok()),
            duration_s: duration_field(payload),
            reason: string_field(payload, "reason").or_else(|| string_field(payload, "end_reason")),
        },
        other => VendorEvent::Unrecognized { event_type: other.to_owned() },
    }
}

fn generated_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

fn call_id_or_unknown(payload: &Value) -> String {
    first_string(payload, ID_FIELDS).unwrap_or_else(|| "unknown".to_owned())
}

fn first_string(payload: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| string_field(payload, field))
}

fn string_field(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// The vendor nests tool invocations as `{tool: {name, args}}` on newer
/// webhook revisions and sends a bare `{tool: "name"}` on older ones.
fn tool_name(payload: &Value) -> Option<String> {
    let tool = payload.get("tool")?;
    match tool {
        Value::Object(fields) => {
            fields.get("name").and_then(Value::as_str).map(str::to_owned)
        }
        Value::String(name) => Some(name.clone()),
        _ => None,
    }
}

fn tool_query(payload: &Value) -> Option<String> {
    payload
        .get("tool")
        .and_then(|tool| tool.get("args"))
        .and_then(|args| args.get("query"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| string_field(payload, "query"))
}

fn duration_field(payload: &Value) -> Option<i64> {
    let raw = payload.get("duration_s")?;
    match raw {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}
