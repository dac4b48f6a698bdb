use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Conversational language for a call. `Auto` until the vendor (or an
/// operator) pins the call to a concrete language.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
    #[default]
    Auto,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Hi => "hi",
            Self::Auto => "auto",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "hi" => Some(Self::Hi),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observability passthrough supplied by the vendor; never computed here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub last_turn_latency_ms: Option<u64>,
    pub latency_p95_ms: Option<u64>,
}

/// Per-call conversational state, alive from call-start to call-end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub call_id: String,
    pub lang: Language,
    pub kb_opt_in: bool,
    pub crisis: bool,
    /// Epoch ms of the last permitted KB invocation; 0 if never used.
    pub last_kb_ms: i64,
    pub kb_uses: u32,
    pub turn_count: u32,
    pub metrics: SessionMetrics,
}

impl Session {
    pub fn new(call_id: impl Into<String>, lang: Language) -> Self {
        Self {
            call_id: call_id.into(),
            lang,
            kb_opt_in: false,
            crisis: false,
            last_kb_ms: 0,
            kb_uses: 0,
            turn_count: 0,
            metrics: SessionMetrics::default(),
        }
    }

    /// Crisis is sticky: there is deliberately no way to clear it back.
    pub fn flag_crisis(&mut self) {
        self.crisis = true;
    }

    /// Bookkeeping for one successful KB invocation.
    pub fn record_kb_use(&mut self, now_ms: i64) {
        self.kb_uses += 1;
        self.last_kb_ms = now_ms;
    }
}

/// Handle to one call's state. The per-call mutex serializes mutation even
/// when the hosting runtime delivers concurrent events for the same call,
/// without blocking handlers for other calls across KB awaits.
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// Keyed registry of live call sessions. Owned by the orchestrator and
/// injected where needed; there is no process-global instance.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh session for `call_id`, replacing any stale entry.
    /// A duplicate call-start therefore resets all counters.
    pub fn create(&self, call_id: &str, lang: Language) -> SharedSession {
        let session = Arc::new(tokio::sync::Mutex::new(Session::new(call_id, lang)));
        self.lock_map().insert(call_id.to_owned(), Arc::clone(&session));
        session
    }

    pub fn get(&self, call_id: &str) -> Option<SharedSession> {
        self.lock_map().get(call_id).cloned()
    }

    /// Removes and returns the session; `None` when absent (idempotent end).
    pub fn remove(&self, call_id: &str) -> Option<SharedSession> {
        self.lock_map().remove(call_id)
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_map().is_empty()
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedSession>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
