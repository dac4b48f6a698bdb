use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Language, Session};

pub const DEFAULT_CALL_DURATION_S: i64 = 60;
pub const DEFAULT_END_REASON: &str = "normal";

/// Terminal metadata emitted once per ended call to the persistence
/// collaborator. Built from the session's final state plus whatever timing
/// the vendor supplied on the call-end payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub ts_start: DateTime<Utc>,
    pub ts_end: DateTime<Utc>,
    pub duration_s: i64,
    pub lang: Language,
    pub crisis_flag: bool,
    pub kb_used: bool,
    pub kb_count: u32,
    pub end_reason: String,
}

impl CallRecord {
    /// Fallbacks when the vendor omits timing: start = end - 60s,
    /// duration = 60s, reason = "normal".
    pub fn from_session(
        session: &Session,
        ts_end: DateTime<Utc>,
        ts_start: Option<DateTime<Utc>>,
        duration_s: Option<i64>,
        end_reason: Option<String>,
    ) -> Self {
        Self {
            call_id: session.call_id.clone(),
            ts_start: ts_start
                .unwrap_or_else(|| ts_end - Duration::seconds(DEFAULT_CALL_DURATION_S)),
            ts_end,
            duration_s: duration_s.unwrap_or(DEFAULT_CALL_DURATION_S),
            lang: session.lang,
            crisis_flag: session.crisis,
            kb_used: session.kb_uses > 0,
            kb_count: session.kb_uses,
            end_reason: end_reason.unwrap_or_else(|| DEFAULT_END_REASON.to_owned()),
        }
    }
}

/// Aggregate counters for the admin read-side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    pub total_calls: i64,
    pub crisis_calls: i64,
    pub kb_calls: i64,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::CallRecord;
    use crate::session::{Language, Session};

    #[test]
    fn untouched_session_produces_quiet_record() {
        let session = Session::new("c1", Language::Auto);
        let ts_end = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let record = CallRecord::from_session(&session, ts_end, None, None, None);

        assert_eq!(record.call_id, "c1");
        assert!(!record.kb_used);
        assert_eq!(record.kb_count, 0);
        assert!(!record.crisis_flag);
        assert_eq!(record.end_reason, "normal");
        assert_eq!(record.duration_s, 60);
        assert_eq!(record.ts_start, ts_end - Duration::seconds(60));
    }

    #[test]
    fn vendor_supplied_timing_wins_over_fallbacks() {
        let mut session = Session::new("c2", Language::Hi);
        session.record_kb_use(1_700_000_000_000);
        session.flag_crisis();

        let ts_end = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        let ts_start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 10, 0).unwrap();
        let record = CallRecord::from_session(
            &session,
            ts_end,
            Some(ts_start),
            Some(1_200),
            Some("hangup".to_owned()),
        );

        assert_eq!(record.ts_start, ts_start);
        assert_eq!(record.duration_s, 1_200);
        assert_eq!(record.end_reason, "hangup");
        assert_eq!(record.lang, Language::Hi);
        assert!(record.kb_used);
        assert_eq!(record.kb_count, 1);
        assert!(record.crisis_flag);
    }
}
