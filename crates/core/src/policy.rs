use std::time::Duration;

use crate::session::Session;

/// Intent marker the vendor NLU sends when the caller explicitly opts in to
/// cultural-reference enrichment.
pub const OPT_IN_INTENT: &str = "opt_in_epics";

/// Self-harm phrases in English and Hindi. Heuristic only; the vendor-side
/// model signal is expected to fire alongside this.
const CRISIS_KEYWORDS: &[&str] =
    &["suicide", "kill myself", "end my life", "आत्महत्या", "मरना"];

/// Case-insensitive keyword scan over a free-text transcript.
pub fn detect_crisis(transcript: &str) -> bool {
    let lowered = transcript.to_lowercase();
    CRISIS_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KbDenyReason {
    NotOptedIn,
    CrisisActive,
    CooldownActive,
    QuotaExhausted,
}

impl KbDenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotOptedIn => "not_opted_in",
            Self::CrisisActive => "crisis_active",
            Self::CooldownActive => "cooldown_active",
            Self::QuotaExhausted => "quota_exhausted",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KbAccessDecision {
    Allow,
    Deny { reason: KbDenyReason },
}

impl KbAccessDecision {
    pub fn allows(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Pure gate over session state deciding whether a KB invocation is
/// permitted right now. Evaluated before the collaborator is contacted;
/// no I/O, no side effects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KbAccessPolicy {
    pub cooldown: Duration,
    pub max_uses_per_call: u32,
}

impl Default for KbAccessPolicy {
    fn default() -> Self {
        Self { cooldown: Duration::from_secs(120), max_uses_per_call: 2 }
    }
}

impl KbAccessPolicy {
    pub fn evaluate(&self, session: &Session, now_ms: i64) -> KbAccessDecision {
        if !session.kb_opt_in {
            return KbAccessDecision::Deny { reason: KbDenyReason::NotOptedIn };
        }
        // Crisis suppression is absolute: no other field can re-enable access.
        if session.crisis {
            return KbAccessDecision::Deny { reason: KbDenyReason::CrisisActive };
        }
        if now_ms.saturating_sub(session.last_kb_ms) <= self.cooldown.as_millis() as i64 {
            return KbAccessDecision::Deny { reason: KbDenyReason::CooldownActive };
        }
        if session.kb_uses >= self.max_uses_per_call {
            return KbAccessDecision::Deny { reason: KbDenyReason::QuotaExhausted };
        }
        KbAccessDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::{detect_crisis, KbAccessDecision, KbAccessPolicy, KbDenyReason};
    use crate::session::{Language, Session};

    const NOW_MS: i64 = 1_700_000_000_000;

    fn opted_in_session() -> Session {
        let mut session = Session::new("c1", Language::Auto);
        session.kb_opt_in = true;
        session
    }

    #[test]
    fn denies_without_opt_in() {
        let policy = KbAccessPolicy::default();
        let session = Session::new("c1", Language::Auto);

        assert_eq!(
            policy.evaluate(&session, NOW_MS),
            KbAccessDecision::Deny { reason: KbDenyReason::NotOptedIn }
        );
    }

    #[test]
    fn allows_opted_in_fresh_session() {
        let policy = KbAccessPolicy::default();
        let session = opted_in_session();

        assert!(policy.evaluate(&session, NOW_MS).allows());
    }

    #[test]
    fn crisis_suppression_is_absolute() {
        let policy = KbAccessPolicy::default();
        let mut session = opted_in_session();
        session.flag_crisis();

        assert_eq!(
            policy.evaluate(&session, NOW_MS),
            KbAccessDecision::Deny { reason: KbDenyReason::CrisisActive }
        );

        // Even with quota and cooldown wide open, crisis wins.
        session.kb_uses = 0;
        session.last_kb_ms = 0;
        assert!(!policy.evaluate(&session, NOW_MS).allows());
    }

    #[test]
    fn cooldown_denies_within_window_and_clears_after() {
        let policy = KbAccessPolicy::default();
        let mut session = opted_in_session();
        session.record_kb_use(NOW_MS);

        assert_eq!(
            policy.evaluate(&session, NOW_MS + 1_000),
            KbAccessDecision::Deny { reason: KbDenyReason::CooldownActive }
        );
        assert!(policy.evaluate(&session, NOW_MS + 120_001).allows());
    }

    #[test]
    fn quota_denies_immediately_after_second_use() {
        let policy = KbAccessPolicy::default();
        let mut session = opted_in_session();

        session.record_kb_use(NOW_MS);
        assert!(policy.evaluate(&session, NOW_MS + 200_000).allows());

        session.record_kb_use(NOW_MS + 200_000);
        assert_eq!(
            policy.evaluate(&session, NOW_MS + 500_000),
            KbAccessDecision::Deny { reason: KbDenyReason::QuotaExhausted }
        );
    }

    #[test]
    fn crisis_keywords_match_case_insensitively() {
        assert!(detect_crisis("I want to End My Life"));
        assert!(detect_crisis("thinking about suicide lately"));
        assert!(!detect_crisis("tell me about the weather"));
    }

    #[test]
    fn crisis_keywords_cover_hindi_phrases() {
        assert!(detect_crisis("मुझे लगता है कि आत्महत्या ही रास्ता है"));
        assert!(detect_crisis("मैं मरना चाहता हूँ"));
    }
}
