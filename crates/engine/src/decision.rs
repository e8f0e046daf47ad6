//! Meeting badge inference from free-text lines.
//!
//! Explicit decisions always win. Without one, a line is matched against
//! keyword groups in order hold, approved, kickoff. Text that matches none of
//! them is reported as [`MeetingDecision::Reviewing`], the neutral badge.

use bureau_protocol::MeetingDecision;
use regex::Regex;
use std::sync::OnceLock;

fn hold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(hold|on hold|pause|paused|postpone|postponed|block|blocked|reject|rejected|defer|deferred)\b|보류|중단|반려|保留|暂缓|延期",
        )
        .expect("hold keyword regex")
    })
}

fn approved_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(approve|approved|lgtm|ship it|go ahead|green ?light|sign(ed)? off)\b|승인|承認|批准|通过",
        )
        .expect("approval keyword regex")
    })
}

fn kickoff_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(kick ?off|let'?s start|starting|begin|agenda)\b|착수|킥오프|시작|開始|开始")
            .expect("kickoff keyword regex")
    })
}

/// Badge for a meeting line. Negations like "not approved" read as hold.
pub fn infer_decision(line: &str) -> MeetingDecision {
    if line.trim().is_empty() {
        return MeetingDecision::Reviewing;
    }
    if hold_re().is_match(line) || negated_approval(line) {
        return MeetingDecision::Hold;
    }
    if approved_re().is_match(line) {
        return MeetingDecision::Approved;
    }
    if kickoff_re().is_match(line) {
        return MeetingDecision::Kickoff;
    }
    MeetingDecision::Reviewing
}

pub fn resolve_decision(explicit: Option<MeetingDecision>, line: Option<&str>) -> MeetingDecision {
    explicit.unwrap_or_else(|| line.map(infer_decision).unwrap_or(MeetingDecision::Reviewing))
}

fn negated_approval(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(not|never|can'?t|cannot|won'?t)\s+(be\s+)?(approve|approved|sign off)\b")
            .expect("negation regex")
    })
    .is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_groups() {
        assert_eq!(infer_decision("LGTM, ship it"), MeetingDecision::Approved);
        assert_eq!(infer_decision("Let's put this on hold"), MeetingDecision::Hold);
        assert_eq!(infer_decision("Kickoff: agenda first"), MeetingDecision::Kickoff);
        assert_eq!(infer_decision("이 건은 승인합니다"), MeetingDecision::Approved);
        assert_eq!(infer_decision("일단 보류"), MeetingDecision::Hold);
    }

    #[test]
    fn hold_beats_approval() {
        assert_eq!(
            infer_decision("approved in principle but blocked on legal"),
            MeetingDecision::Hold
        );
        assert_eq!(infer_decision("this cannot be approved yet"), MeetingDecision::Hold);
    }

    #[test]
    fn ambiguous_text_is_reviewing() {
        assert_eq!(infer_decision("hmm, interesting numbers"), MeetingDecision::Reviewing);
        assert_eq!(infer_decision("   "), MeetingDecision::Reviewing);
        // Word boundaries: "holder" is not "hold".
        assert_eq!(infer_decision("ask the stakeholder"), MeetingDecision::Reviewing);
    }

    #[test]
    fn explicit_decision_wins() {
        assert_eq!(
            resolve_decision(Some(MeetingDecision::Kickoff), Some("approved")),
            MeetingDecision::Kickoff
        );
        assert_eq!(resolve_decision(None, None), MeetingDecision::Reviewing);
    }
}
