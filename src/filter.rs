//! Participation filter.
//!
//! A thread qualifies when its title, lowercased, contains the phrase
//! `participation d`. Nothing else is consulted.

use serde_json::Value;

use crate::fields;

pub const QUALIFYING_PHRASE: &str = "participation d";

/// Whether a raw thread belongs to the participation subset.
pub fn is_qualifying(thread: &Value) -> bool {
    fields::probe_str(thread, &fields::TITLE)
        .map(title_qualifies)
        .unwrap_or(false)
}

pub fn title_qualifies(title: &str) -> bool {
    let title = title.trim();
    !title.is_empty() && title.to_lowercase().contains(QUALIFYING_PHRASE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substring_match_is_case_insensitive() {
        assert!(title_qualifies("Special Participation D: Muon"));
        assert!(title_qualifies("SPECIAL PARTICIPATION D"));
        assert!(title_qualifies("participation directory"));
    }

    #[test]
    fn near_misses_do_not_qualify() {
        assert!(!title_qualifies("Participation C"));
        assert!(!title_qualifies("ParticipationD"));
        assert!(!title_qualifies("Participation  D"));
        assert!(!title_qualifies(""));
        assert!(!title_qualifies("   "));
    }

    #[test]
    fn reads_title_then_subject() {
        assert!(is_qualifying(&json!({"title": "Participation D"})));
        assert!(is_qualifying(&json!({"subject": "participation d writeup"})));
        assert!(is_qualifying(&json!({"title": "", "subject": "Participation D"})));
        assert!(!is_qualifying(&json!({"title": "HW1", "subject": "Participation D"})));
        assert!(!is_qualifying(&json!({"body": "Participation D"})));
        assert!(!is_qualifying(&json!({"title": 7})));
    }
}
