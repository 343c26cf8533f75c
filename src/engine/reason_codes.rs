//! Canonical reason codes for analyzer explain output.
//!
//! Codes are additive; existing codes are never removed or renamed. Free-text
//! reasons map to codes through a fixed heuristic when no explicit code is
//! supplied.

pub const H2H_USED: &str = "H2H_USED";
pub const TOP_SEP: &str = "TOP_SEP";
pub const MISSING_STATS: &str = "MISSING_STATS";
pub const XG_PROXY: &str = "XG_PROXY";
pub const EXPECTED_GOALS_ABOVE: &str = "EXPECTED_GOALS_ABOVE";
pub const EXPECTED_GOALS_BELOW: &str = "EXPECTED_GOALS_BELOW";
pub const BTTS_TREND: &str = "BTTS_TREND";
pub const DEFENSIVE_STRENGTH: &str = "DEFENSIVE_STRENGTH";
pub const GATE_BLOCKED: &str = "GATE_BLOCKED";
pub const GOALS_TREND: &str = "GOALS_TREND";

// Extended explainability codes.
pub const FORM_RECENCY: &str = "FORM_RECENCY";
pub const HOME_AWAY_SPLIT: &str = "HOME_AWAY_SPLIT";
pub const DEFENSE_STABILITY: &str = "DEFENSE_STABILITY";
pub const MARKET_CONSENSUS_DAMPEN: &str = "MARKET_CONSENSUS_DAMPEN";

pub const UNKNOWN: &str = "UNKNOWN";

/// All known codes, for validation and reports.
pub const ALL_REASON_CODES: [&str; 14] = [
    H2H_USED,
    TOP_SEP,
    MISSING_STATS,
    XG_PROXY,
    EXPECTED_GOALS_ABOVE,
    EXPECTED_GOALS_BELOW,
    BTTS_TREND,
    DEFENSIVE_STRENGTH,
    GATE_BLOCKED,
    GOALS_TREND,
    FORM_RECENCY,
    HOME_AWAY_SPLIT,
    DEFENSE_STABILITY,
    MARKET_CONSENSUS_DAMPEN,
];

pub fn is_known_code(code: &str) -> bool {
    ALL_REASON_CODES.contains(&code)
}

/// Map reason strings to codes, order preserved, same length as the input.
pub fn codes_for_reasons(reasons: &[String]) -> Vec<String> {
    reasons.iter().map(|r| code_for_reason(r)).collect()
}

fn code_for_reason(reason: &str) -> String {
    let s = reason.trim();
    let lower = s.to_ascii_lowercase();
    if lower.contains("h2h") {
        H2H_USED.to_string()
    } else if s.contains("top=") || s.contains("sep=") {
        TOP_SEP.to_string()
    } else if s.contains("Missing stats") {
        MISSING_STATS.to_string()
    } else if s.contains("xG proxy") || lower.contains("expected goals") {
        if lower.contains("above") {
            EXPECTED_GOALS_ABOVE.to_string()
        } else if lower.contains("below") {
            EXPECTED_GOALS_BELOW.to_string()
        } else {
            XG_PROXY.to_string()
        }
    } else if lower.contains("both teams scoring") || s.contains("P(GG)") {
        BTTS_TREND.to_string()
    } else if lower.contains("defensive") {
        DEFENSIVE_STRENGTH.to_string()
    } else if s.contains("Gate blocked") {
        GATE_BLOCKED.to_string()
    } else {
        UNKNOWN.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_maps_known_phrases() {
        let reasons = vec![
            "H2H used".to_string(),
            "top=HOME sep=0.14".to_string(),
            "Missing stats for OU_2.5".to_string(),
            "xG proxy=3.10".to_string(),
            "expected goals above threshold".to_string(),
            "expected goals below threshold".to_string(),
            "both teams scoring trend".to_string(),
            "defensive strength present".to_string(),
            "Gate blocked: LOW_QUALITY_EVIDENCE".to_string(),
            "something else entirely".to_string(),
        ];
        let codes = codes_for_reasons(&reasons);
        assert_eq!(
            codes,
            vec![
                H2H_USED,
                TOP_SEP,
                MISSING_STATS,
                XG_PROXY,
                EXPECTED_GOALS_ABOVE,
                EXPECTED_GOALS_BELOW,
                BTTS_TREND,
                DEFENSIVE_STRENGTH,
                GATE_BLOCKED,
                UNKNOWN,
            ]
        );
        assert_eq!(codes.len(), reasons.len());
    }

    #[test]
    fn known_code_membership() {
        assert!(is_known_code(H2H_USED));
        assert!(!is_known_code("MADE_UP_CODE"));
    }
}
