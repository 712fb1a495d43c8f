//! Deterministic claim parsing and narrative recovery.
//!
//! Two jobs:
//! - [`ClaimParser`] splits generated text into atomic, typed claims
//!   (sentence split → conjunction split → type classification).
//! - [`extract_recovery_claims`] is the tier-1 regex fallback used when
//!   the pipeline produced no claims but the narrative asserts facts.

use std::sync::OnceLock;

use regex::Regex;

use nd_domain::claim::{Claim, ClaimConfidence, ClaimType, VerificationLevel};

/// Mechanistic language markers. A narrative using these with an empty
/// claim list fails the integrity check.
const MECHANISM_MARKERS: &[&str] = &[
    "because",
    "due to",
    "causes",
    "activates",
    "inhibits",
    "mechanism",
    "receptor",
    "cid:",
];

const QUANTITATIVE_MARKERS: &[&str] = &[
    "high", "low", "rich", "source", "contains", "mg", "g", "mcg", "%", "percent", "daily value",
];

const MECHANISTIC_MARKERS: &[&str] = &[
    "supports",
    "aids",
    "helps",
    "promotes",
    "prevents",
    "inhibits",
    "regulates",
    "modulates",
    "boosts",
    "digestion",
    "metabolism",
    "immune",
    "absorption",
    "synthesis",
];

/// True when the text asserts a mechanism.
pub fn narrative_asserts_mechanism(text: &str) -> bool {
    let lower = text.to_lowercase();
    MECHANISM_MARKERS.iter().any(|m| lower.contains(m))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tier-1 regex recovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn rich_in_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b([A-Za-z]+(?:\s+[A-Za-z]+)?)\s+is\s+rich\s+in\s+([A-Za-z]+(?:\s+[A-Za-z]+)?)\b")
            .expect("static regex compiles")
    })
}

fn supports_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b([A-Za-z]+(?:\s+[A-Za-z]+)?)\s+(helps|supports|aids|promotes)\s+([A-Za-z]+(?:\s+[A-Za-z]+)?)\b")
            .expect("static regex compiles")
    })
}

/// Fast regex recovery over a narrative: "X is rich in Y" and
/// "X helps/supports/aids/promotes Y" become medium-confidence
/// heuristic claims.
pub fn extract_recovery_claims(text: &str) -> Vec<Claim> {
    let mut claims = Vec::new();

    for caps in rich_in_pattern().captures_iter(text) {
        let subject = caps[1].to_string();
        let object = caps[2].to_string();
        let mut claim = Claim::new(caps[0].to_string(), ClaimType::Quantitative)
            .with_subject(subject.clone())
            .with_predicate(format!("rich in {object}"));
        claim.confidence = ClaimConfidence::Medium;
        claim.verification_level = VerificationLevel::Heuristic;
        claim.mechanism_type = Some("heuristic".into());
        claims.push(claim);
    }

    for caps in supports_pattern().captures_iter(text) {
        let subject = caps[1].to_string();
        let verb = caps[2].to_lowercase();
        let object = caps[3].to_string();
        let mut claim = Claim::new(caps[0].to_string(), ClaimType::Mechanistic)
            .with_subject(subject.clone())
            .with_predicate(format!("{verb} {object}"))
            .with_mechanism(format!("direct link between {subject} and {object}"));
        claim.confidence = ClaimConfidence::Medium;
        claim.verification_level = VerificationLevel::Heuristic;
        claim.mechanism_type = Some("heuristic".into());
        claims.push(claim);
    }

    if !claims.is_empty() {
        tracing::info!(count = claims.len(), "tier-1 claim recovery matched");
    }
    claims
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deterministic parser
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Splits text into atomic claims without any model assistance.
#[derive(Debug, Default)]
pub struct ClaimParser;

impl ClaimParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse full text into atomic claims: sentence split, conjunction
    /// split, then type classification.
    pub fn parse(&self, text: &str) -> Vec<Claim> {
        let mut claims = Vec::new();
        for sentence in split_sentences(text) {
            for atom in split_atoms(&sentence) {
                let clean = atom.trim().trim_matches('.').trim();
                if clean.is_empty() || clean.split_whitespace().count() < 3 {
                    continue;
                }
                let mut claim = Claim::new(clean.to_string(), classify(clean));
                claim.verification_level = VerificationLevel::Extracted;
                claim.confidence = ClaimConfidence::Medium;
                claims.push(claim);
            }
        }
        claims
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?m)[.!?]\s+").expect("static regex compiles"));
    re.split(text).map(|s| s.to_string()).collect()
}

fn split_atoms(sentence: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\s+and\s+|\s+while\s+|\s+as\s+well\s+as\s+").expect("static regex compiles")
    });
    re.split(sentence).map(|s| s.to_string()).collect()
}

fn classify(text: &str) -> ClaimType {
    let lower = text.to_lowercase();
    let has_digit = lower.chars().any(|c| c.is_ascii_digit());
    if has_digit
        || QUANTITATIVE_MARKERS
            .iter()
            .any(|m| contains_word(&lower, m))
    {
        return ClaimType::Quantitative;
    }
    if MECHANISTIC_MARKERS.iter().any(|m| contains_word(&lower, m)) {
        return ClaimType::Mechanistic;
    }
    ClaimType::Qualitative
}

/// Whole-word containment so "g" does not match inside "digestion".
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric() && c != '%')
        .any(|word| word == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_markers_detected() {
        assert!(narrative_asserts_mechanism(
            "It tastes hot because capsaicin activates the TRPV1 receptor."
        ));
        assert!(!narrative_asserts_mechanism("Sounds delicious, enjoy!"));
    }

    #[test]
    fn recovery_matches_rich_in() {
        let claims = extract_recovery_claims("Spinach is rich in iron.");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].claim_type, ClaimType::Quantitative);
        assert_eq!(claims[0].subject.as_deref(), Some("Spinach"));
    }

    #[test]
    fn recovery_matches_support_verbs() {
        let claims = extract_recovery_claims("Ginger supports digestion after heavy meals.");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].claim_type, ClaimType::Mechanistic);
        assert!(claims[0].mechanism.as_deref().unwrap().contains("Ginger"));
    }

    #[test]
    fn recovery_yields_stable_ids() {
        let a = extract_recovery_claims("Spinach is rich in iron.");
        let b = extract_recovery_claims("Spinach is rich in iron.");
        assert_eq!(a[0].id, b[0].id);
    }

    #[test]
    fn recovery_on_plain_text_is_empty() {
        assert!(extract_recovery_claims("what a lovely evening").is_empty());
    }

    #[test]
    fn parser_splits_conjunctions() {
        let parser = ClaimParser::new();
        let claims =
            parser.parse("Capsaicin binds TRPV1 receptors and menthol triggers cold sensors.");
        assert_eq!(claims.len(), 2);
    }

    #[test]
    fn parser_classifies_types() {
        let parser = ClaimParser::new();
        let claims = parser.parse(
            "Chili contains 40 mg of capsaicinoids. Ginger aids digestion. The stew smelled wonderful last night.",
        );
        assert_eq!(claims[0].claim_type, ClaimType::Quantitative);
        assert_eq!(claims[1].claim_type, ClaimType::Mechanistic);
        assert_eq!(claims[2].claim_type, ClaimType::Qualitative);
    }

    #[test]
    fn parser_skips_trivial_fragments() {
        let parser = ClaimParser::new();
        assert!(parser.parse("Yes. No. Ok.").is_empty());
    }
}
