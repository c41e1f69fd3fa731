//! Layer 4: commitment detection on outgoing text.
//!
//! Pure pattern scan for binding language (payments, contracts, deadlines,
//! guarantees). Negation is not modelled: "we will not pay $5000" still
//! matches, and the send gate treats commitments as warnings rather than
//! blocks.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// One detected commitment.
#[derive(Debug, Clone, Serialize)]
pub struct Commitment {
    pub kind: &'static str,
    pub description: &'static str,
    /// Matched text, capped at 100 characters.
    pub matched_text: String,
}

struct CommitmentPattern {
    kind: &'static str,
    description: &'static str,
    regex: Regex,
}

fn pattern(kind: &'static str, description: &'static str, re: &str) -> CommitmentPattern {
    CommitmentPattern {
        kind,
        description,
        regex: Regex::new(re).expect("valid commitment pattern"),
    }
}

static COMMITMENT_PATTERNS: LazyLock<Vec<CommitmentPattern>> = LazyLock::new(|| {
    vec![
        // Financial commitments
        pattern(
            "financial",
            "Mentions specific dollar amounts or payment",
            r"(?i)(?:pay|send|transfer|wire|invoice)\s+(?:you\s+)?\$[\d,]+",
        ),
        pattern(
            "price_agreement",
            "Agrees to a price or rate",
            r"(?i)(?:agree|accept|confirm)\s+(?:the\s+)?(?:price|rate|cost|fee|quote)\s+of\s+\$[\d,]+",
        ),
        // Legal commitments
        pattern(
            "contract",
            "References contract or agreement signing",
            r"(?i)(?:sign|execute|agree\s+to)\s+(?:the\s+)?(?:contract|agreement|NDA|terms)",
        ),
        pattern(
            "guarantee",
            "Makes a guarantee or warranty",
            r"(?i)(?:I|we)\s+(?:guarantee|warrant|promise|assure)\s+",
        ),
        // Deadline commitments
        pattern(
            "deadline",
            "Commits to a specific deadline",
            r"(?i)(?:deliver|complete|finish|done)\s+by\s+(?:end\s+of\s+)?(?:Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday|\d{1,2}[/-]\d{1,2}|tomorrow|next\s+week)",
        ),
        pattern(
            "will_do",
            "Makes a firm commitment to do something",
            r"(?i)(?:I|we)\s+will\s+(?:definitely|certainly|absolutely)\s+",
        ),
        // Resource commitments
        pattern(
            "resource",
            "Commits resources or people",
            r"(?i)(?:assign|allocate|dedicate)\s+(?:\d+\s+)?(?:people|developers|hours|resources)",
        ),
    ]
});

fn cap_match_text(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Scan outgoing text for binding commitments. First match per pattern.
#[must_use]
pub fn detect_commitments(text: &str) -> Vec<Commitment> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut commitments = Vec::new();
    for p in COMMITMENT_PATTERNS.iter() {
        if let Some(found) = p.regex.find(text) {
            commitments.push(Commitment {
                kind: p.kind,
                description: p.description,
                matched_text: cap_match_text(found.as_str(), 100),
            });
        }
    }
    commitments
}

/// Quick boolean form.
#[must_use]
pub fn has_commitments(text: &str) -> bool {
    !detect_commitments(text).is_empty()
}
