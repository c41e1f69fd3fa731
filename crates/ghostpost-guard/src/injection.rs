//! Layer 3: prompt-injection detection for email content.
//!
//! A static catalogue of regex patterns grouped by severity. Scanning is
//! pure; [`scan_and_quarantine`] additionally records a security event and
//! quarantines the email when critical/high patterns match.

use std::sync::LazyLock;

use asupersync::{Cx, Outcome};
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use ghostpost_core::Severity;
use ghostpost_db::{DbPool, queries};

use crate::audit;
use crate::error::GuardError;

/// One matched injection pattern.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionMatch {
    pub pattern_name: &'static str,
    pub severity: Severity,
    /// Matched text, capped at 100 characters.
    pub matched_text: String,
    pub description: &'static str,
}

struct InjectionPattern {
    name: &'static str,
    severity: Severity,
    description: &'static str,
    regex: Regex,
}

fn pattern(
    name: &'static str,
    severity: Severity,
    description: &'static str,
    re: &str,
) -> InjectionPattern {
    InjectionPattern {
        name,
        severity,
        description,
        regex: Regex::new(re).expect("valid injection pattern"),
    }
}

/// Injection patterns, ordered by severity.
static INJECTION_PATTERNS: LazyLock<Vec<InjectionPattern>> = LazyLock::new(|| {
    vec![
        // Critical: direct system prompt manipulation
        pattern(
            "system_prompt_override",
            Severity::Critical,
            "Attempts to override system instructions",
            r"(?i)(?:ignore|disregard|forget)\s+(?:all\s+)?(?:previous|prior|above|your)\s+(?:instructions|rules|guidelines|prompts?)",
        ),
        pattern(
            "new_instructions",
            Severity::Critical,
            "Attempts to inject new system instructions",
            r"(?i)(?:new|updated?|revised?)\s+(?:system\s+)?(?:instructions?|rules?|guidelines?)\s*:",
        ),
        pattern(
            "role_hijack",
            Severity::Critical,
            "Attempts to reassign AI role",
            r"(?i)you\s+are\s+(?:now|actually|really)\s+(?:a|an|the)\s+",
        ),
        pattern(
            "system_tag",
            Severity::Critical,
            "Contains system/assistant role tags",
            r"(?i)<(?:system|assistant|admin|root)>",
        ),
        // High: action manipulation
        pattern(
            "send_email_command",
            Severity::High,
            "Attempts to command email sending",
            r"(?i)(?:send|forward|reply)\s+(?:this|an?|the)\s+(?:email|message|response)\s+to\s+",
        ),
        pattern(
            "execute_command",
            Severity::High,
            "Attempts to execute system commands",
            r"(?i)(?:execute|run|eval|exec)\s*\(",
        ),
        pattern(
            "data_exfil",
            Severity::High,
            "Attempts to extract sensitive data",
            r"(?i)(?:list|show|reveal|display|output)\s+(?:all\s+)?(?:emails?|contacts?|passwords?|tokens?|keys?|secrets?)",
        ),
        pattern(
            "transfer_money",
            Severity::High,
            "Attempts to trigger financial actions",
            r"(?i)(?:transfer|send|wire|pay)\s+\$?\d+",
        ),
        pattern(
            "urgent_action",
            Severity::High,
            "Uses urgency to force immediate action",
            r"(?i)(?:urgent|immediately|right\s+now|asap)\s*[:\-!]\s*(?:send|transfer|approve|confirm|click)",
        ),
        // Medium: suspicious patterns
        pattern(
            "delimiter_escape",
            Severity::Medium,
            "Contains delimiter/escape sequences",
            r"(?i)(?:```|---|\*\*\*|===)\s*(?:system|admin|instructions?)",
        ),
        pattern(
            "base64_payload",
            Severity::Medium,
            "Contains base64-encoded payload markers",
            r"(?i)(?:decode|base64|atob)\s*\(",
        ),
        pattern(
            "hidden_text",
            Severity::Medium,
            "Contains zero-width or invisible characters",
            r"[\x{200B}\x{200C}\x{200D}\x{2060}\x{FEFF}]",
        ),
        pattern(
            "prompt_leak",
            Severity::Medium,
            "Attempts to extract prompt/instructions",
            r"(?i)(?:what\s+are|show\s+me|repeat|print)\s+your\s+(?:instructions?|rules?|system\s+prompt|guidelines?)",
        ),
        pattern(
            "jailbreak_phrase",
            Severity::Medium,
            "Common jailbreak phrasing",
            r"(?i)(?:DAN|do\s+anything\s+now|developer\s+mode|pretend\s+you)",
        ),
        pattern(
            "markdown_injection",
            Severity::Medium,
            "Markdown/formatting injection attempt",
            r"(?i)\[.*?\]\((?:javascript|data|vbscript):",
        ),
        pattern(
            "multi_persona",
            Severity::Medium,
            "Attempts to create alternate personas",
            r"(?i)(?:act|behave|respond)\s+as\s+(?:if\s+you\s+(?:are|were)|a\s+different)",
        ),
        pattern(
            "context_manipulation",
            Severity::Medium,
            "Attempts to manipulate conversation context",
            r"(?i)(?:previous\s+conversation|earlier\s+you\s+said|you\s+(?:agreed|promised)\s+to)",
        ),
        pattern(
            "encoding_evasion",
            Severity::Medium,
            "URL or unicode encoding evasion",
            r"(?i)%[0-9a-fA-F]{2}.*%[0-9a-fA-F]{2}.*(?:script|exec|eval)",
        ),
    ]
});

/// Truncate at a char boundary at or below `max` bytes.
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

/// Scan text for injection patterns. Returns the first match per pattern.
#[must_use]
pub fn scan_text(text: &str) -> Vec<InjectionMatch> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for p in INJECTION_PATTERNS.iter() {
        if let Some(found) = p.regex.find(text) {
            matches.push(InjectionMatch {
                pattern_name: p.name,
                severity: p.severity,
                matched_text: cap_match_text(found.as_str(), 100),
                description: p.description,
            });
        }
    }
    matches
}

/// Scan all text fields of an email, deduplicating by pattern name and
/// keeping the first occurrence.
#[must_use]
pub fn scan_email_content(
    subject: Option<&str>,
    body_plain: Option<&str>,
    body_html: Option<&str>,
) -> Vec<InjectionMatch> {
    let mut matches = Vec::new();
    for text in [subject, body_plain, body_html].into_iter().flatten() {
        matches.extend(scan_text(text));
    }

    let mut seen: std::collections::HashSet<&'static str> = std::collections::HashSet::new();
    matches.retain(|m| seen.insert(m.pattern_name));
    matches
}

/// Highest severity across matches under `critical > high > medium`.
#[must_use]
pub fn get_max_severity(matches: &[InjectionMatch]) -> Option<Severity> {
    matches.iter().map(|m| m.severity).max()
}

/// Scan an email by id, record a `SecurityEvent` if anything matched, and
/// quarantine on critical/high severity.
///
/// A missing email id yields an empty match list, not an error.
pub async fn scan_and_quarantine(
    cx: &Cx,
    pool: &DbPool,
    email_id: i64,
) -> Outcome<Vec<InjectionMatch>, GuardError> {
    let email = match queries::get_email(cx, pool, email_id).await {
        Outcome::Ok(email) => email,
        Outcome::Err(e) if e.is_not_found() => return Outcome::Ok(Vec::new()),
        Outcome::Err(e) => return Outcome::Err(GuardError::Db(e)),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let matches = scan_email_content(
        Some(&email.subject),
        email.body_plain.as_deref(),
        email.body_html.as_deref(),
    );
    if matches.is_empty() {
        return Outcome::Ok(matches);
    }

    let max_severity = get_max_severity(&matches).unwrap_or(Severity::Medium);
    let quarantine = matches!(max_severity, Severity::Critical | Severity::High);

    let details = json!({
        "matches": matches
            .iter()
            .map(|m| json!({
                "pattern": m.pattern_name,
                "severity": m.severity.as_str(),
                "text": m.matched_text,
            }))
            .collect::<Vec<_>>(),
        "from": email.from_address,
        "subject": email.subject,
    });

    match audit::log_security_event(
        cx,
        pool,
        "injection_detected",
        max_severity,
        details,
        Some(email_id),
        Some(email.thread_id),
        quarantine,
    )
    .await
    {
        Outcome::Ok(_) => {}
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    }

    tracing::info!(
        email_id,
        matches = matches.len(),
        max_severity = %max_severity,
        quarantined = quarantine,
        "injection scan flagged email"
    );
    Outcome::Ok(matches)
}
