//! Layer 6: the send gate.
//!
//! Single pre-send decision composing the blocklist, the rate limiter, the
//! commitment detector, the sensitive-topic scan, and the thread security
//! score. Reasons block; warnings never do.

use asupersync::{Cx, Outcome};
use serde::{Deserialize, Serialize};
use serde_json::json;

use ghostpost_core::{AddressList, Severity};
use ghostpost_db::{DbPool, queries};

use crate::anomaly::{self, CounterStore};
use crate::audit;
use crate::commitment;
use crate::error::GuardError;

/// Actor name used for the outbound send-rate counter.
pub const SEND_ACTOR: &str = "agent";

/// Thread security averages below this add a warning.
const LOW_SECURITY_SCORE: i64 = 50;

/// Substring-matched sensitive topics. Deliberately naive: "court" inside
/// "basketball court" is a known, accepted false positive.
const SENSITIVE_TOPICS: &[&str] = &[
    "legal",
    "medical",
    "confidential",
    "audit",
    "lawsuit",
    "harassment",
    "termination",
    "court",
    "attorney",
    "settlement",
];

/// The gate's decision. `allowed` is true iff `reasons` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendDecision {
    pub allowed: bool,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

/// Scan body text for sensitive topics (case-insensitive substrings).
#[must_use]
pub fn check_sensitive_topics(body: &str) -> Vec<&'static str> {
    let lower = body.to_lowercase();
    SENSITIVE_TOPICS
        .iter()
        .filter(|topic| lower.contains(**topic))
        .copied()
        .collect()
}

/// Decide whether an outbound message may be sent.
///
/// Blocking reasons: blocklisted recipient, hourly rate limit exceeded,
/// rate store unreachable (the gate fails closed). Warnings: detected
/// commitments, sensitive topics, low thread security score.
pub async fn check_send_allowed<C: CounterStore>(
    cx: &Cx,
    pool: &DbPool,
    store: &C,
    to: &AddressList,
    body: &str,
    thread_id: Option<i64>,
    rate_limit: i64,
) -> Outcome<SendDecision, GuardError> {
    let mut reasons: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();

    // 1+2. Normalize recipients and check the blocklist (exact match,
    // case-insensitive; list is stored lowercase).
    let blocklist = match queries::get_list_setting(cx, pool, "blocklist").await {
        Outcome::Ok(list) => list,
        Outcome::Err(e) => return Outcome::Err(GuardError::Db(e)),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    for addr in to.addresses() {
        if blocklist.iter().any(|b| b == &addr.to_lowercase()) {
            reasons.push(format!("recipient on blocklist: {addr}"));
        }
    }

    // 3. Hourly rate limit. A store failure blocks the send rather than
    // silently waving it through.
    match anomaly::check_send_rate(cx, store, SEND_ACTOR, rate_limit).await {
        Outcome::Ok(rate) if !rate.allowed => {
            reasons.push(format!(
                "send rate limit exceeded: {}/{} this hour",
                rate.count, rate.limit
            ));
            audit::log_security_event_best_effort(
                cx,
                pool,
                "rate_limit_exceeded",
                Severity::High,
                json!({"actor": SEND_ACTOR, "count": rate.count, "limit": rate.limit}),
                None,
                thread_id,
                false,
            )
            .await;
        }
        Outcome::Ok(_) => {}
        Outcome::Err(e) => {
            tracing::warn!(error = %e, "rate check unavailable; blocking send");
            reasons.push(format!("rate check unavailable: {e}"));
        }
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    }

    // 4. Commitments warn, never block.
    for c in commitment::detect_commitments(body) {
        warnings.push(format!("commitment detected ({}): {}", c.kind, c.matched_text));
    }

    // 5. Sensitive topics warn.
    for topic in check_sensitive_topics(body) {
        warnings.push(format!("sensitive topic mentioned: {topic}"));
    }

    // 6. Low thread security score warns. A missing thread is not an error
    // at this layer.
    if let Some(tid) = thread_id {
        match queries::get_thread(cx, pool, tid).await {
            Outcome::Ok(thread) => {
                if let Some(avg) = thread.security_score_avg
                    && avg < LOW_SECURITY_SCORE
                {
                    warnings.push(format!(
                        "thread #{tid} has a low security score ({avg}/100)"
                    ));
                }
            }
            Outcome::Err(e) if e.is_not_found() => {}
            Outcome::Err(e) => return Outcome::Err(GuardError::Db(e)),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }

    let allowed = reasons.is_empty();
    Outcome::Ok(SendDecision {
        allowed,
        reasons,
        warnings,
    })
}
