//! Layer 6 support: security event and audit trail helpers.
//!
//! Wraps the db crate's append operations. The `_best_effort` variants are
//! for call sites where a logging failure must never block the initiating
//! flow; failures are traced and swallowed.

use asupersync::{Cx, Outcome};
use ghostpost_core::Severity;
use ghostpost_db::{AuditLogRow, DbPool, SecurityEventRow, queries, timestamps::now_micros};

use crate::error::GuardError;

/// Append an immutable security event.
#[allow(clippy::too_many_arguments)]
pub async fn log_security_event(
    cx: &Cx,
    pool: &DbPool,
    event_type: &str,
    severity: Severity,
    details: serde_json::Value,
    email_id: Option<i64>,
    thread_id: Option<i64>,
    quarantined: bool,
) -> Outcome<SecurityEventRow, GuardError> {
    let row = SecurityEventRow {
        event_type: event_type.to_string(),
        severity: severity.as_str().to_string(),
        email_id,
        thread_id,
        details: details.to_string(),
        quarantined: i64::from(quarantined),
        resolution: "pending".to_string(),
        created_at: now_micros(),
        ..SecurityEventRow::default()
    };
    match queries::insert_security_event(cx, pool, row).await {
        Outcome::Ok(row) => Outcome::Ok(row),
        Outcome::Err(e) => Outcome::Err(GuardError::Db(e)),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Append a security event, swallowing any failure.
#[allow(clippy::too_many_arguments)]
pub async fn log_security_event_best_effort(
    cx: &Cx,
    pool: &DbPool,
    event_type: &str,
    severity: Severity,
    details: serde_json::Value,
    email_id: Option<i64>,
    thread_id: Option<i64>,
    quarantined: bool,
) {
    match log_security_event(
        cx, pool, event_type, severity, details, email_id, thread_id, quarantined,
    )
    .await
    {
        Outcome::Ok(_) => {}
        Outcome::Err(e) => {
            tracing::warn!(event_type, error = %e, "failed to record security event");
        }
        Outcome::Cancelled(_) | Outcome::Panicked(_) => {
            tracing::warn!(event_type, "security event write interrupted");
        }
    }
}

/// Append an immutable audit record of a user/agent action.
pub async fn log_action(
    cx: &Cx,
    pool: &DbPool,
    actor: &str,
    action_type: &str,
    subject_id: Option<i64>,
    metadata: serde_json::Value,
) -> Outcome<AuditLogRow, GuardError> {
    let row = AuditLogRow {
        actor: actor.to_string(),
        action_type: action_type.to_string(),
        subject_id,
        metadata: metadata.to_string(),
        created_at: now_micros(),
        ..AuditLogRow::default()
    };
    match queries::insert_audit_log(cx, pool, row).await {
        Outcome::Ok(row) => Outcome::Ok(row),
        Outcome::Err(e) => Outcome::Err(GuardError::Db(e)),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Append an audit record, swallowing any failure.
pub async fn log_action_best_effort(
    cx: &Cx,
    pool: &DbPool,
    actor: &str,
    action_type: &str,
    subject_id: Option<i64>,
    metadata: serde_json::Value,
) {
    match log_action(cx, pool, actor, action_type, subject_id, metadata).await {
        Outcome::Ok(_) => {}
        Outcome::Err(e) => {
            tracing::warn!(action_type, error = %e, "failed to record audit entry");
        }
        Outcome::Cancelled(_) | Outcome::Panicked(_) => {
            tracing::warn!(action_type, "audit entry write interrupted");
        }
    }
}
