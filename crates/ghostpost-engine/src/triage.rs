//! The triage engine: a single entry point that scans the world and emits
//! a prioritized action list for the agent.

use asupersync::{Cx, Outcome};
use serde::Serialize;
use serde_json::{Map, Value, json};

use ghostpost_db::{DbPool, now_micros, queries};

use crate::error::EngineError;

const MICROS_PER_HOUR: i64 = 3_600 * 1_000_000;
const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

/// Drafts older than this are escalated.
const DRAFT_STALE_HOURS: f64 = 2.0;

/// Overdue threads beyond this many days are escalated.
const OVERDUE_ESCALATION_DAYS: i64 = 3;

macro_rules! try_db {
    ($out:expr) => {
        match $out {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => return Outcome::Err(EngineError::Db(e)),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

/// One prioritized action for the agent.
#[derive(Debug, Clone, Serialize)]
pub struct TriageAction {
    /// "approve_draft" | "follow_up" | "review_security" | "review_new" | "check_goal"
    pub action: &'static str,
    /// "draft" | "thread" | "security_event"
    pub target_type: &'static str,
    pub target_id: i64,
    pub reason: String,
    /// "critical" | "high" | "medium" | "low"
    pub priority: &'static str,
    /// Exact CLI command to execute.
    pub command: String,
    /// Internal sorting score.
    pub score: i64,
}

/// The complete triage snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TriageSnapshot {
    pub timestamp: String,
    pub summary: Map<String, Value>,
    pub actions: Vec<TriageAction>,
    pub overdue_threads: Vec<Value>,
    pub pending_drafts: Vec<Value>,
    pub security_incidents: Vec<Value>,
    pub new_threads: Vec<Value>,
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

fn subject_or_placeholder(subject: &str) -> &str {
    if subject.is_empty() { "(no subject)" } else { subject }
}

/// Build a complete triage snapshot with prioritized actions.
pub async fn get_triage_data(
    cx: &Cx,
    pool: &DbPool,
    limit: usize,
) -> Outcome<TriageSnapshot, EngineError> {
    let now = now_micros();

    let state_counts = try_db!(queries::thread_state_counts(cx, pool).await);
    let total_threads: i64 = state_counts.iter().map(|(_, n)| n).sum();
    let unread = try_db!(queries::unread_count(cx, pool).await);
    let drafts = try_db!(queries::pending_drafts(cx, pool).await);
    let sec_events = try_db!(queries::pending_security_events(cx, pool, 20).await);
    let overdue = try_db!(queries::overdue_threads(cx, pool, now).await);
    let new_threads = try_db!(queries::new_threads(cx, pool, 10).await);
    let goal_threads = try_db!(queries::goal_check_threads(cx, pool, 5).await);

    let mut actions: Vec<TriageAction> = Vec::new();

    // Security events first: they block all agent action until resolved.
    for ev in &sec_events {
        let score = match ev.severity.as_str() {
            "critical" => 100,
            "high" => 80,
            _ => 40,
        };
        let thread_ref = ev
            .thread_id
            .map(|t| format!(" on thread #{t}"))
            .unwrap_or_default();
        actions.push(TriageAction {
            action: "review_security",
            target_type: "security_event",
            target_id: ev.id.unwrap_or(0),
            reason: format!(
                "{} {}{thread_ref}",
                ev.severity.to_uppercase(),
                ev.event_type
            ),
            priority: if ev.severity == "critical" {
                "critical"
            } else {
                "high"
            },
            command: "ghostpost quarantine list --json".to_string(),
            score,
        });
    }

    // Pending drafts: approve or reject before they go stale.
    #[allow(clippy::cast_precision_loss)]
    for draft in &drafts {
        let age_hours = (now - draft.created_at) as f64 / MICROS_PER_HOUR as f64;
        let stale = age_hours > DRAFT_STALE_HOURS;
        actions.push(TriageAction {
            action: "approve_draft",
            target_type: "draft",
            target_id: draft.id.unwrap_or(0),
            reason: format!(
                "Draft pending {age_hours:.0}h: {}",
                truncate_chars(subject_or_placeholder(&draft.subject), 50)
            ),
            priority: if stale { "high" } else { "medium" },
            command: format!("ghostpost draft-approve {} --json", draft.id.unwrap_or(0)),
            score: if stale { 60 } else { 35 },
        });
    }

    // Overdue threads: the follow-up deadline has passed.
    for thread in &overdue {
        let days_overdue = thread
            .next_follow_up_at
            .map_or(0, |at| (now - at).max(0) / MICROS_PER_DAY);
        let escalated = days_overdue > OVERDUE_ESCALATION_DAYS;
        actions.push(TriageAction {
            action: "follow_up",
            target_type: "thread",
            target_id: thread.id.unwrap_or(0),
            reason: format!(
                "Overdue {days_overdue}d: {}",
                truncate_chars(subject_or_placeholder(&thread.subject), 50)
            ),
            priority: if escalated { "high" } else { "medium" },
            command: format!(
                "ghostpost reply {} --body \"...\" --json",
                thread.id.unwrap_or(0)
            ),
            score: if escalated { 50 } else { 30 },
        });
    }

    // NEW threads awaiting first triage.
    for thread in &new_threads {
        let prio = thread.priority.as_deref().unwrap_or("medium");
        let elevated = matches!(prio, "high" | "critical");
        actions.push(TriageAction {
            action: "review_new",
            target_type: "thread",
            target_id: thread.id.unwrap_or(0),
            reason: format!(
                "New thread [{prio}]: {}",
                truncate_chars(subject_or_placeholder(&thread.subject), 50)
            ),
            priority: if elevated { "high" } else { "low" },
            command: format!("ghostpost brief {} --json", thread.id.unwrap_or(0)),
            score: if elevated { 40 } else { 15 },
        });
    }

    // In-progress goals that may have been fulfilled.
    for thread in &goal_threads {
        actions.push(TriageAction {
            action: "check_goal",
            target_type: "thread",
            target_id: thread.id.unwrap_or(0),
            reason: format!(
                "Goal may be met: {}",
                truncate_chars(thread.goal.as_deref().unwrap_or(""), 40)
            ),
            priority: "low",
            command: format!("ghostpost goal {} --check --json", thread.id.unwrap_or(0)),
            score: 20,
        });
    }

    // Stable sort keeps insertion order for equal scores.
    actions.sort_by(|a, b| b.score.cmp(&a.score));
    actions.truncate(limit);

    let mut by_state = Map::new();
    for (state, count) in &state_counts {
        by_state.insert(state.clone(), json!(count));
    }
    let mut summary = Map::new();
    summary.insert("total_threads".to_string(), json!(total_threads));
    summary.insert("unread".to_string(), json!(unread));
    summary.insert("by_state".to_string(), Value::Object(by_state));
    summary.insert("pending_drafts".to_string(), json!(drafts.len()));
    summary.insert("security_incidents".to_string(), json!(sec_events.len()));
    summary.insert("overdue_threads".to_string(), json!(overdue.len()));
    summary.insert("new_threads".to_string(), json!(new_threads.len()));

    #[allow(clippy::cast_precision_loss)]
    let snapshot = TriageSnapshot {
        timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        summary,
        overdue_threads: overdue
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "subject": truncate_chars(&t.subject, 60),
                    "days_overdue": t
                        .next_follow_up_at
                        .map_or(0, |at| (now - at).max(0) / MICROS_PER_DAY),
                })
            })
            .collect(),
        pending_drafts: drafts
            .iter()
            .map(|d| {
                let age_hours = (now - d.created_at) as f64 / MICROS_PER_HOUR as f64;
                json!({
                    "id": d.id,
                    "thread_id": d.thread_id,
                    "subject": truncate_chars(&d.subject, 60),
                    "age_hours": (age_hours * 10.0).round() / 10.0,
                })
            })
            .collect(),
        security_incidents: sec_events
            .iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "severity": e.severity,
                    "event_type": e.event_type,
                    "thread_id": e.thread_id,
                })
            })
            .collect(),
        new_threads: new_threads
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "subject": truncate_chars(&t.subject, 60),
                    "priority": t.priority,
                })
            })
            .collect(),
        actions,
    };

    tracing::info!(
        actions = snapshot.actions.len(),
        overdue = overdue.len(),
        drafts = drafts.len(),
        security = sec_events.len(),
        "triage snapshot built"
    );
    Outcome::Ok(snapshot)
}
