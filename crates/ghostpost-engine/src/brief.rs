//! Structured per-thread brief generation for agent consumption.

use asupersync::{Cx, Outcome};
use smallvec::SmallVec;

use ghostpost_core::Config;
use ghostpost_db::timestamps::{micros_to_date, micros_to_naive};
use ghostpost_db::{DbPool, ThreadRow, queries};

use crate::error::EngineError;

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

fn state_action_label(state: &str) -> String {
    match state {
        "NEW" => "Triage this thread — it has not been acted on yet".to_string(),
        "ACTIVE" => "This thread is active — monitor and respond as needed".to_string(),
        "WAITING_REPLY" => "Wait for reply (WAITING_REPLY state)".to_string(),
        "FOLLOW_UP" => "Send a follow-up — the deadline has passed with no reply".to_string(),
        "GOAL_MET" => "Goal has been met — no further action required".to_string(),
        "ARCHIVED" => "Thread is archived — no action needed".to_string(),
        other => format!("Handle thread (state: {other})"),
    }
}

fn auto_reply_label(mode: &str) -> String {
    match mode {
        "off" => "Do not send replies automatically — notify user instead".to_string(),
        "draft" => "Create draft for approval before sending".to_string(),
        "auto" => "Send replies automatically without approval".to_string(),
        other => format!("Auto-reply mode: {other}"),
    }
}

/// Build the `## Agent Instructions` section from thread metadata.
///
/// State drives the primary action; playbook, auto-reply mode, follow-up
/// schedule and goal status drive the supporting lines. Terminal states
/// never produce a follow-up instruction.
fn build_agent_instructions(thread: &ThreadRow) -> String {
    let mut lines: Vec<String> = vec!["## Agent Instructions".to_string()];

    lines.push(format!("- **Action:** {}", state_action_label(&thread.state)));

    if let Some(playbook) = &thread.playbook {
        lines.push(format!("- **Playbook:** Follow `{playbook}` template"));
    }

    lines.push(format!(
        "- **Auto-reply:** {}",
        auto_reply_label(&thread.auto_reply_mode)
    ));

    let terminal = matches!(thread.state.as_str(), "GOAL_MET" | "ARCHIVED");
    if !terminal {
        if let Some(next) = thread.next_follow_up_at {
            let date = micros_to_date(next);
            if thread.state == "FOLLOW_UP" {
                lines.push(format!(
                    "- **Follow-up:** Overdue — send follow-up now (was due {date})"
                ));
            } else {
                lines.push(format!(
                    "- **Follow-up:** If no reply by {date}, send a follow-up"
                ));
            }
        } else {
            lines.push(format!(
                "- **Follow-up:** Schedule check every {} days",
                thread.follow_up_days
            ));
        }
    }

    match (thread.goal.as_deref(), thread.goal_status.as_deref()) {
        (Some(_), Some("in_progress")) => {
            let criteria_hint = thread
                .acceptance_criteria
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default();
            lines.push(format!(
                "- **Goal check:** When reply received, evaluate whether the goal is \
                 met{criteria_hint}"
            ));
        }
        (Some(_), Some("met")) => {
            lines.push(
                "- **Goal check:** Goal already met — no further evaluation needed".to_string(),
            );
        }
        _ => {}
    }

    lines.join("\n")
}

/// Generate a structured markdown brief for a thread.
///
/// Returns `None` when the thread is missing or has no emails.
pub async fn generate_brief(
    cx: &Cx,
    pool: &DbPool,
    config: &Config,
    thread_id: i64,
) -> Outcome<Option<String>, EngineError> {
    let thread = match queries::get_thread(cx, pool, thread_id).await {
        Outcome::Ok(thread) => thread,
        Outcome::Err(e) if e.is_not_found() => return Outcome::Ok(None),
        Outcome::Err(e) => return Outcome::Err(EngineError::Db(e)),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let emails = try_db!(queries::list_thread_emails(cx, pool, thread_id).await);
    if emails.is_empty() {
        return Outcome::Ok(None);
    }

    // Unique participants, first-seen order.
    let mut participants: SmallVec<[String; 8]> = SmallVec::new();
    for email in &emails {
        if !email.from_address.is_empty() && !participants.contains(&email.from_address) {
            participants.push(email.from_address.clone());
        }
        for addr in email.to_address_list().addresses() {
            if !addr.is_empty() && !participants.contains(&addr) {
                participants.push(addr);
            }
        }
    }

    // Contact profile for the primary non-self participant.
    let other: Option<&String> = participants.iter().find(|p| **p != config.own_email);
    let mut contact_info = String::new();
    if let Some(other) = other {
        let contact = try_db!(queries::get_contact_by_email(cx, pool, other).await);
        if let Some(contact) = contact {
            let mut parts: Vec<String> = Vec::new();
            if let Some(name) = &contact.name {
                parts.push(name.clone());
            }
            if let Some(rel) = contact
                .relationship_type
                .as_deref()
                .filter(|r| *r != "unknown")
            {
                parts.push(format!("Relationship: {rel}"));
            }
            if let Some(style) = &contact.preferred_style {
                parts.push(format!("Prefers {style} emails"));
            }
            if let Some(freq) = &contact.communication_frequency {
                parts.push(format!("Communicates {freq}"));
            }
            contact_info = parts.join(". ");
        }
    }

    // Last email summary.
    let last = emails.last().expect("non-empty");
    let last_direction = if last.is_sent_bool() {
        "You".to_string()
    } else if last.from_address.is_empty() {
        "Unknown".to_string()
    } else {
        last.from_address.clone()
    };
    let last_date = last.date.map_or_else(
        || "Unknown".to_string(),
        |d| micros_to_naive(d).format("%b %d").to_string(),
    );
    let last_snippet: String = last
        .body_plain
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(200)
        .collect::<String>()
        .replace('\n', " ")
        .trim()
        .to_string();

    // Overall sentiment from the three most recent emails.
    let recent_sentiments: Vec<&str> = emails
        .iter()
        .rev()
        .take(3)
        .filter_map(|e| e.sentiment.as_deref())
        .collect();
    let sentiment_str = if recent_sentiments.is_empty() {
        "unknown".to_string()
    } else {
        // Restore chronological order after the reverse scan.
        recent_sentiments
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(", ")
    };

    let follow_up_display = thread.next_follow_up_at.map_or_else(
        || format!("{} days (not scheduled)", thread.follow_up_days),
        |next| format!("{} days (next: {})", thread.follow_up_days, micros_to_date(next)),
    );

    let subject = if thread.subject.is_empty() {
        "(no subject)"
    } else {
        &thread.subject
    };
    let security_display = thread
        .security_score_avg
        .map_or_else(|| "unscored".to_string(), |avg| avg.to_string());

    let mut lines: Vec<String> = vec![
        format!("## Thread Brief: {subject}"),
        format!("- **Thread ID:** {thread_id}"),
        format!("- **Participants:** {}", participants.join(", ")),
        format!("- **State:** {}", thread.state),
        format!(
            "- **Priority:** {} | **Sentiment:** {sentiment_str} | **Security:** {security_display}/100",
            thread.priority.as_deref().unwrap_or("unscored")
        ),
    ];

    if let Some(category) = &thread.category {
        lines.push(format!("- **Category:** {category}"));
    }
    if let Some(summary) = &thread.summary {
        lines.push(format!("- **Summary:** {summary}"));
    }

    if let Some(goal) = &thread.goal {
        lines.push(format!("- **Goal:** {goal}"));
        if let Some(criteria) = &thread.acceptance_criteria {
            lines.push(format!("- **Acceptance Criteria:** {criteria}"));
        }
        if let Some(status) = &thread.goal_status {
            lines.push(format!("- **Goal Status:** {status}"));
        }
    }

    if let Some(playbook) = &thread.playbook {
        lines.push(format!("- **Playbook:** {playbook}"));
    }

    // Always shown: the agent must know whether to draft or send, and the
    // follow-up cadence.
    lines.push(format!("- **Auto-Reply:** {}", thread.auto_reply_mode));
    lines.push(format!("- **Follow-up:** {follow_up_display}"));

    lines.push(format!(
        "- **Last message:** {last_direction} ({last_date}) — \"{last_snippet}\""
    ));
    lines.push(format!("- **Email count:** {}", emails.len()));

    if !contact_info.is_empty() {
        lines.push(format!("- **Contact:** {contact_info}"));
    }
    if let Some(notes) = &thread.notes {
        lines.push(format!("- **Notes:** {notes}"));
    }

    lines.push(String::new());
    lines.push(build_agent_instructions(&thread));

    Outcome::Ok(Some(lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use ghostpost_core::{GoalStatus, ThreadState};
    use ghostpost_db::pool::DbPoolConfig;
    use ghostpost_db::{ContactRow, EmailRow, now_micros};

    fn test_pool(dir: &tempfile::TempDir) -> DbPool {
        let db_path = dir.path().join("brief_test.db");
        DbPool::new(&DbPoolConfig {
            database_url: format!("sqlite:///{}", db_path.display()),
            ..Default::default()
        })
        .expect("create pool")
    }

    fn run<T>(f: impl Future<Output = T>) -> T {
        let rt = RuntimeBuilder::current_thread().build().expect("runtime");
        rt.block_on(f)
    }

    fn ok<T: std::fmt::Debug, E: std::fmt::Debug>(out: Outcome<T, E>) -> T {
        match out {
            Outcome::Ok(v) => v,
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    fn config() -> Config {
        Config {
            own_email: "me@example.com".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn missing_thread_and_empty_thread_are_none() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();

        run(async {
            assert!(ok(generate_brief(&cx, &pool, &config(), 999).await).is_none());

            let thread = ok(queries::create_thread(&cx, &pool, "Empty").await);
            assert!(
                ok(generate_brief(&cx, &pool, &config(), thread.id.unwrap()).await).is_none()
            );
        });
    }

    #[test]
    fn brief_includes_core_fields() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "Pricing discussion").await);
            let tid = thread.id.unwrap();
            ok(queries::insert_email(
                &cx,
                &pool,
                EmailRow {
                    thread_id: tid,
                    subject: "Pricing discussion".to_string(),
                    from_address: "client@example.com".to_string(),
                    to_addresses: r#"["me@example.com"]"#.to_string(),
                    body_plain: Some("Can you share your\nrates for Q3?".to_string()),
                    sentiment: Some("curious".to_string()),
                    date: Some(now_micros()),
                    ..EmailRow::default()
                },
            )
            .await);

            let brief = ok(generate_brief(&cx, &pool, &config(), tid).await).unwrap();
            assert!(brief.starts_with("## Thread Brief: Pricing discussion"));
            assert!(brief.contains(&format!("- **Thread ID:** {tid}")));
            assert!(brief.contains("client@example.com"));
            assert!(brief.contains("- **State:** NEW"));
            assert!(brief.contains("**Sentiment:** curious"));
            assert!(brief.contains("- **Email count:** 1"));
            // Newlines in the snippet flatten to spaces.
            assert!(brief.contains("Can you share your rates for Q3?"));
            assert!(brief.contains("## Agent Instructions"));
            assert!(brief.contains("Triage this thread"));
            assert!(brief.contains("- **Auto-Reply:** off"));
            assert!(brief.contains("- **Follow-up:** 3 days (not scheduled)"));
        });
    }

    #[test]
    fn contact_profile_appears_when_known() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();

        run(async {
            ok(queries::upsert_contact(
                &cx,
                &pool,
                ContactRow {
                    email: "client@example.com".to_string(),
                    name: Some("Cliff Client".to_string()),
                    relationship_type: Some("customer".to_string()),
                    preferred_style: Some("formal".to_string()),
                    ..ContactRow::default()
                },
            )
            .await);

            let thread = ok(queries::create_thread(&cx, &pool, "Hello").await);
            let tid = thread.id.unwrap();
            ok(queries::insert_email(
                &cx,
                &pool,
                EmailRow {
                    thread_id: tid,
                    from_address: "client@example.com".to_string(),
                    ..EmailRow::default()
                },
            )
            .await);

            let brief = ok(generate_brief(&cx, &pool, &config(), tid).await).unwrap();
            assert!(brief.contains("- **Contact:** Cliff Client. Relationship: customer"));
            assert!(brief.contains("Prefers formal emails"));
        });
    }

    #[test]
    fn terminal_states_suppress_follow_up_instruction() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "Done").await);
            let tid = thread.id.unwrap();
            ok(queries::insert_email(
                &cx,
                &pool,
                EmailRow {
                    thread_id: tid,
                    ..EmailRow::default()
                },
            )
            .await);
            ok(queries::update_thread_state(&cx, &pool, tid, ThreadState::Archived).await);

            let brief = ok(generate_brief(&cx, &pool, &config(), tid).await).unwrap();
            let instructions = brief.split("## Agent Instructions").nth(1).unwrap();
            assert!(!instructions.contains("**Follow-up:**"));
            assert!(instructions.contains("Thread is archived"));
        });
    }

    #[test]
    fn goal_instructions_track_status() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "Deal").await);
            let tid = thread.id.unwrap();
            ok(queries::insert_email(
                &cx,
                &pool,
                EmailRow {
                    thread_id: tid,
                    ..EmailRow::default()
                },
            )
            .await);
            ok(queries::set_thread_goal(
                &cx,
                &pool,
                tid,
                Some("Signature"),
                Some("countersigned PDF"),
                Some(GoalStatus::InProgress),
            )
            .await);

            let brief = ok(generate_brief(&cx, &pool, &config(), tid).await).unwrap();
            assert!(brief.contains("- **Goal:** Signature"));
            assert!(brief.contains("- **Acceptance Criteria:** countersigned PDF"));
            assert!(brief.contains("- **Goal check:** When reply received"));
            assert!(brief.contains("(countersigned PDF)"));

            ok(queries::set_goal_status(&cx, &pool, tid, GoalStatus::Met).await);
            let brief = ok(generate_brief(&cx, &pool, &config(), tid).await).unwrap();
            assert!(brief.contains("Goal already met"));
        });
    }

    #[test]
    fn follow_up_overdue_wording_in_follow_up_state() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "Chase").await);
            let tid = thread.id.unwrap();
            ok(queries::insert_email(
                &cx,
                &pool,
                EmailRow {
                    thread_id: tid,
                    ..EmailRow::default()
                },
            )
            .await);
            ok(queries::update_thread_state(&cx, &pool, tid, ThreadState::Active).await);
            ok(queries::update_thread_state(&cx, &pool, tid, ThreadState::WaitingReply).await);
            ok(queries::schedule_follow_up(&cx, &pool, tid, Some(now_micros() - 1), None).await);
            ok(queries::update_thread_state(&cx, &pool, tid, ThreadState::FollowUp).await);

            let brief = ok(generate_brief(&cx, &pool, &config(), tid).await).unwrap();
            assert!(brief.contains("Overdue — send follow-up now"));
        });
    }
}
