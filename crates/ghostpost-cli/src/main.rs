//! The `ghostpost` binary.
//!
//! Thin command surface over the engine: triage, briefs, context refresh,
//! gate-checked replies, state and goal management, quarantine review.

#![forbid(unsafe_code)]

use std::process::ExitCode;

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use clap::{Parser, Subcommand};
use serde_json::json;

use ghostpost_core::{AutoReplyMode, Config, GoalStatus, ThreadState};
use ghostpost_db::pool::{DbPool, DbPoolConfig};
use ghostpost_db::{DraftRow, EmailRow, now_micros, queries};
use ghostpost_engine::{MemoryBus, Notifier};
use ghostpost_guard::{MemoryCounterStore, check_send_allowed, increment_send_rate};
use ghostpost_storage::ContextProjector;

#[derive(Parser)]
#[command(name = "ghostpost", about = "Autonomous email-handling backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the prioritized triage snapshot.
    Triage {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Print the structured brief for a thread.
    Brief {
        thread_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Regenerate all context files from database state.
    ContextRefresh,
    /// Send (or draft) a reply on a thread, subject to the send gate.
    Reply {
        thread_id: i64,
        #[arg(long)]
        body: String,
        /// Save as a pending draft instead of sending.
        #[arg(long)]
        draft: bool,
        #[arg(long)]
        json: bool,
    },
    /// Generate a reply with the LLM and save it as a pending draft.
    Compose {
        thread_id: i64,
        #[arg(long)]
        instructions: Option<String>,
        #[arg(long)]
        style: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Transition a thread to a new state.
    State {
        thread_id: i64,
        state: String,
        #[arg(long)]
        json: bool,
    },
    /// Manage a thread's goal.
    Goal {
        thread_id: i64,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        criteria: Option<String>,
        /// Set the goal status (in_progress | met | abandoned).
        #[arg(long)]
        status: Option<String>,
        /// Re-surface the goal for evaluation.
        #[arg(long)]
        check: bool,
        #[arg(long)]
        json: bool,
    },
    /// Toggle a thread's auto-reply mode.
    Toggle {
        thread_id: i64,
        #[arg(long)]
        mode: String,
        #[arg(long)]
        json: bool,
    },
    /// Apply a named playbook to a thread.
    ApplyPlaybook {
        thread_id: i64,
        name: String,
        #[arg(long)]
        json: bool,
    },
    /// Approve a pending draft.
    DraftApprove {
        draft_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// Quarantine review.
    Quarantine {
        #[command(subcommand)]
        command: QuarantineCommand,
    },
    /// Deduplicate and trim the alert log.
    CleanupAlerts,
}

#[derive(Subcommand)]
enum QuarantineCommand {
    /// List quarantined security events awaiting resolution.
    List {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = match DbPool::new(&DbPoolConfig {
        database_url: config.database_url.clone(),
        ..Default::default()
    }) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("error: cannot open database: {e}");
            return ExitCode::FAILURE;
        }
    };

    let rt = match RuntimeBuilder::current_thread().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let cx = Cx::for_request();

    rt.block_on(run_command(&cx, &config, &pool, cli.command))
}

/// Unwrap an Outcome into the command result, printing failures.
macro_rules! try_cli {
    ($out:expr) => {
        match $out {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
            Outcome::Cancelled(_) => {
                eprintln!("error: operation cancelled");
                return ExitCode::FAILURE;
            }
            Outcome::Panicked(p) => {
                eprintln!("error: internal panic: {}", p.message());
                return ExitCode::FAILURE;
            }
        }
    };
}

#[allow(clippy::too_many_lines)]
async fn run_command(cx: &Cx, config: &Config, pool: &DbPool, command: Command) -> ExitCode {
    match command {
        Command::Triage { limit, json } => {
            let snapshot = try_cli!(ghostpost_engine::get_triage_data(cx, pool, limit).await);
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot).unwrap_or_default());
            } else {
                println!("Triage @ {}", snapshot.timestamp);
                for action in &snapshot.actions {
                    println!(
                        "  [{:>3}] {:<16} {}  ->  {}",
                        action.score, action.action, action.reason, action.command
                    );
                }
                if snapshot.actions.is_empty() {
                    println!("  nothing to do");
                }
            }
            ExitCode::SUCCESS
        }

        Command::Brief { thread_id, json } => {
            let brief =
                try_cli!(ghostpost_engine::generate_brief(cx, pool, config, thread_id).await);
            match brief {
                Some(text) => {
                    if json {
                        println!("{}", json!({"thread_id": thread_id, "brief": text}));
                    } else {
                        println!("{text}");
                    }
                    ExitCode::SUCCESS
                }
                None => {
                    eprintln!("thread not found: {thread_id}");
                    ExitCode::FAILURE
                }
            }
        }

        Command::ContextRefresh => {
            let projector = ContextProjector::new(config.clone(), pool.clone());
            let paths = try_cli!(projector.write_all_context_files(cx).await);
            println!("wrote {} context files under {}", paths.len(), config.context_dir.display());
            ExitCode::SUCCESS
        }

        Command::Reply {
            thread_id,
            body,
            draft,
            json,
        } => {
            let thread = try_cli!(queries::get_thread(cx, pool, thread_id).await);
            let emails = try_cli!(queries::list_thread_emails(cx, pool, thread_id).await);
            let recipient = emails
                .iter()
                .rev()
                .find(|e| !e.is_sent_bool())
                .map(|e| e.from_address.clone())
                .unwrap_or_default();
            if recipient.is_empty() {
                eprintln!("error: thread #{thread_id} has no counterparty to reply to");
                return ExitCode::FAILURE;
            }
            let to = ghostpost_core::AddressList::List(vec![recipient.clone()]);

            let store = MemoryCounterStore::new();
            let decision = try_cli!(
                check_send_allowed(
                    cx,
                    pool,
                    &store,
                    &to,
                    &body,
                    Some(thread_id),
                    config.send_rate_limit,
                )
                .await
            );
            for warning in &decision.warnings {
                eprintln!("warning: {warning}");
            }
            if !decision.allowed {
                if json {
                    println!("{}", json!({"sent": false, "reasons": decision.reasons}));
                } else {
                    for reason in &decision.reasons {
                        eprintln!("blocked: {reason}");
                    }
                }
                return ExitCode::FAILURE;
            }

            let subject = if thread.subject.to_lowercase().starts_with("re:") {
                thread.subject.clone()
            } else {
                format!("Re: {}", thread.subject)
            };

            if draft {
                let row = try_cli!(
                    queries::create_draft(
                        cx,
                        pool,
                        DraftRow {
                            thread_id: Some(thread_id),
                            to_addresses: to.to_json_string(),
                            subject: subject.clone(),
                            body: body.clone(),
                            ..DraftRow::default()
                        },
                    )
                    .await
                );
                ghostpost_guard::audit::log_action_best_effort(
                    cx,
                    pool,
                    "agent",
                    "draft_created",
                    row.id,
                    json!({"thread_id": thread_id}),
                )
                .await;
                let bus = MemoryBus::new();
                let notifier = Notifier::new(config, pool, &bus);
                try_cli!(
                    notifier
                        .notify_draft_ready(cx, thread_id, &subject, row.id.unwrap_or(0))
                        .await
                );
                if json {
                    println!("{}", json!({"draft_id": row.id, "status": "pending"}));
                } else {
                    println!("draft #{} saved for approval", row.id.unwrap_or(0));
                }
                return ExitCode::SUCCESS;
            }

            // Mail-provider hand-off happens upstream; record the send and
            // advance the thread.
            try_cli!(increment_send_rate(cx, &store, ghostpost_guard::send_gate::SEND_ACTOR).await);
            let email = try_cli!(
                queries::insert_email(
                    cx,
                    pool,
                    EmailRow {
                        thread_id,
                        subject: subject.clone(),
                        from_address: config.own_email.clone(),
                        to_addresses: to.to_json_string(),
                        body_plain: Some(body.clone()),
                        is_sent: 1,
                        is_read: 1,
                        received_at: Some(now_micros()),
                        ..EmailRow::default()
                    },
                )
                .await
            );
            let updated = try_cli!(
                ghostpost_engine::record_outbound_send(cx, pool, config, thread_id).await
            );
            ghostpost_guard::audit::log_action_best_effort(
                cx,
                pool,
                "agent",
                "email_sent",
                email.id,
                json!({"thread_id": thread_id, "to": recipient}),
            )
            .await;

            let projector = ContextProjector::new(config.clone(), pool.clone());
            try_cli!(projector.write_single_thread_file(cx, thread_id).await);

            if json {
                println!(
                    "{}",
                    json!({
                        "sent": true,
                        "email_id": email.id,
                        "state": updated.state,
                        "warnings": decision.warnings,
                    })
                );
            } else {
                println!("sent reply on thread #{thread_id} (now {})", updated.state);
            }
            ExitCode::SUCCESS
        }

        Command::Compose {
            thread_id,
            instructions,
            style,
            json,
        } => {
            let draft = match ghostpost_engine::generate_reply(
                cx,
                pool,
                config,
                thread_id,
                instructions.as_deref(),
                style.as_deref(),
            )
            .await
            {
                Outcome::Ok(draft) => draft,
                Outcome::Err(e) => {
                    if json {
                        println!("{}", json!({"error": e.reply_error_message()}));
                    } else {
                        eprintln!("error: {}", e.reply_error_message());
                    }
                    return ExitCode::FAILURE;
                }
                Outcome::Cancelled(_) => {
                    eprintln!("error: operation cancelled");
                    return ExitCode::FAILURE;
                }
                Outcome::Panicked(p) => {
                    eprintln!("error: internal panic: {}", p.message());
                    return ExitCode::FAILURE;
                }
            };

            let row = try_cli!(
                queries::create_draft(
                    cx,
                    pool,
                    DraftRow {
                        thread_id: Some(thread_id),
                        to_addresses: ghostpost_core::AddressList::List(vec![draft.to.clone()])
                            .to_json_string(),
                        subject: draft.subject.clone(),
                        body: draft.body.clone(),
                        ..DraftRow::default()
                    },
                )
                .await
            );
            ghostpost_guard::audit::log_action_best_effort(
                cx,
                pool,
                "agent",
                "draft_created",
                row.id,
                json!({"thread_id": thread_id, "style": draft.style}),
            )
            .await;
            let bus = MemoryBus::new();
            let notifier = Notifier::new(config, pool, &bus);
            try_cli!(
                notifier
                    .notify_draft_ready(cx, thread_id, &draft.subject, row.id.unwrap_or(0))
                    .await
            );

            if json {
                println!(
                    "{}",
                    json!({
                        "draft_id": row.id,
                        "to": draft.to,
                        "subject": draft.subject,
                        "style": draft.style,
                        "body": draft.body,
                    })
                );
            } else {
                println!("draft #{} ready: {}", row.id.unwrap_or(0), draft.subject);
            }
            ExitCode::SUCCESS
        }

        Command::State {
            thread_id,
            state,
            json,
        } => {
            let Ok(to) = state.parse::<ThreadState>() else {
                eprintln!("error: unknown state '{state}'");
                return ExitCode::FAILURE;
            };
            let updated =
                try_cli!(ghostpost_engine::apply_transition(cx, pool, thread_id, to).await);
            ghostpost_guard::audit::log_action_best_effort(
                cx,
                pool,
                "agent",
                "state_changed",
                Some(thread_id),
                json!({"state": updated.state}),
            )
            .await;
            if json {
                println!("{}", json!({"thread_id": thread_id, "state": updated.state}));
            } else {
                println!("thread #{thread_id} -> {}", updated.state);
            }
            ExitCode::SUCCESS
        }

        Command::Goal {
            thread_id,
            goal,
            criteria,
            status,
            check,
            json,
        } => {
            if let Some(goal_text) = goal.as_deref() {
                try_cli!(
                    queries::set_thread_goal(
                        cx,
                        pool,
                        thread_id,
                        Some(goal_text),
                        criteria.as_deref(),
                        Some(GoalStatus::InProgress),
                    )
                    .await
                );
            }
            if let Some(status) = status.as_deref() {
                let Ok(parsed) = status.parse::<GoalStatus>() else {
                    eprintln!("error: unknown goal status '{status}'");
                    return ExitCode::FAILURE;
                };
                if parsed == GoalStatus::Met {
                    try_cli!(ghostpost_engine::mark_goal_met(cx, pool, thread_id).await);
                } else {
                    try_cli!(queries::set_goal_status(cx, pool, thread_id, parsed).await);
                }
            }

            let thread = try_cli!(queries::get_thread(cx, pool, thread_id).await);
            if check && thread.goal.is_none() {
                eprintln!("thread #{thread_id} has no goal to check");
                return ExitCode::FAILURE;
            }
            if json {
                println!(
                    "{}",
                    json!({
                        "thread_id": thread_id,
                        "goal": thread.goal,
                        "acceptance_criteria": thread.acceptance_criteria,
                        "goal_status": thread.goal_status,
                        "state": thread.state,
                    })
                );
            } else {
                println!(
                    "thread #{thread_id}: goal={} status={}",
                    thread.goal.as_deref().unwrap_or("-"),
                    thread.goal_status.as_deref().unwrap_or("-")
                );
            }
            ExitCode::SUCCESS
        }

        Command::Toggle {
            thread_id,
            mode,
            json,
        } => {
            let Ok(parsed) = mode.parse::<AutoReplyMode>() else {
                eprintln!("error: unknown auto-reply mode '{mode}'");
                return ExitCode::FAILURE;
            };
            try_cli!(queries::set_auto_reply_mode(cx, pool, thread_id, parsed).await);
            if json {
                println!("{}", json!({"thread_id": thread_id, "auto_reply_mode": mode}));
            } else {
                println!("thread #{thread_id} auto-reply -> {mode}");
            }
            ExitCode::SUCCESS
        }

        Command::ApplyPlaybook {
            thread_id,
            name,
            json,
        } => {
            try_cli!(queries::set_thread_playbook(cx, pool, thread_id, Some(&name)).await);
            if json {
                println!("{}", json!({"thread_id": thread_id, "playbook": name}));
            } else {
                println!("thread #{thread_id} playbook -> {name}");
            }
            ExitCode::SUCCESS
        }

        Command::DraftApprove { draft_id, json } => {
            try_cli!(
                queries::set_draft_status(cx, pool, draft_id, ghostpost_core::DraftStatus::Approved)
                    .await
            );
            ghostpost_guard::audit::log_action_best_effort(
                cx,
                pool,
                "agent",
                "draft_approved",
                Some(draft_id),
                json!({}),
            )
            .await;
            if json {
                println!("{}", json!({"draft_id": draft_id, "status": "approved"}));
            } else {
                println!("draft #{draft_id} approved");
            }
            ExitCode::SUCCESS
        }

        Command::Quarantine { command } => match command {
            QuarantineCommand::List { json } => {
                let events = try_cli!(queries::quarantined_events(cx, pool).await);
                if json {
                    let items: Vec<_> = events
                        .iter()
                        .map(|e| {
                            json!({
                                "id": e.id,
                                "event_type": e.event_type,
                                "severity": e.severity,
                                "email_id": e.email_id,
                                "thread_id": e.thread_id,
                                "details": serde_json::from_str::<serde_json::Value>(&e.details)
                                    .unwrap_or(serde_json::Value::Null),
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&items).unwrap_or_default());
                } else if events.is_empty() {
                    println!("no quarantined events");
                } else {
                    for e in &events {
                        println!(
                            "#{} [{}] {} email={:?} thread={:?}",
                            e.id.unwrap_or(0),
                            e.severity,
                            e.event_type,
                            e.email_id,
                            e.thread_id
                        );
                    }
                }
                ExitCode::SUCCESS
            }
        },

        Command::CleanupAlerts => {
            match ghostpost_storage::cleanup_alerts(&config.alerts_file()) {
                Ok(removed) => {
                    println!("removed {removed} duplicate/excess alert entries");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
