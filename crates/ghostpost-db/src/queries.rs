//! Database query operations
//!
//! CRUD operations for all models. These functions are the "DB truth" for
//! the rest of the application: the guard, engine, storage and CLI crates
//! rely on these helpers rather than embedding raw SQL.

#![allow(clippy::missing_const_for_fn)]

use asupersync::{Cx, Outcome};
use sqlmodel_core::{Connection, Error as SqlError, Row as SqlRow, Value};
use sqlmodel_pool::PooledConnection;
use sqlmodel_query::{raw_execute, raw_query};

use ghostpost_core::{AutoReplyMode, GoalStatus, Resolution, ThreadState, parse_bool};

use crate::error::DbError;
use crate::models::{
    AuditLogRow, ContactRow, DraftRow, EmailRow, SecurityEventRow, ThreadOutcomeRow, ThreadRow,
};
use crate::pool::DbPool;
use crate::timestamps::now_micros;

/// Unwrap an `Outcome`, returning early on non-`Ok`.
macro_rules! try_out {
    ($out:expr) => {
        match $out {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

// =============================================================================
// Shared helpers
// =============================================================================

fn map_sql_error(e: &SqlError) -> DbError {
    DbError::Sqlite(e.to_string())
}

fn map_sql_outcome<T>(out: Outcome<T, SqlError>) -> Outcome<T, DbError> {
    match out {
        Outcome::Ok(v) => Outcome::Ok(v),
        Outcome::Err(e) => Outcome::Err(map_sql_error(&e)),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

async fn acquire_conn(
    cx: &Cx,
    pool: &DbPool,
) -> Outcome<PooledConnection<crate::DbConn>, DbError> {
    map_sql_outcome(pool.acquire(cx).await)
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::BigInt(n) => Some(*n),
        Value::Int(n) => Some(i64::from(*n)),
        Value::SmallInt(n) => Some(i64::from(*n)),
        Value::TinyInt(n) => Some(i64::from(*n)),
        _ => None,
    }
}

fn row_i64(row: &SqlRow, idx: usize) -> i64 {
    row.get(idx).and_then(value_as_i64).unwrap_or(0)
}

fn row_opt_i64(row: &SqlRow, idx: usize) -> Option<i64> {
    row.get(idx).and_then(value_as_i64)
}

fn row_string(row: &SqlRow, idx: usize) -> String {
    row.get(idx)
        .and_then(|v| match v {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

fn row_opt_string(row: &SqlRow, idx: usize) -> Option<String> {
    row.get(idx).and_then(|v| match v {
        Value::Text(s) => Some(s.clone()),
        _ => None,
    })
}

fn row_first_i64(row: &SqlRow) -> Option<i64> {
    row.get(0).and_then(value_as_i64)
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

fn opt_big(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::BigInt)
}

async fn count_query(
    cx: &Cx,
    pool: &DbPool,
    sql: &str,
    params: &[Value],
) -> Outcome<i64, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, sql, params).await));
    Outcome::Ok(rows.first().and_then(row_first_i64).unwrap_or(0))
}

// =============================================================================
// Thread decoding
// =============================================================================

/// Explicit column order shared by every thread SELECT.
const THREAD_COLUMNS_SQL: &str = "id, subject, state, priority, category, summary, goal, \
     acceptance_criteria, goal_status, playbook, auto_reply_mode, follow_up_days, \
     next_follow_up_at, security_score_avg, last_activity_at, notes, created_at, updated_at";

fn decode_thread_row(row: &SqlRow) -> ThreadRow {
    ThreadRow {
        id: row_opt_i64(row, 0),
        subject: row_string(row, 1),
        state: {
            let s = row_string(row, 2);
            if s.is_empty() { "NEW".to_string() } else { s }
        },
        priority: row_opt_string(row, 3),
        category: row_opt_string(row, 4),
        summary: row_opt_string(row, 5),
        goal: row_opt_string(row, 6),
        acceptance_criteria: row_opt_string(row, 7),
        goal_status: row_opt_string(row, 8),
        playbook: row_opt_string(row, 9),
        auto_reply_mode: {
            let s = row_string(row, 10);
            if s.is_empty() { "off".to_string() } else { s }
        },
        follow_up_days: row_opt_i64(row, 11).unwrap_or(3),
        next_follow_up_at: row_opt_i64(row, 12),
        security_score_avg: row_opt_i64(row, 13),
        last_activity_at: row_opt_i64(row, 14),
        notes: row_opt_string(row, 15),
        created_at: row_i64(row, 16),
        updated_at: row_i64(row, 17),
    }
}

async fn query_threads(
    cx: &Cx,
    pool: &DbPool,
    sql: &str,
    params: &[Value],
) -> Outcome<Vec<ThreadRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, sql, params).await));
    Outcome::Ok(rows.iter().map(decode_thread_row).collect())
}

// =============================================================================
// Thread queries
// =============================================================================

/// Create a new thread in the `NEW` state.
pub async fn create_thread(cx: &Cx, pool: &DbPool, subject: &str) -> Outcome<ThreadRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let now = now_micros();

    let sql = "INSERT INTO threads (subject, state, auto_reply_mode, follow_up_days, \
               created_at, updated_at) VALUES (?, 'NEW', 'off', 3, ?, ?)";
    let params = [
        Value::Text(subject.to_string()),
        Value::BigInt(now),
        Value::BigInt(now),
    ];
    let id = try_out!(map_sql_outcome((*conn).insert(cx, sql, &params).await));

    let mut row = ThreadRow::new(subject.to_string());
    row.id = Some(id);
    row.created_at = now;
    row.updated_at = now;
    Outcome::Ok(row)
}

/// Load a thread by id.
pub async fn get_thread(cx: &Cx, pool: &DbPool, thread_id: i64) -> Outcome<ThreadRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!("SELECT {THREAD_COLUMNS_SQL} FROM threads WHERE id = ? LIMIT 1");
    let params = [Value::BigInt(thread_id)];
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &sql, &params).await));
    rows.first().map_or_else(
        || Outcome::Err(DbError::not_found("Thread", thread_id.to_string())),
        |row| Outcome::Ok(decode_thread_row(row)),
    )
}

/// Set a thread's state.
///
/// Entering a terminal state clears `next_follow_up_at`; callers validate
/// the transition itself (the state machine lives in the engine crate).
pub async fn update_thread_state(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    state: ThreadState,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let now = now_micros();

    let sql = if state.is_terminal() {
        "UPDATE threads SET state = ?, next_follow_up_at = NULL, updated_at = ? WHERE id = ?"
    } else {
        "UPDATE threads SET state = ?, updated_at = ? WHERE id = ?"
    };
    let params = [
        Value::Text(state.as_str().to_string()),
        Value::BigInt(now),
        Value::BigInt(thread_id),
    ];
    let affected = try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    if affected == 0 {
        return Outcome::Err(DbError::not_found("Thread", thread_id.to_string()));
    }
    Outcome::Ok(())
}

/// Set or clear a thread's goal. `goal_status` is forced to NULL whenever
/// the goal itself is NULL.
pub async fn set_thread_goal(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    goal: Option<&str>,
    acceptance_criteria: Option<&str>,
    goal_status: Option<GoalStatus>,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let status = if goal.is_some() {
        goal_status.map(|s| s.as_str().to_string())
    } else {
        None
    };

    let sql = "UPDATE threads SET goal = ?, acceptance_criteria = ?, goal_status = ?, \
               updated_at = ? WHERE id = ?";
    let params = [
        opt_text(goal),
        opt_text(acceptance_criteria),
        opt_text(status.as_deref()),
        Value::BigInt(now_micros()),
        Value::BigInt(thread_id),
    ];
    let affected = try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    if affected == 0 {
        return Outcome::Err(DbError::not_found("Thread", thread_id.to_string()));
    }
    Outcome::Ok(())
}

/// Update a thread's goal status only.
pub async fn set_goal_status(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    status: GoalStatus,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "UPDATE threads SET goal_status = ?, updated_at = ? \
               WHERE id = ? AND goal IS NOT NULL";
    let params = [
        Value::Text(status.as_str().to_string()),
        Value::BigInt(now_micros()),
        Value::BigInt(thread_id),
    ];
    let affected = try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    if affected == 0 {
        return Outcome::Err(DbError::not_found("Thread", thread_id.to_string()));
    }
    Outcome::Ok(())
}

/// Set a thread's playbook.
pub async fn set_thread_playbook(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    playbook: Option<&str>,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "UPDATE threads SET playbook = ?, updated_at = ? WHERE id = ?";
    let params = [
        opt_text(playbook),
        Value::BigInt(now_micros()),
        Value::BigInt(thread_id),
    ];
    try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    Outcome::Ok(())
}

/// Set a thread's auto-reply mode.
pub async fn set_auto_reply_mode(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    mode: AutoReplyMode,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "UPDATE threads SET auto_reply_mode = ?, updated_at = ? WHERE id = ?";
    let params = [
        Value::Text(mode.as_str().to_string()),
        Value::BigInt(now_micros()),
        Value::BigInt(thread_id),
    ];
    try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    Outcome::Ok(())
}

/// Schedule (or clear) a thread's next follow-up, optionally updating the
/// interval.
pub async fn schedule_follow_up(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    next_follow_up_at: Option<i64>,
    follow_up_days: Option<i64>,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let (sql, params): (&str, Vec<Value>) = if let Some(days) = follow_up_days {
        (
            "UPDATE threads SET next_follow_up_at = ?, follow_up_days = ?, updated_at = ? \
             WHERE id = ?",
            vec![
                opt_big(next_follow_up_at),
                Value::BigInt(days),
                Value::BigInt(now_micros()),
                Value::BigInt(thread_id),
            ],
        )
    } else {
        (
            "UPDATE threads SET next_follow_up_at = ?, updated_at = ? WHERE id = ?",
            vec![
                opt_big(next_follow_up_at),
                Value::BigInt(now_micros()),
                Value::BigInt(thread_id),
            ],
        )
    };
    try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    Outcome::Ok(())
}

/// Set thread priority.
pub async fn set_thread_priority(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    priority: Option<&str>,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "UPDATE threads SET priority = ?, updated_at = ? WHERE id = ?";
    let params = [
        opt_text(priority),
        Value::BigInt(now_micros()),
        Value::BigInt(thread_id),
    ];
    try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    Outcome::Ok(())
}

/// Count threads grouped by state.
pub async fn thread_state_counts(cx: &Cx, pool: &DbPool) -> Outcome<Vec<(String, i64)>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "SELECT state, COUNT(id) FROM threads \
               WHERE EXISTS (SELECT 1 FROM emails WHERE emails.thread_id = threads.id) \
               GROUP BY state";
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, sql, &[]).await));
    Outcome::Ok(
        rows.iter()
            .map(|r| (row_string(r, 0), row_i64(r, 1)))
            .collect(),
    )
}

/// Non-archived threads with at least one email, newest activity first.
pub async fn list_active_threads(
    cx: &Cx,
    pool: &DbPool,
    limit: i64,
) -> Outcome<Vec<ThreadRow>, DbError> {
    let sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads \
         WHERE state != 'ARCHIVED' \
         AND EXISTS (SELECT 1 FROM emails WHERE emails.thread_id = threads.id) \
         ORDER BY last_activity_at DESC LIMIT ?"
    );
    query_threads(cx, pool, &sql, &[Value::BigInt(limit)]).await
}

/// All threads (any state) with at least one email, paired with their
/// emails in chronological order. Two queries total, grouped in memory.
pub async fn list_threads_with_emails(
    cx: &Cx,
    pool: &DbPool,
) -> Outcome<Vec<(ThreadRow, Vec<EmailRow>)>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);

    let thread_sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads \
         WHERE EXISTS (SELECT 1 FROM emails WHERE emails.thread_id = threads.id) \
         ORDER BY id ASC"
    );
    let thread_rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &thread_sql, &[]).await));
    let threads: Vec<ThreadRow> = thread_rows.iter().map(decode_thread_row).collect();

    let email_sql = format!(
        "SELECT {EMAIL_COLUMNS_SQL} FROM emails \
         ORDER BY thread_id ASC, COALESCE(date, received_at, created_at) ASC"
    );
    let email_rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &email_sql, &[]).await));

    let mut by_thread: std::collections::HashMap<i64, Vec<EmailRow>> =
        std::collections::HashMap::new();
    for row in &email_rows {
        let email = decode_email_row(row);
        by_thread.entry(email.thread_id).or_default().push(email);
    }

    Outcome::Ok(
        threads
            .into_iter()
            .map(|t| {
                let emails = t.id.and_then(|id| by_thread.remove(&id)).unwrap_or_default();
                (t, emails)
            })
            .collect(),
    )
}

/// Total thread count (threads with at least one email).
pub async fn count_threads(cx: &Cx, pool: &DbPool) -> Outcome<i64, DbError> {
    count_query(
        cx,
        pool,
        "SELECT COUNT(id) FROM threads \
         WHERE EXISTS (SELECT 1 FROM emails WHERE emails.thread_id = threads.id)",
        &[],
    )
    .await
}

/// Threads whose follow-up deadline has passed, oldest deadline first.
pub async fn overdue_threads(cx: &Cx, pool: &DbPool, now: i64) -> Outcome<Vec<ThreadRow>, DbError> {
    let sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads \
         WHERE state IN ('WAITING_REPLY', 'FOLLOW_UP') AND next_follow_up_at <= ? \
         ORDER BY next_follow_up_at ASC"
    );
    query_threads(cx, pool, &sql, &[Value::BigInt(now)]).await
}

/// WAITING_REPLY threads whose follow-up deadline has passed (the
/// scheduler flips these to FOLLOW_UP).
pub async fn follow_ups_due(cx: &Cx, pool: &DbPool, now: i64) -> Outcome<Vec<ThreadRow>, DbError> {
    let sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads \
         WHERE state = 'WAITING_REPLY' AND next_follow_up_at <= ? \
         ORDER BY next_follow_up_at ASC"
    );
    query_threads(cx, pool, &sql, &[Value::BigInt(now)]).await
}

/// Untriaged NEW threads, most recent activity first.
pub async fn new_threads(cx: &Cx, pool: &DbPool, limit: i64) -> Outcome<Vec<ThreadRow>, DbError> {
    let sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads WHERE state = 'NEW' \
         ORDER BY last_activity_at DESC LIMIT ?"
    );
    query_threads(cx, pool, &sql, &[Value::BigInt(limit)]).await
}

/// ACTIVE threads with in-progress goals whose goal may have been met.
pub async fn goal_check_threads(
    cx: &Cx,
    pool: &DbPool,
    limit: i64,
) -> Outcome<Vec<ThreadRow>, DbError> {
    let sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads \
         WHERE goal IS NOT NULL AND goal_status = 'in_progress' AND state = 'ACTIVE' \
         ORDER BY updated_at DESC LIMIT ?"
    );
    query_threads(cx, pool, &sql, &[Value::BigInt(limit)]).await
}

/// Non-archived threads needing attention: elevated priority or overdue
/// follow-up.
pub async fn attention_threads(
    cx: &Cx,
    pool: &DbPool,
    now: i64,
    limit: i64,
) -> Outcome<Vec<ThreadRow>, DbError> {
    let sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads \
         WHERE state != 'ARCHIVED' \
         AND (priority IN ('critical', 'high') OR next_follow_up_at < ?) \
         ORDER BY priority DESC, next_follow_up_at ASC LIMIT ?"
    );
    query_threads(cx, pool, &sql, &[Value::BigInt(now), Value::BigInt(limit)]).await
}

/// All threads carrying a goal, most recently updated first.
pub async fn threads_with_goals(cx: &Cx, pool: &DbPool) -> Outcome<Vec<ThreadRow>, DbError> {
    let sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads WHERE goal IS NOT NULL \
         ORDER BY updated_at DESC"
    );
    query_threads(cx, pool, &sql, &[]).await
}

/// Threads with in-progress goals, most recently updated first.
pub async fn active_goal_threads(cx: &Cx, pool: &DbPool) -> Outcome<Vec<ThreadRow>, DbError> {
    let sql = format!(
        "SELECT {THREAD_COLUMNS_SQL} FROM threads \
         WHERE goal IS NOT NULL AND goal_status = 'in_progress' \
         ORDER BY updated_at DESC"
    );
    query_threads(cx, pool, &sql, &[]).await
}

/// Load several threads by id. Missing ids are silently skipped.
pub async fn threads_by_ids(
    cx: &Cx,
    pool: &DbPool,
    ids: &[i64],
) -> Outcome<Vec<ThreadRow>, DbError> {
    if ids.is_empty() {
        return Outcome::Ok(Vec::new());
    }
    let placeholders = std::iter::repeat_n("?", ids.len())
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {THREAD_COLUMNS_SQL} FROM threads WHERE id IN ({placeholders})");
    let params: Vec<Value> = ids.iter().map(|id| Value::BigInt(*id)).collect();
    query_threads(cx, pool, &sql, &params).await
}

// =============================================================================
// Email decoding & queries
// =============================================================================

const EMAIL_COLUMNS_SQL: &str = "id, thread_id, subject, from_address, to_addresses, \
     body_plain, body_html, is_sent, is_read, received_at, date, sentiment, urgency, \
     action_required, security_score, attachments, created_at";

fn decode_email_row(row: &SqlRow) -> EmailRow {
    EmailRow {
        id: row_opt_i64(row, 0),
        thread_id: row_i64(row, 1),
        subject: row_string(row, 2),
        from_address: row_string(row, 3),
        to_addresses: {
            let s = row_string(row, 4);
            if s.is_empty() { "[]".to_string() } else { s }
        },
        body_plain: row_opt_string(row, 5),
        body_html: row_opt_string(row, 6),
        is_sent: row_i64(row, 7),
        is_read: row_i64(row, 8),
        received_at: row_opt_i64(row, 9),
        date: row_opt_i64(row, 10),
        sentiment: row_opt_string(row, 11),
        urgency: row_opt_string(row, 12),
        action_required: row_opt_string(row, 13),
        security_score: row_opt_i64(row, 14),
        attachments: {
            let s = row_string(row, 15);
            if s.is_empty() { "[]".to_string() } else { s }
        },
        created_at: row_i64(row, 16),
    }
}

/// Insert an email and refresh the owning thread's derived columns:
/// `security_score_avg` (integer mean over scored emails) and
/// `last_activity_at`.
pub async fn insert_email(cx: &Cx, pool: &DbPool, email: EmailRow) -> Outcome<EmailRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);

    let sql = "INSERT INTO emails (thread_id, subject, from_address, to_addresses, body_plain, \
               body_html, is_sent, is_read, received_at, date, sentiment, urgency, \
               action_required, security_score, attachments, created_at) \
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
    let params = [
        Value::BigInt(email.thread_id),
        Value::Text(email.subject.clone()),
        Value::Text(email.from_address.clone()),
        Value::Text(email.to_addresses.clone()),
        opt_text(email.body_plain.as_deref()),
        opt_text(email.body_html.as_deref()),
        Value::BigInt(email.is_sent),
        Value::BigInt(email.is_read),
        opt_big(email.received_at),
        opt_big(email.date),
        opt_text(email.sentiment.as_deref()),
        opt_text(email.urgency.as_deref()),
        opt_text(email.action_required.as_deref()),
        opt_big(email.security_score),
        Value::Text(email.attachments.clone()),
        Value::BigInt(email.created_at),
    ];
    let id = try_out!(map_sql_outcome((*conn).insert(cx, sql, &params).await));

    // Refresh derived thread columns. AVG over NULLs is NULL, which keeps
    // unscored threads unscored.
    let activity = email.received_at.unwrap_or(email.created_at);
    let refresh_sql = "UPDATE threads SET \
         security_score_avg = (SELECT CAST(AVG(security_score) AS INTEGER) FROM emails \
                               WHERE thread_id = ? AND security_score IS NOT NULL), \
         last_activity_at = MAX(COALESCE(last_activity_at, 0), ?), \
         updated_at = ? \
         WHERE id = ?";
    let refresh_params = [
        Value::BigInt(email.thread_id),
        Value::BigInt(activity),
        Value::BigInt(now_micros()),
        Value::BigInt(email.thread_id),
    ];
    try_out!(map_sql_outcome(
        raw_execute(cx, &*conn, refresh_sql, &refresh_params).await
    ));

    let mut inserted = email;
    inserted.id = Some(id);
    Outcome::Ok(inserted)
}

/// Load an email by id.
pub async fn get_email(cx: &Cx, pool: &DbPool, email_id: i64) -> Outcome<EmailRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!("SELECT {EMAIL_COLUMNS_SQL} FROM emails WHERE id = ? LIMIT 1");
    let params = [Value::BigInt(email_id)];
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &sql, &params).await));
    rows.first().map_or_else(
        || Outcome::Err(DbError::not_found("Email", email_id.to_string())),
        |row| Outcome::Ok(decode_email_row(row)),
    )
}

/// A thread's emails in chronological order
/// (`coalesce(date, received_at, created_at)`).
pub async fn list_thread_emails(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
) -> Outcome<Vec<EmailRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {EMAIL_COLUMNS_SQL} FROM emails WHERE thread_id = ? \
         ORDER BY COALESCE(date, received_at, created_at) ASC"
    );
    let params = [Value::BigInt(thread_id)];
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &sql, &params).await));
    Outcome::Ok(rows.iter().map(decode_email_row).collect())
}

/// Mark an email read.
pub async fn mark_email_read(cx: &Cx, pool: &DbPool, email_id: i64) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "UPDATE emails SET is_read = 1 WHERE id = ?";
    try_out!(map_sql_outcome(
        raw_execute(cx, &*conn, sql, &[Value::BigInt(email_id)]).await
    ));
    Outcome::Ok(())
}

/// Count of unread emails.
pub async fn unread_count(cx: &Cx, pool: &DbPool) -> Outcome<i64, DbError> {
    count_query(cx, pool, "SELECT COUNT(id) FROM emails WHERE is_read = 0", &[]).await
}

/// Most recent `received_at` across all emails (the last-sync marker).
pub async fn max_received_at(cx: &Cx, pool: &DbPool) -> Outcome<Option<i64>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let rows = try_out!(map_sql_outcome(
        raw_query(cx, &*conn, "SELECT MAX(received_at) FROM emails", &[]).await
    ));
    Outcome::Ok(rows.first().and_then(row_first_i64))
}

/// Count of received (non-sent) emails since a timestamp.
pub async fn count_received_since(cx: &Cx, pool: &DbPool, since: i64) -> Outcome<i64, DbError> {
    count_query(
        cx,
        pool,
        "SELECT COUNT(id) FROM emails WHERE received_at > ? AND is_sent = 0",
        &[Value::BigInt(since)],
    )
    .await
}

/// Count of sent emails since a timestamp.
pub async fn count_sent_since(cx: &Cx, pool: &DbPool, since: i64) -> Outcome<i64, DbError> {
    count_query(
        cx,
        pool,
        "SELECT COUNT(id) FROM emails WHERE received_at > ? AND is_sent = 1",
        &[Value::BigInt(since)],
    )
    .await
}

// =============================================================================
// Contact queries
// =============================================================================

const CONTACT_COLUMNS_SQL: &str = "id, email, name, relationship_type, preferred_style, \
     communication_frequency, topics, last_interaction, notes";

fn decode_contact_row(row: &SqlRow) -> ContactRow {
    ContactRow {
        id: row_opt_i64(row, 0),
        email: row_string(row, 1),
        name: row_opt_string(row, 2),
        relationship_type: row_opt_string(row, 3),
        preferred_style: row_opt_string(row, 4),
        communication_frequency: row_opt_string(row, 5),
        topics: {
            let s = row_string(row, 6);
            if s.is_empty() { "[]".to_string() } else { s }
        },
        last_interaction: row_opt_i64(row, 7),
        notes: row_opt_string(row, 8),
    }
}

/// Insert or update a contact keyed by address.
pub async fn upsert_contact(
    cx: &Cx,
    pool: &DbPool,
    contact: ContactRow,
) -> Outcome<ContactRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "INSERT INTO contacts (email, name, relationship_type, preferred_style, \
               communication_frequency, topics, last_interaction, notes) \
               VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
               ON CONFLICT(email) DO UPDATE SET \
               name = excluded.name, relationship_type = excluded.relationship_type, \
               preferred_style = excluded.preferred_style, \
               communication_frequency = excluded.communication_frequency, \
               topics = excluded.topics, last_interaction = excluded.last_interaction, \
               notes = excluded.notes";
    let params = [
        Value::Text(contact.email.clone()),
        opt_text(contact.name.as_deref()),
        opt_text(contact.relationship_type.as_deref()),
        opt_text(contact.preferred_style.as_deref()),
        opt_text(contact.communication_frequency.as_deref()),
        Value::Text(contact.topics.clone()),
        opt_big(contact.last_interaction),
        opt_text(contact.notes.as_deref()),
    ];
    try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));

    match get_contact_by_email(cx, pool, &contact.email).await {
        Outcome::Ok(Some(row)) => Outcome::Ok(row),
        Outcome::Ok(None) => Outcome::Err(DbError::Internal(
            "contact upsert succeeded but row is missing".to_string(),
        )),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Look up a contact by exact address.
pub async fn get_contact_by_email(
    cx: &Cx,
    pool: &DbPool,
    email: &str,
) -> Outcome<Option<ContactRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!("SELECT {CONTACT_COLUMNS_SQL} FROM contacts WHERE email = ? LIMIT 1");
    let params = [Value::Text(email.to_string())];
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &sql, &params).await));
    Outcome::Ok(rows.first().map(decode_contact_row))
}

/// Whether any contact row matches the address.
pub async fn contact_exists(cx: &Cx, pool: &DbPool, email: &str) -> Outcome<bool, DbError> {
    let count = try_out!(
        count_query(
            cx,
            pool,
            "SELECT COUNT(id) FROM contacts WHERE email = ?",
            &[Value::Text(email.to_string())],
        )
        .await
    );
    Outcome::Ok(count > 0)
}

/// Known contacts, most recent interaction first.
pub async fn list_contacts(cx: &Cx, pool: &DbPool, limit: i64) -> Outcome<Vec<ContactRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {CONTACT_COLUMNS_SQL} FROM contacts \
         ORDER BY last_interaction DESC LIMIT ?"
    );
    let rows = try_out!(map_sql_outcome(
        raw_query(cx, &*conn, &sql, &[Value::BigInt(limit)]).await
    ));
    Outcome::Ok(rows.iter().map(decode_contact_row).collect())
}

// =============================================================================
// Draft queries
// =============================================================================

const DRAFT_COLUMNS_SQL: &str = "id, thread_id, to_addresses, subject, body, status, created_at";

fn decode_draft_row(row: &SqlRow) -> DraftRow {
    DraftRow {
        id: row_opt_i64(row, 0),
        thread_id: row_opt_i64(row, 1),
        to_addresses: {
            let s = row_string(row, 2);
            if s.is_empty() { "[]".to_string() } else { s }
        },
        subject: row_string(row, 3),
        body: row_string(row, 4),
        status: {
            let s = row_string(row, 5);
            if s.is_empty() { "pending".to_string() } else { s }
        },
        created_at: row_i64(row, 6),
    }
}

/// Create a draft.
pub async fn create_draft(cx: &Cx, pool: &DbPool, draft: DraftRow) -> Outcome<DraftRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "INSERT INTO drafts (thread_id, to_addresses, subject, body, status, created_at) \
               VALUES (?, ?, ?, ?, ?, ?)";
    let params = [
        opt_big(draft.thread_id),
        Value::Text(draft.to_addresses.clone()),
        Value::Text(draft.subject.clone()),
        Value::Text(draft.body.clone()),
        Value::Text(draft.status.clone()),
        Value::BigInt(draft.created_at),
    ];
    let id = try_out!(map_sql_outcome((*conn).insert(cx, sql, &params).await));
    let mut inserted = draft;
    inserted.id = Some(id);
    Outcome::Ok(inserted)
}

/// Load a draft by id.
pub async fn get_draft(cx: &Cx, pool: &DbPool, draft_id: i64) -> Outcome<DraftRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!("SELECT {DRAFT_COLUMNS_SQL} FROM drafts WHERE id = ? LIMIT 1");
    let rows = try_out!(map_sql_outcome(
        raw_query(cx, &*conn, &sql, &[Value::BigInt(draft_id)]).await
    ));
    rows.first().map_or_else(
        || Outcome::Err(DbError::not_found("Draft", draft_id.to_string())),
        |row| Outcome::Ok(decode_draft_row(row)),
    )
}

/// Pending drafts, oldest first so the backlog clears in order.
pub async fn pending_drafts(cx: &Cx, pool: &DbPool) -> Outcome<Vec<DraftRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {DRAFT_COLUMNS_SQL} FROM drafts WHERE status = 'pending' \
         ORDER BY created_at ASC"
    );
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &sql, &[]).await));
    Outcome::Ok(rows.iter().map(decode_draft_row).collect())
}

/// Pending drafts newest-first (the projector's DRAFTS.md ordering).
pub async fn pending_drafts_newest_first(
    cx: &Cx,
    pool: &DbPool,
) -> Outcome<Vec<DraftRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {DRAFT_COLUMNS_SQL} FROM drafts WHERE status = 'pending' \
         ORDER BY created_at DESC"
    );
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &sql, &[]).await));
    Outcome::Ok(rows.iter().map(decode_draft_row).collect())
}

/// Count of pending drafts.
pub async fn count_pending_drafts(cx: &Cx, pool: &DbPool) -> Outcome<i64, DbError> {
    count_query(
        cx,
        pool,
        "SELECT COUNT(id) FROM drafts WHERE status = 'pending'",
        &[],
    )
    .await
}

/// Update a draft's status.
pub async fn set_draft_status(
    cx: &Cx,
    pool: &DbPool,
    draft_id: i64,
    status: ghostpost_core::DraftStatus,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "UPDATE drafts SET status = ? WHERE id = ?";
    let params = [
        Value::Text(status.as_str().to_string()),
        Value::BigInt(draft_id),
    ];
    let affected = try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    if affected == 0 {
        return Outcome::Err(DbError::not_found("Draft", draft_id.to_string()));
    }
    Outcome::Ok(())
}

// =============================================================================
// Security event queries
// =============================================================================

const SECURITY_EVENT_COLUMNS_SQL: &str = "id, event_type, severity, email_id, thread_id, \
     details, quarantined, resolution, created_at";

fn decode_security_event_row(row: &SqlRow) -> SecurityEventRow {
    SecurityEventRow {
        id: row_opt_i64(row, 0),
        event_type: row_string(row, 1),
        severity: row_string(row, 2),
        email_id: row_opt_i64(row, 3),
        thread_id: row_opt_i64(row, 4),
        details: {
            let s = row_string(row, 5);
            if s.is_empty() { "{}".to_string() } else { s }
        },
        quarantined: row_i64(row, 6),
        resolution: {
            let s = row_string(row, 7);
            if s.is_empty() { "pending".to_string() } else { s }
        },
        created_at: row_i64(row, 8),
    }
}

/// Append an immutable security event.
pub async fn insert_security_event(
    cx: &Cx,
    pool: &DbPool,
    event: SecurityEventRow,
) -> Outcome<SecurityEventRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "INSERT INTO security_events (event_type, severity, email_id, thread_id, \
               details, quarantined, resolution, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)";
    let params = [
        Value::Text(event.event_type.clone()),
        Value::Text(event.severity.clone()),
        opt_big(event.email_id),
        opt_big(event.thread_id),
        Value::Text(event.details.clone()),
        Value::BigInt(event.quarantined),
        Value::Text(event.resolution.clone()),
        Value::BigInt(event.created_at),
    ];
    let id = try_out!(map_sql_outcome((*conn).insert(cx, sql, &params).await));
    let mut inserted = event;
    inserted.id = Some(id);
    Outcome::Ok(inserted)
}

/// Unresolved security events, newest first.
pub async fn pending_security_events(
    cx: &Cx,
    pool: &DbPool,
    limit: i64,
) -> Outcome<Vec<SecurityEventRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {SECURITY_EVENT_COLUMNS_SQL} FROM security_events \
         WHERE resolution = 'pending' ORDER BY created_at DESC LIMIT ?"
    );
    let rows = try_out!(map_sql_outcome(
        raw_query(cx, &*conn, &sql, &[Value::BigInt(limit)]).await
    ));
    Outcome::Ok(rows.iter().map(decode_security_event_row).collect())
}

/// Quarantined events awaiting resolution, newest first.
pub async fn quarantined_events(
    cx: &Cx,
    pool: &DbPool,
) -> Outcome<Vec<SecurityEventRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {SECURITY_EVENT_COLUMNS_SQL} FROM security_events \
         WHERE quarantined = 1 AND resolution = 'pending' ORDER BY created_at DESC"
    );
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, &sql, &[]).await));
    Outcome::Ok(rows.iter().map(decode_security_event_row).collect())
}

/// Count of unresolved security events.
pub async fn count_pending_security_events(cx: &Cx, pool: &DbPool) -> Outcome<i64, DbError> {
    count_query(
        cx,
        pool,
        "SELECT COUNT(id) FROM security_events WHERE resolution = 'pending'",
        &[],
    )
    .await
}

/// Count of quarantined events.
pub async fn count_quarantined(cx: &Cx, pool: &DbPool) -> Outcome<i64, DbError> {
    count_query(
        cx,
        pool,
        "SELECT COUNT(id) FROM security_events WHERE quarantined = 1",
        &[],
    )
    .await
}

/// Resolve a security event.
pub async fn resolve_security_event(
    cx: &Cx,
    pool: &DbPool,
    event_id: i64,
    resolution: Resolution,
) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "UPDATE security_events SET resolution = ? WHERE id = ?";
    let params = [
        Value::Text(resolution.as_str().to_string()),
        Value::BigInt(event_id),
    ];
    let affected = try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    if affected == 0 {
        return Outcome::Err(DbError::not_found("SecurityEvent", event_id.to_string()));
    }
    Outcome::Ok(())
}

// =============================================================================
// Audit log queries
// =============================================================================

/// Append an immutable audit record.
pub async fn insert_audit_log(
    cx: &Cx,
    pool: &DbPool,
    entry: AuditLogRow,
) -> Outcome<AuditLogRow, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "INSERT INTO audit_log (actor, action_type, subject_id, metadata, created_at) \
               VALUES (?, ?, ?, ?, ?)";
    let params = [
        Value::Text(entry.actor.clone()),
        Value::Text(entry.action_type.clone()),
        opt_big(entry.subject_id),
        Value::Text(entry.metadata.clone()),
        Value::BigInt(entry.created_at),
    ];
    let id = try_out!(map_sql_outcome((*conn).insert(cx, sql, &params).await));
    let mut inserted = entry;
    inserted.id = Some(id);
    Outcome::Ok(inserted)
}

/// Count of audit entries of one action type since a timestamp.
pub async fn count_actions_since(
    cx: &Cx,
    pool: &DbPool,
    action_type: &str,
    since: i64,
) -> Outcome<i64, DbError> {
    count_query(
        cx,
        pool,
        "SELECT COUNT(id) FROM audit_log WHERE action_type = ? AND created_at > ?",
        &[Value::Text(action_type.to_string()), Value::BigInt(since)],
    )
    .await
}

// =============================================================================
// Settings queries
// =============================================================================

/// Raw setting value, if a row exists.
pub async fn get_setting(cx: &Cx, pool: &DbPool, key: &str) -> Outcome<Option<String>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "SELECT value FROM settings WHERE key = ? LIMIT 1";
    let rows = try_out!(map_sql_outcome(
        raw_query(cx, &*conn, sql, &[Value::Text(key.to_string())]).await
    ));
    Outcome::Ok(rows.first().map(|r| row_string(r, 0)))
}

/// Setting value with fallback to the built-in defaults table.
pub async fn get_setting_or_default(
    cx: &Cx,
    pool: &DbPool,
    key: &str,
) -> Outcome<Option<String>, DbError> {
    match get_setting(cx, pool, key).await {
        Outcome::Ok(Some(v)) => Outcome::Ok(Some(v)),
        Outcome::Ok(None) => {
            Outcome::Ok(ghostpost_core::default_setting(key).map(String::from))
        }
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Boolean setting (`true|1|yes`), with defaults fallback.
pub async fn get_bool_setting(
    cx: &Cx,
    pool: &DbPool,
    key: &str,
    default: bool,
) -> Outcome<bool, DbError> {
    let value = try_out!(get_setting_or_default(cx, pool, key).await);
    Outcome::Ok(value.map_or(default, |v| parse_bool(&v, default)))
}

/// JSON-list setting; unparseable or missing values yield an empty list.
pub async fn get_list_setting(
    cx: &Cx,
    pool: &DbPool,
    key: &str,
) -> Outcome<Vec<String>, DbError> {
    let value = try_out!(get_setting_or_default(cx, pool, key).await);
    Outcome::Ok(
        value
            .and_then(|v| serde_json::from_str(&v).ok())
            .unwrap_or_default(),
    )
}

/// Upsert a setting row.
pub async fn set_setting(cx: &Cx, pool: &DbPool, key: &str, value: &str) -> Outcome<(), DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "INSERT INTO settings (key, value) VALUES (?, ?) \
               ON CONFLICT(key) DO UPDATE SET value = excluded.value";
    let params = [
        Value::Text(key.to_string()),
        Value::Text(value.to_string()),
    ];
    try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    Outcome::Ok(())
}

// =============================================================================
// Thread outcome queries
// =============================================================================

const OUTCOME_COLUMNS_SQL: &str = "id, thread_id, outcome_type, summary, created_at";

fn decode_outcome_row(row: &SqlRow) -> ThreadOutcomeRow {
    ThreadOutcomeRow {
        id: row_opt_i64(row, 0),
        thread_id: row_i64(row, 1),
        outcome_type: row_string(row, 2),
        summary: row_opt_string(row, 3),
        created_at: row_i64(row, 4),
    }
}

/// Record a terminal outcome for a thread, at most once.
///
/// Returns `true` when a new outcome row was created, `false` when the
/// thread already has one.
pub async fn record_thread_outcome(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    outcome_type: &str,
    summary: Option<&str>,
) -> Outcome<bool, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "INSERT INTO thread_outcomes (thread_id, outcome_type, summary, created_at) \
               SELECT ?, ?, ?, ? \
               WHERE NOT EXISTS (SELECT 1 FROM thread_outcomes WHERE thread_id = ?)";
    let params = [
        Value::BigInt(thread_id),
        Value::Text(outcome_type.to_string()),
        opt_text(summary),
        Value::BigInt(now_micros()),
        Value::BigInt(thread_id),
    ];
    let affected = try_out!(map_sql_outcome(raw_execute(cx, &*conn, sql, &params).await));
    Outcome::Ok(affected > 0)
}

/// Outcomes recorded since a cutoff, newest first.
pub async fn recent_outcomes(
    cx: &Cx,
    pool: &DbPool,
    since: i64,
    limit: i64,
) -> Outcome<Vec<ThreadOutcomeRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {OUTCOME_COLUMNS_SQL} FROM thread_outcomes WHERE created_at >= ? \
         ORDER BY created_at DESC LIMIT ?"
    );
    let rows = try_out!(map_sql_outcome(
        raw_query(cx, &*conn, &sql, &[Value::BigInt(since), Value::BigInt(limit)]).await
    ));
    Outcome::Ok(rows.iter().map(decode_outcome_row).collect())
}

/// Total count of recorded outcomes.
pub async fn count_outcomes(cx: &Cx, pool: &DbPool) -> Outcome<i64, DbError> {
    count_query(cx, pool, "SELECT COUNT(id) FROM thread_outcomes", &[]).await
}

// =============================================================================
// Research queries (status reporting only)
// =============================================================================

const RESEARCH_CAMPAIGN_COLUMNS_SQL: &str = "id, company_name, contact_name, status, phase, \
     goal, identity, error, email_subject, thread_id, created_at, completed_at";

fn decode_research_campaign_row(row: &SqlRow) -> crate::models::ResearchCampaignRow {
    crate::models::ResearchCampaignRow {
        id: row_opt_i64(row, 0),
        company_name: row_string(row, 1),
        contact_name: row_opt_string(row, 2),
        status: row_string(row, 3),
        phase: row_i64(row, 4),
        goal: row_string(row, 5),
        identity: row_string(row, 6),
        error: row_opt_string(row, 7),
        email_subject: row_opt_string(row, 8),
        thread_id: row_opt_i64(row, 9),
        created_at: row_i64(row, 10),
        completed_at: row_opt_i64(row, 11),
    }
}

fn decode_research_batch_row(row: &SqlRow) -> crate::models::ResearchBatchRow {
    crate::models::ResearchBatchRow {
        id: row_opt_i64(row, 0),
        name: row_string(row, 1),
        status: row_string(row, 2),
        total_companies: row_i64(row, 3),
        completed: row_i64(row, 4),
        failed: row_i64(row, 5),
        created_at: row_i64(row, 6),
    }
}

/// Campaigns still in flight, newest first.
pub async fn active_research_campaigns(
    cx: &Cx,
    pool: &DbPool,
    limit: i64,
) -> Outcome<Vec<crate::models::ResearchCampaignRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {RESEARCH_CAMPAIGN_COLUMNS_SQL} FROM research_campaigns \
         WHERE status NOT IN ('sent', 'draft_pending', 'skipped', 'failed') \
         ORDER BY created_at DESC LIMIT ?"
    );
    let rows = try_out!(map_sql_outcome(
        raw_query(cx, &*conn, &sql, &[Value::BigInt(limit)]).await
    ));
    Outcome::Ok(rows.iter().map(decode_research_campaign_row).collect())
}

/// Recently completed campaigns, most recently completed first.
pub async fn completed_research_campaigns(
    cx: &Cx,
    pool: &DbPool,
    limit: i64,
) -> Outcome<Vec<crate::models::ResearchCampaignRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = format!(
        "SELECT {RESEARCH_CAMPAIGN_COLUMNS_SQL} FROM research_campaigns \
         WHERE status IN ('sent', 'draft_pending') \
         ORDER BY completed_at DESC LIMIT ?"
    );
    let rows = try_out!(map_sql_outcome(
        raw_query(cx, &*conn, &sql, &[Value::BigInt(limit)]).await
    ));
    Outcome::Ok(rows.iter().map(decode_research_campaign_row).collect())
}

/// Batches with work remaining, newest first.
pub async fn active_research_batches(
    cx: &Cx,
    pool: &DbPool,
) -> Outcome<Vec<crate::models::ResearchBatchRow>, DbError> {
    let conn = try_out!(acquire_conn(cx, pool).await);
    let sql = "SELECT id, name, status, total_companies, completed, failed, created_at \
               FROM research_batches WHERE status IN ('pending', 'in_progress', 'paused') \
               ORDER BY created_at DESC";
    let rows = try_out!(map_sql_outcome(raw_query(cx, &*conn, sql, &[]).await));
    Outcome::Ok(rows.iter().map(decode_research_batch_row).collect())
}

/// Total campaign count.
pub async fn count_research_campaigns(cx: &Cx, pool: &DbPool) -> Outcome<i64, DbError> {
    count_query(cx, pool, "SELECT COUNT(id) FROM research_campaigns", &[]).await
}
