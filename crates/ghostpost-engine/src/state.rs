//! The thread state machine and follow-up scheduler.
//!
//! Transitions are validated here; the db crate only persists them.
//! Entering a terminal state clears the follow-up schedule and records the
//! thread's outcome exactly once.

use asupersync::{Cx, Outcome};
use ghostpost_core::{Config, GoalStatus, ThreadState};
use ghostpost_db::{DbPool, ThreadRow, now_micros, queries};

use crate::error::EngineError;

const MICROS_PER_DAY: i64 = 24 * 3_600 * 1_000_000;

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

macro_rules! try_eng {
    ($out:expr) => {
        match $out {
            Outcome::Ok(v) => v,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    };
}

/// Whether `from -> to` is a legal lifecycle transition.
#[must_use]
pub fn can_transition(from: ThreadState, to: ThreadState) -> bool {
    use ThreadState::{Active, Archived, FollowUp, GoalMet, New, WaitingReply};

    if from == to {
        return false;
    }
    match (from, to) {
        // Anything can be archived; archived threads restore to active.
        (_, Archived) => true,
        (Archived, Active) => true,
        (New, Active) => true,
        (Active, WaitingReply) => true,
        (WaitingReply, Active | FollowUp) => true,
        (FollowUp, WaitingReply) => true,
        (Active | WaitingReply | FollowUp, GoalMet) => true,
        _ => false,
    }
}

fn outcome_type_for(state: ThreadState) -> &'static str {
    match state {
        ThreadState::GoalMet => "goal_met",
        _ => "archived",
    }
}

/// Apply a validated state transition and return the updated thread.
///
/// On the first entry into a terminal state a `ThreadOutcome` row is
/// recorded; re-archiving a restored thread does not create a second one.
pub async fn apply_transition(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
    to: ThreadState,
) -> Outcome<ThreadRow, EngineError> {
    let thread = try_db!(queries::get_thread(cx, pool, thread_id).await);
    let from = thread.state_enum();

    if !can_transition(from, to) {
        return Outcome::Err(EngineError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }

    try_db!(queries::update_thread_state(cx, pool, thread_id, to).await);

    if to.is_terminal() {
        let created = try_db!(
            queries::record_thread_outcome(
                cx,
                pool,
                thread_id,
                outcome_type_for(to),
                thread.summary.as_deref(),
            )
            .await
        );
        if created {
            tracing::info!(thread_id, outcome = outcome_type_for(to), "recorded thread outcome");
        }
    }

    tracing::debug!(thread_id, from = %from, to = %to, "thread transition");
    Outcome::Ok(try_db!(queries::get_thread(cx, pool, thread_id).await))
}

/// Record a successful outbound send on a thread: move it to
/// `WAITING_REPLY` and schedule the next follow-up at
/// `now + follow_up_days`.
///
/// Terminal threads reject the send; a `NEW` thread is promoted through
/// `ACTIVE` first (a send is at least as strong a touch as a triage view).
pub async fn record_outbound_send(
    cx: &Cx,
    pool: &DbPool,
    config: &Config,
    thread_id: i64,
) -> Outcome<ThreadRow, EngineError> {
    let thread = try_db!(queries::get_thread(cx, pool, thread_id).await);
    let state = thread.state_enum();

    if state.is_terminal() {
        return Outcome::Err(EngineError::InvalidTransition {
            from: state.as_str().to_string(),
            to: ThreadState::WaitingReply.as_str().to_string(),
        });
    }

    if state == ThreadState::New {
        try_eng!(apply_transition(cx, pool, thread_id, ThreadState::Active).await);
    }
    if state != ThreadState::WaitingReply {
        try_eng!(apply_transition(cx, pool, thread_id, ThreadState::WaitingReply).await);
    }

    let days = if thread.follow_up_days > 0 {
        thread.follow_up_days
    } else {
        config.default_follow_up_days
    };
    let next = now_micros() + days * MICROS_PER_DAY;
    try_db!(queries::schedule_follow_up(cx, pool, thread_id, Some(next), None).await);

    Outcome::Ok(try_db!(queries::get_thread(cx, pool, thread_id).await))
}

/// Scheduler pass: flip `WAITING_REPLY` threads whose follow-up deadline
/// has passed into `FOLLOW_UP`. Returns the flipped thread ids.
pub async fn mark_follow_ups_due(
    cx: &Cx,
    pool: &DbPool,
    now: i64,
) -> Outcome<Vec<i64>, EngineError> {
    let due = try_db!(queries::follow_ups_due(cx, pool, now).await);

    let mut flipped = Vec::with_capacity(due.len());
    for thread in due {
        let Some(id) = thread.id else { continue };
        try_eng!(apply_transition(cx, pool, id, ThreadState::FollowUp).await);
        flipped.push(id);
    }

    if !flipped.is_empty() {
        tracing::info!(count = flipped.len(), "threads moved to FOLLOW_UP");
    }
    Outcome::Ok(flipped)
}

/// Mark a thread's goal as met and close it out.
pub async fn mark_goal_met(
    cx: &Cx,
    pool: &DbPool,
    thread_id: i64,
) -> Outcome<ThreadRow, EngineError> {
    try_db!(queries::set_goal_status(cx, pool, thread_id, GoalStatus::Met).await);
    apply_transition(cx, pool, thread_id, ThreadState::GoalMet).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use ghostpost_db::pool::DbPoolConfig;

    #[test]
    fn transition_table_matches_lifecycle() {
        use ThreadState::{Active, Archived, FollowUp, GoalMet, New, WaitingReply};

        // Legal
        assert!(can_transition(New, Active));
        assert!(can_transition(Active, WaitingReply));
        assert!(can_transition(WaitingReply, Active));
        assert!(can_transition(WaitingReply, FollowUp));
        assert!(can_transition(FollowUp, WaitingReply));
        assert!(can_transition(Active, GoalMet));
        assert!(can_transition(WaitingReply, GoalMet));
        assert!(can_transition(FollowUp, GoalMet));
        assert!(can_transition(New, Archived));
        assert!(can_transition(GoalMet, Archived));
        assert!(can_transition(Archived, Active));

        // Illegal
        assert!(!can_transition(New, WaitingReply));
        assert!(!can_transition(New, GoalMet));
        assert!(!can_transition(GoalMet, Active));
        assert!(!can_transition(Archived, WaitingReply));
        assert!(!can_transition(Active, Active));
        assert!(!can_transition(GoalMet, WaitingReply));
    }

    fn test_pool(dir: &tempfile::TempDir) -> DbPool {
        let db_path = dir.path().join("state_test.db");
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

    #[test]
    fn invalid_transition_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "T").await);
            let id = thread.id.unwrap();
            match apply_transition(&cx, &pool, id, ThreadState::GoalMet).await {
                Outcome::Err(EngineError::InvalidTransition { from, to }) => {
                    assert_eq!(from, "NEW");
                    assert_eq!(to, "GOAL_MET");
                }
                other => panic!("expected InvalidTransition, got {other:?}"),
            }
        });
    }

    #[test]
    fn outbound_send_schedules_follow_up() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();
        let config = Config::default();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "T").await);
            let id = thread.id.unwrap();

            let updated = ok(record_outbound_send(&cx, &pool, &config, id).await);
            assert_eq!(updated.state, "WAITING_REPLY");
            let next = updated.next_follow_up_at.expect("follow-up scheduled");
            let expected = now_micros() + 3 * MICROS_PER_DAY;
            assert!((next - expected).abs() < 60 * 1_000_000, "≈3 days out");
        });
    }

    #[test]
    fn send_on_terminal_thread_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();
        let config = Config::default();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "T").await);
            let id = thread.id.unwrap();
            ok(apply_transition(&cx, &pool, id, ThreadState::Archived).await);

            assert!(matches!(
                record_outbound_send(&cx, &pool, &config, id).await,
                Outcome::Err(EngineError::InvalidTransition { .. })
            ));
        });
    }

    #[test]
    fn follow_up_scheduler_flips_due_threads() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();
        let config = Config::default();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "T").await);
            let id = thread.id.unwrap();
            ok(record_outbound_send(&cx, &pool, &config, id).await);

            // Not yet due.
            assert!(ok(mark_follow_ups_due(&cx, &pool, now_micros()).await).is_empty());

            // Force the deadline into the past.
            ok(queries::schedule_follow_up(&cx, &pool, id, Some(now_micros() - 1), None).await);
            let flipped = ok(mark_follow_ups_due(&cx, &pool, now_micros()).await);
            assert_eq!(flipped, vec![id]);
            assert_eq!(ok(queries::get_thread(&cx, &pool, id).await).state, "FOLLOW_UP");
        });
    }

    #[test]
    fn terminal_entry_records_outcome_once() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "T").await);
            let id = thread.id.unwrap();

            ok(apply_transition(&cx, &pool, id, ThreadState::Archived).await);
            assert_eq!(ok(queries::count_outcomes(&cx, &pool).await), 1);

            // Restore and re-archive: still one outcome.
            ok(apply_transition(&cx, &pool, id, ThreadState::Active).await);
            ok(apply_transition(&cx, &pool, id, ThreadState::Archived).await);
            assert_eq!(ok(queries::count_outcomes(&cx, &pool).await), 1);
        });
    }

    #[test]
    fn goal_met_closes_thread_and_clears_follow_up() {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir);
        let cx = Cx::for_testing();
        let config = Config::default();

        run(async {
            let thread = ok(queries::create_thread(&cx, &pool, "Deal").await);
            let id = thread.id.unwrap();
            ok(queries::set_thread_goal(
                &cx,
                &pool,
                id,
                Some("Close the deal"),
                None,
                Some(GoalStatus::InProgress),
            )
            .await);
            ok(record_outbound_send(&cx, &pool, &config, id).await);

            let updated = ok(mark_goal_met(&cx, &pool, id).await);
            assert_eq!(updated.state, "GOAL_MET");
            assert_eq!(updated.goal_status.as_deref(), Some("met"));
            assert!(updated.next_follow_up_at.is_none());
        });
    }
}
