//! Full-refresh projector tests against a real database and context tree.

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use ghostpost_core::{Config, ThreadState};
use ghostpost_db::pool::{DbPool, DbPoolConfig};
use ghostpost_db::{EmailRow, now_micros, queries};
use ghostpost_storage::ContextProjector;

struct Fixture {
    _dir: tempfile::TempDir,
    config: Config,
    pool: DbPool,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("projector_test.db");
    let pool = DbPool::new(&DbPoolConfig {
        database_url: format!("sqlite:///{}", db_path.display()),
        ..Default::default()
    })
    .expect("create pool");
    let config = Config {
        context_dir: dir.path().join("context"),
        ..Config::default()
    };
    Fixture {
        _dir: dir,
        config,
        pool,
    }
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
fn clean_inbound_projection() {
    let fx = fixture();
    let cx = Cx::for_testing();

    run(async {
        let thread = ok(queries::create_thread(&cx, &fx.pool, "Meeting tomorrow").await);
        let tid = thread.id.unwrap();
        ok(queries::insert_email(
            &cx,
            &fx.pool,
            EmailRow {
                thread_id: tid,
                subject: "Meeting tomorrow".to_string(),
                from_address: "colleague@example.com".to_string(),
                body_plain: Some("Hi, 3pm works.".to_string()),
                received_at: Some(now_micros()),
                ..EmailRow::default()
            },
        )
        .await);

        let projector = ContextProjector::new(fx.config.clone(), fx.pool.clone());
        let paths = ok(projector.write_all_context_files(&cx).await);
        assert_eq!(paths.len(), 10);

        let thread_md =
            std::fs::read_to_string(fx.config.threads_dir().join(format!("{tid}.md"))).unwrap();
        assert!(!thread_md.contains("## Analysis"));
        assert!(thread_md.contains("=== UNTRUSTED EMAIL CONTENT START ==="));
        assert!(thread_md.contains("Hi, 3pm works."));

        let brief =
            std::fs::read_to_string(fx.config.context_dir.join("SYSTEM_BRIEF.md")).unwrap();
        assert!(brief.contains("No items need immediate attention"));

        let email_context =
            std::fs::read_to_string(fx.config.context_dir.join("EMAIL_CONTEXT.md")).unwrap();
        assert!(email_context.contains(&format!("`context/threads/{tid}.md`")));
        assert!(email_context.contains("colleague@example.com"));

        // Every projected file exists.
        for name in [
            "SYSTEM_BRIEF.md",
            "EMAIL_CONTEXT.md",
            "CONTACTS.md",
            "RULES.md",
            "ACTIVE_GOALS.md",
            "DRAFTS.md",
            "SECURITY_ALERTS.md",
            "RESEARCH.md",
            "COMPLETED_OUTCOMES.md",
        ] {
            assert!(fx.config.context_dir.join(name).exists(), "missing {name}");
        }
    });
}

#[test]
fn no_temp_files_after_refresh() {
    let fx = fixture();
    let cx = Cx::for_testing();

    run(async {
        let thread = ok(queries::create_thread(&cx, &fx.pool, "T").await);
        ok(queries::insert_email(
            &cx,
            &fx.pool,
            EmailRow {
                thread_id: thread.id.unwrap(),
                ..EmailRow::default()
            },
        )
        .await);

        let projector = ContextProjector::new(fx.config.clone(), fx.pool.clone());
        ok(projector.write_all_context_files(&cx).await);

        fn assert_no_temps(dir: &std::path::Path) {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        assert_no_temps(&path);
                    } else {
                        assert!(
                            !entry.file_name().to_string_lossy().starts_with(".tmp-"),
                            "temp file left behind: {path:?}"
                        );
                    }
                }
            }
        }
        assert_no_temps(&fx.config.context_dir);
    });
}

#[test]
fn orphan_sweep_tracks_database_state() {
    let fx = fixture();
    let cx = Cx::for_testing();

    run(async {
        let thread = ok(queries::create_thread(&cx, &fx.pool, "Real").await);
        let tid = thread.id.unwrap();
        ok(queries::insert_email(
            &cx,
            &fx.pool,
            EmailRow {
                thread_id: tid,
                ..EmailRow::default()
            },
        )
        .await);

        // Seed stale files the sweep must remove, plus files it must keep.
        let threads_dir = fx.config.threads_dir();
        std::fs::create_dir_all(&threads_dir).unwrap();
        std::fs::write(threads_dir.join("999.md"), "stale").unwrap();
        std::fs::write(threads_dir.join("README.md"), "keep").unwrap();
        std::fs::write(threads_dir.join("notes.txt"), "keep").unwrap();
        let archive_dir = fx.config.threads_archive_dir();
        std::fs::create_dir_all(&archive_dir).unwrap();
        std::fs::write(archive_dir.join("888.md"), "stale").unwrap();

        let projector = ContextProjector::new(fx.config.clone(), fx.pool.clone());
        ok(projector.write_thread_files(&cx).await);

        assert!(threads_dir.join(format!("{tid}.md")).exists());
        assert!(!threads_dir.join("999.md").exists());
        assert!(!archive_dir.join("888.md").exists());
        assert!(threads_dir.join("README.md").exists());
        assert!(threads_dir.join("notes.txt").exists());
    });
}

#[test]
fn archived_threads_move_to_archive_dir() {
    let fx = fixture();
    let cx = Cx::for_testing();

    run(async {
        let thread = ok(queries::create_thread(&cx, &fx.pool, "Old stuff").await);
        let tid = thread.id.unwrap();
        ok(queries::insert_email(
            &cx,
            &fx.pool,
            EmailRow {
                thread_id: tid,
                ..EmailRow::default()
            },
        )
        .await);

        let projector = ContextProjector::new(fx.config.clone(), fx.pool.clone());
        ok(projector.write_thread_files(&cx).await);
        assert!(fx.config.threads_dir().join(format!("{tid}.md")).exists());

        ok(queries::update_thread_state(&cx, &fx.pool, tid, ThreadState::Archived).await);
        ok(projector.write_thread_files(&cx).await);

        // The live-file copy is swept, the archive copy exists.
        assert!(!fx.config.threads_dir().join(format!("{tid}.md")).exists());
        assert!(
            fx.config
                .threads_archive_dir()
                .join(format!("{tid}.md"))
                .exists()
        );
    });
}

#[test]
fn attention_table_lists_elevated_priority_threads() {
    let fx = fixture();
    let cx = Cx::for_testing();

    run(async {
        let thread = ok(queries::create_thread(&cx, &fx.pool, "Escalation").await);
        let tid = thread.id.unwrap();
        ok(queries::insert_email(
            &cx,
            &fx.pool,
            EmailRow {
                thread_id: tid,
                from_address: "vip@example.com".to_string(),
                received_at: Some(now_micros()),
                ..EmailRow::default()
            },
        )
        .await);
        ok(queries::set_thread_priority(&cx, &fx.pool, tid, Some("critical")).await);

        let projector = ContextProjector::new(fx.config.clone(), fx.pool.clone());
        ok(projector.write_system_brief(&cx).await);

        let brief =
            std::fs::read_to_string(fx.config.context_dir.join("SYSTEM_BRIEF.md")).unwrap();
        assert!(brief.contains(&format!("| #{tid} |")));
        assert!(brief.contains("CRITICAL priority"));
        assert!(brief.contains("vip@example.com"));
        assert!(!brief.contains("No items need immediate attention"));
    });
}
