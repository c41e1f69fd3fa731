//! The heartbeat changelog (`CHANGELOG.md`).
//!
//! Newest-first event lines under a fixed frontmatter header. No dedup;
//! entries beyond 100 are trimmed. Writes are atomic so the agent's
//! heartbeat reads never see a partial file.

use std::fs;
use std::path::Path;

use crate::atomic_write_text;
use crate::error::StorageResult;

/// Retained entries after any append.
pub const MAX_CHANGELOG_ENTRIES: usize = 100;

const HEADER: &str = "---\nschema_version: 1\ntype: changelog\n---\n# Changelog\n\n";

/// Append one event line, newest first, capping total entries at 100.
pub fn append_changelog(
    path: &Path,
    event_type: &str,
    summary: &str,
    severity: &str,
) -> StorageResult<()> {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M");
    let new_line = format!("- [{now}] {event_type}: {summary} [{severity}]");

    // Collect only event lines; header lines are reconstructed fresh.
    let mut existing_lines: Vec<String> = Vec::new();
    if path.exists() {
        for line in fs::read_to_string(path)?.lines() {
            if line.starts_with("- [") {
                existing_lines.push(line.to_string());
            }
        }
    }

    let mut all_lines = vec![new_line];
    all_lines.extend(existing_lines);
    all_lines.truncate(MAX_CHANGELOG_ENTRIES);

    let content = format!("{HEADER}{}\n", all_lines.join("\n"));
    atomic_write_text(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| l.starts_with("- ["))
            .map(String::from)
            .collect()
    }

    #[test]
    fn append_creates_file_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");

        append_changelog(&path, "new_email", "Thread #3 \"Hello\" from a@x.com", "HIGH").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("---\nschema_version: 1\ntype: changelog\n---\n"));
        assert!(content.contains("new_email: Thread #3"));
        assert!(content.contains("[HIGH]"));
    }

    #[test]
    fn newest_entry_first_no_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");

        append_changelog(&path, "goal_met", "Thread #1 goal achieved", "INFO").unwrap();
        append_changelog(&path, "goal_met", "Thread #1 goal achieved", "INFO").unwrap();
        append_changelog(&path, "stale_thread", "Thread #2 no reply for 3d", "MEDIUM").unwrap();

        let lines = entry_lines(&path);
        assert_eq!(lines.len(), 3, "no dedup in the changelog");
        assert!(lines[0].contains("stale_thread"));
    }

    #[test]
    fn cap_at_one_hundred_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");

        for i in 0..120 {
            append_changelog(&path, "tick", &format!("event {i}"), "INFO").unwrap();
        }
        let lines = entry_lines(&path);
        assert_eq!(lines.len(), MAX_CHANGELOG_ENTRIES);
        // Newest kept, oldest trimmed.
        assert!(lines[0].contains("event 119"));
        assert!(lines.iter().all(|l| !l.contains("event 19\n")));
        assert!(!fs::read_to_string(&path).unwrap().contains("event 10 "));
    }

    #[test]
    fn no_temp_files_remain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        append_changelog(&path, "tick", "x", "INFO").unwrap();

        for entry in fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(!name.to_string_lossy().starts_with(".tmp-"));
        }
    }
}
