//! The operational alert log (`ALERTS.md`).
//!
//! A single markdown document, newest entry first. Appends deduplicate
//! against the 20 most recent entries keyed on `thread_id|message`; the
//! file retains at most 50 entries. All writes are atomic.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::{atomic_write_text, now_header_timestamp};

/// Retained entries after any append or cleanup.
pub const MAX_ALERT_ENTRIES: usize = 50;

/// Number of newest entries consulted for deduplication on append.
pub const DEDUP_WINDOW: usize = 20;

/// One alert as dispatched by the notification layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    pub event_type: String,
    pub severity: String,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AlertRecord {
    /// Build a record stamped with the current time.
    #[must_use]
    pub fn new(
        event_type: &str,
        severity: &str,
        title: &str,
        message: &str,
        thread_id: Option<i64>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            event_type: event_type.to_string(),
            severity: severity.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            thread_id,
            metadata: None,
        }
    }
}

/// Severity badge for formatting; unknown severities are uppercased.
fn severity_label(severity: &str) -> String {
    match severity {
        "critical" => "CRITICAL".to_string(),
        "high" => "HIGH".to_string(),
        "medium" => "MEDIUM".to_string(),
        "info" => "INFO".to_string(),
        other => other.to_uppercase(),
    }
}

/// Split file content into individual entry strings ("- **[..." blocks).
fn parse_alert_entries(content: &str) -> Vec<String> {
    content
        .split("\n- ")
        .skip(1)
        .map(|part| format!("- {part}"))
        .collect()
}

/// Dedup key for an incoming alert.
fn make_dedup_key(thread_id: Option<i64>, message: &str) -> String {
    let tid = thread_id.map_or_else(|| "-".to_string(), |t| t.to_string());
    format!("{tid}|{}", message.trim())
}

/// Extract the dedup key from a raw entry: the thread-id token on the
/// header line plus the message body on the second line.
fn entry_dedup_key(entry: &str) -> String {
    let mut lines = entry.trim().lines();
    let header_line = lines.next().unwrap_or("");
    let message_line = lines.next().map(str::trim).unwrap_or("");

    let thread_id = header_line
        .split_once("(thread #")
        .map(|(_, rest)| rest.trim_end_matches(')').to_string());

    let tid = thread_id.unwrap_or_else(|| "-".to_string());
    format!("{tid}|{message_line}")
}

fn render_entry(alert: &AlertRecord) -> String {
    // "YYYY-MM-DD HH:MM" without timezone noise.
    let timestamp = alert
        .timestamp
        .get(..16)
        .unwrap_or(&alert.timestamp)
        .replace('T', " ");
    let label = severity_label(&alert.severity);

    let mut entry = format!("- **[{timestamp}]** [{label}] {}", alert.title);
    if let Some(tid) = alert.thread_id {
        entry.push_str(&format!(" (thread #{tid})"));
    }
    entry.push_str(&format!("\n  {}\n", alert.message));
    entry
}

fn render_file(header_note: &str, entries: &[String]) -> String {
    let mut parts = vec![
        "# Active Alerts\n".to_string(),
        "<!-- schema_version: 1 -->\n".to_string(),
        header_note.to_string(),
        format!("_Last updated: {}_\n\n", now_header_timestamp()),
    ];
    for entry in entries {
        let normalized = if entry.starts_with("- ") {
            entry.clone()
        } else {
            format!("- {entry}")
        };
        parts.push(if normalized.ends_with('\n') {
            normalized
        } else {
            format!("{normalized}\n")
        });
    }
    parts.concat()
}

/// Append one alert entry, keeping the newest 50.
///
/// Returns `false` when the alert was suppressed by the dedup window (an
/// identical `thread_id|message` pair within the 20 most recent entries).
pub fn append_alert(path: &Path, alert: &AlertRecord) -> StorageResult<bool> {
    let is_new_file = !path.is_file() || fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let existing_entries = if is_new_file {
        Vec::new()
    } else {
        parse_alert_entries(&fs::read_to_string(path)?)
    };

    // Entries are newest-first, so the head of the list is the window.
    let incoming_key = make_dedup_key(alert.thread_id, &alert.message);
    for recent in existing_entries.iter().take(DEDUP_WINDOW) {
        if entry_dedup_key(recent) == incoming_key {
            tracing::debug!(
                thread_id = ?alert.thread_id,
                "duplicate alert suppressed"
            );
            return Ok(false);
        }
    }

    let mut entries = vec![render_entry(alert)];
    entries.extend(
        existing_entries
            .into_iter()
            .take(MAX_ALERT_ENTRIES - 1),
    );

    // On first creation, include a relationship note so the agent knows
    // where security-specific alerts live.
    let header_note = if is_new_file {
        "_Operational alerts. For security-specific alerts see SECURITY_ALERTS.md._\n\n"
    } else {
        ""
    };
    atomic_write_text(path, &render_file(header_note, &entries))?;
    Ok(true)
}

/// Remove duplicate entries and trim to the newest 50. Returns the number
/// of entries removed.
pub fn cleanup_alerts(path: &Path) -> StorageResult<usize> {
    if !path.is_file() {
        return Ok(0);
    }

    let content = fs::read_to_string(path)?;
    let entries = parse_alert_entries(&content);
    let original_count = entries.len();

    let mut seen = std::collections::HashSet::new();
    let deduplicated: Vec<String> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry_dedup_key(entry)))
        .collect();

    let trimmed: Vec<String> = deduplicated.into_iter().take(MAX_ALERT_ENTRIES).collect();
    let removed = original_count - trimmed.len();

    atomic_write_text(path, &render_file("", &trimmed))?;

    if removed > 0 {
        tracing::info!(removed, remain = trimmed.len(), "alert log compacted");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(thread_id: Option<i64>, message: &str) -> AlertRecord {
        AlertRecord::new("stale_thread", "medium", "Stale thread", message, thread_id)
    }

    fn entry_count(path: &Path) -> usize {
        parse_alert_entries(&fs::read_to_string(path).unwrap()).len()
    }

    #[test]
    fn first_append_creates_file_with_note() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");

        assert!(append_alert(&path, &alert(Some(7), "No reply for 3 days.")).unwrap());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Active Alerts"));
        assert!(content.contains("<!-- schema_version: 1 -->"));
        assert!(content.contains("SECURITY_ALERTS.md"));
        assert!(content.contains("(thread #7)"));
        assert!(content.contains("No reply for 3 days."));
        assert_eq!(entry_count(&path), 1);
    }

    #[test]
    fn consecutive_identical_alerts_dedup_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");

        assert!(append_alert(&path, &alert(Some(7), "No reply for 3 days.")).unwrap());
        assert!(!append_alert(&path, &alert(Some(7), "No reply for 3 days.")).unwrap());
        assert!(!append_alert(&path, &alert(Some(7), "No reply for 3 days.")).unwrap());
        assert_eq!(entry_count(&path), 1);
    }

    #[test]
    fn dedup_scope_is_twenty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");

        append_alert(&path, &alert(Some(7), "No reply for 3 days.")).unwrap();
        for i in 0..21 {
            append_alert(&path, &alert(Some(100 + i), &format!("filler {i}"))).unwrap();
        }
        // The original is now past the 20-entry window, so it appends again.
        assert!(append_alert(&path, &alert(Some(7), "No reply for 3 days.")).unwrap());

        let content = fs::read_to_string(&path).unwrap();
        let occurrences = content.matches("No reply for 3 days.").count();
        assert_eq!(occurrences, 2);
    }

    #[test]
    fn distinct_thread_ids_are_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");

        assert!(append_alert(&path, &alert(Some(1), "same message")).unwrap());
        assert!(append_alert(&path, &alert(Some(2), "same message")).unwrap());
        assert!(append_alert(&path, &alert(None, "same message")).unwrap());
        assert_eq!(entry_count(&path), 3);
    }

    #[test]
    fn title_does_not_participate_in_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");

        let mut first = alert(Some(9), "identical body");
        first.title = "Title A".to_string();
        let mut second = alert(Some(9), "identical body");
        second.title = "Title B".to_string();

        assert!(append_alert(&path, &first).unwrap());
        assert!(!append_alert(&path, &second).unwrap());
    }

    #[test]
    fn cap_at_fifty_entries_trims_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");

        for i in 0..60 {
            append_alert(&path, &alert(Some(i), &format!("message {i}"))).unwrap();
        }
        assert_eq!(entry_count(&path), MAX_ALERT_ENTRIES);

        let content = fs::read_to_string(&path).unwrap();
        // Newest survive, oldest are gone.
        assert!(content.contains("message 59"));
        assert!(!content.contains("message 0\n"));
    }

    #[test]
    fn newest_entry_is_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");

        append_alert(&path, &alert(Some(1), "older")).unwrap();
        append_alert(&path, &alert(Some(2), "newer")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let newer_pos = content.find("newer").unwrap();
        let older_pos = content.find("older").unwrap();
        assert!(newer_pos < older_pos);
    }

    #[test]
    fn cleanup_removes_duplicates_and_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");

        // Seed with duplicates beyond the dedup window: write 21 fillers
        // between identical alerts so both land in the file.
        append_alert(&path, &alert(Some(7), "dup")).unwrap();
        for i in 0..21 {
            append_alert(&path, &alert(Some(200 + i), &format!("filler {i}"))).unwrap();
        }
        append_alert(&path, &alert(Some(7), "dup")).unwrap();
        assert_eq!(entry_count(&path), 23);

        let removed = cleanup_alerts(&path).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(entry_count(&path), 22);
    }

    #[test]
    fn cleanup_on_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_alerts(&dir.path().join("ALERTS.md")).unwrap(), 0);
    }

    #[test]
    fn unknown_severity_is_uppercased() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ALERTS.md");
        let mut record = alert(None, "odd severity");
        record.severity = "weird".to_string();
        append_alert(&path, &record).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[WEIRD]"));
    }
}
