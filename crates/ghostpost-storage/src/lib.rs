//! Context-file storage layer for GhostPost.
//!
//! Provides:
//! - Atomic text writes (temp file + same-directory rename)
//! - The operational alert log (`ALERTS.md`): append with dedup window,
//!   bounded retention, maintenance compaction
//! - The heartbeat changelog (`CHANGELOG.md`): newest-first append, cap
//! - The context projector: renders database state into the markdown tree
//!   an external agent consumes

#![forbid(unsafe_code)]

pub mod alerts;
pub mod changelog;
pub mod error;
pub mod projector;

pub use alerts::{AlertRecord, append_alert, cleanup_alerts};
pub use changelog::append_changelog;
pub use error::{StorageError, StorageResult};
pub use projector::ContextProjector;

use std::fs;
use std::io::Write as _;
use std::path::Path;

/// Write text content to a file atomically (write-to-temp-then-rename).
///
/// Creates parent directories as needed. The temp file lives in the same
/// directory as the target so the rename is atomic on POSIX filesystems;
/// readers never observe a partial file. On any failure the temp file is
/// removed before the error propagates.
pub fn atomic_write_text(path: &Path, content: &str) -> StorageResult<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
    }

    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let tmp_name = format!(
        ".tmp-{}-{}-{seq}",
        std::process::id(),
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    let tmp_path = parent.join(&tmp_name);

    let write_result = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(content.as_bytes())?;
        f.sync_data()?;
        fs::rename(&tmp_path, path)
    })();

    write_result.map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StorageError::Io(e)
    })
}

/// Current time formatted `YYYY-MM-DD HH:MM UTC` for file headers.
#[must_use]
pub fn now_header_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Current time formatted `YYYY-MM-DDTHH:MM:SSZ`.
#[must_use]
pub fn now_compact_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
