//! Configuration management for GhostPost
//!
//! Configuration is loaded once from environment variables at startup and
//! threaded through component constructors as an immutable value. Tests
//! construct a `Config` by hand and override the paths they care about.

use std::env;
use std::path::PathBuf;

/// Main configuration struct for GhostPost.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (`sqlite:///path/to/ghostpost.db` or `sqlite:///:memory:`).
    pub database_url: String,

    /// Root directory for agent-facing context files.
    pub context_dir: PathBuf,

    /// The mailbox owner's own address. Excluded from "other participant"
    /// contact lookups.
    pub own_email: String,

    /// Hourly outbound send limit per actor.
    pub send_rate_limit: i64,

    /// Default follow-up interval in days for threads without an override.
    pub default_follow_up_days: i64,

    /// Whether LLM-backed reply generation is enabled.
    pub llm_enabled: bool,

    /// Model name passed to the completion client.
    pub llm_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:///ghostpost.db".to_string(),
            context_dir: PathBuf::from("context"),
            own_email: String::new(),
            send_rate_limit: 20,
            default_follow_up_days: 3,
            llm_enabled: true,
            llm_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env_string("GHOSTPOST_DATABASE_URL", &defaults.database_url),
            context_dir: PathBuf::from(env_string(
                "GHOSTPOST_CONTEXT_DIR",
                &defaults.context_dir.display().to_string(),
            )),
            own_email: env_string("GHOSTPOST_OWN_EMAIL", ""),
            send_rate_limit: env_i64("GHOSTPOST_SEND_RATE_LIMIT", defaults.send_rate_limit),
            default_follow_up_days: env_i64(
                "GHOSTPOST_FOLLOW_UP_DAYS",
                defaults.default_follow_up_days,
            ),
            llm_enabled: env_bool("GHOSTPOST_LLM_ENABLED", defaults.llm_enabled),
            llm_model: env_string("GHOSTPOST_LLM_MODEL", &defaults.llm_model),
        }
    }

    /// Directory holding per-thread context files.
    #[must_use]
    pub fn threads_dir(&self) -> PathBuf {
        self.context_dir.join("threads")
    }

    /// Directory holding archived per-thread context files.
    #[must_use]
    pub fn threads_archive_dir(&self) -> PathBuf {
        self.context_dir.join("threads").join("archive")
    }

    /// Path of the append-based operational alert log.
    #[must_use]
    pub fn alerts_file(&self) -> PathBuf {
        self.context_dir.join("ALERTS.md")
    }

    /// Path of the heartbeat changelog.
    #[must_use]
    pub fn changelog_file(&self) -> PathBuf {
        self.context_dir.join("CHANGELOG.md")
    }
}

/// Parse a boolean setting value: case-insensitive `true|1|yes` are true,
/// `false|0|no` are false, anything else falls back to `default`.
#[must_use]
pub fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => default,
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_string(key: &str, default: &str) -> String {
    env_value(key).unwrap_or_else(|| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_bool(&v, default))
}

fn env_i64(key: &str, default: i64) -> i64 {
    env_value(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.send_rate_limit, 20);
        assert_eq!(cfg.default_follow_up_days, 3);
        assert!(cfg.llm_enabled);
        assert_eq!(cfg.context_dir, PathBuf::from("context"));
    }

    #[test]
    fn parse_bool_accepts_known_forms() {
        for v in ["true", "TRUE", "1", "yes", "Yes"] {
            assert!(parse_bool(v, false), "{v} should parse true");
        }
        for v in ["false", "0", "no", "No"] {
            assert!(!parse_bool(v, true), "{v} should parse false");
        }
    }

    #[test]
    fn parse_bool_falls_back_on_garbage() {
        assert!(parse_bool("maybe", true));
        assert!(!parse_bool("maybe", false));
    }

    #[test]
    fn derived_paths_hang_off_context_dir() {
        let cfg = Config {
            context_dir: PathBuf::from("/tmp/ctx"),
            ..Config::default()
        };
        assert_eq!(cfg.threads_dir(), PathBuf::from("/tmp/ctx/threads"));
        assert_eq!(
            cfg.threads_archive_dir(),
            PathBuf::from("/tmp/ctx/threads/archive")
        );
        assert_eq!(cfg.alerts_file(), PathBuf::from("/tmp/ctx/ALERTS.md"));
        assert_eq!(cfg.changelog_file(), PathBuf::from("/tmp/ctx/CHANGELOG.md"));
    }
}
