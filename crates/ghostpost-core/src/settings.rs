//! Settings keys consumed by the core, with their built-in defaults.
//!
//! The settings table is a key → string-value map. When a row is absent the
//! defaults below apply; list-valued settings hold JSON-encoded arrays.

/// Built-in defaults for every setting key the core consumes.
pub const SETTING_DEFAULTS: &[(&str, &str)] = &[
    ("reply_style", "professional"),
    ("blocklist", "[]"),
    ("never_auto_reply", "[]"),
    ("notification_new_email", "true"),
    ("notification_goal_met", "true"),
    ("notification_security_alert", "true"),
    ("notification_draft_ready", "true"),
    ("notification_stale_thread", "true"),
    ("default_follow_up_days", "3"),
];

/// Look up the built-in default for a setting key.
#[must_use]
pub fn default_setting(key: &str) -> Option<&'static str> {
    SETTING_DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_defaults_resolve() {
        assert_eq!(default_setting("reply_style"), Some("professional"));
        assert_eq!(default_setting("blocklist"), Some("[]"));
        assert_eq!(default_setting("notification_goal_met"), Some("true"));
        assert_eq!(default_setting("default_follow_up_days"), Some("3"));
    }

    #[test]
    fn unknown_key_is_none() {
        assert_eq!(default_setting("reply_style_custom"), None);
        assert_eq!(default_setting("nope"), None);
    }
}
