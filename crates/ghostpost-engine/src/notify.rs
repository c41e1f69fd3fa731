//! The notification dispatcher.
//!
//! Every event type maps to a settings key that can silence it; enabled
//! notifications append to the alert log and publish to the `notification`
//! pub/sub channel (best-effort). Convenience wrappers enforce per-caller
//! constraints and drop a heartbeat line into the changelog.

use std::sync::Mutex;

use asupersync::{Cx, Outcome};
use serde_json::Value;

use ghostpost_core::{Config, Severity};
use ghostpost_db::{DbPool, queries};
use ghostpost_storage::{AlertRecord, append_alert, append_changelog};

use crate::error::EngineError;

/// Pub/sub topic alerts are published on.
pub const NOTIFICATION_CHANNEL: &str = "notification";

/// Event type → the settings key that gates it.
const EVENT_SETTING_MAP: &[(&str, &str)] = &[
    ("new_high_urgency_email", "notification_new_email"),
    ("goal_met", "notification_goal_met"),
    ("security_alert", "notification_security_alert"),
    ("injection_detected", "notification_security_alert"),
    ("anomaly_detected", "notification_security_alert"),
    ("email_quarantined", "notification_security_alert"),
    ("draft_ready", "notification_draft_ready"),
    ("stale_thread", "notification_stale_thread"),
    ("commitment_detected", "notification_security_alert"),
    ("thread_composed", "notification_new_email"),
];

fn setting_key_for(event_type: &str) -> Option<&'static str> {
    EVENT_SETTING_MAP
        .iter()
        .find(|(event, _)| *event == event_type)
        .map(|(_, key)| *key)
}

/// External pub/sub channel for pushing alerts to live consumers.
pub trait NotificationBus: Send + Sync {
    fn publish(
        &self,
        cx: &Cx,
        channel: &str,
        alert: &AlertRecord,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// In-memory bus; tests inspect what was published.
#[derive(Debug, Default)]
pub struct MemoryBus {
    published: Mutex<Vec<(String, AlertRecord)>>,
}

impl MemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<(String, AlertRecord)> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl NotificationBus for MemoryBus {
    async fn publish(
        &self,
        _cx: &Cx,
        channel: &str,
        alert: &AlertRecord,
    ) -> Result<(), EngineError> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((channel.to_string(), alert.clone()));
        Ok(())
    }
}

/// Dispatches notifications according to the user's settings.
pub struct Notifier<'a, B: NotificationBus> {
    config: &'a Config,
    pool: &'a DbPool,
    bus: &'a B,
}

impl<'a, B: NotificationBus> Notifier<'a, B> {
    #[must_use]
    pub fn new(config: &'a Config, pool: &'a DbPool, bus: &'a B) -> Self {
        Self { config, pool, bus }
    }

    /// Whether the setting for this event type is enabled. Unknown event
    /// types are never dispatched.
    pub async fn should_notify(&self, cx: &Cx, event_type: &str) -> Outcome<bool, EngineError> {
        let Some(key) = setting_key_for(event_type) else {
            tracing::warn!(event_type, "unknown event type for notification check");
            return Outcome::Ok(false);
        };
        match queries::get_bool_setting(cx, self.pool, key, true).await {
            Outcome::Ok(enabled) => Outcome::Ok(enabled),
            Outcome::Err(e) => Outcome::Err(EngineError::Db(e)),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Dispatch a notification if the matching setting is enabled.
    ///
    /// Appends to the alert log and publishes on the bus (best-effort).
    /// Returns true if dispatched, false if filtered out.
    pub async fn dispatch_notification(
        &self,
        cx: &Cx,
        event_type: &str,
        title: &str,
        message: &str,
        thread_id: Option<i64>,
        severity: Severity,
        metadata: Option<Value>,
    ) -> Outcome<bool, EngineError> {
        let enabled = match self.should_notify(cx, event_type).await {
            Outcome::Ok(enabled) => enabled,
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        if !enabled {
            tracing::debug!(event_type, "notification filtered out (setting disabled)");
            return Outcome::Ok(false);
        }

        let mut alert = AlertRecord::new(event_type, severity.as_str(), title, message, thread_id);
        alert.metadata = metadata;

        if let Err(e) = append_alert(&self.config.alerts_file(), &alert) {
            return Outcome::Err(EngineError::Storage(e));
        }

        // Best-effort pub/sub: failure must not block callers.
        if let Err(e) = self.bus.publish(cx, NOTIFICATION_CHANNEL, &alert).await {
            tracing::error!(error = %e, "failed to publish notification event");
        }

        tracing::info!(severity = %severity, title, "notification dispatched");
        Outcome::Ok(true)
    }

    fn heartbeat(&self, event_type: &str, summary: &str, severity_label: &str) {
        if let Err(e) = append_changelog(
            &self.config.changelog_file(),
            event_type,
            summary,
            severity_label,
        ) {
            tracing::warn!(error = %e, "changelog append failed");
        }
    }

    /// Notify about a new high-urgency or critical email. Returns false
    /// immediately for lower urgencies so callers need no guard.
    pub async fn notify_new_email(
        &self,
        cx: &Cx,
        thread_id: i64,
        subject: &str,
        sender: &str,
        urgency: &str,
    ) -> Outcome<bool, EngineError> {
        if !matches!(urgency, "high" | "critical") {
            return Outcome::Ok(false);
        }
        let severity = if urgency == "high" {
            Severity::High
        } else {
            Severity::Critical
        };
        self.heartbeat(
            "new_email",
            &format!("Thread #{thread_id} \"{subject}\" from {sender}"),
            severity.badge(),
        );
        self.dispatch_notification(
            cx,
            "new_high_urgency_email",
            &format!("High-urgency email from {sender}"),
            &format!("Subject: {subject}. Urgency: {urgency}. Requires attention."),
            Some(thread_id),
            severity,
            None,
        )
        .await
    }

    /// Notify when a thread's goal has been achieved.
    pub async fn notify_goal_met(
        &self,
        cx: &Cx,
        thread_id: i64,
        subject: &str,
        goal: &str,
    ) -> Outcome<bool, EngineError> {
        self.heartbeat("goal_met", &format!("Thread #{thread_id} goal achieved"), "INFO");
        self.dispatch_notification(
            cx,
            "goal_met",
            &format!("Goal achieved: {subject}"),
            &format!("Goal '{goal}' has been met."),
            Some(thread_id),
            Severity::Info,
            None,
        )
        .await
    }

    /// Notify about a security event (injection, anomaly, quarantine,
    /// commitment).
    pub async fn notify_security_alert(
        &self,
        cx: &Cx,
        thread_id: Option<i64>,
        event_type: &str,
        details: &str,
        severity: Severity,
    ) -> Outcome<bool, EngineError> {
        let thread_label = thread_id
            .map_or_else(|| "no thread".to_string(), |t| format!("thread #{t}"));
        self.heartbeat(
            "security_alert",
            &format!("{event_type} on {thread_label}"),
            severity.badge(),
        );
        self.dispatch_notification(
            cx,
            event_type,
            &format!("Security: {}", event_type.replace('_', " ")),
            details,
            thread_id,
            severity,
            None,
        )
        .await
    }

    /// Notify when an auto-generated draft is waiting for approval.
    pub async fn notify_draft_ready(
        &self,
        cx: &Cx,
        thread_id: i64,
        subject: &str,
        draft_id: i64,
    ) -> Outcome<bool, EngineError> {
        self.heartbeat(
            "draft_ready",
            &format!("Draft #{draft_id} for thread #{thread_id} pending approval"),
            "INFO",
        );
        self.dispatch_notification(
            cx,
            "draft_ready",
            &format!("Draft ready: {subject}"),
            &format!("Draft #{draft_id} is waiting for approval."),
            Some(thread_id),
            Severity::Info,
            None,
        )
        .await
    }

    /// Notify that a new outbound thread was composed.
    pub async fn notify_thread_composed(
        &self,
        cx: &Cx,
        thread_id: i64,
        subject: &str,
        to: &str,
        goal: Option<&str>,
    ) -> Outcome<bool, EngineError> {
        let mut message = format!("New email to {to}. Subject: {subject}.");
        if let Some(goal) = goal {
            message.push_str(&format!(" Goal: {goal}."));
        }
        self.dispatch_notification(
            cx,
            "thread_composed",
            &format!("Thread created: {subject}"),
            &message,
            Some(thread_id),
            Severity::Info,
            None,
        )
        .await
    }

    /// Notify that a thread has gone unanswered for `days`.
    pub async fn notify_stale_thread(
        &self,
        cx: &Cx,
        thread_id: i64,
        subject: &str,
        days: i64,
    ) -> Outcome<bool, EngineError> {
        self.heartbeat(
            "stale_thread",
            &format!("Thread #{thread_id} no reply for {days}d"),
            "MEDIUM",
        );
        self.dispatch_notification(
            cx,
            "stale_thread",
            &format!("Stale thread: {subject}"),
            &format!("No reply received for {days} days. Follow-up recommended."),
            Some(thread_id),
            Severity::Medium,
            None,
        )
        .await
    }
}
