//! Shared domain enums and the `AddressList` sum type.
//!
//! Enums are stored as TEXT in SQLite and round-trip through `as_str` /
//! `parse`. `ThreadState` values keep their historical uppercase form
//! because they appear verbatim in context files and CLI commands.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Thread lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreadState {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "WAITING_REPLY")]
    WaitingReply,
    #[serde(rename = "FOLLOW_UP")]
    FollowUp,
    #[serde(rename = "GOAL_MET")]
    GoalMet,
    #[serde(rename = "ARCHIVED")]
    Archived,
}

impl ThreadState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Active => "ACTIVE",
            Self::WaitingReply => "WAITING_REPLY",
            Self::FollowUp => "FOLLOW_UP",
            Self::GoalMet => "GOAL_MET",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Terminal states never schedule follow-ups.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::GoalMet | Self::Archived)
    }

    /// All states, in display order.
    pub const ALL: [Self; 6] = [
        Self::New,
        Self::Active,
        Self::WaitingReply,
        Self::FollowUp,
        Self::GoalMet,
        Self::Archived,
    ];
}

impl std::str::FromStr for ThreadState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "ACTIVE" => Ok(Self::Active),
            "WAITING_REPLY" => Ok(Self::WaitingReply),
            "FOLLOW_UP" => Ok(Self::FollowUp),
            "GOAL_MET" => Ok(Self::GoalMet),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(UnknownVariant::new("ThreadState", other)),
        }
    }
}

impl std::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown enum variant from stored text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown {kind} variant: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Severity & priority
// ---------------------------------------------------------------------------

/// Severity of a security event or alert.
///
/// Ordered so that `max()` picks the most severe:
/// `critical > high > medium > info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Uppercase badge used in alert/changelog formatting.
    #[must_use]
    pub const fn badge(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(UnknownVariant::new("Severity", other)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread priority assigned during scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical priorities surface in "needs attention" views.
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::str::FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(UnknownVariant::new("Priority", other)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Goal / reply / draft / resolution
// ---------------------------------------------------------------------------

/// Status of a thread goal. Only meaningful when a goal is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    InProgress,
    Met,
    Abandoned,
}

impl GoalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Met => "met",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::str::FromStr for GoalStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "met" => Ok(Self::Met),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(UnknownVariant::new("GoalStatus", other)),
        }
    }
}

impl std::fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-thread auto-reply behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoReplyMode {
    #[default]
    Off,
    Draft,
    Auto,
}

impl AutoReplyMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Draft => "draft",
            Self::Auto => "auto",
        }
    }
}

impl std::str::FromStr for AutoReplyMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "draft" => Ok(Self::Draft),
            "auto" => Ok(Self::Auto),
            other => Err(UnknownVariant::new("AutoReplyMode", other)),
        }
    }
}

impl std::fmt::Display for AutoReplyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a prepared outbound draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Approved,
    Rejected,
    Sent,
}

impl DraftStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Sent => "sent",
        }
    }
}

impl std::str::FromStr for DraftStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "sent" => Ok(Self::Sent),
            other => Err(UnknownVariant::new("DraftStatus", other)),
        }
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution state of a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Pending,
    Dismissed,
    Approved,
}

impl Resolution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dismissed => "dismissed",
            Self::Approved => "approved",
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "dismissed" => Ok(Self::Dismissed),
            "approved" => Ok(Self::Approved),
            other => Err(UnknownVariant::new("Resolution", other)),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Address lists
// ---------------------------------------------------------------------------

/// Recipient list as stored on emails and drafts.
///
/// Legacy rows carry either an ordered JSON array of addresses or a
/// name → address JSON object. Both shapes deserialize here; every place
/// that renders addresses goes through [`AddressList::display`] so the
/// normalisation lives in exactly one spot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddressList {
    List(Vec<String>),
    Map(IndexMap<String, String>),
}

impl Default for AddressList {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl AddressList {
    /// Parse from the stored JSON text. Unparseable or empty input yields
    /// an empty list.
    #[must_use]
    pub fn from_json_str(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// Serialize back to the stored JSON text.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }

    /// Flat ordered list of addresses. For the map shape these are the
    /// values, matching the legacy normalisation.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            Self::Map(map) => map.values().cloned().collect(),
        }
    }

    /// Comma-joined display form.
    #[must_use]
    pub fn display(&self) -> String {
        self.addresses().join(", ")
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
        }
    }
}

impl From<Vec<String>> for AddressList {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn thread_state_round_trips() {
        for state in ThreadState::ALL {
            assert_eq!(ThreadState::from_str(state.as_str()).unwrap(), state);
        }
        assert!(ThreadState::from_str("waiting_reply").is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(ThreadState::GoalMet.is_terminal());
        assert!(ThreadState::Archived.is_terminal());
        assert!(!ThreadState::FollowUp.is_terminal());
        assert!(!ThreadState::New.is_terminal());
    }

    #[test]
    fn severity_total_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Info);
        assert_eq!(
            [Severity::Medium, Severity::Critical, Severity::High]
                .into_iter()
                .max(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn severity_badges() {
        assert_eq!(Severity::Critical.badge(), "CRITICAL");
        assert_eq!(Severity::Info.badge(), "INFO");
    }

    #[test]
    fn priority_elevation() {
        assert!(Priority::High.is_elevated());
        assert!(Priority::Critical.is_elevated());
        assert!(!Priority::Medium.is_elevated());
    }

    #[test]
    fn address_list_from_array_json() {
        let list = AddressList::from_json_str(r#"["a@x.com", "b@y.com"]"#);
        assert_eq!(list.display(), "a@x.com, b@y.com");
        assert_eq!(list.addresses().len(), 2);
    }

    #[test]
    fn address_list_from_map_json() {
        let list = AddressList::from_json_str(r#"{"Alice": "a@x.com", "Bob": "b@y.com"}"#);
        // Map normalisation takes the values, in insertion order.
        assert_eq!(list.display(), "a@x.com, b@y.com");
    }

    #[test]
    fn address_list_garbage_is_empty() {
        assert!(AddressList::from_json_str("not json").is_empty());
        assert!(AddressList::from_json_str("").is_empty());
        assert_eq!(AddressList::from_json_str("").display(), "");
    }

    #[test]
    fn address_list_round_trip() {
        let list = AddressList::List(vec!["a@x.com".to_string()]);
        let json = list.to_json_string();
        assert_eq!(AddressList::from_json_str(&json), list);
    }
}
