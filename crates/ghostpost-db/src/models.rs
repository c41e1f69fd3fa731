//! Database models using sqlmodel derive macros
//!
//! These models map directly to `SQLite` tables. All datetime fields use
//! `i64` (microseconds since Unix epoch); booleans are stored as 0/1.

use serde::{Deserialize, Serialize};
use sqlmodel::Model;

use ghostpost_core::AddressList;

use crate::timestamps::now_micros;

// =============================================================================
// Thread
// =============================================================================

/// A conversation thread owning an ordered set of emails.
///
/// # Constraints
/// - `state` holds a `ThreadState` string (`NEW`, `ACTIVE`, ...).
/// - `next_follow_up_at` is NULL whenever the state is terminal.
/// - `goal_status` may be non-NULL only when `goal` is non-NULL.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "threads")]
pub struct ThreadRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub subject: String,

    #[sqlmodel(default = "'NEW'")]
    pub state: String,

    #[sqlmodel(nullable)]
    pub priority: Option<String>,

    #[sqlmodel(nullable)]
    pub category: Option<String>,

    #[sqlmodel(nullable)]
    pub summary: Option<String>,

    #[sqlmodel(nullable)]
    pub goal: Option<String>,

    #[sqlmodel(nullable)]
    pub acceptance_criteria: Option<String>,

    #[sqlmodel(nullable)]
    pub goal_status: Option<String>,

    #[sqlmodel(nullable)]
    pub playbook: Option<String>,

    #[sqlmodel(default = "'off'")]
    pub auto_reply_mode: String,

    #[sqlmodel(default = "3")]
    pub follow_up_days: i64,

    #[sqlmodel(nullable)]
    pub next_follow_up_at: Option<i64>,

    /// Integer mean (0-100) of the thread's email security scores.
    #[sqlmodel(nullable)]
    pub security_score_avg: Option<i64>,

    #[sqlmodel(nullable)]
    pub last_activity_at: Option<i64>,

    #[sqlmodel(nullable)]
    pub notes: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Default for ThreadRow {
    fn default() -> Self {
        let now = now_micros();
        Self {
            id: None,
            subject: String::new(),
            state: "NEW".to_string(),
            priority: None,
            category: None,
            summary: None,
            goal: None,
            acceptance_criteria: None,
            goal_status: None,
            playbook: None,
            auto_reply_mode: "off".to_string(),
            follow_up_days: 3,
            next_follow_up_at: None,
            security_score_avg: None,
            last_activity_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl ThreadRow {
    /// Create a new thread row in the `NEW` state.
    #[must_use]
    pub fn new(subject: String) -> Self {
        Self {
            subject,
            ..Self::default()
        }
    }

    /// Parsed thread state; unknown stored values fall back to `NEW`.
    #[must_use]
    pub fn state_enum(&self) -> ghostpost_core::ThreadState {
        self.state
            .parse()
            .unwrap_or(ghostpost_core::ThreadState::New)
    }
}

// =============================================================================
// Email
// =============================================================================

/// A single message, always owned by exactly one thread.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "emails")]
pub struct EmailRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub thread_id: i64,

    pub subject: String,

    pub from_address: String,

    /// JSON text: either an ordered array of addresses or a name->address map.
    #[sqlmodel(default = "'[]'")]
    pub to_addresses: String,

    #[sqlmodel(nullable)]
    pub body_plain: Option<String>,

    #[sqlmodel(nullable)]
    pub body_html: Option<String>,

    #[sqlmodel(default = "0")]
    pub is_sent: i64,

    #[sqlmodel(default = "0")]
    pub is_read: i64,

    #[sqlmodel(nullable)]
    pub received_at: Option<i64>,

    /// Sender-provided date header, when parseable.
    #[sqlmodel(nullable)]
    pub date: Option<i64>,

    #[sqlmodel(nullable)]
    pub sentiment: Option<String>,

    #[sqlmodel(nullable)]
    pub urgency: Option<String>,

    #[sqlmodel(nullable)]
    pub action_required: Option<String>,

    /// Per-message security score, 0-100.
    #[sqlmodel(nullable)]
    pub security_score: Option<i64>,

    /// JSON array of attachment metadata `{filename, size}`.
    #[sqlmodel(default = "'[]'")]
    pub attachments: String,

    pub created_at: i64,
}

impl Default for EmailRow {
    fn default() -> Self {
        Self {
            id: None,
            thread_id: 0,
            subject: String::new(),
            from_address: String::new(),
            to_addresses: "[]".to_string(),
            body_plain: None,
            body_html: None,
            is_sent: 0,
            is_read: 0,
            received_at: None,
            date: None,
            sentiment: None,
            urgency: None,
            action_required: None,
            security_score: None,
            attachments: "[]".to_string(),
            created_at: now_micros(),
        }
    }
}

impl EmailRow {
    #[must_use]
    pub const fn is_sent_bool(&self) -> bool {
        self.is_sent != 0
    }

    #[must_use]
    pub const fn is_read_bool(&self) -> bool {
        self.is_read != 0
    }

    /// Parsed recipient list.
    #[must_use]
    pub fn to_address_list(&self) -> AddressList {
        AddressList::from_json_str(&self.to_addresses)
    }

    /// Chronological sort key: `coalesce(date, received_at, created_at)`.
    #[must_use]
    pub fn sort_key(&self) -> i64 {
        self.date
            .or(self.received_at)
            .unwrap_or(self.created_at)
    }

    /// Parsed attachment metadata; malformed entries are skipped.
    #[must_use]
    pub fn attachment_list(&self) -> Vec<Attachment> {
        serde_json::from_str(&self.attachments).unwrap_or_default()
    }

    /// Whether any analysis label is present.
    #[must_use]
    pub fn has_analysis(&self) -> bool {
        self.sentiment.is_some() || self.urgency.is_some() || self.action_required.is_some()
    }
}

/// Attachment metadata as stored in the `attachments` JSON array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

// =============================================================================
// Contact
// =============================================================================

/// A known correspondent with a derived communication profile.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "contacts")]
pub struct ContactRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    #[sqlmodel(unique)]
    pub email: String,

    #[sqlmodel(nullable)]
    pub name: Option<String>,

    #[sqlmodel(nullable)]
    pub relationship_type: Option<String>,

    #[sqlmodel(nullable)]
    pub preferred_style: Option<String>,

    #[sqlmodel(nullable)]
    pub communication_frequency: Option<String>,

    /// JSON array of topic strings.
    #[sqlmodel(default = "'[]'")]
    pub topics: String,

    #[sqlmodel(nullable)]
    pub last_interaction: Option<i64>,

    #[sqlmodel(nullable)]
    pub notes: Option<String>,
}

impl Default for ContactRow {
    fn default() -> Self {
        Self {
            id: None,
            email: String::new(),
            name: None,
            relationship_type: None,
            preferred_style: None,
            communication_frequency: None,
            topics: "[]".to_string(),
            last_interaction: None,
            notes: None,
        }
    }
}

impl ContactRow {
    /// Parsed topic list.
    #[must_use]
    pub fn topic_list(&self) -> Vec<String> {
        serde_json::from_str(&self.topics).unwrap_or_default()
    }
}

// =============================================================================
// Draft
// =============================================================================

/// A prepared outbound message that has not been sent yet.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "drafts")]
pub struct DraftRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    #[sqlmodel(nullable)]
    pub thread_id: Option<i64>,

    /// JSON text, same shapes as `EmailRow::to_addresses`.
    #[sqlmodel(default = "'[]'")]
    pub to_addresses: String,

    pub subject: String,
    pub body: String,

    #[sqlmodel(default = "'pending'")]
    pub status: String,

    pub created_at: i64,
}

impl Default for DraftRow {
    fn default() -> Self {
        Self {
            id: None,
            thread_id: None,
            to_addresses: "[]".to_string(),
            subject: String::new(),
            body: String::new(),
            status: "pending".to_string(),
            created_at: now_micros(),
        }
    }
}

impl DraftRow {
    #[must_use]
    pub fn to_address_list(&self) -> AddressList {
        AddressList::from_json_str(&self.to_addresses)
    }
}

// =============================================================================
// SecurityEvent
// =============================================================================

/// An immutable security audit record.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "security_events")]
pub struct SecurityEventRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub event_type: String,
    pub severity: String,

    #[sqlmodel(nullable)]
    pub email_id: Option<i64>,

    #[sqlmodel(nullable)]
    pub thread_id: Option<i64>,

    /// JSON details blob.
    #[sqlmodel(default = "'{}'")]
    pub details: String,

    #[sqlmodel(default = "0")]
    pub quarantined: i64,

    #[sqlmodel(default = "'pending'")]
    pub resolution: String,

    pub created_at: i64,
}

impl Default for SecurityEventRow {
    fn default() -> Self {
        Self {
            id: None,
            event_type: String::new(),
            severity: "info".to_string(),
            email_id: None,
            thread_id: None,
            details: "{}".to_string(),
            quarantined: 0,
            resolution: "pending".to_string(),
            created_at: now_micros(),
        }
    }
}

impl SecurityEventRow {
    #[must_use]
    pub const fn quarantined_bool(&self) -> bool {
        self.quarantined != 0
    }
}

// =============================================================================
// AuditLog
// =============================================================================

/// An immutable trace of a user or agent action.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "audit_log")]
pub struct AuditLogRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub actor: String,
    pub action_type: String,

    #[sqlmodel(nullable)]
    pub subject_id: Option<i64>,

    #[sqlmodel(default = "'{}'")]
    pub metadata: String,

    pub created_at: i64,
}

impl Default for AuditLogRow {
    fn default() -> Self {
        Self {
            id: None,
            actor: String::new(),
            action_type: String::new(),
            subject_id: None,
            metadata: "{}".to_string(),
            created_at: now_micros(),
        }
    }
}

// =============================================================================
// Setting
// =============================================================================

/// One configuration key/value pair. Some keys hold JSON-encoded lists.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "settings")]
pub struct SettingRow {
    #[sqlmodel(primary_key)]
    pub key: String,

    pub value: String,
}

// =============================================================================
// ThreadOutcome
// =============================================================================

/// Terminal record attached to a thread after it closes. Created exactly
/// once per thread.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "thread_outcomes")]
pub struct ThreadOutcomeRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub thread_id: i64,
    pub outcome_type: String,

    #[sqlmodel(nullable)]
    pub summary: Option<String>,

    pub created_at: i64,
}

impl Default for ThreadOutcomeRow {
    fn default() -> Self {
        Self {
            id: None,
            thread_id: 0,
            outcome_type: String::new(),
            summary: None,
            created_at: now_micros(),
        }
    }
}

// =============================================================================
// ResearchCampaign / ResearchBatch
// =============================================================================

/// One outbound research campaign. The research pipeline itself runs
/// elsewhere; these rows exist so the projector can report status.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "research_campaigns")]
pub struct ResearchCampaignRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub company_name: String,

    #[sqlmodel(nullable)]
    pub contact_name: Option<String>,

    pub status: String,

    #[sqlmodel(default = "0")]
    pub phase: i64,

    pub goal: String,
    pub identity: String,

    #[sqlmodel(nullable)]
    pub error: Option<String>,

    #[sqlmodel(nullable)]
    pub email_subject: Option<String>,

    #[sqlmodel(nullable)]
    pub thread_id: Option<i64>,

    pub created_at: i64,

    #[sqlmodel(nullable)]
    pub completed_at: Option<i64>,
}

impl Default for ResearchCampaignRow {
    fn default() -> Self {
        Self {
            id: None,
            company_name: String::new(),
            contact_name: None,
            status: "pending".to_string(),
            phase: 0,
            goal: String::new(),
            identity: String::new(),
            error: None,
            email_subject: None,
            thread_id: None,
            created_at: now_micros(),
            completed_at: None,
        }
    }
}

impl ResearchCampaignRow {
    /// Campaigns with a named contact run one extra personalisation phase.
    #[must_use]
    pub const fn max_phases(&self) -> i64 {
        if self.contact_name.is_some() { 8 } else { 7 }
    }
}

/// A batch grouping of research campaigns.
#[derive(Model, Debug, Clone, Serialize, Deserialize)]
#[sqlmodel(table = "research_batches")]
pub struct ResearchBatchRow {
    #[sqlmodel(primary_key, auto_increment)]
    pub id: Option<i64>,

    pub name: String,
    pub status: String,

    #[sqlmodel(default = "0")]
    pub total_companies: i64,

    #[sqlmodel(default = "0")]
    pub completed: i64,

    #[sqlmodel(default = "0")]
    pub failed: i64,

    pub created_at: i64,
}

impl Default for ResearchBatchRow {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            status: "pending".to_string(),
            total_companies: 0,
            completed: 0,
            failed: 0,
            created_at: now_micros(),
        }
    }
}
