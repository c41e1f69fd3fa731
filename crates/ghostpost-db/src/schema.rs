//! Database schema creation.
//!
//! All statements are idempotent (`CREATE ... IF NOT EXISTS`) so the pool
//! can apply them on every new connection.

/// SQL statements for creating the database schema.
pub const CREATE_TABLES_SQL: &str = r"
-- Threads table
CREATE TABLE IF NOT EXISTS threads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject TEXT NOT NULL DEFAULT '',
    state TEXT NOT NULL DEFAULT 'NEW',
    priority TEXT,
    category TEXT,
    summary TEXT,
    goal TEXT,
    acceptance_criteria TEXT,
    goal_status TEXT,
    playbook TEXT,
    auto_reply_mode TEXT NOT NULL DEFAULT 'off',
    follow_up_days INTEGER NOT NULL DEFAULT 3,
    next_follow_up_at INTEGER,
    security_score_avg INTEGER,
    last_activity_at INTEGER,
    notes TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_threads_state ON threads(state);
CREATE INDEX IF NOT EXISTS idx_threads_follow_up ON threads(state, next_follow_up_at);
CREATE INDEX IF NOT EXISTS idx_threads_last_activity ON threads(last_activity_at);

-- Emails table
CREATE TABLE IF NOT EXISTS emails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id INTEGER NOT NULL REFERENCES threads(id),
    subject TEXT NOT NULL DEFAULT '',
    from_address TEXT NOT NULL DEFAULT '',
    to_addresses TEXT NOT NULL DEFAULT '[]',
    body_plain TEXT,
    body_html TEXT,
    is_sent INTEGER NOT NULL DEFAULT 0,
    is_read INTEGER NOT NULL DEFAULT 0,
    received_at INTEGER,
    date INTEGER,
    sentiment TEXT,
    urgency TEXT,
    action_required TEXT,
    security_score INTEGER,
    attachments TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_emails_thread ON emails(thread_id);
CREATE INDEX IF NOT EXISTS idx_emails_unread ON emails(is_read);
CREATE INDEX IF NOT EXISTS idx_emails_received ON emails(received_at);

-- Contacts table
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    relationship_type TEXT,
    preferred_style TEXT,
    communication_frequency TEXT,
    topics TEXT NOT NULL DEFAULT '[]',
    last_interaction INTEGER,
    notes TEXT
);
CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email);

-- Drafts table
CREATE TABLE IF NOT EXISTS drafts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id INTEGER REFERENCES threads(id),
    to_addresses TEXT NOT NULL DEFAULT '[]',
    subject TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_drafts_status ON drafts(status, created_at);

-- Security events table
CREATE TABLE IF NOT EXISTS security_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    email_id INTEGER,
    thread_id INTEGER,
    details TEXT NOT NULL DEFAULT '{}',
    quarantined INTEGER NOT NULL DEFAULT 0,
    resolution TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_security_events_resolution ON security_events(resolution, created_at);
CREATE INDEX IF NOT EXISTS idx_security_events_quarantined ON security_events(quarantined);

-- Audit log table
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor TEXT NOT NULL,
    action_type TEXT NOT NULL,
    subject_id INTEGER,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_action_created ON audit_log(action_type, created_at);

-- Settings table
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Research campaigns table
CREATE TABLE IF NOT EXISTS research_campaigns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    company_name TEXT NOT NULL,
    contact_name TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    phase INTEGER NOT NULL DEFAULT 0,
    goal TEXT NOT NULL DEFAULT '',
    identity TEXT NOT NULL DEFAULT '',
    error TEXT,
    email_subject TEXT,
    thread_id INTEGER,
    created_at INTEGER NOT NULL,
    completed_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_research_campaigns_status ON research_campaigns(status, created_at);

-- Research batches table
CREATE TABLE IF NOT EXISTS research_batches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    total_companies INTEGER NOT NULL DEFAULT 0,
    completed INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_research_batches_status ON research_batches(status, created_at);

-- Thread outcomes table
CREATE TABLE IF NOT EXISTS thread_outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id INTEGER NOT NULL REFERENCES threads(id),
    outcome_type TEXT NOT NULL,
    summary TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_outcomes_thread ON thread_outcomes(thread_id);
CREATE INDEX IF NOT EXISTS idx_outcomes_created ON thread_outcomes(created_at);
";

/// Per-connection PRAGMAs applied by the pool factory.
pub const CONN_PRAGMAS_SQL: &str = "\
PRAGMA foreign_keys = OFF;
PRAGMA busy_timeout = 60000;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
";

/// Full per-connection init: PRAGMAs plus idempotent schema.
#[must_use]
pub fn init_schema_sql() -> String {
    format!("{CONN_PRAGMAS_SQL}\n{CREATE_TABLES_SQL}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_covers_all_tables() {
        for table in [
            "threads",
            "emails",
            "contacts",
            "drafts",
            "security_events",
            "audit_log",
            "settings",
            "research_campaigns",
            "research_batches",
            "thread_outcomes",
        ] {
            assert!(
                CREATE_TABLES_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn init_sql_is_idempotent_by_construction() {
        let sql = init_schema_sql();
        assert!(!sql.contains("DROP"));
        assert!(sql.contains("IF NOT EXISTS"));
    }
}
