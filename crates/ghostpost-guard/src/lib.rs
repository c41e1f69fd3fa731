//! The GhostPost safety pipeline.
//!
//! Six layers, applied to every inbound and outbound message:
//! 1. Sanitization: strip dangerous markup and control characters
//! 2. Content isolation: visible trust-boundary markers
//! 3. Injection detection: prompt-injection pattern scanning
//! 4. Commitment detection: binding-language scanning on outbound text
//! 5. Anomaly detection: hourly send-rate counters, new-recipient checks
//! 6. Send gate: the single pre-send decision composing layers 3-5 with
//!    the blocklist and thread security scores

#![forbid(unsafe_code)]

pub mod anomaly;
pub mod audit;
pub mod commitment;
pub mod error;
pub mod injection;
pub mod sanitizer;
pub mod send_gate;

pub use anomaly::{
    Anomaly, CounterStore, MemoryCounterStore, RateCheck, check_anomalies, check_new_recipient,
    check_send_rate, hour_bucket, increment_send_rate, rate_key,
};
pub use commitment::{Commitment, detect_commitments, has_commitments};
pub use error::{GuardError, GuardResult};
pub use injection::{
    InjectionMatch, get_max_severity, scan_and_quarantine, scan_email_content, scan_text,
};
pub use sanitizer::{
    ISOLATION_END, ISOLATION_START, is_isolated, isolate_content, sanitize_html, sanitize_plain,
};
pub use send_gate::{SendDecision, check_send_allowed};
