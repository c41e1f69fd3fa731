//! Decision engine for GhostPost.
//!
//! This crate provides:
//! - The thread state machine and follow-up scheduler
//! - The triage engine (the agent's prioritized action list)
//! - The notification dispatcher with per-event-type filtering
//! - The per-thread brief generator
//! - The LLM-backed reply composer

#![forbid(unsafe_code)]

pub mod brief;
pub mod composer;
pub mod error;
pub mod llm;
pub mod notify;
pub mod state;
pub mod triage;

pub use brief::generate_brief;
pub use composer::{ReplyDraft, generate_reply};
pub use error::{EngineError, EngineResult};
pub use llm::{LlmError, complete, llm_available, set_stub};
pub use notify::{MemoryBus, NotificationBus, Notifier};
pub use state::{
    apply_transition, can_transition, mark_follow_ups_due, mark_goal_met, record_outbound_send,
};
pub use triage::{TriageAction, TriageSnapshot, get_triage_data};
