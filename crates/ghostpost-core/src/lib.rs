//! Core types and configuration for GhostPost
//!
//! This crate provides:
//! - Configuration management (`Config`, environment parsing)
//! - Shared domain enums (`ThreadState`, `Severity`, `Priority`, ...)
//! - The `AddressList` sum type and its normalisation
//! - Settings keys and their built-in defaults

#![forbid(unsafe_code)]

pub mod config;
pub mod models;
pub mod settings;

pub use config::{Config, parse_bool};
pub use models::{
    AddressList, AutoReplyMode, DraftStatus, GoalStatus, Priority, Resolution, Severity,
    ThreadState,
};
pub use settings::{SETTING_DEFAULTS, default_setting};
