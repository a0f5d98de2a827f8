//! Shared domain types for statelang.
//!
//! State machine definitions, choice rules, engine configuration, and the
//! error taxonomy. Zero infrastructure dependencies: only serde, serde_json,
//! regex, and thiserror.

pub mod choice;
pub mod config;
pub mod definition;
pub mod error;
