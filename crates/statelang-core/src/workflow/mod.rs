//! State machine engine: data shaping, choice evaluation, and the run loop.
//!
//! - `path` -- `$` / `$$` path resolution and assignment
//! - `intrinsic` -- `States.Format(...)` and friends
//! - `template` -- `Parameters` / `ResultSelector` payload templates
//! - `predicate` -- Choice rule evaluation
//! - `retry` -- Retry/Catch controller around a resolver call
//! - `context` -- the `$$` execution context document
//! - `resolver` -- task resolver traits and registry
//! - `definition` -- JSON/YAML loading and structural validation
//! - `executor` -- the sequential state machine executor

pub mod context;
pub mod definition;
pub mod executor;
pub mod intrinsic;
pub mod path;
pub mod predicate;
pub mod resolver;
pub mod retry;
pub mod template;
