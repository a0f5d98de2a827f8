//! Execution logic for statelang state machines.
//!
//! Depends only on `statelang-types`. Task work is supplied by the caller
//! through the resolver traits in [`workflow::resolver`].

pub mod workflow;
