//! Observability setup shared by statelang binaries.

pub mod tracing_setup;
