//! Observability setup for Conductor.
//!
//! Owns tracing-subscriber initialization with optional OpenTelemetry
//! export. Kept as its own crate so the core and infra layers depend only on
//! the `tracing` facade.

pub mod tracing_setup;
