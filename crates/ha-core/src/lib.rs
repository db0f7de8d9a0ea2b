//! Core runtime for Home Assistant
//!
//! This crate provides the scheduling primitives every other crate builds on:
//! a cooperative job queue that serialises work touching host-owned state, and
//! an executor for blocking I/O that must stay off that queue.

mod job;

pub use job::{JobError, JobResult, JobScheduler};

/// Version of the host, reported to integrations that forward it upstream
pub const HA_VERSION: &str = env!("CARGO_PKG_VERSION");
