//! Overwatch backend status monitor.
//!
//! One invocation probes regional latency, console platform reachability and
//! the advisory sources, reduces them to a single severity, records history,
//! and keeps a single Discord webhook message in sync with the result.

pub mod advisory;
pub mod aggregate;
pub mod config;
pub mod export;
pub mod monitor;
pub mod platform;
pub mod probe;
pub mod publish;
pub mod report;
pub mod severity;
pub mod state;
