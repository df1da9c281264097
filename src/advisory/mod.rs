//! External advisory sources: the maintenance notice page and the
//! known-issues forum feed. Both degrade to a neutral value on any failure.

pub mod known_issues;
pub mod maintenance;

pub use known_issues::{check_known_issues, KnownIssues};
pub use maintenance::{check_maintenance, MaintenanceNotice};
