//! Archivist - automated changelog archiving for closed tracker issues
//!
//! When an issue is closed (webhook trigger) or an operator starts the
//! pipeline by hand, the run classifies the issue, extracts the
//! introduced and archive versions from its body and comment thread, and
//! appends or replaces a row in the versioned changelog document. Runs
//! that fail an archiving condition reopen the issue and post the reason
//! as a comment.
//!
//! Module layering, leaves first: [`extract`] and [`classify`] are pure;
//! [`eligibility`] decides on extracted evidence; [`document`] owns the
//! changelog file; [`platform`] adapts the two tracker REST APIs behind
//! one capability trait; [`processor`] composes the pass.

pub mod classify;
pub mod config;
pub mod document;
pub mod eligibility;
pub mod error;
pub mod extract;
pub mod issue;
pub mod platform;
pub mod processor;

pub use config::{CiEventType, Config, Environment};
pub use error::ArchiveError;
pub use processor::{IssueProcessor, RunOutcome};
