//! Error types for the archiving pipeline.
//!
//! The `Display` text of the archiving-condition variants doubles as the
//! comment body posted back to the issue when a run fails, so every message
//! names the concrete evidence (conflicting candidates, missing labels) an
//! operator needs to fix the issue.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for every fallible operation in the pipeline.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Two or more version candidates matched where exactly one was expected
    #[error(
        "found more than one version candidate {candidates:?}; \
         exactly one is required, please remove the extra mentions"
    )]
    AmbiguousVersion { candidates: Vec<String> },

    /// The issue type requires an introduced version but none was found in the body
    #[error(
        "no introduced version found in the issue description; \
         this issue type requires one"
    )]
    MissingIntroducedVersion,

    /// Required label set not satisfied while version evidence is present
    #[error("issue is missing the required archive labels {labels:?}")]
    MissingArchiveLabels { labels: Vec<String> },

    /// Version evidence absent while the required labels are present
    #[error("no archive version found in the issue comments")]
    MissingArchiveVersion,

    /// Manual run with neither an operator-supplied version nor labels/comment evidence
    #[error(
        "manual run: no archive version was supplied and the issue carries \
         neither the required labels nor a version comment"
    )]
    MissingArchiveVersionAndLabels,

    /// Neither label map nor title keywords yielded an issue type
    #[error("could not determine the issue type; known type labels are {known:?}")]
    MissingIssueType { known: Vec<String> },

    /// Platform could not be resolved from the environment or CLI override
    #[error("could not determine the CI platform; expected GitHub Actions or GitLab CI")]
    UnexpectedPlatform,

    /// The persisted issue record required by a downstream stage is unavailable
    #[error("issue record not found at {path}")]
    IssueInfoMissing { path: PathBuf },

    /// The changelog document to mutate does not exist
    #[error("changelog document not found at {path}")]
    DocumentNotFound { path: PathBuf },

    /// Non-success HTTP status after retries were exhausted
    #[error("platform API returned {status}: {body}")]
    ApiStatus { status: u16, body: String },

    /// Configuration could not be loaded or validated
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Whether this error is an archiving condition: an issue-level problem
    /// the reopen+comment recovery sequence applies to. Infrastructure
    /// errors (HTTP, I/O, config, platform resolution) are excluded so a
    /// failing transport cannot trigger a recovery dance that would fail
    /// the same way.
    pub fn is_archiving_condition(&self) -> bool {
        matches!(
            self,
            ArchiveError::AmbiguousVersion { .. }
                | ArchiveError::MissingIntroducedVersion
                | ArchiveError::MissingArchiveLabels { .. }
                | ArchiveError::MissingArchiveVersion
                | ArchiveError::MissingArchiveVersionAndLabels
                | ArchiveError::MissingIssueType { .. }
        )
    }
}
