//! Issue snapshot types shared across the pipeline.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Sentinel issue type meaning "not yet classified"; the processor
/// resolves it from labels or title keywords.
pub const AUTO_ISSUE_TYPE: &str = "auto-detect";

/// Normalized issue state.
///
/// Platforms report a wider vocabulary (`close`, `opened`, `reopen`, ...);
/// [`IssueState::parse`] folds it down to the two terminal states plus the
/// transient `Update`, which GitLab emits for metadata-only webhook events
/// and which always means "skip archiving".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
    Update,
}

impl IssueState {
    pub fn parse(raw: &str) -> Result<Self, ArchiveError> {
        match raw {
            "open" | "opened" | "reopen" => Ok(IssueState::Open),
            "close" | "closed" => Ok(IssueState::Closed),
            "update" => Ok(IssueState::Update),
            other => Err(ArchiveError::Config(format!(
                "unrecognized issue state {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
            IssueState::Update => "update",
        }
    }
}

/// One issue comment, in thread order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub author: String,
    pub body: String,
}

/// Platform URLs the pipeline acts on. Opaque to the core beyond being
/// passed back to the platform adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Links {
    /// REST resource of the issue itself (fetch / reopen / close)
    pub issue_url: String,
    /// REST collection for the issue's comments (fetch / post)
    pub comments_url: String,
}

/// One issue snapshot under evaluation.
///
/// Constructed by the platform adapter from the CI environment or webhook
/// payload, enriched by one extra fetch, then mutated in place while the
/// processor classifies and extracts.
#[derive(Debug, Clone)]
pub struct IssueRecord {
    pub issue_id: u64,
    pub title: String,
    pub body: String,
    pub state: IssueState,
    pub labels: Vec<String>,
    pub comments: Vec<Comment>,
    pub issue_type: String,
    pub introduced_version: String,
    pub archive_version: String,
    /// Changelog repository tag, e.g. "外部Issue" / "内部Issue"
    pub repository: String,
    pub links: Links,
}

impl IssueRecord {
    /// A record with nothing resolved yet. Adapters fill in what their
    /// trigger payload provides and leave the rest for enrichment.
    pub fn new(issue_id: u64, repository: impl Into<String>) -> Self {
        Self {
            issue_id,
            title: String::new(),
            body: String::new(),
            state: IssueState::Open,
            labels: Vec::new(),
            comments: Vec::new(),
            issue_type: AUTO_ISSUE_TYPE.to_string(),
            introduced_version: String::new(),
            archive_version: String::new(),
            repository: repository.into(),
            links: Links::default(),
        }
    }

    pub fn needs_type_detection(&self) -> bool {
        self.issue_type == AUTO_ISSUE_TYPE
    }

    /// All comment bodies joined for version scanning.
    pub fn combined_comment_text(&self) -> String {
        let bodies: Vec<&str> = self.comments.iter().map(|c| c.body.as_str()).collect();
        bodies.join("\n")
    }
}

/// JSON mirror of a resolved [`IssueRecord`], persisted for downstream
/// pipeline steps (document push, success comment).
///
/// `http_header` carries the authorization header those steps need; it is
/// retained in the persisted file but stripped from every printed or
/// logged representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    pub issue_id: u64,
    pub issue_type: String,
    pub issue_title: String,
    pub issue_state: String,
    pub introduced_version: String,
    pub archive_version: String,
    pub ci_event_type: String,
    pub platform_type: String,
    pub http_header: BTreeMap<String, String>,
    pub links: Links,
}

impl OutputRecord {
    pub fn from_issue(
        issue: &IssueRecord,
        ci_event_type: &str,
        platform_type: &str,
        http_header: BTreeMap<String, String>,
    ) -> Self {
        Self {
            issue_id: issue.issue_id,
            issue_type: issue.issue_type.clone(),
            issue_title: issue.title.clone(),
            issue_state: issue.state.as_str().to_string(),
            introduced_version: issue.introduced_version.clone(),
            archive_version: issue.archive_version.clone(),
            ci_event_type: ci_event_type.to_string(),
            platform_type: platform_type.to_string(),
            http_header,
            links: issue.links.clone(),
        }
    }

    /// Pretty JSON with the sensitive header removed. This is the only
    /// form that may be printed or logged.
    pub fn printable(&self) -> Result<String, ArchiveError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("http_header");
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Persist the full record (header included) for downstream steps.
    pub fn write_to(&self, path: &Path) -> Result<(), ArchiveError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self, ArchiveError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::IssueInfoMissing {
                    path: path.to_path_buf(),
                }
            } else {
                ArchiveError::Io(e)
            }
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}
