//! Tracker platform adapters.
//!
//! The core depends on the [`GitService`] capability shape, never on a
//! concrete transport. The two implementations (GitHub, GitLab) are
//! selected exactly once at startup via [`Platform::resolve`]; nothing
//! downstream branches on platform identity again.

use std::collections::BTreeMap;

use crate::config::{Environment, env_keys};
use crate::error::ArchiveError;
use crate::issue::{Comment, IssueRecord, IssueState, Links};

mod http;

pub mod github;
pub mod gitlab;

pub use github::GithubClient;
pub use gitlab::GitlabClient;

/// Tracker platform tag, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Github,
    Gitlab,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Github => "github",
            Platform::Gitlab => "gitlab",
        }
    }

    /// Explicit tagged choice: a CLI override wins, otherwise the CI
    /// marker variables decide.
    pub fn resolve(
        cli_override: Option<&str>,
        env: &Environment,
    ) -> Result<Platform, ArchiveError> {
        match cli_override {
            Some("github") => Ok(Platform::Github),
            Some("gitlab") => Ok(Platform::Gitlab),
            Some(_) => Err(ArchiveError::UnexpectedPlatform),
            None if env.github_actions => Ok(Platform::Github),
            None if env.gitlab_ci => Ok(Platform::Gitlab),
            None => Err(ArchiveError::UnexpectedPlatform),
        }
    }
}

/// Issue fields returned by the enrichment fetch.
#[derive(Debug, Clone)]
pub struct FetchedIssue {
    pub title: String,
    pub state: IssueState,
    pub body: String,
    pub labels: Vec<String>,
}

/// Capability shape the core consumes: issue reads plus the three
/// actions the recovery path needs.
#[allow(async_fn_in_trait)]
pub trait GitService {
    fn platform(&self) -> Platform;

    /// Headers downstream pipeline steps need to act on the same issue;
    /// persisted in the output record, never logged.
    fn auth_header(&self) -> BTreeMap<String, String>;

    async fn fetch_issue(&self, issue_url: &str) -> Result<FetchedIssue, ArchiveError>;

    /// All comments, paging until the platform returns an empty page.
    async fn fetch_comments(&self, comments_url: &str) -> Result<Vec<Comment>, ArchiveError>;

    async fn reopen_issue(&self, issue_url: &str) -> Result<(), ArchiveError>;

    async fn close_issue(&self, issue_url: &str) -> Result<(), ArchiveError>;

    async fn post_comment(&self, comments_url: &str, body: &str) -> Result<(), ArchiveError>;
}

/// Build the initial issue record from the CI environment variables.
///
/// Used directly for GitHub runs (the workflow exports the event fields)
/// and as the fallback for manually-started GitLab pipelines, where no
/// webhook payload exists.
pub fn issue_from_environment(env: &Environment) -> Result<IssueRecord, ArchiveError> {
    let number_raw = env.issue_number.clone().ok_or_else(|| {
        ArchiveError::Config(format!(
            "environment variable {} is not set",
            env_keys::ISSUE_NUMBER
        ))
    })?;
    let issue_id: u64 = number_raw.parse().map_err(|_| {
        ArchiveError::Config(format!("{} is not a number: {number_raw:?}", env_keys::ISSUE_NUMBER))
    })?;
    let repository = env.issue_repository.clone().ok_or_else(|| {
        ArchiveError::Config(format!(
            "environment variable {} is not set",
            env_keys::ISSUE_REPOSITORY
        ))
    })?;

    let mut issue = IssueRecord::new(issue_id, repository);
    issue.title = env.issue_title.clone().unwrap_or_default();
    issue.body = env.issue_body.clone().unwrap_or_default();
    // Manual runs may omit the state; enrichment fills it in.
    issue.state = match &env.issue_state {
        Some(raw) => IssueState::parse(raw)?,
        None => IssueState::Open,
    };
    issue.introduced_version = env.introduced_version.clone().unwrap_or_default();
    issue.archive_version = env.archive_version.clone().unwrap_or_default();
    issue.links = Links {
        issue_url: env.issue_url.clone().unwrap_or_default(),
        comments_url: env.comments_url.clone().unwrap_or_default(),
    };
    Ok(issue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn cli_override_wins_over_environment() {
        let env = Environment::from_map(HashMap::from([(env_keys::GITHUB_ACTIONS, "true")]));
        assert_eq!(
            Platform::resolve(Some("gitlab"), &env).unwrap(),
            Platform::Gitlab
        );
    }

    #[test]
    fn environment_markers_select_platform() {
        let github = Environment::from_map(HashMap::from([(env_keys::GITHUB_ACTIONS, "true")]));
        let gitlab = Environment::from_map(HashMap::from([(env_keys::GITLAB_CI, "true")]));
        assert_eq!(Platform::resolve(None, &github).unwrap(), Platform::Github);
        assert_eq!(Platform::resolve(None, &gitlab).unwrap(), Platform::Gitlab);
    }

    #[test]
    fn unresolvable_platform_is_an_error() {
        let env = Environment::from_map(HashMap::new());
        assert!(matches!(
            Platform::resolve(None, &env),
            Err(ArchiveError::UnexpectedPlatform)
        ));
        assert!(matches!(
            Platform::resolve(Some("bitbucket"), &env),
            Err(ArchiveError::UnexpectedPlatform)
        ));
    }

    #[test]
    fn issue_from_environment_reads_event_fields() {
        let env = Environment::from_map(HashMap::from([
            (env_keys::ISSUE_NUMBER, "17"),
            (env_keys::ISSUE_REPOSITORY, "外部Issue"),
            (env_keys::ISSUE_TITLE, "#Bug#坏了"),
            (env_keys::ISSUE_STATE, "closed"),
            (env_keys::ISSUE_BODY, "描述"),
            (env_keys::ISSUE_URL, "https://api.example.com/issues/17"),
            (env_keys::COMMENTS_URL, "https://api.example.com/issues/17/comments"),
        ]));
        let issue = issue_from_environment(&env).unwrap();
        assert_eq!(issue.issue_id, 17);
        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.title, "#Bug#坏了");
        assert_eq!(issue.links.issue_url, "https://api.example.com/issues/17");
    }

    #[test]
    fn missing_issue_number_is_config_error() {
        let env = Environment::from_map(HashMap::new());
        assert!(matches!(
            issue_from_environment(&env),
            Err(ArchiveError::Config(_))
        ));
    }
}
