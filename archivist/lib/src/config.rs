//! Configuration loading.
//!
//! All environment access happens here (and in the platform adapters'
//! record constructors) at startup; everything downstream receives a
//! fully-populated [`Config`] and never touches the environment itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::classify::{KeywordRule, LabelRule};
use crate::document::DocumentLayout;
use crate::eligibility::RunMode;
use crate::error::ArchiveError;

/// Environment variable names shared between the GitHub Actions and
/// GitLab CI pipeline definitions.
pub mod env_keys {
    pub const GITHUB_ACTIONS: &str = "GITHUB_ACTIONS";
    pub const GITLAB_CI: &str = "GITLAB_CI";
    pub const TOKEN: &str = "TOKEN";
    pub const OUTPUT_PATH: &str = "OUTPUT_PATH";
    pub const ARCHIVED_DOCUMENT_PATH: &str = "ARCHIVED_DOCUMENT_PATH";
    pub const CI_EVENT_TYPE: &str = "CI_EVENT_TYPE";
    pub const ISSUE_REPOSITORY: &str = "ISSUE_REPOSITORY";
    pub const ISSUE_NUMBER: &str = "ISSUE_NUMBER";
    pub const ISSUE_TITLE: &str = "ISSUE_TITLE";
    pub const ISSUE_STATE: &str = "ISSUE_STATE";
    pub const ISSUE_BODY: &str = "ISSUE_BODY";
    pub const ISSUE_URL: &str = "ISSUE_URL";
    pub const COMMENTS_URL: &str = "COMMENTS_URL";
    pub const INTRODUCED_VERSION: &str = "INTRODUCED_VERSION";
    pub const ARCHIVE_VERSION: &str = "ARCHIVE_VERSION";
    pub const WEBHOOK_PAYLOAD: &str = "WEBHOOK_PAYLOAD";
}

/// How the CI run was started, parsed from the pipeline's event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiEventType {
    /// `workflow_dispatch` (GitHub) / `web` (GitLab): operator-started
    Manual,
    /// Everything else: issue webhook / tracker event
    IssueEvent,
}

impl CiEventType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "workflow_dispatch" | "web" => CiEventType::Manual,
            _ => CiEventType::IssueEvent,
        }
    }

    pub fn run_mode(&self) -> RunMode {
        match self {
            CiEventType::Manual => RunMode::Manual,
            CiEventType::IssueEvent => RunMode::Automatic,
        }
    }
}

/// Snapshot of every environment variable the pipeline reads, captured
/// once at startup.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub github_actions: bool,
    pub gitlab_ci: bool,
    pub token: Option<String>,
    pub output_path: Option<String>,
    pub document_path: Option<String>,
    pub ci_event_type: Option<String>,
    pub issue_repository: Option<String>,
    pub issue_number: Option<String>,
    pub issue_title: Option<String>,
    pub issue_state: Option<String>,
    pub issue_body: Option<String>,
    pub issue_url: Option<String>,
    pub comments_url: Option<String>,
    pub introduced_version: Option<String>,
    pub archive_version: Option<String>,
    pub webhook_payload: Option<String>,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Environment {
    pub fn capture() -> Self {
        Self {
            github_actions: var(env_keys::GITHUB_ACTIONS).as_deref() == Some("true"),
            gitlab_ci: var(env_keys::GITLAB_CI).as_deref() == Some("true"),
            token: var(env_keys::TOKEN),
            output_path: var(env_keys::OUTPUT_PATH),
            document_path: var(env_keys::ARCHIVED_DOCUMENT_PATH),
            ci_event_type: var(env_keys::CI_EVENT_TYPE),
            issue_repository: var(env_keys::ISSUE_REPOSITORY),
            issue_number: var(env_keys::ISSUE_NUMBER),
            issue_title: var(env_keys::ISSUE_TITLE),
            issue_state: var(env_keys::ISSUE_STATE),
            issue_body: var(env_keys::ISSUE_BODY),
            issue_url: var(env_keys::ISSUE_URL),
            comments_url: var(env_keys::COMMENTS_URL),
            introduced_version: var(env_keys::INTRODUCED_VERSION),
            archive_version: var(env_keys::ARCHIVE_VERSION),
            webhook_payload: var(env_keys::WEBHOOK_PAYLOAD),
        }
    }

    /// Neither CI marker is set: a developer machine. The CLI loads a
    /// `.env` file in this case before capturing the rest.
    pub fn is_local(&self) -> bool {
        !self.github_actions && !self.gitlab_ci
    }
}

/// Raw shape of the JSON configuration file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    introduced_version_patterns: Vec<String>,
    archive_version_patterns: Vec<String>,
    required_labels: Vec<String>,
    issue_type: IssueTypeSection,
    document: DocumentLayout,
}

#[derive(Debug, Deserialize)]
struct IssueTypeSection {
    #[serde(default)]
    label_rules: Vec<LabelRule>,
    #[serde(default)]
    keyword_rules: Vec<KeywordRule>,
    #[serde(default)]
    needs_introduced_version: Vec<String>,
}

/// Fully-populated configuration passed by reference into every
/// component.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub output_path: PathBuf,
    pub document_path: PathBuf,
    pub ci_event_type: CiEventType,
    /// Raw event name, carried through to the output record
    pub ci_event_name: String,
    /// Changelog repository tag for this tracker, e.g. "外部Issue"
    pub repository: String,
    pub required_labels: Vec<String>,
    pub introduced_version_patterns: Vec<Regex>,
    pub archive_version_patterns: Vec<Regex>,
    pub label_rules: Vec<LabelRule>,
    pub keyword_rules: Vec<KeywordRule>,
    pub needs_introduced_version: Vec<String>,
    pub layout: DocumentLayout,
}

fn required(value: &Option<String>, key: &str) -> Result<String, ArchiveError> {
    value
        .clone()
        .ok_or_else(|| ArchiveError::Config(format!("environment variable {key} is not set")))
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ArchiveError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p)
                .map_err(|e| ArchiveError::Config(format!("invalid version pattern {p:?}: {e}")))
        })
        .collect()
}

impl Config {
    /// Load the JSON file at `path` and overlay the environment snapshot.
    pub fn load(path: &Path, env: &Environment) -> Result<Self, ArchiveError> {
        info!(path = %path.display(), "loading configuration");
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&raw)?;

        let ci_event_name = required(&env.ci_event_type, env_keys::CI_EVENT_TYPE)?;
        let config = Self {
            token: required(&env.token, env_keys::TOKEN)?,
            output_path: PathBuf::from(required(&env.output_path, env_keys::OUTPUT_PATH)?),
            document_path: PathBuf::from(required(
                &env.document_path,
                env_keys::ARCHIVED_DOCUMENT_PATH,
            )?),
            ci_event_type: CiEventType::parse(&ci_event_name),
            ci_event_name,
            repository: required(&env.issue_repository, env_keys::ISSUE_REPOSITORY)?,
            required_labels: file.required_labels,
            introduced_version_patterns: compile_patterns(&file.introduced_version_patterns)?,
            archive_version_patterns: compile_patterns(&file.archive_version_patterns)?,
            label_rules: file.issue_type.label_rules,
            keyword_rules: file.issue_type.keyword_rules,
            needs_introduced_version: file.issue_type.needs_introduced_version,
            layout: file.document,
        };
        info!("configuration loaded");
        Ok(config)
    }
}

/// Test-only environment builder; production code captures the real
/// environment exactly once in the CLI.
impl Environment {
    pub fn from_map(values: HashMap<&str, &str>) -> Self {
        let get = |key: &str| values.get(key).map(|v| v.to_string());
        Self {
            github_actions: values.get(env_keys::GITHUB_ACTIONS).copied() == Some("true"),
            gitlab_ci: values.get(env_keys::GITLAB_CI).copied() == Some("true"),
            token: get(env_keys::TOKEN),
            output_path: get(env_keys::OUTPUT_PATH),
            document_path: get(env_keys::ARCHIVED_DOCUMENT_PATH),
            ci_event_type: get(env_keys::CI_EVENT_TYPE),
            issue_repository: get(env_keys::ISSUE_REPOSITORY),
            issue_number: get(env_keys::ISSUE_NUMBER),
            issue_title: get(env_keys::ISSUE_TITLE),
            issue_state: get(env_keys::ISSUE_STATE),
            issue_body: get(env_keys::ISSUE_BODY),
            issue_url: get(env_keys::ISSUE_URL),
            comments_url: get(env_keys::COMMENTS_URL),
            introduced_version: get(env_keys::INTRODUCED_VERSION),
            archive_version: get(env_keys::ARCHIVE_VERSION),
            webhook_payload: get(env_keys::WEBHOOK_PAYLOAD),
        }
    }
}
