//! The archiving run: one issue, one document, one linear pass.
//!
//! `Start → ExclusionCheck → EligibilityCheck → Classify → ExtractVersions
//! → FormatRow → IdempotenceCheck → MutateDocument → PersistOutput → End`,
//! stopping early on exclusion, ineligibility, or an already-archived
//! record. Archiving-condition failures trigger the reopen+comment
//! recovery sequence and are then re-raised so CI observes a non-zero
//! exit; infrastructure failures propagate untouched.

use tracing::{error, info};

use crate::classify::{strip_type_keyword, type_from_labels, type_from_title};
use crate::config::Config;
use crate::document::{ChangelogDocument, RowFields};
use crate::eligibility::{Eligibility, RunMode, evaluate, is_excluded};
use crate::error::ArchiveError;
use crate::extract::extract;
use crate::issue::{IssueRecord, IssueState, OutputRecord};
use crate::platform::GitService;

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A row was written (or replaced) and the output record persisted
    Archived,
    /// The issue is not an archive target; nothing was changed
    NotArchiveTarget,
    /// A row for this issue already exists and the run was automatic
    AlreadyArchived,
}

pub struct IssueProcessor<'a, S: GitService> {
    service: &'a S,
    config: &'a Config,
}

impl<'a, S: GitService> IssueProcessor<'a, S> {
    pub fn new(service: &'a S, config: &'a Config) -> Self {
        Self { service, config }
    }

    /// One extra fetch to fill in what the trigger payload lacks.
    ///
    /// Labels are never part of the trigger environment, so they are
    /// always refreshed. Manual runs additionally take the live state
    /// (the operator may have left state fields unset) and fill title and
    /// body only where the operator supplied nothing.
    async fn enrich(&self, issue: &mut IssueRecord) -> Result<(), ArchiveError> {
        issue.comments = self
            .service
            .fetch_comments(&issue.links.comments_url)
            .await?;
        let fetched = self.service.fetch_issue(&issue.links.issue_url).await?;
        issue.labels = fetched.labels;
        if self.config.ci_event_type.run_mode() == RunMode::Manual {
            issue.state = fetched.state;
            if issue.title.is_empty() {
                issue.title = fetched.title;
            }
            if issue.body.is_empty() {
                issue.body = fetched.body;
            }
        }
        Ok(())
    }

    /// Drive one issue through the archiving pass.
    ///
    /// The document is mutated in memory only; the caller persists it via
    /// [`ChangelogDocument::save`] on every exit path.
    pub async fn run(
        &self,
        issue: &mut IssueRecord,
        document: &mut ChangelogDocument,
    ) -> Result<RunOutcome, ArchiveError> {
        let mode = self.config.ci_event_type.run_mode();

        self.enrich(issue).await?;

        if is_excluded(issue.state, mode) {
            return Ok(RunOutcome::NotArchiveTarget);
        }

        let comment_text = issue.combined_comment_text();
        let archive_candidates = extract(&comment_text, &self.config.archive_version_patterns);
        let version_override = !issue.archive_version.is_empty();

        match evaluate(
            &issue.labels,
            &self.config.required_labels,
            &archive_candidates,
            mode,
            version_override,
        )? {
            Eligibility::Skip => {
                info!("issue is not an archive candidate");
                return Ok(RunOutcome::NotArchiveTarget);
            }
            Eligibility::Eligible => {}
        }

        // A manual run may target an issue nobody closed yet.
        if mode == RunMode::Manual && issue.state == IssueState::Open {
            self.service.close_issue(&issue.links.issue_url).await?;
            issue.state = IssueState::Closed;
        }

        if issue.needs_type_detection() {
            issue.issue_type = match type_from_labels(&issue.labels, &self.config.label_rules) {
                Some(issue_type) => issue_type,
                None => type_from_title(&issue.title, &self.config.keyword_rules)?,
            };
            info!(issue_type = %issue.issue_type, "issue type resolved");
        }
        issue.title = strip_type_keyword(&issue.title, &self.config.keyword_rules);

        if issue.introduced_version.is_empty() {
            match extract(&issue.body, &self.config.introduced_version_patterns)
                .into_optional()?
            {
                Some(version) => issue.introduced_version = version,
                None => {
                    if self
                        .config
                        .needs_introduced_version
                        .contains(&issue.issue_type)
                    {
                        return Err(ArchiveError::MissingIntroducedVersion);
                    }
                    info!("no introduced version in the body; not required for this type");
                }
            }
        }

        if issue.archive_version.is_empty() {
            issue.archive_version = archive_candidates
                .into_optional()?
                .ok_or(ArchiveError::MissingArchiveVersion)?;
        }

        if mode == RunMode::Automatic
            && document.record_exists(&issue.repository, issue.issue_id)
        {
            info!(issue_id = issue.issue_id, "already archived, nothing to do");
            return Ok(RunOutcome::AlreadyArchived);
        }

        document.archive(
            &RowFields {
                issue_id: issue.issue_id,
                issue_type: &issue.issue_type,
                title: &issue.title,
                repository: &issue.repository,
                issue_url: &issue.links.issue_url,
                introduced_version: &issue.introduced_version,
                archive_version: &issue.archive_version,
            },
            &self.config.layout,
            mode == RunMode::Manual,
        );

        let record = OutputRecord::from_issue(
            issue,
            &self.config.ci_event_name,
            self.service.platform().as_str(),
            self.service.auth_header(),
        );
        info!(record = %record.printable()?, "resolved issue record");
        record.write_to(&self.config.output_path)?;

        Ok(RunOutcome::Archived)
    }

    /// [`run`], plus the recovery sequence for archiving-condition
    /// failures: reopen the issue, post the error text as a comment, then
    /// re-raise the original error. Failures inside the recovery steps
    /// are logged and never mask the original error.
    ///
    /// [`run`]: IssueProcessor::run
    pub async fn run_with_recovery(
        &self,
        issue: &mut IssueRecord,
        document: &mut ChangelogDocument,
    ) -> Result<RunOutcome, ArchiveError> {
        match self.run(issue, document).await {
            Err(err) if err.is_archiving_condition() => {
                error!(error = %err, "archiving conditions not satisfied, reopening issue");
                if let Err(reopen_err) = self.service.reopen_issue(&issue.links.issue_url).await {
                    error!(error = %reopen_err, "failed to reopen the issue");
                }
                if let Err(comment_err) = self
                    .service
                    .post_comment(&issue.links.comments_url, &err.to_string())
                    .await
                {
                    error!(error = %comment_err, "failed to post the failure comment");
                }
                Err(err)
            }
            other => other,
        }
    }
}
