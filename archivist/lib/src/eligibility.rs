//! Archive eligibility decisions.
//!
//! Two layers run in order. The exclusion pre-check looks only at the
//! trigger and the issue state and short-circuits everything else; the
//! main evaluation then distinguishes "not an archive candidate at all"
//! (silent skip — someone closed an issue that never shipped) from "a
//! candidate missing required evidence" (hard error demanding operator
//! attention, because silently dropping a real candidate loses data).

use tracing::info;

use crate::error::ArchiveError;
use crate::extract::VersionMatch;
use crate::issue::IssueState;

/// How the pipeline run was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Operator started the pipeline and may have supplied field overrides
    Manual,
    /// Tracker webhook / issue event started the pipeline
    Automatic,
}

/// Outcome of the main eligibility evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Not an archive candidate; stop silently
    Skip,
    /// All conditions met; proceed to archive
    Eligible,
}

/// States that must short-circuit before any label or version logic runs.
///
/// An automatic run against an open issue is a non-close webhook trigger
/// (GitLab fires issue webhooks for reopen as well); `update` is a
/// metadata-changed event and never an archive trigger.
pub fn is_excluded(state: IssueState, mode: RunMode) -> bool {
    if mode == RunMode::Automatic && state == IssueState::Open {
        info!("issue is still open under an automatic trigger, skipping");
        return true;
    }
    if state == IssueState::Update {
        info!("issue update event, skipping");
        return true;
    }
    false
}

/// Evaluate the label and version-evidence conditions.
///
/// `version_override` is the manual-mode operator input channel; when it
/// is set the evidence checks are skipped entirely — the operator has
/// already answered the question the checks exist to ask.
pub fn evaluate(
    issue_labels: &[String],
    required_labels: &[String],
    archive_candidates: &VersionMatch,
    mode: RunMode,
    version_override: bool,
) -> Result<Eligibility, ArchiveError> {
    if mode == RunMode::Manual && version_override {
        return Ok(Eligibility::Eligible);
    }

    // The issue must carry ALL required labels, not just overlap with them.
    let labels_satisfied = required_labels
        .iter()
        .all(|required| issue_labels.iter().any(|l| l == required));
    let version_present = !archive_candidates.is_none();

    if labels_satisfied {
        info!("required archive labels present");
    } else {
        info!(required = ?required_labels, "required archive labels not present");
    }
    if version_present {
        info!("archive version evidence found in comments");
    } else {
        info!("no archive version evidence in comments");
    }

    match (labels_satisfied, version_present) {
        (false, false) => match mode {
            // The common "closed without a release" case.
            RunMode::Automatic => Ok(Eligibility::Skip),
            RunMode::Manual => Err(ArchiveError::MissingArchiveVersionAndLabels),
        },
        (false, true) => Err(ArchiveError::MissingArchiveLabels {
            labels: required_labels.to_vec(),
        }),
        (true, false) => Err(ArchiveError::MissingArchiveVersion),
        (true, true) => Ok(Eligibility::Eligible),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> Vec<String> {
        vec!["resolved".to_string()]
    }

    #[test]
    fn open_issue_excluded_under_automatic_trigger() {
        assert!(is_excluded(IssueState::Open, RunMode::Automatic));
        assert!(!is_excluded(IssueState::Open, RunMode::Manual));
        assert!(!is_excluded(IssueState::Closed, RunMode::Automatic));
    }

    #[test]
    fn update_event_excluded_unconditionally() {
        assert!(is_excluded(IssueState::Update, RunMode::Automatic));
        assert!(is_excluded(IssueState::Update, RunMode::Manual));
    }

    #[test]
    fn no_labels_no_version_skips_silently() {
        let result = evaluate(
            &[],
            &required(),
            &VersionMatch::None,
            RunMode::Automatic,
            false,
        )
        .unwrap();
        assert_eq!(result, Eligibility::Skip);
    }

    #[test]
    fn labels_without_version_is_missing_version() {
        let err = evaluate(
            &["resolved".to_string()],
            &required(),
            &VersionMatch::None,
            RunMode::Automatic,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingArchiveVersion));
    }

    #[test]
    fn version_without_labels_is_missing_labels() {
        let err = evaluate(
            &[],
            &required(),
            &VersionMatch::One("0.99.918".into()),
            RunMode::Automatic,
            false,
        )
        .unwrap_err();
        match err {
            ArchiveError::MissingArchiveLabels { labels } => {
                assert_eq!(labels, vec!["resolved".to_string()]);
            }
            other => panic!("expected MissingArchiveLabels, got {other:?}"),
        }
    }

    #[test]
    fn labels_and_version_is_eligible() {
        let result = evaluate(
            &["resolved".to_string()],
            &required(),
            &VersionMatch::One("0.99.918".into()),
            RunMode::Automatic,
            false,
        )
        .unwrap();
        assert_eq!(result, Eligibility::Eligible);
    }

    #[test]
    fn label_check_is_superset_not_intersection() {
        let err = evaluate(
            &["resolved".to_string()],
            &["resolved".to_string(), "archive".to_string()],
            &VersionMatch::One("0.99.918".into()),
            RunMode::Automatic,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingArchiveLabels { .. }));
    }

    #[test]
    fn manual_run_with_nothing_is_combined_error() {
        let err = evaluate(
            &[],
            &required(),
            &VersionMatch::None,
            RunMode::Manual,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingArchiveVersionAndLabels));
    }

    #[test]
    fn manual_version_override_bypasses_checks() {
        let result = evaluate(&[], &required(), &VersionMatch::None, RunMode::Manual, true).unwrap();
        assert_eq!(result, Eligibility::Eligible);
    }
}
