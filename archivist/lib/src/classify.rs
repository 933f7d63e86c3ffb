//! Issue type classification and title processing.
//!
//! Two classification channels exist: label-based (optional, first
//! configured rule whose label the issue carries wins) and title-keyword
//! based (mandatory where used, since label-less trackers have nothing
//! else to go on). Keyword stripping removes at most one marker: a title
//! carrying several type keywords cannot be classified reliably, so only
//! the first configured match is taken out.

use serde::Deserialize;

use crate::error::ArchiveError;

/// Maps a tracker label to an issue type. Rule order is the configured
/// priority order.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LabelRule {
    pub label: String,
    pub issue_type: String,
}

/// Maps a literal title keyword (e.g. `#Bug#`) to an issue type.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct KeywordRule {
    pub keyword: String,
    pub issue_type: String,
}

/// Per-type title rewrite applied when formatting the changelog row.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TitleRule {
    pub issue_type: String,
    #[serde(default)]
    pub add_prefix: String,
    #[serde(default)]
    pub add_suffix: String,
    #[serde(default)]
    pub remove_keywords: Vec<String>,
}

/// First rule whose label the issue carries wins; no match is not an
/// error — label classification is an optional channel.
pub fn type_from_labels(issue_labels: &[String], rules: &[LabelRule]) -> Option<String> {
    rules
        .iter()
        .find(|rule| issue_labels.iter().any(|l| l == &rule.label))
        .map(|rule| rule.issue_type.clone())
}

/// First keyword found as a literal substring of the title wins.
/// No match is a hard error: where title classification runs, there are
/// no labels to fall back on.
pub fn type_from_title(title: &str, rules: &[KeywordRule]) -> Result<String, ArchiveError> {
    rules
        .iter()
        .find(|rule| title.contains(&rule.keyword))
        .map(|rule| rule.issue_type.clone())
        .ok_or_else(|| ArchiveError::MissingIssueType {
            known: rules.iter().map(|r| r.keyword.clone()).collect(),
        })
}

/// Remove the first matching type keyword from the title and trim.
pub fn strip_type_keyword(title: &str, rules: &[KeywordRule]) -> String {
    for rule in rules {
        if title.contains(&rule.keyword) {
            return title.replacen(&rule.keyword, "", 1).trim().to_string();
        }
    }
    title.to_string()
}

/// Apply the per-type rewrite rule: drop each configured keyword, then
/// wrap with prefix and suffix. A type with no rule passes through.
pub fn process_title(title: &str, issue_type: &str, rules: &[TitleRule]) -> String {
    let Some(rule) = rules.iter().find(|r| r.issue_type == issue_type) else {
        return title.to_string();
    };
    let mut result = title.to_string();
    for keyword in &rule.remove_keywords {
        result = result.replace(keyword.as_str(), "");
    }
    format!("{}{}{}", rule.add_prefix, result, rule.add_suffix)
}
