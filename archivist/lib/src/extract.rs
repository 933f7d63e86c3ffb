//! Version extraction from free text.
//!
//! Issue bodies and comment threads mention release versions in prose; the
//! pipeline pulls them out with a configurable list of regular expressions.
//! Zero matches, one match, and multiple matches are three distinct
//! outcomes: the caller decides whether "absent" is tolerable, but more
//! than one candidate is always an error — the pipeline never guesses
//! which version the author meant, because a wrong silent choice would
//! corrupt the changelog.

use regex::Regex;

use crate::error::ArchiveError;

/// Outcome of applying the extraction patterns to a text blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionMatch {
    /// No pattern matched anywhere in the text
    None,
    /// Exactly one match across all patterns
    One(String),
    /// Two or more matches; never resolved automatically
    Ambiguous(Vec<String>),
}

impl VersionMatch {
    /// True when no pattern matched.
    pub fn is_none(&self) -> bool {
        matches!(self, VersionMatch::None)
    }

    /// All candidates in match order, regardless of outcome.
    pub fn candidates(&self) -> &[String] {
        match self {
            VersionMatch::None => &[],
            VersionMatch::One(v) => std::slice::from_ref(v),
            VersionMatch::Ambiguous(vs) => vs,
        }
    }

    /// Resolve to an optional version, failing on ambiguity.
    ///
    /// `Ok(None)` means "absent" — the caller applies its own policy
    /// (tolerate, or raise a call-site-specific missing-version error).
    pub fn into_optional(self) -> Result<Option<String>, ArchiveError> {
        match self {
            VersionMatch::None => Ok(None),
            VersionMatch::One(v) => Ok(Some(v)),
            VersionMatch::Ambiguous(candidates) => {
                Err(ArchiveError::AmbiguousVersion { candidates })
            }
        }
    }
}

/// Apply `patterns` to `text` and classify the matches.
///
/// Each pattern is expected to carry exactly one capturing group; the
/// captured text is the version candidate. Candidates are collected in
/// pattern order, then match order within a pattern, and trimmed of
/// surrounding whitespace. The same routine serves both the
/// introduced-version scan (issue body) and the archive-version scan
/// (concatenated comment bodies).
pub fn extract(text: &str, patterns: &[Regex]) -> VersionMatch {
    let mut candidates: Vec<String> = Vec::new();
    for pattern in patterns {
        for captures in pattern.captures_iter(text) {
            // Fall back to the whole match when a pattern has no group.
            let matched = captures
                .get(1)
                .or_else(|| captures.get(0))
                .map(|m| m.as_str().trim().to_string());
            if let Some(candidate) = matched {
                candidates.push(candidate);
            }
        }
    }

    match candidates.len() {
        0 => VersionMatch::None,
        1 => VersionMatch::One(candidates.remove(0)),
        _ => VersionMatch::Ambiguous(candidates),
    }
}
