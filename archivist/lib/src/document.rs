//! The changelog document: a line-oriented markdown table mutated in place.
//!
//! The file is never parsed as markdown. Rows are located by splitting on
//! the configured separator and by substring search on the composite key
//! `{repository}#{issue_id}]`, so minor formatting drift in the table does
//! not break idempotence detection. The trailing `]` is part of the key:
//! without it, issue 12 would match inside issue 123.
//!
//! Loading takes a snapshot of every line with its original newline;
//! `save` splices pending rows immediately after the last non-blank line
//! and writes everything back, so blank lines and non-table content
//! survive byte-for-byte.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::classify::{TitleRule, process_title};
use crate::error::ArchiveError;

/// Table layout and row-rendering rules, from the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentLayout {
    /// Right-justification target width, counted in characters of the raw title
    pub pad_width: usize,
    /// Padding character (repeated)
    pub pad_char: String,
    /// Table cell separator, e.g. `|`
    pub table_separator: String,
    /// Row template with named `{placeholder}` fields
    pub row_template: String,
    /// Repository tags whose rows get a `({url})` suffix after the key
    #[serde(default)]
    pub url_suffix_repositories: Vec<String>,
    /// Per-type title rewrite rules applied at render time
    #[serde(default)]
    pub title_rules: Vec<TitleRule>,
}

/// Fields of one changelog row, before rendering.
#[derive(Debug, Clone)]
pub struct RowFields<'a> {
    pub issue_id: u64,
    pub issue_type: &'a str,
    /// Title with the type keyword already stripped; the per-type
    /// prefix/suffix rule is applied during rendering
    pub title: &'a str,
    pub repository: &'a str,
    pub issue_url: &'a str,
    pub introduced_version: &'a str,
    pub archive_version: &'a str,
}

/// In-memory snapshot of the changelog file plus not-yet-flushed rows.
///
/// Owned exclusively by one run: load, mutate via [`archive`], persist via
/// [`save`] on every exit path.
///
/// [`archive`]: ChangelogDocument::archive
/// [`save`]: ChangelogDocument::save
#[derive(Debug)]
pub struct ChangelogDocument {
    path: PathBuf,
    /// Every line of the file, each retaining its trailing newline (the
    /// final line may lack one, as in the source file)
    lines: Vec<String>,
    /// New rows waiting to be spliced in after the last table row
    pending: Vec<String>,
}

impl ChangelogDocument {
    /// Load the document. A missing file is fatal: there is nothing to
    /// mutate and creating an empty changelog silently would hide a
    /// misconfigured path.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let path = path.into();
        info!(path = %path.display(), "loading changelog document");
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::DocumentNotFound { path: path.clone() }
            } else {
                ArchiveError::Io(e)
            }
        })?;
        let lines = content.split_inclusive('\n').map(str::to_string).collect();
        Ok(Self {
            path,
            lines,
            pending: Vec::new(),
        })
    }

    fn composite_key(repository: &str, issue_id: u64) -> String {
        format!("{repository}#{issue_id}]")
    }

    /// Whether a row for this issue already exists — the idempotence check
    /// that prevents double-archiving.
    pub fn record_exists(&self, repository: &str, issue_id: u64) -> bool {
        let key = Self::composite_key(repository, issue_id);
        let found = self
            .lines
            .iter()
            .chain(self.pending.iter())
            .any(|line| line.contains(&key));
        if found {
            info!(issue_id, repository, "issue already present in the archive");
        } else {
            debug!(issue_id, repository, "issue not present in the archive");
        }
        found
    }

    /// Index of the last non-blank line. Trailing blank lines are common
    /// in markdown files and must not be mistaken for table rows.
    fn last_row_index(&self) -> Option<usize> {
        self.lines.iter().rposition(|line| !line.trim().is_empty())
    }

    /// Sequence number in the first cell of `line`, if it parses.
    fn sequence_of_line(line: &str, separator: &str) -> Option<u64> {
        let mut cells = line.split(separator);
        cells.next()?;
        cells.next()?.trim().parse().ok()
    }

    /// Sequence number of the last table row. A malformed cell is
    /// recovered leniently: warn and treat as zero, so a damaged table
    /// still lets the next row land as sequence one.
    fn last_sequence_number(&self, separator: &str) -> u64 {
        let Some(index) = self.last_row_index() else {
            return 0;
        };
        let line = &self.lines[index];
        match Self::sequence_of_line(line, separator) {
            Some(seq) => seq,
            None => {
                warn!(
                    line = line.trim_end(),
                    "last table row has no parsable sequence number, continuing from zero"
                );
                0
            }
        }
    }

    fn next_sequence(&self, separator: &str) -> u64 {
        if let Some(last_pending) = self.pending.last()
            && let Some(seq) = Self::sequence_of_line(last_pending, separator)
        {
            return seq + 1;
        }
        self.last_sequence_number(separator) + 1
    }

    fn render_row(layout: &DocumentLayout, fields: &RowFields<'_>, sequence: u64) -> String {
        let pad_count = layout
            .pad_width
            .saturating_sub(fields.title.chars().count());
        let url_suffix = if layout
            .url_suffix_repositories
            .iter()
            .any(|r| r == fields.repository)
        {
            format!("({})", fields.issue_url)
        } else {
            String::new()
        };
        let mut row = layout
            .row_template
            .replace("{table_id}", &sequence.to_string())
            .replace("{issue_type}", fields.issue_type)
            .replace(
                "{issue_title}",
                &process_title(fields.title, fields.issue_type, &layout.title_rules),
            )
            .replace("{rjust_space}", &layout.pad_char.repeat(pad_count))
            .replace("{issue_repository}", fields.repository)
            .replace("{issue_id}", &fields.issue_id.to_string())
            .replace("{issue_url_suffix}", &url_suffix)
            .replace("{introduced_version}", fields.introduced_version)
            .replace("{archive_version}", fields.archive_version);
        if !row.ends_with('\n') {
            row.push('\n');
        }
        row
    }

    /// Record one issue in the table.
    ///
    /// With `replace_mode` false the row is always appended with the next
    /// sequence number. With `replace_mode` true an existing row for the
    /// same composite key is rewritten in place, keeping its original
    /// sequence number — manual re-runs correct entries without
    /// renumbering the table — and when no row matches, the call falls
    /// through to a plain append. The caller cannot always know in
    /// advance which of the two applies.
    pub fn archive(&mut self, fields: &RowFields<'_>, layout: &DocumentLayout, replace_mode: bool) {
        let separator = &layout.table_separator;
        if replace_mode {
            let key = Self::composite_key(fields.repository, fields.issue_id);
            if let Some(index) = self.lines.iter().position(|line| line.contains(&key)) {
                let sequence = Self::sequence_of_line(&self.lines[index], separator)
                    .unwrap_or_else(|| {
                        warn!("replaced row has no parsable sequence number");
                        self.next_sequence(separator)
                    });
                info!(issue_id = fields.issue_id, sequence, "replacing archive row");
                self.lines[index] = Self::render_row(layout, fields, sequence);
                return;
            }
            if let Some(index) = self.pending.iter().position(|line| line.contains(&key)) {
                let sequence = Self::sequence_of_line(&self.pending[index], separator)
                    .unwrap_or_else(|| self.next_sequence(separator));
                self.pending[index] = Self::render_row(layout, fields, sequence);
                return;
            }
        }
        let sequence = self.next_sequence(separator);
        info!(issue_id = fields.issue_id, sequence, "appending archive row");
        self.pending.push(Self::render_row(layout, fields, sequence));
    }

    /// Write the document back: original lines with pending rows spliced
    /// in immediately after the last non-blank line.
    pub fn save(&mut self) -> Result<(), ArchiveError> {
        if !self.pending.is_empty() {
            let insert_at = match self.last_row_index() {
                Some(index) => index + 1,
                None => self.lines.len(),
            };
            if insert_at > 0
                && let Some(previous) = self.lines.get_mut(insert_at - 1)
                && !previous.ends_with('\n')
            {
                previous.push('\n');
            }
            let pending = std::mem::take(&mut self.pending);
            self.lines.splice(insert_at..insert_at, pending);
        }
        fs::write(&self.path, self.lines.concat())?;
        info!(path = %self.path.display(), "changelog document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TEMPLATE: &str = "|{table_id}|({issue_type}){issue_title}{rjust_space}\
                            [{issue_repository}#{issue_id}]{issue_url_suffix} \
                            |{introduced_version}|{archive_version}|";

    fn layout() -> DocumentLayout {
        DocumentLayout {
            pad_width: 0,
            pad_char: " ".to_string(),
            table_separator: "|".to_string(),
            row_template: TEMPLATE.to_string(),
            url_suffix_repositories: vec!["外部Issue".to_string()],
            title_rules: vec![TitleRule {
                issue_type: "Bug修复".to_string(),
                add_prefix: "修复了".to_string(),
                add_suffix: "的Bug".to_string(),
                remove_keywords: vec![],
            }],
        }
    }

    fn seeded_document(content: &str) -> (NamedTempFile, ChangelogDocument) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let document = ChangelogDocument::load(file.path()).unwrap();
        (file, document)
    }

    const SEEDED: &str = "\
# 历史修改归档\n\
\n\
|序号|描述|引入版本号|归档版本号|\n\
|----|----|---------|----------|\n\
|1|(Bug修复)修复了旧问题的Bug[外部Issue#1](https://api.example.com/issues/1) |0.99.914|0.99.915|\n\
\n";

    fn fields<'a>(issue_id: u64, repository: &'a str, url: &'a str) -> RowFields<'a> {
        RowFields {
            issue_id,
            issue_type: "Bug修复",
            title: "测试标题",
            repository,
            issue_url: url,
            introduced_version: "0.99.914",
            archive_version: "0.99.915",
        }
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = ChangelogDocument::load("/nonexistent/CHANGELOG.md").unwrap_err();
        assert!(matches!(err, ArchiveError::DocumentNotFound { .. }));
    }

    #[test]
    fn record_exists_requires_closing_bracket() {
        let (_file, document) = seeded_document("text [外部Issue#5] more\n");
        assert!(document.record_exists("外部Issue", 5));
        // Issue 50 must not match inside the id 5 row, and 5 must not
        // match a hypothetical 5x row.
        assert!(!document.record_exists("外部Issue", 50));
        assert!(!document.record_exists("内部Issue", 5));
    }

    #[test]
    fn record_exists_does_not_match_numeric_prefix() {
        let (_file, document) = seeded_document("[外部Issue#123]\n");
        assert!(document.record_exists("外部Issue", 123));
        assert!(!document.record_exists("外部Issue", 12));
        assert!(!document.record_exists("外部Issue", 1234));
    }

    #[test]
    fn append_renders_with_next_sequence_and_url_suffix() {
        let (_file, mut document) = seeded_document(SEEDED);
        document.archive(
            &fields(2, "外部Issue", "https://api.example.com/issues/2"),
            &layout(),
            false,
        );
        assert_eq!(
            document.pending[0],
            "|2|(Bug修复)修复了测试标题的Bug[外部Issue#2](https://api.example.com/issues/2) |0.99.914|0.99.915|\n"
        );
    }

    #[test]
    fn unconfigured_repository_gets_no_url_suffix() {
        let (_file, mut document) = seeded_document(SEEDED);
        document.archive(
            &fields(3, "内部Issue", "https://api.example.com/issues/3"),
            &layout(),
            false,
        );
        assert_eq!(
            document.pending[0],
            "|2|(Bug修复)修复了测试标题的Bug[内部Issue#3] |0.99.914|0.99.915|\n"
        );
    }

    #[test]
    fn replace_keeps_original_sequence_number() {
        let (_file, mut document) = seeded_document(SEEDED);
        document.archive(
            &fields(1, "外部Issue", "https://api.example.com/issues/2"),
            &layout(),
            true,
        );
        // Row 1 rewritten in place, still sequence 1.
        assert!(document.pending.is_empty());
        assert_eq!(
            document.lines[4],
            "|1|(Bug修复)修复了测试标题的Bug[外部Issue#1](https://api.example.com/issues/2) |0.99.914|0.99.915|\n"
        );
    }

    #[test]
    fn replace_falls_through_to_append_when_key_absent() {
        let (_file, mut document) = seeded_document(SEEDED);
        document.archive(
            &fields(2, "外部Issue", "https://api.example.com/issues/2"),
            &layout(),
            true,
        );
        assert_eq!(document.pending.len(), 1);
        assert!(document.pending[0].starts_with("|2|"));
    }

    #[test]
    fn double_archive_in_replace_mode_is_idempotent() {
        let (file, mut document) = seeded_document(SEEDED);
        let layout = layout();
        let row = fields(2, "外部Issue", "https://api.example.com/issues/2");
        document.archive(&row, &layout, true);
        document.archive(&row, &layout, true);
        document.save().unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        let occurrences = content.matches("[外部Issue#2]").count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn appended_sequences_are_strictly_increasing() {
        let (file, mut document) = seeded_document("intro text, no table yet\n");
        let layout = layout();
        for issue_id in 10..13 {
            document.archive(&fields(issue_id, "内部Issue", ""), &layout, false);
        }
        document.save().unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        for (expected, issue_id) in (1..=3).zip(10..13) {
            assert!(content.contains(&format!("|{expected}|(Bug修复)")));
            assert!(content.contains(&format!("[内部Issue#{issue_id}]")));
        }
    }

    #[test]
    fn malformed_last_sequence_defaults_to_one() {
        // The header separator row has no numeric first cell; the next
        // appended row still lands as sequence 1.
        let (_file, mut document) =
            seeded_document("|序号|描述|\n|----|----|\n");
        document.archive(&fields(9, "内部Issue", ""), &layout(), false);
        assert!(document.pending[0].starts_with("|1|"));
    }

    #[test]
    fn save_without_mutation_preserves_bytes() {
        let content = "# title\n\n|1|row|\n\n\n";
        let (file, mut document) = seeded_document(content);
        document.save().unwrap();
        assert_eq!(fs::read_to_string(file.path()).unwrap(), content);
    }

    #[test]
    fn save_splices_after_last_row_keeping_trailing_blanks() {
        let (file, mut document) = seeded_document(SEEDED);
        document.archive(
            &fields(2, "外部Issue", "https://api.example.com/issues/2"),
            &layout(),
            false,
        );
        document.save().unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        assert!(lines[4].starts_with("|1|"));
        assert!(lines[5].starts_with("|2|"));
        // The trailing blank line stays at the end.
        assert_eq!(lines[6], "\n");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn save_repairs_missing_final_newline_before_splicing() {
        let (file, mut document) = seeded_document("|1|only row|x|y|");
        document.archive(&fields(4, "内部Issue", ""), &layout(), false);
        document.save().unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("|1|only row|x|y|\n|2|"));
    }

    #[test]
    fn padding_counts_characters_of_raw_title() {
        let mut layout = layout();
        layout.pad_width = 8;
        layout.title_rules.clear();
        let (_file, mut document) = seeded_document("|1|x|\n");
        document.archive(
            &RowFields {
                title: "四个字符",
                ..fields(5, "内部Issue", "")
            },
            &layout,
            false,
        );
        // 8 - 4 characters = 4 spaces of padding.
        assert!(document.pending[0].contains("四个字符    ["));
    }

    #[test]
    fn reload_after_save_sees_new_record() {
        let (file, mut document) = seeded_document(SEEDED);
        document.archive(
            &fields(2, "外部Issue", "https://api.example.com/issues/2"),
            &layout(),
            false,
        );
        document.save().unwrap();

        let reloaded = ChangelogDocument::load(file.path()).unwrap();
        assert!(reloaded.record_exists("外部Issue", 2));
    }
}
