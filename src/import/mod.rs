//! CSV bulk import: marks for one course, and new students with their
//! enrollments.
//!
//! Both variants validate every row before anything is written. The result
//! carries the accepted records and one line-numbered issue per rejected row;
//! the caller decides whether to apply the valid subset.

mod marks;
mod students;
mod template;
mod tokenizer;

pub use marks::{parse_marks_csv, CourseRoster, EnrolledStudent, MarkRecord, MARKS_REQUIRED_COLUMNS};
pub use students::{
    parse_students_csv, CourseRef, StudentCatalog, StudentDirectory, StudentRecord,
    STUDENT_REQUIRED_COLUMNS,
};
pub use template::{write_marks_template, write_students_template};

use crate::grading::MarkRangeError;
use serde::{Serialize, Serializer};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportIssue {
    #[error("Error reading file.")]
    Unreadable,
    #[error("CSV file is empty or has no data rows.")]
    NoDataRows,
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Row {row}: Missing registrationNumber.")]
    MissingRegistrationNumber { row: usize },
    #[error("Row {row}: Student with registration number '{registration_number}' is not enrolled in this course.")]
    NotEnrolled {
        row: usize,
        registration_number: String,
    },
    #[error("Row {row}: Marks for '{registration_number}' must be numbers.")]
    NonNumericMarks {
        row: usize,
        registration_number: String,
    },
    #[error("Row {row} ('{registration_number}'): {source}")]
    MarkOutOfRange {
        row: usize,
        registration_number: String,
        source: MarkRangeError,
    },

    #[error("Row {row}: Missing required field '{field}'.")]
    MissingField { row: usize, field: &'static str },
    #[error("Row {row}: Registration number '{value}' already exists.")]
    DuplicateRegistrationNumber { row: usize, value: String },
    #[error("Row {row}: Email '{value}' already exists.")]
    DuplicateEmail { row: usize, value: String },
    #[error("Row {row}: Invalid course '{value}'.")]
    InvalidProgramme { row: usize, value: String },
    #[error("Row {row}: Invalid session '{value}'.")]
    InvalidSession { row: usize, value: String },
    #[error("Row {row}: Invalid groupRole '{value}'.")]
    InvalidGroupRole { row: usize, value: String },
    #[error("Row {row}: Course code '{code}' in 'enrollCourseCodes' not found.")]
    UnknownCourseCode { row: usize, code: String },
}

impl ImportIssue {
    /// Line number for row-level issues, `None` for file-level ones.
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::Unreadable | Self::NoDataRows | Self::MissingColumns(_) => None,
            Self::MissingRegistrationNumber { row }
            | Self::NotEnrolled { row, .. }
            | Self::NonNumericMarks { row, .. }
            | Self::MarkOutOfRange { row, .. }
            | Self::MissingField { row, .. }
            | Self::DuplicateRegistrationNumber { row, .. }
            | Self::DuplicateEmail { row, .. }
            | Self::InvalidProgramme { row, .. }
            | Self::InvalidSession { row, .. }
            | Self::InvalidGroupRole { row, .. }
            | Self::UnknownCourseCode { row, .. } => Some(*row),
        }
    }
}

impl Serialize for ImportIssue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult<T> {
    pub valid_records: Vec<T>,
    pub errors: Vec<ImportIssue>,
}

impl<T> BulkResult<T> {
    pub fn empty() -> Self {
        Self {
            valid_records: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// A file-level failure: one issue, no records.
    pub fn fatal(issue: ImportIssue) -> Self {
        Self {
            valid_records: Vec::new(),
            errors: vec![issue],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, outcome: Result<T, ImportIssue>) {
        match outcome {
            Ok(record) => self.valid_records.push(record),
            Err(issue) => self.errors.push(issue),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SplitRule {
    Plain,
    Quoted,
}

impl SplitRule {
    fn split(self, line: &str) -> Vec<String> {
        match self {
            SplitRule::Plain => tokenizer::split_plain(line),
            SplitRule::Quoted => tokenizer::split_quoted(line),
        }
    }
}

/// One data row addressed by header name.
pub(crate) struct RawRow<'h> {
    pub number: usize,
    headers: &'h [String],
    fields: Vec<String>,
}

impl RawRow<'_> {
    /// Value of `column`, or `""` when the row is short.
    pub fn field(&self, column: &str) -> &str {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.fields.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn optional(&self, column: &str) -> Option<String> {
        let v = self.field(column);
        if v.is_empty() {
            None
        } else {
            Some(v.to_string())
        }
    }
}

pub(crate) struct Table {
    headers: Vec<String>,
    lines: Vec<(usize, String)>,
    rule: SplitRule,
}

impl Table {
    /// Splits `text` into header and data lines and checks the required
    /// columns. Any failure here rejects the whole file.
    pub fn parse(text: &str, rule: SplitRule, required: &[&str]) -> Result<Self, ImportIssue> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .filter(|l| !l.trim().is_empty());

        let Some(header_line) = lines.next() else {
            return Err(ImportIssue::NoDataRows);
        };
        // Row numbers count non-blank lines, header included, from 1.
        let data: Vec<(usize, String)> = lines
            .enumerate()
            .map(|(i, l)| (i + 2, l.to_string()))
            .collect();
        if data.is_empty() {
            return Err(ImportIssue::NoDataRows);
        }

        let headers = rule.split(header_line);
        let missing: Vec<String> = required
            .iter()
            .filter(|r| !headers.iter().any(|h| h.as_str() == **r))
            .map(|r| r.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ImportIssue::MissingColumns(missing));
        }

        Ok(Self {
            headers,
            lines: data,
            rule,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = RawRow<'_>> + '_ {
        self.lines.iter().map(move |(number, line)| RawRow {
            number: *number,
            headers: &self.headers,
            fields: self.rule.split(line),
        })
    }
}

/// Reads an uploaded file. Any I/O failure maps to the single
/// [`ImportIssue::Unreadable`] issue.
pub fn read_csv_file(path: &Path) -> Result<String, ImportIssue> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "csv file unreadable");
            Err(ImportIssue::Unreadable)
        }
    }
}
