use super::{BulkResult, ImportIssue, RawRow, SplitRule, Table};
use crate::grading::MaxMarks;
use crate::model::MarkComponents;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MARKS_REQUIRED_COLUMNS: [&str; 4] =
    ["registrationNumber", "cats", "coursework", "finalExam"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrolledStudent {
    pub enrollment_id: String,
    pub registration_number: String,
    pub full_name: String,
}

/// Students currently enrolled in one course, keyed by lowercased
/// registration number.
#[derive(Debug, Clone, Default)]
pub struct CourseRoster {
    by_registration: BTreeMap<String, EnrolledStudent>,
}

impl CourseRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, student: EnrolledStudent) {
        self.by_registration
            .insert(student.registration_number.to_lowercase(), student);
    }

    pub fn lookup(&self, registration_number: &str) -> Option<&EnrolledStudent> {
        self.by_registration
            .get(&registration_number.to_lowercase())
    }

    /// Enrolled students ordered by registration number.
    pub fn students(&self) -> impl Iterator<Item = &EnrolledStudent> {
        self.by_registration.values()
    }

    pub fn len(&self) -> usize {
        self.by_registration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_registration.is_empty()
    }
}

impl FromIterator<EnrolledStudent> for CourseRoster {
    fn from_iter<I: IntoIterator<Item = EnrolledStudent>>(iter: I) -> Self {
        let mut roster = CourseRoster::new();
        for s in iter {
            roster.insert(s);
        }
        roster
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub enrollment_id: String,
    pub cats: i64,
    pub coursework: i64,
    pub final_exam: i64,
}

impl MarkRecord {
    pub fn components(&self) -> MarkComponents {
        MarkComponents {
            cats: self.cats,
            coursework: self.coursework,
            final_exam: self.final_exam,
        }
    }
}

/// Validates a marks upload for one course against its roster.
pub fn parse_marks_csv(text: &str, roster: &CourseRoster, max_marks: &MaxMarks) -> BulkResult<MarkRecord> {
    let table = match Table::parse(text, SplitRule::Plain, &MARKS_REQUIRED_COLUMNS) {
        Ok(t) => t,
        Err(issue) => return BulkResult::fatal(issue),
    };

    let mut result = BulkResult::empty();
    for row in table.rows() {
        result.push(parse_mark_row(&row, roster, max_marks));
    }
    result
}

fn parse_mark_row(
    row: &RawRow<'_>,
    roster: &CourseRoster,
    max_marks: &MaxMarks,
) -> Result<MarkRecord, ImportIssue> {
    let registration_number = row.field("registrationNumber");
    if registration_number.is_empty() {
        return Err(ImportIssue::MissingRegistrationNumber { row: row.number });
    }

    let Some(student) = roster.lookup(registration_number) else {
        return Err(ImportIssue::NotEnrolled {
            row: row.number,
            registration_number: registration_number.to_string(),
        });
    };

    let parsed = (
        row.field("cats").parse::<i64>(),
        row.field("coursework").parse::<i64>(),
        row.field("finalExam").parse::<i64>(),
    );
    let (Ok(cats), Ok(coursework), Ok(final_exam)) = parsed else {
        return Err(ImportIssue::NonNumericMarks {
            row: row.number,
            registration_number: registration_number.to_string(),
        });
    };

    let record = MarkRecord {
        enrollment_id: student.enrollment_id.clone(),
        cats,
        coursework,
        final_exam,
    };
    max_marks
        .validate(&record.components())
        .map_err(|source| ImportIssue::MarkOutOfRange {
            row: row.number,
            registration_number: registration_number.to_string(),
            source,
        })?;

    Ok(record)
}
