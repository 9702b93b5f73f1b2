use super::{BulkResult, ImportIssue, RawRow, SplitRule, Table};
use crate::model::GroupRole;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const STUDENT_REQUIRED_COLUMNS: [&str; 5] = [
    "fullName",
    "registrationNumber",
    "email",
    "password",
    "enrollCourseCodes",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRef {
    pub id: String,
    pub code: String,
}

/// Snapshot of existing users and courses an upload is checked against.
#[derive(Debug, Clone, Default)]
pub struct StudentDirectory {
    registration_numbers: HashSet<String>,
    emails: HashSet<String>,
    courses_by_code: HashMap<String, CourseRef>,
}

impl StudentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, registration_number: &str, email: &str) {
        self.registration_numbers
            .insert(registration_number.to_lowercase());
        self.emails.insert(email.to_lowercase());
    }

    pub fn add_course(&mut self, course: CourseRef) {
        self.courses_by_code.insert(course.code.clone(), course);
    }

    pub fn course(&self, code: &str) -> Option<&CourseRef> {
        self.courses_by_code.get(code)
    }

    fn has_registration_number(&self, lowered: &str) -> bool {
        self.registration_numbers.contains(lowered)
    }

    fn has_email(&self, lowered: &str) -> bool {
        self.emails.contains(lowered)
    }
}

/// Allowed values for the optional programme and session columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StudentCatalog {
    pub programmes: Vec<String>,
    pub sessions: Vec<String>,
}

impl Default for StudentCatalog {
    fn default() -> Self {
        Self {
            programmes: ["BIT", "BCS", "BCE", "BBC", "BLIS", "DCS", "DIT", "PDCS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sessions: ["DAY", "EVENING", "WEEKEND"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub full_name: String,
    pub registration_number: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub course: Option<String>,
    pub session: Option<String>,
    pub year_of_study: Option<String>,
    pub semester: Option<String>,
    pub telephone: Option<String>,
    pub group_role: GroupRole,
    pub enroll_course_codes: Vec<String>,
    #[serde(skip_serializing)]
    pub enroll_course_ids: Vec<String>,
}

/// Registration numbers and emails accepted so far in this file, plus the
/// partial result. Threaded by value through the row fold.
struct Accumulator {
    seen_registration_numbers: HashSet<String>,
    seen_emails: HashSet<String>,
    result: BulkResult<StudentRecord>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            seen_registration_numbers: HashSet::new(),
            seen_emails: HashSet::new(),
            result: BulkResult::empty(),
        }
    }

    fn accept(
        mut self,
        row: RawRow<'_>,
        directory: &StudentDirectory,
        catalog: &StudentCatalog,
    ) -> Self {
        match parse_student_row(&row, directory, catalog, &self) {
            Ok(record) => {
                self.seen_registration_numbers
                    .insert(record.registration_number.to_lowercase());
                self.seen_emails.insert(record.email.to_lowercase());
                self.result.valid_records.push(record);
            }
            Err(issue) => self.result.errors.push(issue),
        }
        self
    }
}

/// Validates a bulk registration upload. Quoted fields are honoured so the
/// `enrollCourseCodes` cell can hold a comma-separated list.
pub fn parse_students_csv(
    text: &str,
    directory: &StudentDirectory,
    catalog: &StudentCatalog,
) -> BulkResult<StudentRecord> {
    let table = match Table::parse(text, SplitRule::Quoted, &STUDENT_REQUIRED_COLUMNS) {
        Ok(t) => t,
        Err(issue) => return BulkResult::fatal(issue),
    };

    table
        .rows()
        .fold(Accumulator::new(), |acc, row| acc.accept(row, directory, catalog))
        .result
}

fn parse_student_row(
    row: &RawRow<'_>,
    directory: &StudentDirectory,
    catalog: &StudentCatalog,
    seen: &Accumulator,
) -> Result<StudentRecord, ImportIssue> {
    if let Some(field) = STUDENT_REQUIRED_COLUMNS
        .iter()
        .find(|f| row.field(f).is_empty())
    {
        return Err(ImportIssue::MissingField {
            row: row.number,
            field: *field,
        });
    }

    let registration_number = row.field("registrationNumber");
    let reg_key = registration_number.to_lowercase();
    if directory.has_registration_number(&reg_key)
        || seen.seen_registration_numbers.contains(&reg_key)
    {
        return Err(ImportIssue::DuplicateRegistrationNumber {
            row: row.number,
            value: registration_number.to_string(),
        });
    }

    let email = row.field("email");
    let email_key = email.to_lowercase();
    if directory.has_email(&email_key) || seen.seen_emails.contains(&email_key) {
        return Err(ImportIssue::DuplicateEmail {
            row: row.number,
            value: email.to_string(),
        });
    }

    let course = row.optional("course");
    if let Some(c) = &course {
        if !catalog.programmes.contains(c) {
            return Err(ImportIssue::InvalidProgramme {
                row: row.number,
                value: c.clone(),
            });
        }
    }

    let session = row.optional("session");
    if let Some(s) = &session {
        if !catalog.sessions.contains(s) {
            return Err(ImportIssue::InvalidSession {
                row: row.number,
                value: s.clone(),
            });
        }
    }

    let group_role = match row.optional("groupRole") {
        None => GroupRole::default(),
        Some(raw) => GroupRole::parse(&raw).ok_or(ImportIssue::InvalidGroupRole {
            row: row.number,
            value: raw,
        })?,
    };

    let codes: Vec<String> = row
        .field("enrollCourseCodes")
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    let mut course_ids = Vec::with_capacity(codes.len());
    for code in &codes {
        match directory.course(code) {
            Some(c) => course_ids.push(c.id.clone()),
            None => {
                return Err(ImportIssue::UnknownCourseCode {
                    row: row.number,
                    code: code.clone(),
                })
            }
        }
    }

    Ok(StudentRecord {
        full_name: row.field("fullName").to_string(),
        registration_number: registration_number.to_string(),
        email: email.to_string(),
        password: row.field("password").to_string(),
        course,
        session,
        year_of_study: row.optional("yearOfStudy"),
        semester: row.optional("semester"),
        telephone: row.optional("telephone"),
        group_role,
        enroll_course_codes: codes,
        enroll_course_ids: course_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "fullName,registrationNumber,email,password,course,session,yearOfStudy,semester,telephone,groupRole,enrollCourseCodes";

    fn directory() -> StudentDirectory {
        let mut d = StudentDirectory::new();
        d.add_user("2023-01-11111", "Existing@Example.com");
        d.add_course(CourseRef {
            id: "course-os".into(),
            code: "COS2102".into(),
        });
        d.add_course(CourseRef {
            id: "course-db".into(),
            code: "DCS1203".into(),
        });
        d
    }

    fn csv(rows: &[&str]) -> String {
        let mut s = HEADER.to_string();
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s
    }

    fn messages(r: &BulkResult<StudentRecord>) -> Vec<String> {
        r.errors.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn accepts_quoted_course_list() {
        let text = csv(&[
            r#"John Doe,2024-01-98765,john.doe@example.com,password123,BIT,DAY,1,1,0700000000,"Group Member Only","COS2102,DCS1203""#,
        ]);
        let r = parse_students_csv(&text, &directory(), &StudentCatalog::default());
        assert!(r.is_clean(), "{:?}", messages(&r));
        let rec = &r.valid_records[0];
        assert_eq!(rec.enroll_course_codes, vec!["COS2102", "DCS1203"]);
        assert_eq!(rec.enroll_course_ids, vec!["course-os", "course-db"]);
        assert_eq!(rec.group_role, GroupRole::MemberOnly);
        assert_eq!(rec.course.as_deref(), Some("BIT"));
        assert_eq!(rec.password, "password123");
    }

    #[test]
    fn group_role_defaults_and_optional_columns_may_be_absent() {
        let text = "fullName,registrationNumber,email,password,enrollCourseCodes\n\
                    Jane,2024-01-00001,jane@example.com,pw,COS2102\n";
        let r = parse_students_csv(text, &directory(), &StudentCatalog::default());
        assert!(r.is_clean(), "{:?}", messages(&r));
        let rec = &r.valid_records[0];
        assert_eq!(rec.group_role, GroupRole::MemberOnly);
        assert_eq!(rec.session, None);
        assert_eq!(rec.telephone, None);
    }

    #[test]
    fn one_bad_code_rejects_whole_row() {
        let text = csv(&[
            r#"A,2024-01-00001,a@example.com,pw,,,,,,,"COS2102,NOPE999""#,
            r#"B,2024-01-00002,b@example.com,pw,,,,,,,COS2102"#,
        ]);
        let r = parse_students_csv(&text, &directory(), &StudentCatalog::default());
        assert_eq!(r.valid_records.len(), 1);
        assert_eq!(r.valid_records[0].registration_number, "2024-01-00002");
        assert_eq!(
            messages(&r),
            vec!["Row 2: Course code 'NOPE999' in 'enrollCourseCodes' not found."]
        );
    }

    #[test]
    fn duplicates_against_directory_and_earlier_rows() {
        let text = csv(&[
            r#"A,2023-01-11111,new@example.com,pw,,,,,,,COS2102"#,
            r#"B,2024-01-00002,EXISTING@example.com,pw,,,,,,,COS2102"#,
            r#"C,2024-01-00003,c@example.com,pw,,,,,,,COS2102"#,
            r#"D,2024-01-00003,d@example.com,pw,,,,,,,COS2102"#,
            r#"E,2024-01-00005,C@EXAMPLE.COM,pw,,,,,,,COS2102"#,
        ]);
        let r = parse_students_csv(&text, &directory(), &StudentCatalog::default());
        assert_eq!(r.valid_records.len(), 1);
        assert_eq!(
            messages(&r),
            vec![
                "Row 2: Registration number '2023-01-11111' already exists.",
                "Row 3: Email 'EXISTING@example.com' already exists.",
                "Row 5: Registration number '2024-01-00003' already exists.",
                "Row 6: Email 'C@EXAMPLE.COM' already exists.",
            ]
        );
    }

    #[test]
    fn rejected_row_does_not_reserve_its_keys() {
        let text = csv(&[
            r#"A,2024-01-00001,a@example.com,pw,XYZ,,,,,,COS2102"#,
            r#"A,2024-01-00001,a@example.com,pw,BIT,,,,,,COS2102"#,
        ]);
        let r = parse_students_csv(&text, &directory(), &StudentCatalog::default());
        assert_eq!(r.valid_records.len(), 1);
        assert_eq!(messages(&r), vec!["Row 2: Invalid course 'XYZ'."]);
    }

    #[test]
    fn enumerations_are_enforced() {
        let text = csv(&[
            r#"A,2024-01-00001,a@example.com,pw,BIT,NIGHT,,,,,COS2102"#,
            r#"B,2024-01-00002,b@example.com,pw,BIT,DAY,,,,Boss,COS2102"#,
        ]);
        let r = parse_students_csv(&text, &directory(), &StudentCatalog::default());
        assert!(r.valid_records.is_empty());
        assert_eq!(
            messages(&r),
            vec![
                "Row 2: Invalid session 'NIGHT'.",
                "Row 3: Invalid groupRole 'Boss'.",
            ]
        );
    }

    #[test]
    fn missing_required_field_names_it() {
        let text = csv(&[r#"A,2024-01-00001,,pw,,,,,,,COS2102"#]);
        let r = parse_students_csv(&text, &directory(), &StudentCatalog::default());
        assert_eq!(messages(&r), vec!["Row 2: Missing required field 'email'."]);
    }

    #[test]
    fn missing_header_is_fatal() {
        let text = "fullName,registrationNumber,email,password\nA,1,a@x,pw\nB,2,b@x,pw\n";
        let r = parse_students_csv(text, &directory(), &StudentCatalog::default());
        assert!(r.valid_records.is_empty());
        assert_eq!(messages(&r), vec!["Missing required columns: enrollCourseCodes"]);
    }

    #[test]
    fn reimport_after_registration_rejects_every_row() {
        let text = csv(&[
            r#"A,2024-01-00001,a@example.com,pw,,,,,,,COS2102"#,
            r#"B,2024-01-00002,b@example.com,pw,,,,,,,DCS1203"#,
            r#"C,2024-01-00003,c@example.com,pw,,,,,,,"COS2102, DCS1203""#,
        ]);
        let mut dir = directory();
        let first = parse_students_csv(&text, &dir, &StudentCatalog::default());
        assert_eq!(first.valid_records.len(), 3);

        for rec in &first.valid_records {
            dir.add_user(&rec.registration_number, &rec.email);
        }
        let second = parse_students_csv(&text, &dir, &StudentCatalog::default());
        assert!(second.valid_records.is_empty());
        assert_eq!(second.errors.len(), 3);
    }

    #[test]
    fn custom_catalog_is_respected() {
        let catalog = StudentCatalog {
            programmes: vec!["MSC".into()],
            sessions: vec!["DAY".into()],
        };
        let text = csv(&[r#"A,2024-01-00001,a@example.com,pw,MSC,DAY,,,,,COS2102"#]);
        assert!(parse_students_csv(&text, &directory(), &catalog).is_clean());
        let text = csv(&[r#"A,2024-01-00001,a@example.com,pw,BIT,DAY,,,,,COS2102"#]);
        assert!(!parse_students_csv(&text, &directory(), &catalog).is_clean());
    }
}
