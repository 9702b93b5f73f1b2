use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fresh row id with a table prefix, e.g. `course-3f2b...`.
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Coordinator,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Coordinator => "coordinator",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "coordinator" => Some(Role::Coordinator),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GroupRole {
    #[default]
    #[serde(rename = "Group Member Only")]
    MemberOnly,
    #[serde(rename = "Group Leader")]
    Leader,
}

impl GroupRole {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupRole::MemberOnly => "Group Member Only",
            GroupRole::Leader => "Group Leader",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Group Member Only" => Some(GroupRole::MemberOnly),
            "Group Leader" => Some(GroupRole::Leader),
            _ => None,
        }
    }
}

/// A row of the `users` table. The password hash and reset token never leave
/// the daemon; they are skipped on serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub registration_number: String,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub course: Option<String>,
    pub session: Option<String>,
    pub year_of_study: Option<String>,
    pub semester: Option<String>,
    pub telephone: Option<String>,
    pub group_role: Option<GroupRole>,
    pub force_password_change: bool,
    pub managed_course_id: Option<String>,
    pub managed_session: Option<String>,
    pub intake_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intake {
    pub id: String,
    pub name: String,
    pub description: String,
    pub academic_year: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub course_code: String,
    pub course_name: String,
    pub credit_hours: Option<i64>,
    pub semester: String,
    pub academic_year: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkComponents {
    pub cats: i64,
    pub coursework: i64,
    pub final_exam: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub id: String,
    pub enrollment_id: String,
    pub cats: i64,
    pub coursework: i64,
    pub final_exam: i64,
}

impl Mark {
    /// Marks are keyed by their enrollment so repeated saves upsert in place.
    pub fn id_for(enrollment_id: &str) -> String {
        format!("mark-{}", enrollment_id)
    }

    pub fn components(&self) -> MarkComponents {
        MarkComponents {
            cats: self.cats,
            coursework: self.coursework,
            final_exam: self.final_exam,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McqTest {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: String,
    pub duration_minutes: i64,
    pub due_date: String,
    pub questions: Vec<Question>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSubmission {
    pub id: String,
    pub test_id: String,
    pub student_id: String,
    pub answers: Vec<i64>,
    pub score: i64,
    pub total_questions: i64,
    pub submitted_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: String,
    pub full_name: String,
    pub registration_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProfile {
    pub leader_id: String,
    pub group_name: String,
    pub project_brief: String,
    pub members: Vec<GroupMember>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub message: String,
    pub timestamp: String,
    pub is_read: bool,
}
