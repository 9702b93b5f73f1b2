use super::error::{err, ok};
use super::types::AppState;
use crate::model::{GroupRole, Role, User};
use crate::settings::LoadError;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Display;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub type HandlerResult = Result<Value, HandlerErr>;

impl From<LoadError> for HandlerErr {
    fn from(e: LoadError) -> Self {
        HandlerErr::new(e.code(), format!("{:#}", e))
    }
}

/// Maps any displayable failure onto an IPC error code. Alternate formatting
/// keeps anyhow context chains in the message.
pub trait OrCode<T> {
    fn or_code(self, code: &'static str) -> Result<T, HandlerErr>;
}

impl<T, E: Display> OrCode<T> for Result<T, E> {
    fn or_code(self, code: &'static str) -> Result<T, HandlerErr> {
        self.map_err(|e| HandlerErr::new(code, format!("{:#}", e)))
    }
}

pub fn respond(id: &str, result: HandlerResult) -> Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => {
            if e.code.starts_with("db_") {
                tracing::warn!(code = e.code, message = %e.message, "store failure");
            }
            e.response(id)
        }
    }
}

pub fn with_conn<F>(state: &AppState, f: F) -> HandlerResult
where
    F: FnOnce(&Connection) -> HandlerResult,
{
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    f(conn)
}

pub fn req_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Required string, trimmed, rejected when blank.
pub fn req_text(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = req_str(params, key)?.trim();
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s.to_string())
}

/// Optional string; `null`, absent and blank all read as `None`.
pub fn opt_text(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn req_i64(params: &Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key)))
}

pub fn req_str_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(arr) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must contain only strings", key)))
        })
        .collect()
}

pub fn parse_param<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    serde_json::from_value(v.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", key, e)))
}

pub fn to_json<T: serde::Serialize>(value: &T) -> HandlerResult {
    serde_json::to_value(value).or_code("internal")
}

pub const USER_COLUMNS: &str = "id, registration_number, full_name, email, password_hash, role, \
     course, session, year_of_study, semester, telephone, group_role, force_password_change, \
     managed_course_id, managed_session, intake_id";

pub fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = r.get(5)?;
    let group_role: Option<String> = r.get(11)?;
    Ok(User {
        id: r.get(0)?,
        registration_number: r.get(1)?,
        full_name: r.get(2)?,
        email: r.get(3)?,
        password_hash: r.get(4)?,
        role: Role::parse(&role).unwrap_or(Role::Student),
        course: r.get(6)?,
        session: r.get(7)?,
        year_of_study: r.get(8)?,
        semester: r.get(9)?,
        telephone: r.get(10)?,
        group_role: group_role.as_deref().and_then(GroupRole::parse),
        force_password_change: r.get::<_, i64>(12)? != 0,
        managed_course_id: r.get(13)?,
        managed_session: r.get(14)?,
        intake_id: r.get(15)?,
    })
}

pub fn find_user(conn: &Connection, user_id: &str) -> Result<Option<User>, HandlerErr> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    conn.query_row(&sql, [user_id], user_from_row)
        .optional()
        .or_code("db_query_failed")
}

pub fn find_user_by_registration(
    conn: &Connection,
    registration_number: &str,
) -> Result<Option<User>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM users WHERE lower(registration_number) = lower(?)",
        USER_COLUMNS
    );
    conn.query_row(&sql, [registration_number.trim()], user_from_row)
        .optional()
        .or_code("db_query_failed")
}

pub fn require_student(conn: &Connection, student_id: &str) -> Result<User, HandlerErr> {
    match find_user(conn, student_id)? {
        Some(u) if u.role == Role::Student => Ok(u),
        _ => Err(HandlerErr::not_found("student not found")),
    }
}

pub fn require_course(conn: &Connection, course_id: &str) -> Result<(), HandlerErr> {
    if crate::roster::course_exists(conn, course_id).or_code("db_query_failed")? {
        Ok(())
    } else {
        Err(HandlerErr::not_found("course not found").with_details(serde_json::json!({ "courseId": course_id })))
    }
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
