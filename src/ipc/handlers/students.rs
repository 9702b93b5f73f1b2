use crate::auth;
use crate::ipc::helpers::{
    find_user_by_registration, opt_text, req_str, req_text, require_student, respond, user_from_row,
    with_conn, HandlerErr, HandlerResult, OrCode, USER_COLUMNS,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{GroupRole, User};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Value};

fn enrolled_course_ids(conn: &Connection, student_id: &str) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT course_id FROM enrollments WHERE student_id = ? ORDER BY course_id")
        .or_code("db_query_failed")?;
    let ids = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(ids)
}

fn handle_list(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let mut sql = format!("SELECT {} FROM users WHERE role = 'student'", USER_COLUMNS);
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(intake) = opt_text(p, "intakeId") {
        sql.push_str(" AND intake_id = ?");
        binds.push(SqlValue::Text(intake));
    }
    if let Some(course) = opt_text(p, "courseId") {
        sql.push_str(" AND id IN (SELECT student_id FROM enrollments WHERE course_id = ?)");
        binds.push(SqlValue::Text(course));
    }
    if let Some(session) = opt_text(p, "session") {
        sql.push_str(" AND session = ?");
        binds.push(SqlValue::Text(session));
    }
    if let Some(q) = opt_text(p, "search") {
        sql.push_str(" AND (lower(full_name) LIKE ? OR lower(registration_number) LIKE ?)");
        let pattern = format!("%{}%", q.to_lowercase());
        binds.push(SqlValue::Text(pattern.clone()));
        binds.push(SqlValue::Text(pattern));
    }
    sql.push_str(" ORDER BY registration_number");

    let mut stmt = conn.prepare(&sql).or_code("db_query_failed")?;
    let students: Vec<User> = stmt
        .query_map(params_from_iter(binds), user_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(json!({ "students": students }))
}

fn handle_get(conn: &Connection, req: &Request) -> HandlerResult {
    let id = req_str(&req.params, "id")?;
    let student = require_student(conn, id)?;
    let course_ids = enrolled_course_ids(conn, id)?;
    Ok(json!({ "student": student, "courseIds": course_ids }))
}

/// Applies the editable profile fields present in the request. The password
/// hash and role are changed through their own methods.
fn handle_update(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let id = req_str(p, "id")?;
    let mut student = require_student(conn, id)?;

    if p.get("registrationNumber").is_some() {
        let reg = req_text(p, "registrationNumber")?;
        if !auth::is_registration_number(&reg) {
            return Err(HandlerErr::bad_params(
                "Invalid registration number format. Use 20XX-XX-XXXXX.",
            ));
        }
        if let Some(other) = find_user_by_registration(conn, &reg)? {
            if other.id != student.id {
                return Err(HandlerErr::new(
                    "already_exists",
                    "Registration number already exists.",
                ));
            }
        }
        student.registration_number = reg;
    }
    if p.get("fullName").is_some() {
        student.full_name = req_text(p, "fullName")?;
    }
    if p.get("email").is_some() {
        student.email = req_text(p, "email")?;
    }
    if p.get("groupRole").is_some() {
        let raw = req_str(p, "groupRole")?;
        student.group_role = Some(
            GroupRole::parse(raw)
                .ok_or_else(|| HandlerErr::bad_params(format!("Invalid groupRole '{}'.", raw)))?,
        );
    }
    let optional = |key: &str, current: Option<String>| -> Option<String> {
        match p.get(key) {
            None => current,
            Some(Value::Null) => None,
            Some(_) => opt_text(p, key),
        }
    };
    student.course = optional("course", student.course.take());
    student.session = optional("session", student.session.take());
    student.year_of_study = optional("yearOfStudy", student.year_of_study.take());
    student.semester = optional("semester", student.semester.take());
    student.telephone = optional("telephone", student.telephone.take());
    student.intake_id = optional("intakeId", student.intake_id.take());

    conn.execute(
        "UPDATE users
         SET registration_number = ?, full_name = ?, email = ?, course = ?, session = ?,
             year_of_study = ?, semester = ?, telephone = ?, group_role = ?, intake_id = ?
         WHERE id = ?",
        rusqlite::params![
            student.registration_number,
            student.full_name,
            student.email,
            student.course,
            student.session,
            student.year_of_study,
            student.semester,
            student.telephone,
            student.group_role.map(GroupRole::as_str),
            student.intake_id,
            student.id,
        ],
    )
    .or_code("db_update_failed")?;
    Ok(json!({ "student": student }))
}

fn handle_delete(conn: &Connection, req: &Request) -> HandlerResult {
    let id = req_str(&req.params, "id")?;
    require_student(conn, id)?;

    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    let steps: [(&str, &str); 5] = [
        (
            "marks",
            "DELETE FROM marks WHERE enrollment_id IN (SELECT id FROM enrollments WHERE student_id = ?)",
        ),
        ("mcq_submissions", "DELETE FROM mcq_submissions WHERE student_id = ?"),
        ("group_profiles", "DELETE FROM group_profiles WHERE leader_id = ?"),
        ("enrollments", "DELETE FROM enrollments WHERE student_id = ?"),
        ("users", "DELETE FROM users WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [id]) {
            let _ = tx.rollback();
            return Err(HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": table })));
        }
    }
    tx.commit().or_code("db_tx_failed")?;
    tracing::info!(student_id = %id, "student deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => with_conn(state, |c| handle_list(c, req)),
        "students.get" => with_conn(state, |c| handle_get(c, req)),
        "students.update" => with_conn(state, |c| handle_update(c, req)),
        "students.delete" => with_conn(state, |c| handle_delete(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
