use crate::ipc::helpers::{
    opt_text, req_str, req_text, respond, with_conn, HandlerErr, HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, Course};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

fn course_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: r.get(0)?,
        course_code: r.get(1)?,
        course_name: r.get(2)?,
        credit_hours: r.get(3)?,
        semester: r.get(4)?,
        academic_year: r.get(5)?,
    })
}

pub(crate) fn find_course(conn: &Connection, id: &str) -> Result<Option<Course>, HandlerErr> {
    conn.query_row(
        "SELECT id, course_code, course_name, credit_hours, semester, academic_year
         FROM courses WHERE id = ?",
        [id],
        course_from_row,
    )
    .optional()
    .or_code("db_query_failed")
}

fn code_taken(conn: &Connection, code: &str, except_id: &str) -> Result<bool, HandlerErr> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM courses WHERE course_code = ? AND id <> ?",
            (code, except_id),
            |r| r.get(0),
        )
        .or_code("db_query_failed")?;
    Ok(n > 0)
}

fn credit_hours(p: &Value, fallback: Option<i64>) -> Result<Option<i64>, HandlerErr> {
    match p.get("creditHours") {
        None => Ok(fallback),
        Some(Value::Null) => Ok(None),
        Some(v) => match v.as_i64() {
            Some(n) if n >= 0 => Ok(Some(n)),
            _ => Err(HandlerErr::bad_params(
                "creditHours must be a non-negative integer",
            )),
        },
    }
}

fn handle_list(conn: &Connection) -> HandlerResult {
    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.course_code, c.course_name, c.credit_hours, c.semester, c.academic_year,
                    (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled
             FROM courses c
             ORDER BY c.course_code",
        )
        .or_code("db_query_failed")?;
    let courses = stmt
        .query_map([], |r| {
            let course = course_from_row(r)?;
            let enrolled: i64 = r.get(6)?;
            let mut v = serde_json::to_value(&course).unwrap_or(Value::Null);
            v["enrolledCount"] = json!(enrolled);
            Ok(v)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(json!({ "courses": courses }))
}

fn handle_create(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let course = Course {
        id: new_id("course"),
        course_code: req_text(p, "courseCode")?,
        course_name: req_text(p, "courseName")?,
        credit_hours: credit_hours(p, None)?,
        semester: opt_text(p, "semester").unwrap_or_default(),
        academic_year: opt_text(p, "academicYear").unwrap_or_default(),
    };
    if code_taken(conn, &course.course_code, &course.id)? {
        return Err(HandlerErr::new("already_exists", "course code already exists")
            .with_details(json!({ "courseCode": course.course_code })));
    }
    conn.execute(
        "INSERT INTO courses(id, course_code, course_name, credit_hours, semester, academic_year)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &course.id,
            &course.course_code,
            &course.course_name,
            course.credit_hours,
            &course.semester,
            &course.academic_year,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "courses" }))
    })?;
    tracing::info!(course = %course.course_code, "course created");
    Ok(json!({ "course": course }))
}

fn handle_update(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let id = req_str(p, "id")?;
    let Some(current) = find_course(conn, id)? else {
        return Err(HandlerErr::not_found("course not found"));
    };
    let next = Course {
        course_code: match p.get("courseCode") {
            Some(_) => req_text(p, "courseCode")?,
            None => current.course_code,
        },
        course_name: match p.get("courseName") {
            Some(_) => req_text(p, "courseName")?,
            None => current.course_name,
        },
        credit_hours: credit_hours(p, current.credit_hours)?,
        semester: opt_text(p, "semester").unwrap_or(current.semester),
        academic_year: opt_text(p, "academicYear").unwrap_or(current.academic_year),
        id: current.id,
    };
    if code_taken(conn, &next.course_code, &next.id)? {
        return Err(HandlerErr::new("already_exists", "course code already exists")
            .with_details(json!({ "courseCode": next.course_code })));
    }
    conn.execute(
        "UPDATE courses
         SET course_code = ?, course_name = ?, credit_hours = ?, semester = ?, academic_year = ?
         WHERE id = ?",
        (
            &next.course_code,
            &next.course_name,
            next.credit_hours,
            &next.semester,
            &next.academic_year,
            &next.id,
        ),
    )
    .or_code("db_update_failed")?;
    Ok(json!({ "course": next }))
}

fn handle_delete(conn: &Connection, req: &Request) -> HandlerResult {
    let id = req_str(&req.params, "id")?;
    if find_course(conn, id)?.is_none() {
        return Err(HandlerErr::not_found("course not found"));
    }

    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    // Dependents first; there is no ON DELETE CASCADE.
    let steps: [(&str, &str); 7] = [
        (
            "marks",
            "DELETE FROM marks WHERE enrollment_id IN (SELECT id FROM enrollments WHERE course_id = ?)",
        ),
        (
            "mcq_submissions",
            "DELETE FROM mcq_submissions WHERE test_id IN (SELECT id FROM mcq_tests WHERE course_id = ?)",
        ),
        ("mcq_tests", "DELETE FROM mcq_tests WHERE course_id = ?"),
        ("notifications", "DELETE FROM notifications WHERE course_id = ?"),
        ("enrollments", "DELETE FROM enrollments WHERE course_id = ?"),
        (
            "users",
            "UPDATE users SET managed_course_id = NULL WHERE managed_course_id = ?",
        ),
        ("courses", "DELETE FROM courses WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [id]) {
            let _ = tx.rollback();
            return Err(HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": table })));
        }
    }
    tx.commit().or_code("db_tx_failed")?;
    tracing::info!(course_id = %id, "course deleted");
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => with_conn(state, handle_list),
        "courses.create" => with_conn(state, |c| handle_create(c, req)),
        "courses.update" => with_conn(state, |c| handle_update(c, req)),
        "courses.delete" => with_conn(state, |c| handle_delete(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
