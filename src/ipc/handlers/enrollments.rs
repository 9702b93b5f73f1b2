use crate::ipc::helpers::{
    opt_text, req_str, req_str_list, require_course, require_student, respond, with_conn,
    HandlerErr, HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, Enrollment};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Transaction};
use serde_json::json;
use std::collections::HashSet;

fn find_enrollment(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>, HandlerErr> {
    conn.query_row(
        "SELECT id, student_id, course_id FROM enrollments WHERE student_id = ? AND course_id = ?",
        (student_id, course_id),
        |r| {
            Ok(Enrollment {
                id: r.get(0)?,
                student_id: r.get(1)?,
                course_id: r.get(2)?,
            })
        },
    )
    .optional()
    .or_code("db_query_failed")
}

/// Drops an enrollment together with its mark.
fn remove_enrollment(tx: &Transaction<'_>, enrollment_id: &str) -> Result<(), HandlerErr> {
    tx.execute("DELETE FROM marks WHERE enrollment_id = ?", [enrollment_id])
        .or_code("db_delete_failed")?;
    tx.execute("DELETE FROM enrollments WHERE id = ?", [enrollment_id])
        .or_code("db_delete_failed")?;
    Ok(())
}

fn handle_list(conn: &Connection, req: &Request) -> HandlerResult {
    let mut sql = String::from("SELECT id, student_id, course_id FROM enrollments WHERE 1 = 1");
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(s) = opt_text(&req.params, "studentId") {
        sql.push_str(" AND student_id = ?");
        binds.push(SqlValue::Text(s));
    }
    if let Some(c) = opt_text(&req.params, "courseId") {
        sql.push_str(" AND course_id = ?");
        binds.push(SqlValue::Text(c));
    }
    sql.push_str(" ORDER BY course_id, student_id");

    let mut stmt = conn.prepare(&sql).or_code("db_query_failed")?;
    let enrollments = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(Enrollment {
                id: r.get(0)?,
                student_id: r.get(1)?,
                course_id: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(json!({ "enrollments": enrollments }))
}

fn handle_enroll(conn: &Connection, req: &Request) -> HandlerResult {
    let student_id = req_str(&req.params, "studentId")?;
    let course_id = req_str(&req.params, "courseId")?;
    require_student(conn, student_id)?;
    require_course(conn, course_id)?;

    if let Some(existing) = find_enrollment(conn, student_id, course_id)? {
        return Ok(json!({ "enrollment": existing, "created": false }));
    }
    let enrollment = Enrollment {
        id: new_id("enrol"),
        student_id: student_id.to_string(),
        course_id: course_id.to_string(),
    };
    conn.execute(
        "INSERT INTO enrollments(id, student_id, course_id) VALUES(?, ?, ?)",
        (&enrollment.id, &enrollment.student_id, &enrollment.course_id),
    )
    .or_code("db_insert_failed")?;
    Ok(json!({ "enrollment": enrollment, "created": true }))
}

fn handle_unenroll(conn: &Connection, req: &Request) -> HandlerResult {
    let student_id = req_str(&req.params, "studentId")?;
    let course_id = req_str(&req.params, "courseId")?;
    let Some(enrollment) = find_enrollment(conn, student_id, course_id)? else {
        return Ok(json!({ "removed": false }));
    };
    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    remove_enrollment(&tx, &enrollment.id)?;
    tx.commit().or_code("db_tx_failed")?;
    Ok(json!({ "removed": true }))
}

fn handle_set_for_student(conn: &Connection, req: &Request) -> HandlerResult {
    let student_id = req_str(&req.params, "studentId")?;
    let wanted: HashSet<String> = req_str_list(&req.params, "courseIds")?.into_iter().collect();
    require_student(conn, student_id)?;
    for c in &wanted {
        require_course(conn, c)?;
    }

    let mut stmt = conn
        .prepare("SELECT id, course_id FROM enrollments WHERE student_id = ?")
        .or_code("db_query_failed")?;
    let current: Vec<(String, String)> = stmt
        .query_map([student_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    let have: HashSet<&str> = current.iter().map(|(_, c)| c.as_str()).collect();

    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    let mut removed = 0usize;
    for (enrollment_id, course_id) in &current {
        if !wanted.contains(course_id) {
            remove_enrollment(&tx, enrollment_id)?;
            removed += 1;
        }
    }
    let mut added = 0usize;
    for course_id in &wanted {
        if !have.contains(course_id.as_str()) {
            tx.execute(
                "INSERT INTO enrollments(id, student_id, course_id) VALUES(?, ?, ?)",
                (new_id("enrol"), student_id, course_id),
            )
            .or_code("db_insert_failed")?;
            added += 1;
        }
    }
    tx.commit().or_code("db_tx_failed")?;
    Ok(json!({ "added": added, "removed": removed }))
}

fn handle_bulk_unenroll(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = req_str(&req.params, "courseId")?;
    let student_ids = req_str_list(&req.params, "studentIds")?;
    require_course(conn, course_id)?;

    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    let mut removed = 0usize;
    for sid in &student_ids {
        if let Some(e) = find_enrollment(&tx, sid, course_id)? {
            remove_enrollment(&tx, &e.id)?;
            removed += 1;
        }
    }
    tx.commit().or_code("db_tx_failed")?;
    Ok(json!({ "removed": removed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "enrollments.list" => with_conn(state, |c| handle_list(c, req)),
        "enrollments.enroll" => with_conn(state, |c| handle_enroll(c, req)),
        "enrollments.unenroll" => with_conn(state, |c| handle_unenroll(c, req)),
        "enrollments.setForStudent" => with_conn(state, |c| handle_set_for_student(c, req)),
        "enrollments.bulkUnenroll" => with_conn(state, |c| handle_bulk_unenroll(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
