use crate::ipc::helpers::{
    now_rfc3339, opt_text, req_str, req_text, require_course, require_student, respond,
    with_conn, HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, Notification};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;

/// Posts an unread notification to everyone enrolled in `course_id`.
pub(crate) fn post(
    conn: &Connection,
    course_id: &str,
    title: &str,
    message: &str,
) -> rusqlite::Result<Notification> {
    let n = Notification {
        id: new_id("notif"),
        course_id: course_id.to_string(),
        title: title.to_string(),
        message: message.to_string(),
        timestamp: now_rfc3339(),
        is_read: false,
    };
    conn.execute(
        "INSERT INTO notifications(id, course_id, title, message, timestamp, is_read)
         VALUES(?, ?, ?, ?, ?, 0)",
        (&n.id, &n.course_id, &n.title, &n.message, &n.timestamp),
    )?;
    Ok(n)
}

fn handle_list(conn: &Connection, req: &Request) -> HandlerResult {
    let mut sql = String::from(
        "SELECT id, course_id, title, message, timestamp, is_read FROM notifications WHERE 1 = 1",
    );
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(course_id) = opt_text(&req.params, "courseId") {
        sql.push_str(" AND course_id = ?");
        binds.push(SqlValue::Text(course_id));
    }
    if let Some(student_id) = opt_text(&req.params, "studentId") {
        sql.push_str(" AND course_id IN (SELECT course_id FROM enrollments WHERE student_id = ?)");
        binds.push(SqlValue::Text(student_id));
    }
    sql.push_str(" ORDER BY timestamp DESC, id");

    let mut stmt = conn.prepare(&sql).or_code("db_query_failed")?;
    let notifications = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(Notification {
                id: r.get(0)?,
                course_id: r.get(1)?,
                title: r.get(2)?,
                message: r.get(3)?,
                timestamp: r.get(4)?,
                is_read: r.get::<_, i64>(5)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    let unread = notifications.iter().filter(|n| !n.is_read).count();
    Ok(json!({ "notifications": notifications, "unreadCount": unread }))
}

fn handle_send(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = req_str(&req.params, "courseId")?;
    require_course(conn, course_id)?;
    let title = req_text(&req.params, "title")?;
    let message = req_text(&req.params, "message")?;
    let n = post(conn, course_id, &title, &message).or_code("db_insert_failed")?;
    Ok(json!({ "notification": n }))
}

fn handle_mark_read_for_student(conn: &Connection, req: &Request) -> HandlerResult {
    let student_id = req_str(&req.params, "studentId")?;
    require_student(conn, student_id)?;
    let updated = conn
        .execute(
            "UPDATE notifications SET is_read = 1
             WHERE is_read = 0
               AND course_id IN (SELECT course_id FROM enrollments WHERE student_id = ?)",
            [student_id],
        )
        .or_code("db_update_failed")?;
    Ok(json!({ "updated": updated }))
}

fn handle_mark_all_read(conn: &Connection) -> HandlerResult {
    let updated = conn
        .execute("UPDATE notifications SET is_read = 1 WHERE is_read = 0", [])
        .or_code("db_update_failed")?;
    Ok(json!({ "updated": updated }))
}

fn handle_clear(conn: &Connection, req: &Request) -> HandlerResult {
    let deleted = match opt_text(&req.params, "courseId") {
        Some(course_id) => conn.execute("DELETE FROM notifications WHERE course_id = ?", [course_id]),
        None => conn.execute("DELETE FROM notifications", []),
    }
    .or_code("db_delete_failed")?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "notifications.list" => with_conn(state, |c| handle_list(c, req)),
        "notifications.send" => with_conn(state, |c| handle_send(c, req)),
        "notifications.markReadForStudent" => {
            with_conn(state, |c| handle_mark_read_for_student(c, req))
        }
        "notifications.markAllRead" => with_conn(state, handle_mark_all_read),
        "notifications.clear" => with_conn(state, |c| handle_clear(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
