use crate::ipc::helpers::{
    opt_text, req_str, req_str_list, req_text, respond, with_conn, HandlerErr, HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, Intake};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const INTAKE_STATUSES: [&str; 2] = ["active", "closed"];

fn intake_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Intake> {
    Ok(Intake {
        id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        academic_year: r.get(3)?,
        status: r.get(4)?,
    })
}

fn find_intake(conn: &Connection, id: &str) -> Result<Option<Intake>, HandlerErr> {
    conn.query_row(
        "SELECT id, name, description, academic_year, status FROM intakes WHERE id = ?",
        [id],
        intake_from_row,
    )
    .optional()
    .or_code("db_query_failed")
}

fn parse_status(raw: Option<String>, fallback: &str) -> Result<String, HandlerErr> {
    let status = raw.unwrap_or_else(|| fallback.to_string()).to_ascii_lowercase();
    if !INTAKE_STATUSES.contains(&status.as_str()) {
        return Err(HandlerErr::bad_params("status must be one of: active, closed"));
    }
    Ok(status)
}

fn handle_list(conn: &Connection) -> HandlerResult {
    let mut stmt = conn
        .prepare(
            "SELECT i.id, i.name, i.description, i.academic_year, i.status,
                    (SELECT COUNT(*) FROM users u WHERE u.intake_id = i.id) AS student_count
             FROM intakes i
             ORDER BY i.academic_year DESC, i.name",
        )
        .or_code("db_query_failed")?;
    let intakes = stmt
        .query_map([], |r| {
            let intake = intake_from_row(r)?;
            let student_count: i64 = r.get(5)?;
            Ok(json!({
                "id": intake.id,
                "name": intake.name,
                "description": intake.description,
                "academicYear": intake.academic_year,
                "status": intake.status,
                "studentCount": student_count,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(json!({ "intakes": intakes }))
}

fn handle_create(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let intake = Intake {
        id: new_id("intake"),
        name: req_text(p, "name")?,
        description: opt_text(p, "description").unwrap_or_default(),
        academic_year: opt_text(p, "academicYear").unwrap_or_default(),
        status: parse_status(opt_text(p, "status"), "active")?,
    };
    conn.execute(
        "INSERT INTO intakes(id, name, description, academic_year, status) VALUES(?, ?, ?, ?, ?)",
        (
            &intake.id,
            &intake.name,
            &intake.description,
            &intake.academic_year,
            &intake.status,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "intakes" }))
    })?;
    Ok(json!({ "intake": intake }))
}

fn handle_update(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let id = req_str(p, "id")?;
    let Some(current) = find_intake(conn, id)? else {
        return Err(HandlerErr::not_found("intake not found"));
    };
    let next = Intake {
        id: current.id,
        name: match p.get("name") {
            Some(_) => req_text(p, "name")?,
            None => current.name,
        },
        description: opt_text(p, "description").unwrap_or(current.description),
        academic_year: opt_text(p, "academicYear").unwrap_or(current.academic_year),
        status: parse_status(opt_text(p, "status"), &current.status)?,
    };
    conn.execute(
        "UPDATE intakes SET name = ?, description = ?, academic_year = ?, status = ? WHERE id = ?",
        (
            &next.name,
            &next.description,
            &next.academic_year,
            &next.status,
            &next.id,
        ),
    )
    .or_code("db_update_failed")?;
    Ok(json!({ "intake": next }))
}

fn handle_delete(conn: &Connection, req: &Request) -> HandlerResult {
    let id = req_str(&req.params, "id")?;
    if find_intake(conn, id)?.is_none() {
        return Err(HandlerErr::not_found("intake not found"));
    }
    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    let detached = tx
        .execute("UPDATE users SET intake_id = NULL WHERE intake_id = ?", [id])
        .or_code("db_update_failed")?;
    tx.execute("DELETE FROM intakes WHERE id = ?", [id])
        .or_code("db_delete_failed")?;
    tx.commit().or_code("db_tx_failed")?;
    Ok(json!({ "deleted": true, "studentsDetached": detached }))
}

fn handle_assign_intake(conn: &Connection, req: &Request) -> HandlerResult {
    let student_ids = req_str_list(&req.params, "studentIds")?;
    let intake_id = opt_text(&req.params, "intakeId");
    if let Some(i) = &intake_id {
        if find_intake(conn, i)?.is_none() {
            return Err(HandlerErr::not_found("intake not found"));
        }
    }
    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    let mut updated = 0usize;
    for sid in &student_ids {
        updated += tx
            .execute(
                "UPDATE users SET intake_id = ? WHERE id = ? AND role = 'student'",
                (&intake_id, sid),
            )
            .map_err(|e| {
                HandlerErr::new(
                    "db_update_failed",
                    format!("Bulk intake update failed: {}", e),
                )
            })?;
    }
    tx.commit().or_code("db_tx_failed")?;
    Ok(json!({ "updated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "intakes.list" => with_conn(state, handle_list),
        "intakes.create" => with_conn(state, |c| handle_create(c, req)),
        "intakes.update" => with_conn(state, |c| handle_update(c, req)),
        "intakes.delete" => with_conn(state, |c| handle_delete(c, req)),
        "students.assignIntake" => with_conn(state, |c| handle_assign_intake(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
