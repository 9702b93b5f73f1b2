use crate::auth;
use crate::grading::GradingConfig;
use crate::import::{self, BulkResult, StudentRecord};
use crate::ipc::handlers::marks::upsert_marks;
use crate::ipc::helpers::{
    opt_text, req_str, require_course, respond, with_conn, HandlerErr, HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::new_id;
use crate::roster;
use crate::settings::{self, ImportOptions};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Upload text from `csvText`, or read from `path`. An unreadable file is a
/// file-level import issue, not a request error.
fn read_upload(params: &Value) -> Result<Result<String, import::ImportIssue>, HandlerErr> {
    if let Some(text) = params.get("csvText").and_then(|v| v.as_str()) {
        return Ok(Ok(text.to_string()));
    }
    if let Some(path) = params.get("path").and_then(|v| v.as_str()) {
        return Ok(import::read_csv_file(Path::new(path)));
    }
    Err(HandlerErr::bad_params("provide csvText or path"))
}

/// Preview payload: the parse result plus counts, and each error with its
/// row number (`null` for file-level problems) for display next to the sheet.
fn preview_json<T: Serialize>(result: &BulkResult<T>) -> HandlerResult {
    let mut v = serde_json::to_value(result).or_code("internal")?;
    v["validCount"] = json!(result.valid_records.len());
    v["errorCount"] = json!(result.errors.len());
    v["issues"] = result
        .errors
        .iter()
        .map(|e| json!({ "row": e.row(), "message": e.to_string() }))
        .collect();
    Ok(v)
}

fn require_clean(conn: &Connection, params: &Value) -> Result<bool, HandlerErr> {
    if let Some(b) = params.get("requireClean").and_then(|v| v.as_bool()) {
        return Ok(b);
    }
    let opts: ImportOptions = settings::load(conn)?;
    Ok(opts.require_clean)
}

fn refuse_if_dirty<T>(result: &BulkResult<T>, require_clean: bool) -> Result<(), HandlerErr> {
    if require_clean && !result.is_clean() {
        return Err(HandlerErr::new(
            "import_has_errors",
            format!("{} row(s) failed validation; nothing was written", result.errors.len()),
        )
        .with_details(json!({ "errors": result.errors })));
    }
    Ok(())
}

fn write_template(params: &Value, bytes: Vec<u8>) -> HandlerResult {
    let text = String::from_utf8(bytes).or_code("internal")?;
    let Some(out) = opt_text(params, "outPath").map(PathBuf::from) else {
        return Ok(json!({ "csvText": text }));
    };
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).or_code("io_failed")?;
    }
    std::fs::write(&out, &text).or_code("io_failed")?;
    Ok(json!({ "csvText": text, "path": out.to_string_lossy() }))
}

// ---------------------------------------------------------------------------
// Marks
// ---------------------------------------------------------------------------

fn parse_marks_upload(
    conn: &Connection,
    req: &Request,
) -> Result<BulkResult<import::MarkRecord>, HandlerErr> {
    let course_id = req_str(&req.params, "courseId")?;
    require_course(conn, course_id)?;
    let text = match read_upload(&req.params)? {
        Ok(t) => t,
        Err(issue) => return Ok(BulkResult::fatal(issue)),
    };
    let roster = roster::load_course_roster(conn, course_id).or_code("db_query_failed")?;
    let cfg: GradingConfig = settings::load(conn)?;
    tracing::debug!(course_id, enrolled = roster.len(), "marks upload parsed against roster");
    Ok(import::parse_marks_csv(&text, &roster, &cfg.max_marks))
}

fn handle_marks_preview(conn: &Connection, req: &Request) -> HandlerResult {
    let result = parse_marks_upload(conn, req)?;
    preview_json(&result)
}

fn handle_marks_apply(conn: &Connection, req: &Request) -> HandlerResult {
    let result = parse_marks_upload(conn, req)?;
    refuse_if_dirty(&result, require_clean(conn, &req.params)?)?;

    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    let saved = upsert_marks(&tx, &result.valid_records).or_code("db_update_failed")?;
    tx.commit().or_code("db_tx_failed")?;

    tracing::info!(
        saved,
        rejected = result.errors.len(),
        "marks import applied"
    );
    Ok(json!({ "saved": saved, "errors": result.errors }))
}

fn handle_marks_template(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = req_str(&req.params, "courseId")?;
    require_course(conn, course_id)?;
    let roster = roster::load_course_roster(conn, course_id).or_code("db_query_failed")?;
    if roster.is_empty() {
        tracing::warn!(course_id, "marks template for a course with no students");
    }
    let mut buf = Vec::new();
    import::write_marks_template(&mut buf, &roster).or_code("internal")?;
    write_template(&req.params, buf)
}

// ---------------------------------------------------------------------------
// Students
// ---------------------------------------------------------------------------

fn parse_students_upload(
    conn: &Connection,
    req: &Request,
) -> Result<BulkResult<StudentRecord>, HandlerErr> {
    let text = match read_upload(&req.params)? {
        Ok(t) => t,
        Err(issue) => return Ok(BulkResult::fatal(issue)),
    };
    let directory = roster::load_student_directory(conn).or_code("db_query_failed")?;
    let opts: ImportOptions = settings::load(conn)?;
    Ok(import::parse_students_csv(&text, &directory, &opts.catalog))
}

fn handle_students_preview(conn: &Connection, req: &Request) -> HandlerResult {
    let result = parse_students_upload(conn, req)?;
    preview_json(&result)
}

fn insert_students(conn: &Connection, records: &[StudentRecord]) -> Result<usize, String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("User insertion failed: {}", e))?;
    for rec in records {
        let user_id = new_id("user");
        tx.execute(
            "INSERT INTO users(id, registration_number, full_name, email, password_hash, role,
                               course, session, year_of_study, semester, telephone, group_role,
                               force_password_change)
             VALUES(?, ?, ?, ?, ?, 'student', ?, ?, ?, ?, ?, ?, 1)",
            rusqlite::params![
                user_id,
                rec.registration_number,
                rec.full_name,
                rec.email,
                auth::hash_password(&rec.password),
                rec.course,
                rec.session,
                rec.year_of_study,
                rec.semester,
                rec.telephone,
                rec.group_role.as_str(),
            ],
        )
        .map_err(|e| format!("User insertion failed: {}", e))?;
        for course_id in &rec.enroll_course_ids {
            tx.execute(
                "INSERT OR IGNORE INTO enrollments(id, student_id, course_id) VALUES(?, ?, ?)",
                (new_id("enrol"), &user_id, course_id),
            )
            .map_err(|e| format!("Enrollment failed: {}", e))?;
        }
    }
    tx.commit()
        .map_err(|e| format!("User insertion failed: {}", e))?;
    Ok(records.len())
}

/// Creates every valid student in one transaction. A store failure rolls the
/// whole batch back and is reported alongside the row errors.
fn handle_students_apply(conn: &Connection, req: &Request) -> HandlerResult {
    let result = parse_students_upload(conn, req)?;
    refuse_if_dirty(&result, require_clean(conn, &req.params)?)?;

    let mut errors: Vec<String> = result.errors.iter().map(|e| e.to_string()).collect();
    let success_count = if result.valid_records.is_empty() {
        0
    } else {
        match insert_students(conn, &result.valid_records) {
            Ok(n) => n,
            Err(msg) => {
                tracing::warn!(error = %msg, "student import rolled back");
                errors.push(msg);
                0
            }
        }
    };

    tracing::info!(
        created = success_count,
        rejected = result.errors.len(),
        "student import applied"
    );
    Ok(json!({ "successCount": success_count, "errors": errors }))
}

fn handle_students_template(req: &Request) -> HandlerResult {
    let mut buf = Vec::new();
    import::write_students_template(&mut buf).or_code("internal")?;
    write_template(&req.params, buf)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "imports.marks.preview" => with_conn(state, |c| handle_marks_preview(c, req)),
        "imports.marks.apply" => with_conn(state, |c| handle_marks_apply(c, req)),
        "imports.marks.template" => with_conn(state, |c| handle_marks_template(c, req)),
        "imports.students.preview" => with_conn(state, |c| handle_students_preview(c, req)),
        "imports.students.apply" => with_conn(state, |c| handle_students_apply(c, req)),
        "imports.students.template" => handle_students_template(req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
