use crate::grading::{self, Analysis, GradingConfig};
use crate::import::MarkRecord;
use crate::ipc::helpers::{
    parse_param, req_str, require_course, respond, with_conn, HandlerErr, HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Mark, MarkComponents};
use crate::settings;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkInput {
    enrollment_id: String,
    cats: i64,
    coursework: i64,
    final_exam: i64,
}

impl MarkInput {
    fn into_record(self) -> MarkRecord {
        MarkRecord {
            enrollment_id: self.enrollment_id,
            cats: self.cats,
            coursework: self.coursework,
            final_exam: self.final_exam,
        }
    }
}

/// Upserts marks keyed by enrollment. Callers validate first and own the
/// transaction.
pub(crate) fn upsert_marks(conn: &Connection, records: &[MarkRecord]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO marks(id, enrollment_id, cats, coursework, final_exam, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(enrollment_id) DO UPDATE SET
           cats = excluded.cats,
           coursework = excluded.coursework,
           final_exam = excluded.final_exam,
           updated_at = excluded.updated_at",
    )?;
    let now = chrono::Utc::now().to_rfc3339();
    for r in records {
        stmt.execute((
            Mark::id_for(&r.enrollment_id),
            &r.enrollment_id,
            r.cats,
            r.coursework,
            r.final_exam,
            &now,
        ))?;
    }
    Ok(records.len())
}

fn enrollment_exists(conn: &Connection, enrollment_id: &str) -> Result<bool, HandlerErr> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM enrollments WHERE id = ?", [enrollment_id], |r| r.get(0))
        .optional()
        .or_code("db_query_failed")?;
    Ok(found.is_some())
}

fn load_grading(conn: &Connection) -> Result<GradingConfig, HandlerErr> {
    Ok(settings::load(conn)?)
}

fn invalid_mark(enrollment_id: &str, e: grading::MarkRangeError) -> HandlerErr {
    HandlerErr::bad_params(e.to_string()).with_details(json!({
        "enrollmentId": enrollment_id,
        "component": e.component.label(),
        "value": e.value,
        "max": e.max,
    }))
}

/// Marks sheet for one course: every enrolled student with their mark (if
/// any), total and grade.
fn handle_get(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = req_str(&req.params, "courseId")?;
    require_course(conn, course_id)?;
    let cfg = load_grading(conn)?;

    let mut stmt = conn
        .prepare(
            "SELECT e.id, u.id, u.registration_number, u.full_name,
                    m.cats, m.coursework, m.final_exam
             FROM enrollments e
             JOIN users u ON u.id = e.student_id
             LEFT JOIN marks m ON m.enrollment_id = e.id
             WHERE e.course_id = ? AND u.role = 'student'
             ORDER BY u.registration_number",
        )
        .or_code("db_query_failed")?;
    let rows = stmt
        .query_map([course_id], |r| {
            let cats: Option<i64> = r.get(4)?;
            let coursework: Option<i64> = r.get(5)?;
            let final_exam: Option<i64> = r.get(6)?;
            let mark = match (cats, coursework, final_exam) {
                (Some(cats), Some(coursework), Some(final_exam)) => Some(MarkComponents {
                    cats,
                    coursework,
                    final_exam,
                }),
                _ => None,
            };
            let scored = grading::score_mark(&cfg, Analysis::Overall, mark.as_ref());
            Ok(json!({
                "enrollmentId": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "registrationNumber": r.get::<_, String>(2)?,
                "fullName": r.get::<_, String>(3)?,
                "mark": mark,
                "total": scored.total,
                "grade": scored.grade,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(json!({ "maxMarks": cfg.max_marks, "rows": rows }))
}

fn handle_update(conn: &Connection, req: &Request) -> HandlerResult {
    let input: MarkInput = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid mark: {}", e)))?;
    let record = input.into_record();
    let cfg = load_grading(conn)?;
    cfg.max_marks
        .validate(&record.components())
        .map_err(|e| invalid_mark(&record.enrollment_id, e))?;
    if !enrollment_exists(conn, &record.enrollment_id)? {
        return Err(HandlerErr::not_found("enrollment not found"));
    }

    upsert_marks(conn, std::slice::from_ref(&record)).or_code("db_update_failed")?;
    let mark = Mark {
        id: Mark::id_for(&record.enrollment_id),
        enrollment_id: record.enrollment_id,
        cats: record.cats,
        coursework: record.coursework,
        final_exam: record.final_exam,
    };
    let total = grading::total(Some(&mark.components()));
    Ok(json!({
        "mark": mark,
        "total": total,
        "grade": cfg.scale.grade(total),
    }))
}

/// All-or-nothing: one invalid entry rejects the whole batch before any write.
fn handle_bulk_update(conn: &Connection, req: &Request) -> HandlerResult {
    let inputs: Vec<MarkInput> = parse_param(&req.params, "marks")?;
    let records: Vec<MarkRecord> = inputs.into_iter().map(MarkInput::into_record).collect();
    let cfg = load_grading(conn)?;
    for r in &records {
        cfg.max_marks
            .validate(&r.components())
            .map_err(|e| invalid_mark(&r.enrollment_id, e))?;
        if !enrollment_exists(conn, &r.enrollment_id)? {
            return Err(HandlerErr::not_found("enrollment not found")
                .with_details(json!({ "enrollmentId": r.enrollment_id })));
        }
    }

    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    let saved = upsert_marks(&tx, &records).or_code("db_update_failed")?;
    tx.commit().or_code("db_tx_failed")?;
    Ok(json!({ "saved": saved }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.get" => with_conn(state, |c| handle_get(c, req)),
        "marks.update" => with_conn(state, |c| handle_update(c, req)),
        "marks.bulkUpdate" => with_conn(state, |c| handle_bulk_update(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
