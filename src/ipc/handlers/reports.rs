use crate::grading::{self, Analysis, Component, GradingConfig, ScoredMark};
use crate::ipc::helpers::{
    opt_text, req_str, require_course, require_student, respond, with_conn, HandlerErr,
    HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::MarkComponents;
use crate::settings;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::json;

fn mark_from_columns(r: &Row<'_>, first: usize) -> rusqlite::Result<Option<MarkComponents>> {
    let cats: Option<i64> = r.get(first)?;
    let coursework: Option<i64> = r.get(first + 1)?;
    let final_exam: Option<i64> = r.get(first + 2)?;
    Ok(match (cats, coursework, final_exam) {
        (Some(cats), Some(coursework), Some(final_exam)) => Some(MarkComponents {
            cats,
            coursework,
            final_exam,
        }),
        _ => None,
    })
}

fn parse_analysis(req: &Request) -> Result<Analysis, HandlerErr> {
    match opt_text(&req.params, "analysis") {
        None => Ok(Analysis::default()),
        Some(raw) => Analysis::parse(&raw).ok_or_else(|| {
            HandlerErr::bad_params(format!(
                "analysis must be overall, cats, coursework or finalExam (got '{}')",
                raw
            ))
        }),
    }
}

struct PerformanceRow {
    student_id: String,
    registration_number: String,
    full_name: String,
    scored: ScoredMark,
}

fn handle_course_performance(conn: &Connection, req: &Request) -> HandlerResult {
    let course_id = req_str(&req.params, "courseId")?;
    require_course(conn, course_id)?;
    let analysis = parse_analysis(req)?;
    let cfg: GradingConfig = settings::load(conn)?;

    let mut sql = String::from(
        "SELECT u.id, u.registration_number, u.full_name, m.cats, m.coursework, m.final_exam
         FROM enrollments e
         JOIN users u ON u.id = e.student_id
         LEFT JOIN marks m ON m.enrollment_id = e.id
         WHERE e.course_id = ? AND u.role = 'student'",
    );
    let mut binds = vec![SqlValue::Text(course_id.to_string())];
    let intake_id = opt_text(&req.params, "intakeId");
    if let Some(intake) = &intake_id {
        sql.push_str(" AND u.intake_id = ?");
        binds.push(SqlValue::Text(intake.clone()));
    }
    sql.push_str(" ORDER BY u.registration_number");

    let mut stmt = conn.prepare(&sql).or_code("db_query_failed")?;
    let rows: Vec<PerformanceRow> = stmt
        .query_map(params_from_iter(binds), |r| {
            let mark = mark_from_columns(r, 3)?;
            Ok(PerformanceRow {
                student_id: r.get(0)?,
                registration_number: r.get(1)?,
                full_name: r.get(2)?,
                scored: grading::score_mark(&cfg, analysis, mark.as_ref()),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;

    let summary = grading::summarize(rows.iter().map(|r| &r.scored));
    let distribution = grading::distribution(&cfg.scale, rows.iter().map(|r| &r.scored));
    let rows_json: Vec<_> = rows
        .iter()
        .map(|r| {
            json!({
                "studentId": r.student_id,
                "registrationNumber": r.registration_number,
                "fullName": r.full_name,
                "total": r.scored.total,
                "grade": r.scored.grade,
            })
        })
        .collect();

    Ok(json!({
        "courseId": course_id,
        "analysis": analysis,
        "intakeId": intake_id,
        "rows": rows_json,
        "summary": summary,
        "distribution": distribution,
    }))
}

/// One student's transcript: every enrolled course with its mark, total and
/// grade, plus a grade per component.
fn handle_student_marks(conn: &Connection, req: &Request) -> HandlerResult {
    let student_id = req_str(&req.params, "studentId")?;
    let student = require_student(conn, student_id)?;
    let cfg: GradingConfig = settings::load(conn)?;

    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.course_code, c.course_name, m.cats, m.coursework, m.final_exam
             FROM enrollments e
             JOIN courses c ON c.id = e.course_id
             LEFT JOIN marks m ON m.enrollment_id = e.id
             WHERE e.student_id = ?
             ORDER BY c.course_code",
        )
        .or_code("db_query_failed")?;
    let courses = stmt
        .query_map([student_id], |r| {
            let mark = mark_from_columns(r, 3)?;
            let overall = grading::score_mark(&cfg, Analysis::Overall, mark.as_ref());
            let component_grade = |c: Component| {
                cfg.scale
                    .component_grade(mark.as_ref().map(|m| c.score(m)), cfg.max_marks.max_for(c))
                    .to_string()
            };
            Ok(json!({
                "courseId": r.get::<_, String>(0)?,
                "courseCode": r.get::<_, String>(1)?,
                "courseName": r.get::<_, String>(2)?,
                "mark": mark,
                "total": overall.total,
                "grade": overall.grade,
                "componentGrades": {
                    "cats": component_grade(Component::Cats),
                    "coursework": component_grade(Component::Coursework),
                    "finalExam": component_grade(Component::FinalExam),
                },
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;

    Ok(json!({
        "studentId": student.id,
        "registrationNumber": student.registration_number,
        "fullName": student.full_name,
        "courses": courses,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.coursePerformance" => with_conn(state, |c| handle_course_performance(c, req)),
        "reports.studentMarks" => with_conn(state, |c| handle_student_marks(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
