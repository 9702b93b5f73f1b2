use crate::ipc::handlers::courses::find_course;
use crate::ipc::handlers::notifications;
use crate::ipc::helpers::{
    now_rfc3339, opt_text, parse_param, req_i64, req_str, req_text, require_student, respond,
    with_conn, HandlerErr, HandlerResult, OrCode,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, McqTest, Question, TestSubmission};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde_json::json;

const TEST_COLUMNS: &str =
    "id, course_id, title, description, duration_minutes, due_date, questions_json, created_at";
const SUBMISSION_COLUMNS: &str =
    "id, test_id, student_id, answers_json, score, total_questions, submitted_at";

fn json_column<T: serde::de::DeserializeOwned>(r: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = r.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn test_from_row(r: &Row<'_>) -> rusqlite::Result<McqTest> {
    Ok(McqTest {
        id: r.get(0)?,
        course_id: r.get(1)?,
        title: r.get(2)?,
        description: r.get(3)?,
        duration_minutes: r.get(4)?,
        due_date: r.get(5)?,
        questions: json_column(r, 6)?,
        created_at: r.get(7)?,
    })
}

fn submission_from_row(r: &Row<'_>) -> rusqlite::Result<TestSubmission> {
    Ok(TestSubmission {
        id: r.get(0)?,
        test_id: r.get(1)?,
        student_id: r.get(2)?,
        answers: json_column(r, 3)?,
        score: r.get(4)?,
        total_questions: r.get(5)?,
        submitted_at: r.get(6)?,
    })
}

fn find_test(conn: &Connection, id: &str) -> Result<McqTest, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM mcq_tests WHERE id = ?", TEST_COLUMNS),
        [id],
        test_from_row,
    )
    .optional()
    .or_code("db_query_failed")?
    .ok_or_else(|| HandlerErr::not_found("test not found").with_details(json!({ "testId": id })))
}

fn find_submission(conn: &Connection, id: &str) -> Result<TestSubmission, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM mcq_submissions WHERE id = ?", SUBMISSION_COLUMNS),
        [id],
        submission_from_row,
    )
    .optional()
    .or_code("db_query_failed")?
    .ok_or_else(|| HandlerErr::not_found("submission not found"))
}

/// Number of answers matching the correct option. Missing or `-1` answers
/// score nothing.
fn score_answers(questions: &[Question], answers: &[i64]) -> i64 {
    questions
        .iter()
        .zip(answers)
        .filter(|(q, a)| i64::try_from(q.correct_option_index).map_or(false, |c| c == **a))
        .count() as i64
}

fn check_questions(questions: &mut [Question]) -> Result<(), HandlerErr> {
    if questions.is_empty() {
        return Err(HandlerErr::bad_params("a test needs at least one question"));
    }
    for (i, q) in questions.iter_mut().enumerate() {
        let n = i + 1;
        if q.text.trim().is_empty() {
            return Err(HandlerErr::bad_params(format!("question {} has no text", n)));
        }
        if q.options.len() < 2 {
            return Err(HandlerErr::bad_params(format!(
                "question {} needs at least 2 options",
                n
            )));
        }
        if q.correct_option_index >= q.options.len() {
            return Err(HandlerErr::bad_params(format!(
                "question {} has no option {}",
                n, q.correct_option_index
            )));
        }
        if q.id.trim().is_empty() {
            q.id = new_id("q");
        }
    }
    Ok(())
}

/// Date part of the due timestamp for notification text.
fn due_label(due_date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(due_date) {
        return dt.date_naive().to_string();
    }
    due_date.to_string()
}

fn handle_tests_list(conn: &Connection, req: &Request) -> HandlerResult {
    let mut sql = format!("SELECT {} FROM mcq_tests", TEST_COLUMNS);
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(course_id) = opt_text(&req.params, "courseId") {
        sql.push_str(" WHERE course_id = ?");
        binds.push(SqlValue::Text(course_id));
    }
    sql.push_str(" ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql).or_code("db_query_failed")?;
    let tests = stmt
        .query_map(params_from_iter(binds), test_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(json!({ "tests": tests }))
}

fn handle_tests_create(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let course_id = req_str(p, "courseId")?;
    let Some(course) = find_course(conn, course_id)? else {
        return Err(HandlerErr::not_found("course not found")
            .with_details(json!({ "courseId": course_id })));
    };
    let duration_minutes = req_i64(p, "durationMinutes")?;
    if duration_minutes <= 0 {
        return Err(HandlerErr::bad_params("durationMinutes must be positive"));
    }
    let mut questions: Vec<Question> = parse_param(p, "questions")?;
    check_questions(&mut questions)?;

    let test = McqTest {
        id: new_id("test"),
        course_id: course.id.clone(),
        title: req_text(p, "title")?,
        description: opt_text(p, "description").unwrap_or_default(),
        duration_minutes,
        due_date: req_text(p, "dueDate")?,
        questions,
        created_at: now_rfc3339(),
    };
    let questions_json = serde_json::to_string(&test.questions).or_code("internal")?;

    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    tx.execute(
        &format!("INSERT INTO mcq_tests({}) VALUES(?, ?, ?, ?, ?, ?, ?, ?)", TEST_COLUMNS),
        (
            &test.id,
            &test.course_id,
            &test.title,
            &test.description,
            test.duration_minutes,
            &test.due_date,
            &questions_json,
            &test.created_at,
        ),
    )
    .or_code("db_insert_failed")?;
    let message = format!(
        "A new test \"{}\" has been posted for {}. Due: {}.",
        test.title,
        course.course_code,
        due_label(&test.due_date)
    );
    notifications::post(&tx, &course.id, "New MCQ Test Available", &message)
        .or_code("db_insert_failed")?;
    tx.commit().or_code("db_tx_failed")?;

    tracing::info!(test_id = %test.id, course = %course.course_code, "mcq test created");
    Ok(json!({ "test": test }))
}

fn handle_tests_delete(conn: &Connection, req: &Request) -> HandlerResult {
    let id = req_str(&req.params, "id")?;
    find_test(conn, id)?;
    let tx = conn.unchecked_transaction().or_code("db_tx_failed")?;
    let removed_submissions = tx
        .execute("DELETE FROM mcq_submissions WHERE test_id = ?", [id])
        .or_code("db_delete_failed")?;
    tx.execute("DELETE FROM mcq_tests WHERE id = ?", [id])
        .or_code("db_delete_failed")?;
    tx.commit().or_code("db_tx_failed")?;
    Ok(json!({ "deleted": true, "removedSubmissions": removed_submissions }))
}

fn handle_submit(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let test = find_test(conn, req_str(p, "testId")?)?;
    let student = require_student(conn, req_str(p, "studentId")?)?;
    let answers: Vec<i64> = parse_param(p, "answers")?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM mcq_submissions WHERE test_id = ? AND student_id = ?",
            (&test.id, &student.id),
            |r| r.get(0),
        )
        .optional()
        .or_code("db_query_failed")?;
    if let Some(submission_id) = existing {
        return Err(
            HandlerErr::new("already_exists", "student has already submitted this test")
                .with_details(json!({ "submissionId": submission_id })),
        );
    }

    let submission = TestSubmission {
        id: new_id("sub"),
        test_id: test.id.clone(),
        student_id: student.id,
        score: score_answers(&test.questions, &answers),
        total_questions: test.questions.len() as i64,
        answers,
        submitted_at: now_rfc3339(),
    };
    let answers_json = serde_json::to_string(&submission.answers).or_code("internal")?;
    conn.execute(
        &format!(
            "INSERT INTO mcq_submissions({}) VALUES(?, ?, ?, ?, ?, ?, ?)",
            SUBMISSION_COLUMNS
        ),
        (
            &submission.id,
            &submission.test_id,
            &submission.student_id,
            &answers_json,
            submission.score,
            submission.total_questions,
            &submission.submitted_at,
        ),
    )
    .or_code("db_insert_failed")?;
    Ok(json!({ "submission": submission }))
}

fn handle_submissions_list(conn: &Connection, req: &Request) -> HandlerResult {
    let mut sql = format!("SELECT {} FROM mcq_submissions WHERE 1 = 1", SUBMISSION_COLUMNS);
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(test_id) = opt_text(&req.params, "testId") {
        sql.push_str(" AND test_id = ?");
        binds.push(SqlValue::Text(test_id));
    }
    if let Some(student_id) = opt_text(&req.params, "studentId") {
        sql.push_str(" AND student_id = ?");
        binds.push(SqlValue::Text(student_id));
    }
    sql.push_str(" ORDER BY submitted_at, id");
    let mut stmt = conn.prepare(&sql).or_code("db_query_failed")?;
    let submissions = stmt
        .query_map(params_from_iter(binds), submission_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .or_code("db_query_failed")?;
    Ok(json!({ "submissions": submissions }))
}

/// Replaces the answers (and optionally the student) and rescores against
/// the current questions.
fn handle_submissions_update(conn: &Connection, req: &Request) -> HandlerResult {
    let p = &req.params;
    let mut submission = find_submission(conn, req_str(p, "id")?)?;
    let test = find_test(conn, &submission.test_id)?;
    if let Some(student_id) = opt_text(p, "studentId") {
        submission.student_id = require_student(conn, &student_id)?.id;
    }
    if p.get("answers").is_some() {
        submission.answers = parse_param(p, "answers")?;
    }
    submission.score = score_answers(&test.questions, &submission.answers);
    submission.total_questions = test.questions.len() as i64;

    let answers_json = serde_json::to_string(&submission.answers).or_code("internal")?;
    conn.execute(
        "UPDATE mcq_submissions
         SET student_id = ?, answers_json = ?, score = ?, total_questions = ?
         WHERE id = ?",
        (
            &submission.student_id,
            &answers_json,
            submission.score,
            submission.total_questions,
            &submission.id,
        ),
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            HandlerErr::new("already_exists", "student has already submitted this test")
        }
        other => HandlerErr::new("db_update_failed", other.to_string()),
    })?;
    Ok(json!({ "submission": submission }))
}

fn handle_submissions_delete(conn: &Connection, req: &Request) -> HandlerResult {
    let id = req_str(&req.params, "id")?;
    let n = conn
        .execute("DELETE FROM mcq_submissions WHERE id = ?", [id])
        .or_code("db_delete_failed")?;
    if n == 0 {
        return Err(HandlerErr::not_found("submission not found"));
    }
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "mcq.tests.list" => with_conn(state, |c| handle_tests_list(c, req)),
        "mcq.tests.create" => with_conn(state, |c| handle_tests_create(c, req)),
        "mcq.tests.delete" => with_conn(state, |c| handle_tests_delete(c, req)),
        "mcq.submit" => with_conn(state, |c| handle_submit(c, req)),
        "mcq.submissions.list" => with_conn(state, |c| handle_submissions_list(c, req)),
        "mcq.submissions.update" => with_conn(state, |c| handle_submissions_update(c, req)),
        "mcq.submissions.delete" => with_conn(state, |c| handle_submissions_delete(c, req)),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(options: usize, correct: usize) -> Question {
        Question {
            id: String::new(),
            text: "Which?".into(),
            options: (0..options).map(|i| format!("opt {}", i)).collect(),
            correct_option_index: correct,
        }
    }

    #[test]
    fn score_counts_matching_answers_only() {
        let questions = vec![q(4, 0), q(4, 2), q(3, 1)];
        assert_eq!(score_answers(&questions, &[0, 2, 1]), 3);
        assert_eq!(score_answers(&questions, &[0, -1, 2]), 1);
        assert_eq!(score_answers(&questions, &[1]), 0);
        assert_eq!(score_answers(&questions, &[]), 0);
    }

    #[test]
    fn question_checks_fill_ids_and_reject_bad_shapes() {
        let mut ok = vec![q(2, 1)];
        assert!(check_questions(&mut ok).is_ok());
        assert!(ok[0].id.starts_with("q-"));

        let mut one_option = vec![q(1, 0)];
        assert!(check_questions(&mut one_option).is_err());

        let mut bad_index = vec![q(3, 3)];
        assert!(check_questions(&mut bad_index).is_err());

        assert!(check_questions(&mut []).is_err());
    }

    #[test]
    fn due_label_keeps_the_date_part() {
        assert_eq!(due_label("2026-03-01T09:00:00+00:00"), "2026-03-01");
        assert_eq!(due_label("2026-03-01"), "2026-03-01");
    }
}
