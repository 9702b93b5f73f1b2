//! Reference data for the importers, read from the workspace database.

use crate::import::{CourseRef, CourseRoster, EnrolledStudent, StudentDirectory};
use anyhow::Context;
use rusqlite::Connection;

pub fn load_course_roster(conn: &Connection, course_id: &str) -> anyhow::Result<CourseRoster> {
    let mut stmt = conn
        .prepare(
            "SELECT e.id, u.registration_number, u.full_name
             FROM enrollments e
             JOIN users u ON u.id = e.student_id
             WHERE e.course_id = ? AND u.role = 'student'",
        )
        .context("failed to prepare roster query")?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok(EnrolledStudent {
                enrollment_id: r.get(0)?,
                registration_number: r.get(1)?,
                full_name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("failed to load roster for course {}", course_id))?;
    Ok(rows.into_iter().collect())
}

pub fn load_student_directory(conn: &Connection) -> anyhow::Result<StudentDirectory> {
    let mut dir = StudentDirectory::new();

    let mut users = conn.prepare("SELECT registration_number, email FROM users")?;
    let mut rows = users.query([])?;
    while let Some(r) = rows.next()? {
        let reg: String = r.get(0)?;
        let email: String = r.get(1)?;
        dir.add_user(&reg, &email);
    }

    let mut courses = conn.prepare("SELECT id, course_code FROM courses")?;
    let mut rows = courses.query([])?;
    while let Some(r) = rows.next()? {
        dir.add_course(CourseRef {
            id: r.get(0)?,
            code: r.get(1)?,
        });
    }
    Ok(dir)
}

pub fn course_exists(conn: &Connection, course_id: &str) -> anyhow::Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM courses WHERE id = ?",
        [course_id],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn open_temp() -> Connection {
        let ws = std::env::temp_dir().join(format!(
            "marksd-roster-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        db::open_db(&ws).expect("open db")
    }

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO courses(id, course_code, course_name) VALUES('c1', 'COS2102', 'Operating Systems');
             INSERT INTO courses(id, course_code, course_name) VALUES('c2', 'DCS1203', 'Databases');
             INSERT INTO users(id, registration_number, full_name, email, password_hash, role)
               VALUES('u1', '2024-01-00001', 'Amina Otieno', 'amina@example.com', 'h', 'student');
             INSERT INTO users(id, registration_number, full_name, email, password_hash, role)
               VALUES('u2', '2024-01-00002', 'Brian Kip', 'Brian@Example.com', 'h', 'student');
             INSERT INTO users(id, registration_number, full_name, email, password_hash, role)
               VALUES('u3', 'coord1', 'Cora', 'cora@example.com', 'h', 'coordinator');
             INSERT INTO enrollments(id, student_id, course_id) VALUES('e1', 'u1', 'c1');
             INSERT INTO enrollments(id, student_id, course_id) VALUES('e2', 'u2', 'c2');
             INSERT INTO enrollments(id, student_id, course_id) VALUES('e3', 'u3', 'c1');",
        )
        .expect("seed");
    }

    #[test]
    fn roster_holds_only_enrolled_students_of_the_course() {
        let conn = open_temp();
        seed(&conn);
        let roster = load_course_roster(&conn, "c1").expect("roster");
        assert_eq!(roster.len(), 1);
        let s = roster.lookup("2024-01-00001").expect("amina");
        assert_eq!(s.enrollment_id, "e1");
        assert!(roster.lookup("coord1").is_none());
        assert!(load_course_roster(&conn, "nope").expect("empty").is_empty());
    }

    #[test]
    fn directory_lists_users_and_course_codes() {
        let conn = open_temp();
        seed(&conn);
        let dir = load_student_directory(&conn).expect("directory");
        assert_eq!(dir.course("DCS1203").map(|c| c.id.as_str()), Some("c2"));
        assert!(dir.course("XYZ").is_none());
        assert!(course_exists(&conn, "c1").expect("exists"));
        assert!(!course_exists(&conn, "c9").expect("exists"));
    }
}
