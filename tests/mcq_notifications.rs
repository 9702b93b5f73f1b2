mod test_support;

use serde_json::json;
use test_support::{str_at, Session};

fn questions() -> serde_json::Value {
    json!([
        { "text": "2 + 2?", "options": ["3", "4", "5"], "correctOptionIndex": 1 },
        { "text": "Capital of Kenya?", "options": ["Nairobi", "Mombasa"], "correctOptionIndex": 0 },
        { "text": "Rust's package manager?", "options": ["npm", "pip", "cargo"], "correctOptionIndex": 2 }
    ])
}

#[test]
fn test_creation_posts_a_course_notification() {
    let mut s = Session::open("marksd-mcq-create");
    let course = s.create_course("COS2102", "Data Structures");
    let student = s.register_student("2021-01-00001", "Amina Otieno", &[&course]);

    let e = s.err(
        "mcq.tests.create",
        json!({
            "courseId": course, "title": "Quiz", "durationMinutes": 10, "dueDate": "2026-03-01",
            "questions": [{ "text": "One option", "options": ["only"], "correctOptionIndex": 0 }]
        }),
    );
    assert_eq!(e["code"], json!("bad_params"));

    let created = s.ok(
        "mcq.tests.create",
        json!({
            "courseId": course, "title": "Quiz 1", "durationMinutes": 15,
            "dueDate": "2026-03-01T09:00:00+00:00", "questions": questions()
        }),
    );
    assert!(str_at(&created, "/test/id").starts_with("test-"));
    assert!(str_at(&created, "/test/questions/0/id").starts_with("q-"));

    let inbox = s.ok("notifications.list", json!({ "studentId": student }));
    assert_eq!(inbox["unreadCount"], json!(1));
    assert_eq!(inbox["notifications"][0]["title"], json!("New MCQ Test Available"));
    assert_eq!(
        inbox["notifications"][0]["message"],
        json!("A new test \"Quiz 1\" has been posted for COS2102. Due: 2026-03-01.")
    );

    s.ok(
        "notifications.send",
        json!({ "courseId": course, "title": "Venue", "message": "Lab 3" }),
    );
    let read = s.ok("notifications.markReadForStudent", json!({ "studentId": student }));
    assert_eq!(read["updated"], json!(2));
    let inbox = s.ok("notifications.list", json!({ "courseId": course }));
    assert_eq!(inbox["unreadCount"], json!(0));

    let cleared = s.ok("notifications.clear", json!({}));
    assert_eq!(cleared["deleted"], json!(2));
    s.close();
}

#[test]
fn submissions_are_scored_and_unique_per_student() {
    let mut s = Session::open("marksd-mcq-submit");
    let course = s.create_course("COS2102", "Data Structures");
    let a = s.register_student("2021-01-00001", "Amina Otieno", &[&course]);
    let b = s.register_student("2021-01-00002", "Brian Kamau", &[&course]);
    let created = s.ok(
        "mcq.tests.create",
        json!({
            "courseId": course, "title": "Quiz 1", "durationMinutes": 15,
            "dueDate": "2026-03-01", "questions": questions()
        }),
    );
    let test_id = str_at(&created, "/test/id").to_string();

    let sub = s.ok(
        "mcq.submit",
        json!({ "testId": test_id, "studentId": a, "answers": [1, -1, 2] }),
    );
    assert_eq!(sub["submission"]["score"], json!(2));
    assert_eq!(sub["submission"]["totalQuestions"], json!(3));
    let sub_id = str_at(&sub, "/submission/id").to_string();

    let e = s.err(
        "mcq.submit",
        json!({ "testId": test_id, "studentId": a, "answers": [1, 0, 2] }),
    );
    assert_eq!(e["code"], json!("already_exists"));

    let updated = s.ok(
        "mcq.submissions.update",
        json!({ "id": sub_id, "answers": [1, 0, 2] }),
    );
    assert_eq!(updated["submission"]["score"], json!(3));

    s.ok(
        "mcq.submit",
        json!({ "testId": test_id, "studentId": b, "answers": [0, 1, 0] }),
    );
    let listed = s.ok("mcq.submissions.list", json!({ "testId": test_id }));
    assert_eq!(listed["submissions"].as_array().map(|v| v.len()), Some(2));

    s.ok("mcq.submissions.delete", json!({ "id": sub_id }));
    let e = s.err("mcq.submissions.delete", json!({ "id": sub_id }));
    assert_eq!(e["code"], json!("not_found"));

    let deleted = s.ok("mcq.tests.delete", json!({ "id": test_id }));
    assert_eq!(deleted["removedSubmissions"], json!(1));
    let listed = s.ok("mcq.tests.list", json!({ "courseId": course }));
    assert_eq!(listed["tests"], json!([]));
    s.close();
}

#[test]
fn group_profiles_keep_leader_out_of_members() {
    let mut s = Session::open("marksd-groups");
    let course = s.create_course("COS2102", "Data Structures");
    let leader = s.register_student("2021-01-00001", "Amina Otieno", &[&course]);
    let member = s.register_student("2021-01-00002", "Brian Kamau", &[&course]);

    let empty = s.ok("groups.get", json!({ "leaderId": leader }));
    assert!(empty["profile"].is_null());

    let saved = s.ok(
        "groups.upsert",
        json!({
            "leaderId": leader,
            "groupName": "Team Graph",
            "projectBrief": "Shortest paths",
            "members": [
                { "id": leader, "fullName": "Amina Otieno", "registrationNumber": "2021-01-00001" },
                { "id": member, "fullName": "Brian Kamau", "registrationNumber": "2021-01-00002" },
                { "id": member, "fullName": "Brian Kamau", "registrationNumber": "2021-01-00002" }
            ],
            "assignment": { "name": "report.pdf", "type": "application/pdf", "data": "JVBERi0x" }
        }),
    );
    assert_eq!(saved["profile"]["members"].as_array().map(|v| v.len()), Some(1));

    let listed = s.ok("groups.assignments.list", json!({}));
    assert_eq!(
        listed["assignments"],
        json!([{ "leaderId": leader, "groupName": "Team Graph", "projectBrief": "Shortest paths" }])
    );
    let blob = s.ok("groups.assignment.get", json!({ "leaderId": leader }));
    assert_eq!(blob["assignment"]["type"], json!("application/pdf"));

    // Omitting the assignment keeps it; null removes it.
    s.ok("groups.upsert", json!({ "leaderId": leader, "groupName": "Team Graph II" }));
    let blob = s.ok("groups.assignment.get", json!({ "leaderId": leader }));
    assert_eq!(blob["assignment"]["name"], json!("report.pdf"));
    s.ok(
        "groups.upsert",
        json!({ "leaderId": leader, "groupName": "Team Graph II", "assignment": null }),
    );
    let listed = s.ok("groups.assignments.list", json!({}));
    assert_eq!(listed["assignments"], json!([]));
    s.close();
}
