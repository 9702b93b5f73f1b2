mod test_support;

use serde_json::json;
use test_support::{str_at, Session};

const HEADER: &str = "fullName,registrationNumber,email,password,course,session,yearOfStudy,semester,telephone,groupRole,enrollCourseCodes";

#[test]
fn student_upload_creates_accounts_and_enrollments() {
    let mut s = Session::open("marksd-students-import");
    let c1 = s.create_course("COS2102", "Data Structures");
    s.create_course("DCS1203", "Databases");

    let csv = format!(
        "{}\n\
         Amina Otieno,2024-01-00001,amina@example.com,pass123,BIT,DAY,1,1,0700000000,Group Leader,\"COS2102,DCS1203\"\n\
         Brian Kamau,2024-01-00002,brian@example.com,pass456,BCS,EVENING,1,2,,,COS2102\n\
         Copy Cat,2024-01-00001,copy@example.com,pass789,,,,,,,COS2102\n\
         Bad Course,2024-01-00004,bad@example.com,pass000,,,,,,,XYZ999\n",
        HEADER
    );

    let preview = s.ok("imports.students.preview", json!({ "csvText": csv }));
    assert_eq!(preview["validCount"], json!(2));
    assert!(preview["validRecords"][0].get("password").is_none());

    let applied = s.ok("imports.students.apply", json!({ "csvText": csv }));
    assert_eq!(applied["successCount"], json!(2));
    assert_eq!(
        applied["errors"],
        json!([
            "Row 4: Registration number '2024-01-00001' already exists.",
            "Row 5: Course code 'XYZ999' in 'enrollCourseCodes' not found."
        ])
    );

    let login = s.ok(
        "auth.login",
        json!({ "registrationNumber": "2024-01-00001", "password": "pass123", "role": "student" }),
    );
    assert_eq!(login["user"]["forcePasswordChange"], json!(true));
    assert_eq!(login["user"]["groupRole"], json!("Group Leader"));
    let amina = str_at(&login, "/user/id").to_string();
    let enrolled = s.ok("students.get", json!({ "id": amina }));
    assert_eq!(enrolled["courseIds"].as_array().map(|v| v.len()), Some(2));

    let listed = s.ok("students.list", json!({ "courseId": c1 }));
    assert_eq!(listed["students"].as_array().map(|v| v.len()), Some(2));

    // Uploading the same sheet again only produces duplicates.
    let again = s.ok("imports.students.apply", json!({ "csvText": csv }));
    assert_eq!(again["successCount"], json!(0));
    assert_eq!(again["errors"].as_array().map(|v| v.len()), Some(4));
    s.close();
}

#[test]
fn catalog_options_drive_programme_and_session_checks() {
    let mut s = Session::open("marksd-students-catalog");
    s.create_course("COS2102", "Data Structures");

    let opts = s.ok("imports.options.get", json!({}));
    assert_eq!(opts["requireClean"], json!(false));
    assert!(opts["programmes"].as_array().map_or(false, |p| p.contains(&json!("BIT"))));

    s.ok(
        "imports.options.update",
        json!({ "patch": { "programmes": ["MSC"], "requireClean": true } }),
    );
    let e = s.err("imports.options.update", json!({ "patch": { "sessions": [] } }));
    assert_eq!(e["code"], json!("bad_params"));

    let csv = format!(
        "{}\nAmina Otieno,2024-01-00001,amina@example.com,pass123,BIT,DAY,,,,,COS2102\n",
        HEADER
    );
    let preview = s.ok("imports.students.preview", json!({ "csvText": csv }));
    assert_eq!(preview["errors"], json!(["Row 2: Invalid course 'BIT'."]));

    // requireClean from the saved options refuses the dirty sheet.
    let e = s.err("imports.students.apply", json!({ "csvText": csv }));
    assert_eq!(e["code"], json!("import_has_errors"));
    s.close();
}

#[test]
fn student_template_is_returned_and_written() {
    let mut s = Session::open("marksd-students-template");
    let out = s.workspace.join("students-template.csv");
    let res = s.ok(
        "imports.students.template",
        json!({ "outPath": out.to_string_lossy() }),
    );
    let text = str_at(&res, "/csvText").to_string();
    assert!(text.starts_with(HEADER));
    assert_eq!(std::fs::read_to_string(&out).expect("template"), text);
    s.close();
}
