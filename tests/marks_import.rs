mod test_support;

use serde_json::json;
use test_support::Session;

#[test]
fn marks_csv_preview_then_apply() {
    let mut s = Session::open("marksd-marks-import");
    let course = s.create_course("COS2102", "Data Structures");
    s.register_student("2021-01-00001", "Amina Otieno", &[&course]);
    s.register_student("2021-01-00002", "Brian Kamau", &[&course]);

    let csv = "registrationNumber,fullName,cats,coursework,finalExam\r\n\
               2021-01-00001,Amina Otieno,18,17,50\r\n\
               \r\n\
               2099-99-99999,Ghost,10,10,10\r\n\
               2021-01-00002,Brian Kamau,12,x,40\r\n\
               2021-01-00002,Brian Kamau,12,15,61\r\n";

    let preview = s.ok(
        "imports.marks.preview",
        json!({ "courseId": course, "csvText": csv }),
    );
    assert_eq!(preview["validCount"], json!(1));
    assert_eq!(
        preview["errors"],
        json!([
            "Row 3: Student with registration number '2099-99-99999' is not enrolled in this course.",
            "Row 4: Marks for '2021-01-00002' must be numbers.",
            "Row 5 ('2021-01-00002'): Final Exam must be between 0 and 60."
        ])
    );

    // Nothing is written by a preview.
    let sheet = s.ok("marks.get", json!({ "courseId": course }));
    assert!(sheet["rows"][0]["mark"].is_null());

    let refused = s.err(
        "imports.marks.apply",
        json!({ "courseId": course, "csvText": csv, "requireClean": true }),
    );
    assert_eq!(refused["code"], json!("import_has_errors"));

    let applied = s.ok(
        "imports.marks.apply",
        json!({ "courseId": course, "csvText": csv }),
    );
    assert_eq!(applied["saved"], json!(1));
    assert_eq!(applied["errors"].as_array().map(|v| v.len()), Some(3));

    let sheet = s.ok("marks.get", json!({ "courseId": course }));
    let amina = sheet["rows"]
        .as_array()
        .and_then(|rows| rows.iter().find(|r| r["registrationNumber"] == json!("2021-01-00001")))
        .expect("amina row");
    assert_eq!(amina["total"], json!(85));
    s.close();
}

#[test]
fn file_level_problems_are_single_errors() {
    let mut s = Session::open("marksd-marks-import-file");
    let course = s.create_course("COS2102", "Data Structures");

    let missing = s.ok(
        "imports.marks.preview",
        json!({ "courseId": course, "csvText": "registrationNumber,cats\n2021-01-00001,1\n" }),
    );
    assert_eq!(
        missing["errors"],
        json!(["Missing required columns: coursework, finalExam"])
    );

    let empty = s.ok(
        "imports.marks.preview",
        json!({ "courseId": course, "csvText": "registrationNumber,cats,coursework,finalExam\n\n" }),
    );
    assert_eq!(empty["errors"], json!(["CSV file is empty or has no data rows."]));

    let unreadable = s.ok(
        "imports.marks.preview",
        json!({ "courseId": course, "path": s.workspace.join("nope.csv").to_string_lossy() }),
    );
    assert_eq!(unreadable["errors"], json!(["Error reading file."]));

    let e = s.err("imports.marks.preview", json!({ "courseId": course }));
    assert_eq!(e["code"], json!("bad_params"));
    s.close();
}

#[test]
fn marks_template_lists_enrolled_students() {
    let mut s = Session::open("marksd-marks-template");
    let course = s.create_course("COS2102", "Data Structures");
    s.register_student("2021-01-00001", "Amina Otieno", &[&course]);
    let out = s.workspace.join("exports").join("marks.csv");

    let res = s.ok(
        "imports.marks.template",
        json!({ "courseId": course, "outPath": out.to_string_lossy() }),
    );
    let expected = "registrationNumber,fullName,cats,coursework,finalExam\n2021-01-00001,Amina Otieno,,,\n";
    assert_eq!(res["csvText"], json!(expected));
    assert_eq!(std::fs::read_to_string(&out).expect("template file"), expected);
    s.close();
}
