use super::CourseRoster;
use anyhow::Context;
use std::io::Write;

/// Writes a marks sheet listing every enrolled student with blank marks.
pub fn write_marks_template<W: Write>(out: W, roster: &CourseRoster) -> anyhow::Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(["registrationNumber", "fullName", "cats", "coursework", "finalExam"])
        .context("failed to write marks template header")?;
    for s in roster.students() {
        w.write_record([
            s.registration_number.as_str(),
            s.full_name.as_str(),
            "",
            "",
            "",
        ])
        .with_context(|| format!("failed to write template row for {}", s.registration_number))?;
    }
    w.flush().context("failed to flush marks template")?;
    Ok(())
}

/// Writes the registration sheet header and one example row.
pub fn write_students_template<W: Write>(out: W) -> anyhow::Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record([
        "fullName",
        "registrationNumber",
        "email",
        "password",
        "course",
        "session",
        "yearOfStudy",
        "semester",
        "telephone",
        "groupRole",
        "enrollCourseCodes",
    ])
    .context("failed to write student template header")?;
    w.write_record([
        "John Doe",
        "2024-01-98765",
        "john.doe@example.com",
        "password123",
        "BIT",
        "DAY",
        "1",
        "1",
        "1234567890",
        "Group Member Only",
        "COS2102,DCS1203",
    ])
    .context("failed to write student template example")?;
    w.flush().context("failed to flush student template")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::MaxMarks;
    use crate::import::{
        parse_students_csv, parse_marks_csv, CourseRef, EnrolledStudent, StudentCatalog,
        StudentDirectory,
    };

    #[test]
    fn marks_template_round_trips_as_blank_rows() {
        let roster: CourseRoster = vec![EnrolledStudent {
            enrollment_id: "enrol-1".into(),
            registration_number: "2024-01-00001".into(),
            full_name: "Amina Otieno".into(),
        }]
        .into_iter()
        .collect();
        let mut buf = Vec::new();
        write_marks_template(&mut buf, &roster).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            text,
            "registrationNumber,fullName,cats,coursework,finalExam\n2024-01-00001,Amina Otieno,,,\n"
        );

        // Blank marks are not numbers, so an untouched template is rejected row by row.
        let r = parse_marks_csv(&text, &roster, &MaxMarks::default());
        assert!(r.valid_records.is_empty());
        assert_eq!(r.errors.len(), 1);
    }

    #[test]
    fn student_template_example_row_validates() {
        let mut buf = Vec::new();
        write_students_template(&mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("\"COS2102,DCS1203\""));

        let mut dir = StudentDirectory::new();
        for (id, code) in [("c1", "COS2102"), ("c2", "DCS1203")] {
            dir.add_course(CourseRef {
                id: id.into(),
                code: code.into(),
            });
        }
        let r = parse_students_csv(&text, &dir, &StudentCatalog::default());
        assert!(r.is_clean(), "{:?}", r.errors);
        assert_eq!(r.valid_records[0].enroll_course_ids, vec!["c1", "c2"]);
    }
}
