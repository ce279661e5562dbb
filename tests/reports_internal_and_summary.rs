
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

fn setup(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    workspace: &std::path::Path,
) {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s2",
        "students.upsert",
        json!({ "registerNumber": "310621104001", "rollNumber": "01", "name": "Arun" }),
    );
    for (id, code, name) in [
        ("s3", "CS3451", "Operating Systems"),
        ("s4", "MA8402", "Probability"),
    ] {
        let _ = request_ok(
            stdin,
            reader,
            id,
            "subjects.upsert",
            json!({ "code": code, "name": name, "semesterId": 1 }),
        );
    }
}

#[test]
fn internal_report_totals_average_and_attendance() {
    let workspace = temp_dir("advisor-internal-report");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    for (id, code, marks) in [("1", "CS3451", 80.0), ("2", "MA8402", 60.0)] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "marks.set",
            json!({
                "studentRegNo": "310621104001",
                "subjectId": code,
                "semesterId": 1,
                "internalId": 1,
                "marks": marks
            }),
        );
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "masterAttendance.set",
        json!({
            "studentRegNo": "310621104001",
            "semesterId": 1,
            "internalId": 1,
            "percentage": 92.0
        }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.internal",
        json!({ "studentRegNo": "310621104001", "semesterId": 1, "internalId": 1 }),
    );
    let report = result.get("report").expect("report");
    assert_eq!(report.get("totalMarks").and_then(|v| v.as_f64()), Some(140.0));
    assert_eq!(report.get("avgMarks").and_then(|v| v.as_f64()), Some(70.0));
    assert_eq!(
        report.get("attendancePercentage").and_then(|v| v.as_f64()),
        Some(92.0)
    );

    // The second internal has no data; every lookup degrades, nothing errors.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.internal",
        json!({ "studentRegNo": "310621104001", "semesterId": 1, "internalId": 2 }),
    );
    let report = result.get("report").expect("report");
    assert_eq!(report.get("totalMarks").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(report.get("avgMarks").and_then(|v| v.as_f64()), Some(0.0));
    let subjects = report
        .get("subjects")
        .and_then(|v| v.as_array())
        .expect("subjects");
    assert!(subjects.iter().all(|s| s.get("mark") == Some(&json!(null))));
}

#[test]
fn semester_summary_carries_gpa_and_cross_semester_cgpa() {
    let workspace = temp_dir("advisor-semester-summary");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    for (id, internal, pct) in [("1", 1, 90.0), ("2", 2, 70.0)] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "masterAttendance.set",
            json!({
                "studentRegNo": "310621104001",
                "semesterId": 1,
                "internalId": internal,
                "percentage": pct
            }),
        );
    }
    // Semester 1: O and A+. Semester 2: B. CGPA is flat over all three.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.set",
        json!({
            "studentRegNo": "310621104001",
            "semesterId": 1,
            "results": { "CS3451": "O", "MA8402": "A+" }
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.set",
        json!({
            "studentRegNo": "310621104001",
            "semesterId": 2,
            "results": { "CS3591": "B" }
        }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.semesterSummary",
        json!({ "studentRegNo": "310621104001", "semesterId": 1 }),
    );
    let summary = result.get("summary").expect("summary");
    assert_eq!(
        summary
            .get("internals")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(2)
    );
    assert_eq!(
        summary
            .get("attendancePercentage")
            .and_then(|v| v.as_f64()),
        Some(80.0)
    );
    assert_eq!(summary.get("gpa").and_then(|v| v.as_f64()), Some(9.5));
    assert_eq!(
        summary
            .get("grades")
            .and_then(|g| g.get("status"))
            .and_then(|v| v.as_str()),
        Some("published")
    );

    let cgpa = result.get("cgpa").and_then(|v| v.as_f64()).expect("cgpa");
    assert!((cgpa - 25.0 / 3.0).abs() < 1e-9);
}

#[test]
fn grade_merge_keeps_codes_absent_from_the_incoming_map() {
    let workspace = temp_dir("advisor-grade-merge");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.set",
        json!({
            "studentRegNo": "310621104001",
            "semesterId": 1,
            "results": { "CS3451": "U", "MA8402": "A" }
        }),
    );
    // Revaluation upgrades one subject; the other keeps its grade.
    let merged = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.set",
        json!({
            "studentRegNo": "310621104001",
            "semesterId": 1,
            "results": { "CS3451": "B+" }
        }),
    );
    let results = merged
        .get("grade")
        .and_then(|g| g.get("results"))
        .expect("results");
    assert_eq!(results.get("CS3451").and_then(|v| v.as_str()), Some("B+"));
    assert_eq!(results.get("MA8402").and_then(|v| v.as_str()), Some("A"));
}
