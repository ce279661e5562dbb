
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn class_average_is_a_mean_of_student_averages() {
    let workspace = temp_dir("advisor-class-stats");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (id, reg, name) in [("2", "310621104001", "Arun"), ("3", "310621104002", "Divya")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "students.upsert",
            json!({ "registerNumber": reg, "rollNumber": reg, "name": name }),
        );
    }
    for (id, code, name) in [
        ("4", "CS3451", "Operating Systems"),
        ("5", "MA8402", "Probability"),
    ] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "subjects.upsert",
            json!({ "code": code, "name": name, "semesterId": 1 }),
        );
    }

    // Arun averages 80 over two subjects; Divya has one mark of 60. The
    // class average is (80 + 60) / 2 regardless of subject counts.
    for (id, reg, code, marks) in [
        ("6", "310621104001", "CS3451", 75.0),
        ("7", "310621104001", "MA8402", 85.0),
        ("8", "310621104002", "CS3451", 60.0),
    ] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "marks.set",
            json!({
                "studentRegNo": reg,
                "subjectId": code,
                "semesterId": 1,
                "internalId": 1,
                "marks": marks
            }),
        );
    }

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "reports.classStatistics",
        json!({ "semesterId": 1, "internalId": 1 }),
    );
    let stats = result.get("statistics").expect("statistics");
    assert_eq!(stats.get("studentCount").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(stats.get("classAvgMark").and_then(|v| v.as_f64()), Some(70.0));

    let csv_out = workspace.join("class-internal-1.csv");
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "reports.classCsv",
        json!({ "semesterId": 1, "internalId": 1, "outPath": csv_out.to_string_lossy() }),
    );
    assert_eq!(exported.get("rows").and_then(|v| v.as_u64()), Some(2));

    let csv = std::fs::read_to_string(&csv_out).expect("read class csv");
    let mut lines = csv.lines();
    let header = lines.next().expect("header");
    assert!(header.starts_with("Register Number,Roll Number,Name"));
    assert!(header.contains("CS3451 (Marks)"));
    // Odd internal: no lab columns.
    assert!(!header.contains("(Lab)"));
    let first = lines.next().expect("first row");
    assert!(first.starts_with("310621104001,"));
    assert!(first.contains(",75,"));
    let second = lines.next().expect("second row");
    // Divya has no MA8402 mark; absences export as AB, not zero.
    assert!(second.contains(",AB,"));

    let csv_out_2 = workspace.join("class-internal-2.csv");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "reports.classCsv",
        json!({ "semesterId": 1, "internalId": 2, "outPath": csv_out_2.to_string_lossy() }),
    );
    let csv2 = std::fs::read_to_string(&csv_out_2).expect("read class csv 2");
    assert!(csv2.lines().next().expect("header").contains("CS3451 (Lab)"));
}

#[test]
fn consolidated_csv_is_a_sorted_grade_matrix() {
    let workspace = temp_dir("advisor-consolidated-csv");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for (id, reg, name) in [("2", "310621104002", "Divya"), ("3", "310621104001", "Arun")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "students.upsert",
            json!({ "registerNumber": reg, "rollNumber": reg, "name": name }),
        );
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.set",
        json!({
            "studentRegNo": "310621104002",
            "semesterId": 4,
            "results": { "MA8402": "B", "CS3451": "A" }
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.set",
        json!({
            "studentRegNo": "310621104001",
            "semesterId": 4,
            "results": { "CS3451": "O" }
        }),
    );

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.consolidatedCsv",
        json!({ "semesterId": 4 }),
    );
    assert_eq!(
        result.get("subjectCodes"),
        Some(&json!(["CS3451", "MA8402"]))
    );
    let csv = result.get("csv").and_then(|v| v.as_str()).expect("csv");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Register Number,Name,CS3451,MA8402"));
    assert_eq!(lines.next(), Some("310621104001,Arun,O,"));
    assert_eq!(lines.next(), Some("310621104002,Divya,A,B"));
}
