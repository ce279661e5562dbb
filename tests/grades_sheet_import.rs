
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

const SHEET: &str = "\
Anna University Results
Semester No : 4
Reg Number Name CS3451 CB3401 MA8402
310621104001 ARUN KUMAR O A+ B
310621104099 STRANGER FROM OTHER CLASS U U U
";

#[test]
fn sheet_import_saves_known_students_and_skips_the_rest() {
    let workspace = temp_dir("advisor-sheet-import");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.upsert",
        json!({ "registerNumber": "310621104001", "rollNumber": "01", "name": "Arun" }),
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.importSheet",
        json!({ "text": SHEET }),
    );
    assert_eq!(imported.get("semesterId").and_then(|v| v.as_i64()), Some(4));
    assert_eq!(imported.get("saved").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(imported.get("skipped").and_then(|v| v.as_u64()), Some(1));

    let grades = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.list",
        json!({ "studentRegNo": "310621104001" }),
    );
    let rows = grades
        .get("grades")
        .and_then(|v| v.as_array())
        .expect("grades");
    assert_eq!(rows.len(), 1);
    let results = rows[0].get("results").expect("results");
    assert_eq!(results.get("CS3451").and_then(|v| v.as_str()), Some("O"));
    assert_eq!(results.get("CB3401").and_then(|v| v.as_str()), Some("A+"));
    assert_eq!(results.get("MA8402").and_then(|v| v.as_str()), Some("B"));
}

#[test]
fn sheet_to_csv_converts_without_storing() {
    let workspace = temp_dir("advisor-sheet-to-csv");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let converted = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.sheetToCsv",
        json!({ "text": SHEET }),
    );
    let csv = converted.get("csv").and_then(|v| v.as_str()).expect("csv");
    assert!(csv.starts_with("Register Number,Student Name,CS3451,CB3401,MA8402\n"));
    assert!(csv.contains("310621104001,ARUN KUMAR,O,A+,B"));

    let grades = request_ok(&mut stdin, &mut reader, "3", "grades.list", json!({}));
    assert_eq!(
        grades.get("grades").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn grade_csv_import_uses_the_register_number_column() {
    let workspace = temp_dir("advisor-csv-import");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.upsert",
        json!({ "registerNumber": "310621104001", "rollNumber": "01", "name": "Arun" }),
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.importCsv",
        json!({
            "semesterId": 4,
            "content": "Register Number,Student Name,CS3451,CB3401\n310621104001,Arun,A,B+\n"
        }),
    );
    assert_eq!(imported.get("saved").and_then(|v| v.as_u64()), Some(1));

    let grades = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.list",
        json!({ "studentRegNo": "310621104001" }),
    );
    let rows = grades
        .get("grades")
        .and_then(|v| v.as_array())
        .expect("grades");
    assert_eq!(
        rows[0]
            .get("results")
            .and_then(|r| r.get("CB3401"))
            .and_then(|v| v.as_str()),
        Some("B+")
    );
}
