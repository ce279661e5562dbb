
use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn out_of_range_scores_are_rejected_and_upserts_keep_the_last_write() {
    let workspace = temp_dir("advisor-write-boundary");
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

    let base = json!({
        "studentRegNo": "310621104001",
        "subjectId": "CS3451",
        "semesterId": 1,
        "internalId": 1
    });

    for (id, bad) in [("3", 150.0), ("4", -5.0)] {
        let mut params = base.clone();
        params["marks"] = json!(bad);
        let resp = request(&mut stdin, &mut reader, id, "marks.set", params);
        assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(error_code(&resp), "bad_params");
    }

    let mut params = base.clone();
    params["marks"] = json!(60.0);
    let _ = request_ok(&mut stdin, &mut reader, "5", "marks.set", params);

    // Same composite key again: the row is replaced, not duplicated.
    let mut params = base.clone();
    params["marks"] = json!(75.0);
    let _ = request_ok(&mut stdin, &mut reader, "6", "marks.set", params);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "marks.list",
        json!({ "semesterId": 1, "internalId": 1 }),
    );
    let records = listed
        .get("records")
        .and_then(|v| v.as_array())
        .expect("records array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("marks").and_then(|v| v.as_f64()), Some(75.0));

    let resp = request(
        &mut stdin,
        &mut reader,
        "8",
        "masterAttendance.set",
        json!({
            "studentRegNo": "310621104001",
            "semesterId": 1,
            "internalId": 1,
            "percentage": 120.0
        }),
    );
    assert_eq!(error_code(&resp), "bad_params");
}

#[test]
fn internal_ids_are_bounded_by_the_configured_cycle_count() {
    let workspace = temp_dir("advisor-cycle-bounds");
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

    // Default config runs two internals per semester.
    let lab = json!({
        "studentRegNo": "310621104001",
        "subjectId": "CS3451",
        "semesterId": 1,
        "internalId": 9,
        "marks": 40.0
    });
    let resp = request(&mut stdin, &mut reader, "3", "labMarks.set", lab);
    assert_eq!(error_code(&resp), "bad_params");

    let attendance = json!({
        "studentRegNo": "310621104001",
        "semesterId": 1,
        "internalId": 3,
        "percentage": 80.0
    });
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "masterAttendance.set",
        attendance.clone(),
    );
    assert_eq!(error_code(&resp), "bad_params");

    // Raising the configured cycle count widens the accepted range.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "config.update",
        json!({ "internalsPerSemester": 3 }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "6", "masterAttendance.set", attendance);
}

#[test]
fn writes_canonicalize_subject_ids_to_codes() {
    let workspace = temp_dir("advisor-canonical-key");
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
        json!({ "registerNumber": "310621104002", "rollNumber": "02", "name": "Divya" }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.upsert",
        json!({ "code": "MA8402", "name": "Probability", "semesterId": 1 }),
    );
    let subject_id = created
        .get("subject")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_str())
        .expect("subject id")
        .to_string();

    // Written with the surrogate id, stored and listed under the code.
    let set = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "marks.set",
        json!({
            "studentRegNo": "310621104002",
            "subjectId": subject_id,
            "semesterId": 1,
            "internalId": 1,
            "marks": 66.0
        }),
    );
    assert_eq!(
        set.get("record")
            .and_then(|r| r.get("subjectId"))
            .and_then(|v| v.as_str()),
        Some("MA8402")
    );

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.internal",
        json!({ "studentRegNo": "310621104002", "semesterId": 1, "internalId": 1 }),
    );
    let subjects = report
        .get("report")
        .and_then(|r| r.get("subjects"))
        .and_then(|v| v.as_array())
        .expect("subject lines");
    assert_eq!(subjects.len(), 1);
    assert_eq!(
        subjects[0].get("mark").and_then(|v| v.as_f64()),
        Some(66.0)
    );
}
