use rusqlite::Connection;
use serde_json::json;

use crate::ipc::types::{AppState, Request};
use crate::message;
use crate::report;

use super::helpers::{
    find_student, load_config, load_records, load_students, required_i64, required_str,
    semester_roster, with_conn, HandlerErr, StudentRow,
};

fn internal_message_for(
    conn: &Connection,
    student: &StudentRow,
    semester_id: i64,
    internal_id: i64,
) -> Result<(String, Option<report::Trend>), HandlerErr> {
    let roster = semester_roster(conn, semester_id)?;
    let records = load_records(conn)?;
    let snapshot = records.snapshot();
    let report = report::internal_report(
        snapshot,
        &student.register_number,
        semester_id,
        internal_id,
        &roster,
    );
    // The trend line compares against the previous cycle; the first internal
    // has nothing to compare against.
    let previous = (internal_id > 1).then(|| {
        report::internal_report(
            snapshot,
            &student.register_number,
            semester_id,
            internal_id - 1,
            &roster,
        )
    });
    let trend = previous
        .as_ref()
        .map(|prev| report::trend(report.avg_marks, prev.avg_marks));
    let text = message::compose_internal_message(
        &student.name,
        &student.register_number,
        semester_id,
        &report,
        previous.as_ref(),
    );
    Ok((text, trend))
}

fn compose_internal(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let reg_no = required_str(params, "studentRegNo")?;
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;
    let Some(student) = find_student(conn, &reg_no)? else {
        return Err(HandlerErr::new("not_found", "student not found"));
    };

    let (text, trend) = internal_message_for(conn, &student, semester_id, internal_id)?;
    let wa_link = student
        .parent_contact
        .as_deref()
        .map(|phone| message::wa_link(phone, &text));
    Ok(json!({
        "message": text,
        "waLink": wa_link,
        "trend": trend.map(|t| t.as_str()),
    }))
}

fn compose_semester(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let reg_no = required_str(params, "studentRegNo")?;
    let semester_id = required_i64(params, "semesterId")?;
    let Some(student) = find_student(conn, &reg_no)? else {
        return Err(HandlerErr::new("not_found", "student not found"));
    };

    let config = load_config(conn)?;
    let roster = semester_roster(conn, semester_id)?;
    let records = load_records(conn)?;
    let summary = report::semester_summary(
        records.snapshot(),
        &reg_no,
        semester_id,
        config.internals_per_semester,
        &roster,
    );
    let text = message::compose_semester_message(&student.name, &student.register_number, &summary);
    let wa_link = student
        .parent_contact
        .as_deref()
        .map(|phone| message::wa_link(phone, &text));
    Ok(json!({ "message": text, "waLink": wa_link }))
}

fn wa_link(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let phone = required_str(params, "phone")?;
    let text = required_str(params, "message")?;
    if !phone.chars().any(|c| c.is_ascii_digit()) {
        return Err(HandlerErr::bad_params("phone has no digits"));
    }
    Ok(json!({ "waLink": message::wa_link(&phone, &text) }))
}

/// One `phone,"message"` row per student with a parent contact on file.
/// Students without one are counted but produce no row.
fn bulk_csv(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;

    let students = load_students(conn)?;
    let mut csv = String::new();
    let mut rows = 0usize;
    let mut skipped = 0usize;
    for student in &students {
        let Some(phone) = student.parent_contact.as_deref().filter(|p| !p.is_empty()) else {
            skipped += 1;
            continue;
        };
        let (text, _) = internal_message_for(conn, student, semester_id, internal_id)?;
        csv.push_str(&message::bulk_csv_row(phone, &text));
        csv.push('\n');
        rows += 1;
    }

    if let Some(path) = params.get("outPath").and_then(|v| v.as_str()) {
        std::fs::write(path, &csv)
            .map_err(|e| HandlerErr::bad_params(format!("cannot write {}: {}", path, e)))?;
    }
    Ok(json!({ "csv": csv, "rows": rows, "skipped": skipped }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "broadcast.composeInternal" => Some(with_conn(state, req, compose_internal)),
        "broadcast.composeSemester" => Some(with_conn(state, req, compose_semester)),
        "broadcast.waLink" => Some(with_conn(state, req, |_conn, params| wa_link(params))),
        "broadcast.bulkCsv" => Some(with_conn(state, req, bulk_csv)),
        _ => None,
    }
}
