use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::types::{AppState, Request};

use super::helpers::{
    canonical_subject_key, check_score_range, load_config, now_rfc3339, required_f64,
    required_i64, required_str, with_conn, AppConfig, HandlerErr,
};

fn check_cycle(config: &AppConfig, semester_id: i64, internal_id: i64) -> Result<(), HandlerErr> {
    if semester_id < 1 {
        return Err(HandlerErr::bad_params("semesterId must be >= 1"));
    }
    if internal_id < 1 || internal_id > config.internals_per_semester {
        return Err(HandlerErr::bad_params(format!(
            "internalId must be between 1 and {}",
            config.internals_per_semester
        )));
    }
    Ok(())
}

/// Upsert into one of the subject-keyed record tables. Last write wins on the
/// composite key; that is the accepted concurrency model.
fn set_subject_record(
    conn: &Connection,
    params: &serde_json::Value,
    table: &str,
    value_column: &str,
    value_key: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let student_reg_no = required_str(params, "studentRegNo")?;
    let subject_id = required_str(params, "subjectId")?;
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;
    let value = required_f64(params, value_key)?;
    check_cycle(&load_config(conn)?, semester_id, internal_id)?;
    check_score_range(value, value_key)?;

    let subject_key = canonical_subject_key(conn, &subject_id)?;
    conn.execute(
        &format!(
            "INSERT INTO {table}(id, student_reg_no, subject_id, semester_id, internal_id, {value_column}, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_reg_no, subject_id, semester_id, internal_id) DO UPDATE SET
               {value_column} = excluded.{value_column},
               updated_at = excluded.updated_at"
        ),
        (
            Uuid::new_v4().to_string(),
            &student_reg_no,
            &subject_key,
            semester_id,
            internal_id,
            value,
            now_rfc3339(),
        ),
    )
    .map_err(HandlerErr::update)?;

    Ok(json!({
        "record": {
            "studentRegNo": student_reg_no,
            "subjectId": subject_key,
            "semesterId": semester_id,
            "internalId": internal_id,
            (value_key): value,
        }
    }))
}

fn list_subject_records(
    conn: &Connection,
    params: &serde_json::Value,
    table: &str,
    value_column: &str,
    value_key: &str,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;

    let mut stmt = conn
        .prepare(&format!(
            "SELECT student_reg_no, subject_id, {value_column}
             FROM {table}
             WHERE semester_id = ? AND internal_id = ?
             ORDER BY student_reg_no, subject_id"
        ))
        .map_err(HandlerErr::query)?;
    let records: Vec<serde_json::Value> = stmt
        .query_map([semester_id, internal_id], |r| {
            Ok(json!({
                "studentRegNo": r.get::<_, String>(0)?,
                "subjectId": r.get::<_, String>(1)?,
                (value_key): r.get::<_, f64>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "records": records }))
}

fn set_master_attendance(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_reg_no = required_str(params, "studentRegNo")?;
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;
    let percentage = required_f64(params, "percentage")?;
    check_cycle(&load_config(conn)?, semester_id, internal_id)?;
    check_score_range(percentage, "percentage")?;

    conn.execute(
        "INSERT INTO master_attendance(id, student_reg_no, semester_id, internal_id, percentage, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_reg_no, semester_id, internal_id) DO UPDATE SET
           percentage = excluded.percentage,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            &student_reg_no,
            semester_id,
            internal_id,
            percentage,
            now_rfc3339(),
        ),
    )
    .map_err(HandlerErr::update)?;

    Ok(json!({
        "record": {
            "studentRegNo": student_reg_no,
            "semesterId": semester_id,
            "internalId": internal_id,
            "percentage": percentage,
        }
    }))
}

fn list_master_attendance(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;

    let mut stmt = conn
        .prepare(
            "SELECT student_reg_no, percentage
             FROM master_attendance
             WHERE semester_id = ? AND internal_id = ?
             ORDER BY student_reg_no",
        )
        .map_err(HandlerErr::query)?;
    let records: Vec<serde_json::Value> = stmt
        .query_map([semester_id, internal_id], |r| {
            Ok(json!({
                "studentRegNo": r.get::<_, String>(0)?,
                "percentage": r.get::<_, f64>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "records": records }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.set" => Some(with_conn(state, req, |conn, params| {
            set_subject_record(conn, params, "marks", "marks", "marks")
        })),
        "marks.list" => Some(with_conn(state, req, |conn, params| {
            list_subject_records(conn, params, "marks", "marks", "marks")
        })),
        "labMarks.set" => Some(with_conn(state, req, |conn, params| {
            set_subject_record(conn, params, "lab_marks", "marks", "marks")
        })),
        "labMarks.list" => Some(with_conn(state, req, |conn, params| {
            list_subject_records(conn, params, "lab_marks", "marks", "marks")
        })),
        "attendance.set" => Some(with_conn(state, req, |conn, params| {
            set_subject_record(conn, params, "attendance", "percentage", "percentage")
        })),
        "attendance.list" => Some(with_conn(state, req, |conn, params| {
            list_subject_records(conn, params, "attendance", "percentage", "percentage")
        })),
        "masterAttendance.set" => Some(with_conn(state, req, set_master_attendance)),
        "masterAttendance.list" => Some(with_conn(state, req, list_master_attendance)),
        _ => None,
    }
}
