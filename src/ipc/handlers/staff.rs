use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::ipc::types::{AppState, Request};

use super::helpers::{optional_str, required_i64, required_str, with_conn, HandlerErr};

const ADVISOR_PASSWORD_KEY: &str = "advisor.password";
const DEFAULT_ADVISOR_PASSWORD: &str = "advisor";

fn staff_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, semester_id, subject_code, subject_name
             FROM staff
             ORDER BY semester_id, subject_code",
        )
        .map_err(HandlerErr::query)?;
    let staff: Vec<serde_json::Value> = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "semesterId": r.get::<_, i64>(2)?,
                "subjectCode": r.get::<_, String>(3)?,
                "subjectName": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "staff": staff }))
}

fn staff_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let semester_id = required_i64(params, "semesterId")?;
    let subject_code = required_str(params, "subjectCode")?;
    let subject_name = required_str(params, "subjectName")?;
    let password = required_str(params, "password")?;
    let id = optional_str(params, "id").unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        "INSERT INTO staff(id, name, semester_id, subject_code, subject_name, password)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(name, semester_id, subject_code) DO UPDATE SET
           subject_name = excluded.subject_name,
           password = excluded.password",
        (&id, &name, semester_id, &subject_code, &subject_name, &password),
    )
    .map_err(HandlerErr::update)?;

    Ok(json!({
        "staff": {
            "id": id,
            "name": name,
            "semesterId": semester_id,
            "subjectCode": subject_code,
            "subjectName": subject_name,
        }
    }))
}

fn staff_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let removed = conn
        .execute("DELETE FROM staff WHERE id = ?", [&id])
        .map_err(HandlerErr::update)?;
    if removed == 0 {
        return Err(HandlerErr::new("not_found", "staff member not found"));
    }
    Ok(json!({ "deleted": id }))
}

fn advisor_password(conn: &Connection) -> Result<String, HandlerErr> {
    let stored = db::settings_get_json(conn, ADVISOR_PASSWORD_KEY)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(stored
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| DEFAULT_ADVISOR_PASSWORD.to_string()))
}

/// A staff login may be backed by a `staff` row or by a subject's own
/// assigned-staff credential; both views merge into the roster, so both
/// resolve here.
fn find_staff_assignment(
    conn: &Connection,
    name: &str,
    password: &str,
) -> Result<Option<(String, i64, String, String)>, HandlerErr> {
    let assignment: Option<(String, i64, String, String)> = conn
        .query_row(
            "SELECT id, semester_id, subject_code, subject_name
             FROM staff
             WHERE name = ? AND password = ?",
            (name, password),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    if assignment.is_some() {
        return Ok(assignment);
    }
    conn.query_row(
        "SELECT id, semester_id, code, name
         FROM subjects
         WHERE assigned_staff = ? AND staff_password = ?",
        (name, password),
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
    )
    .optional()
    .map_err(HandlerErr::query)
}

/// Plaintext credential matching, carried over from the source dashboard.
/// This is an accepted non-goal, not a security boundary.
fn auth_login(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let role = required_str(params, "role")?;
    match role.as_str() {
        "advisor" => {
            let password = required_str(params, "password")?;
            if password != advisor_password(conn)? {
                return Err(HandlerErr::new("auth_failed", "invalid advisor password"));
            }
            Ok(json!({ "role": "advisor" }))
        }
        "staff" => {
            let name = required_str(params, "name")?;
            let password = required_str(params, "password")?;
            let Some((id, semester_id, subject_code, subject_name)) =
                find_staff_assignment(conn, &name, &password)?
            else {
                return Err(HandlerErr::new("auth_failed", "invalid staff credentials"));
            };
            Ok(json!({
                "role": "staff",
                "staff": {
                    "id": id,
                    "name": name,
                    "semesterId": semester_id,
                    "subjectCode": subject_code,
                    "subjectName": subject_name,
                }
            }))
        }
        "student" => {
            let register_number = required_str(params, "registerNumber")?;
            let roll_number = required_str(params, "rollNumber")?;
            let stored: Option<String> = conn
                .query_row(
                    "SELECT roll_number FROM students WHERE register_number = ?",
                    [&register_number],
                    |r| r.get(0),
                )
                .optional()
                .map_err(HandlerErr::query)?;
            if stored.as_deref() != Some(roll_number.as_str()) {
                return Err(HandlerErr::new("auth_failed", "invalid student credentials"));
            }
            Ok(json!({ "role": "student", "registerNumber": register_number }))
        }
        other => Err(HandlerErr {
            code: "bad_params",
            message: "role must be one of: advisor, staff, student".to_string(),
            details: Some(json!({ "role": other })),
        }),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.list" => Some(with_conn(state, req, |conn, _| staff_list(conn))),
        "staff.upsert" => Some(with_conn(state, req, staff_upsert)),
        "staff.delete" => Some(with_conn(state, req, staff_delete)),
        "auth.login" => Some(with_conn(state, req, auth_login)),
        _ => None,
    }
}
