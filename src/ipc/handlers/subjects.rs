use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::types::{AppState, Request};

use super::helpers::{
    optional_str, required_i64, required_str, semester_roster, with_conn, HandlerErr,
};

fn subjects_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = params.get("semesterId").and_then(|v| v.as_i64());
    let mut sql = String::from(
        "SELECT id, code, name, semester_id, assigned_staff FROM subjects",
    );
    if semester_id.is_some() {
        sql.push_str(" WHERE semester_id = ?");
    }
    sql.push_str(" ORDER BY semester_id, code");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "code": r.get::<_, String>(1)?,
            "name": r.get::<_, String>(2)?,
            "semesterId": r.get::<_, i64>(3)?,
            "assignedStaff": r.get::<_, Option<String>>(4)?,
        }))
    };
    let subjects: Vec<serde_json::Value> = match semester_id {
        Some(sem) => stmt
            .query_map([sem], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::query)?,
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::query)?,
    };
    Ok(json!({ "subjects": subjects }))
}

fn subjects_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let code = required_str(params, "code")?;
    let name = required_str(params, "name")?;
    let semester_id = required_i64(params, "semesterId")?;
    if semester_id < 1 {
        return Err(HandlerErr::bad_params("semesterId must be >= 1"));
    }
    let assigned_staff = optional_str(params, "assignedStaff");
    let staff_password = optional_str(params, "staffPassword");
    let id = optional_str(params, "id").unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        "INSERT INTO subjects(id, code, name, semester_id, assigned_staff, staff_password)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           code = excluded.code,
           name = excluded.name,
           semester_id = excluded.semester_id,
           assigned_staff = excluded.assigned_staff,
           staff_password = excluded.staff_password",
        (&id, &code, &name, semester_id, &assigned_staff, &staff_password),
    )
    .map_err(HandlerErr::update)?;

    Ok(json!({
        "subject": {
            "id": id,
            "code": code,
            "name": name,
            "semesterId": semester_id,
            "assignedStaff": assigned_staff,
        }
    }))
}

/// Deleting a subject removes the mark and attendance rows keyed by either
/// its id or its code (historical rows may carry either).
fn subjects_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let id = required_str(params, "id")?;

    use rusqlite::OptionalExtension;
    let code: Option<String> = conn
        .query_row("SELECT code FROM subjects WHERE id = ?", [&id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(code) = code else {
        return Err(HandlerErr::new("not_found", "subject not found"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for table in ["marks", "lab_marks", "attendance"] {
        tx.execute(
            &format!("DELETE FROM {table} WHERE subject_id = ? OR subject_id = ?"),
            (&id, &code),
        )
        .map_err(HandlerErr::update)?;
    }
    tx.execute("DELETE FROM subjects WHERE id = ?", [&id])
        .map_err(HandlerErr::update)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    Ok(json!({ "deleted": id }))
}

fn subjects_semester_roster(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = required_i64(params, "semesterId")?;
    let roster: Vec<serde_json::Value> = semester_roster(conn, semester_id)?
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id,
                "code": s.code,
                "name": s.name,
                "semesterId": semester_id,
            })
        })
        .collect();
    Ok(json!({ "subjects": roster }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(with_conn(state, req, subjects_list)),
        "subjects.upsert" => Some(with_conn(state, req, subjects_upsert)),
        "subjects.delete" => Some(with_conn(state, req, subjects_delete)),
        "subjects.semesterRoster" => Some(with_conn(state, req, subjects_semester_roster)),
        _ => None,
    }
}
