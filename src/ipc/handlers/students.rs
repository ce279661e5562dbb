use rusqlite::Connection;
use serde_json::json;

use crate::ipc::types::{AppState, Request};

use super::helpers::{
    load_students, now_rfc3339, optional_str, required_str, with_conn, HandlerErr,
};

fn students_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let students: Vec<serde_json::Value> = load_students(conn)?
        .into_iter()
        .map(|s| {
            json!({
                "registerNumber": s.register_number,
                "rollNumber": s.roll_number,
                "name": s.name,
                "parentContact": s.parent_contact,
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn students_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let register_number = required_str(params, "registerNumber")?;
    if register_number.trim().is_empty() {
        return Err(HandlerErr::bad_params("registerNumber must not be blank"));
    }
    let roll_number = required_str(params, "rollNumber")?;
    let name = required_str(params, "name")?;
    let parent_contact = optional_str(params, "parentContact");

    conn.execute(
        "INSERT INTO students(register_number, roll_number, name, parent_contact, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(register_number) DO UPDATE SET
           roll_number = excluded.roll_number,
           name = excluded.name,
           parent_contact = excluded.parent_contact,
           updated_at = excluded.updated_at",
        (
            &register_number,
            &roll_number,
            &name,
            &parent_contact,
            now_rfc3339(),
        ),
    )
    .map_err(HandlerErr::update)?;

    Ok(json!({
        "student": {
            "registerNumber": register_number,
            "rollNumber": roll_number,
            "name": name,
            "parentContact": parent_contact,
        }
    }))
}

/// Deleting a student removes every record keyed by the register number.
fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let register_number = required_str(params, "registerNumber")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for table in [
        "marks",
        "lab_marks",
        "attendance",
        "master_attendance",
        "semester_grades",
    ] {
        tx.execute(
            &format!("DELETE FROM {table} WHERE student_reg_no = ?"),
            [&register_number],
        )
        .map_err(HandlerErr::update)?;
    }
    let removed = tx
        .execute(
            "DELETE FROM students WHERE register_number = ?",
            [&register_number],
        )
        .map_err(HandlerErr::update)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    if removed == 0 {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    Ok(json!({ "deleted": register_number }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn(state, req, |conn, _| students_list(conn))),
        "students.upsert" => Some(with_conn(state, req, students_upsert)),
        "students.delete" => Some(with_conn(state, req, students_delete)),
        _ => None,
    }
}
