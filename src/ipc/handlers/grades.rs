use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::gradesheet;
use crate::ipc::types::{AppState, Request};

use super::helpers::{now_rfc3339, required_i64, required_str, with_conn, HandlerErr};

/// Merge new results into whatever is already stored for the (student,
/// semester) key. New codes win; codes absent from the incoming map keep
/// their stored grade. A stored blob that no longer parses is replaced
/// wholesale rather than wedging the import.
fn merge_results(
    conn: &Connection,
    student_reg_no: &str,
    semester_id: i64,
    incoming: &serde_json::Map<String, serde_json::Value>,
) -> Result<serde_json::Value, HandlerErr> {
    let existing_raw: Option<String> = conn
        .query_row(
            "SELECT results FROM semester_grades WHERE student_reg_no = ? AND semester_id = ?",
            (student_reg_no, semester_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;

    let mut merged = existing_raw
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    for (code, grade) in incoming {
        merged.insert(code.clone(), grade.clone());
    }
    let merged = serde_json::Value::Object(merged);

    conn.execute(
        "INSERT INTO semester_grades(id, student_reg_no, semester_id, results, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_reg_no, semester_id) DO UPDATE SET
           results = excluded.results,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            student_reg_no,
            semester_id,
            serde_json::to_string(&merged)
                .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?,
            now_rfc3339(),
        ),
    )
    .map_err(HandlerErr::update)?;

    Ok(merged)
}

fn student_exists(conn: &Connection, reg_no: &str) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM students WHERE register_number = ?",
        [reg_no],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::query)
}

fn grades_set(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_reg_no = required_str(params, "studentRegNo")?;
    let semester_id = required_i64(params, "semesterId")?;
    let Some(results) = params.get("results").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params(
            "results must be an object of subjectCode -> grade",
        ));
    };
    if !student_exists(conn, &student_reg_no)? {
        return Err(HandlerErr::new("not_found", "student not found"));
    }

    let merged = merge_results(conn, &student_reg_no, semester_id, results)?;
    Ok(json!({
        "grade": {
            "studentRegNo": student_reg_no,
            "semesterId": semester_id,
            "results": merged,
        }
    }))
}

fn grades_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_reg_no = params
        .get("studentRegNo")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let mut sql =
        String::from("SELECT student_reg_no, semester_id, results FROM semester_grades");
    if student_reg_no.is_some() {
        sql.push_str(" WHERE student_reg_no = ?");
    }
    sql.push_str(" ORDER BY student_reg_no, semester_id");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        let raw: String = r.get(2)?;
        let results = serde_json::from_str::<serde_json::Value>(&raw)
            .unwrap_or(serde_json::Value::Null);
        let status = if results.is_object() { "published" } else { "pending" };
        Ok(json!({
            "studentRegNo": r.get::<_, String>(0)?,
            "semesterId": r.get::<_, i64>(1)?,
            "results": results,
            "status": status,
        }))
    };
    let grades: Vec<serde_json::Value> = match &student_reg_no {
        Some(reg) => stmt
            .query_map([reg], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::query)?,
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::query)?,
    };
    Ok(json!({ "grades": grades }))
}

fn save_parsed_rows(
    conn: &Connection,
    rows: &[gradesheet::ParsedGradeRow],
    semester_id: i64,
) -> Result<(usize, usize), HandlerErr> {
    let mut saved = 0usize;
    let mut skipped = 0usize;
    for row in rows {
        // Rows for register numbers outside this class are expected in a
        // university-wide sheet; skip them without failing the import.
        if !student_exists(conn, &row.register_number)? {
            skipped += 1;
            continue;
        }
        let incoming: serde_json::Map<String, serde_json::Value> = row
            .results
            .iter()
            .map(|(code, grade)| (code.clone(), json!(grade)))
            .collect();
        merge_results(conn, &row.register_number, semester_id, &incoming)?;
        saved += 1;
    }
    Ok((saved, skipped))
}

/// Import a university result sheet from its extracted text. The caller may
/// pin the semester; otherwise the sheet's own "Semester No" line decides,
/// falling back to 1.
fn grades_import_sheet(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let text = required_str(params, "text")?;
    let sheet = gradesheet::parse_result_sheet(&text);
    let semester_id = params
        .get("semesterId")
        .and_then(|v| v.as_i64())
        .or(sheet.semester_id)
        .unwrap_or(1);

    let (saved, skipped) = save_parsed_rows(conn, &sheet.rows, semester_id)?;
    Ok(json!({
        "semesterId": semester_id,
        "headerCodes": sheet.header_codes,
        "rowsParsed": sheet.rows.len(),
        "saved": saved,
        "skipped": skipped,
    }))
}

fn grades_import_csv(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let content = required_str(params, "content")?;
    let semester_id = required_i64(params, "semesterId")?;
    let rows = gradesheet::parse_grade_csv(&content)
        .map_err(|e| HandlerErr::bad_params(e.to_string()))?;

    let (saved, skipped) = save_parsed_rows(conn, &rows, semester_id)?;
    Ok(json!({
        "semesterId": semester_id,
        "rowsParsed": rows.len(),
        "saved": saved,
        "skipped": skipped,
    }))
}

/// Pure conversion of sheet text to a CSV grade matrix; nothing is stored.
fn grades_sheet_to_csv(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let text = required_str(params, "text")?;
    let sheet = gradesheet::parse_result_sheet(&text);
    if sheet.header_codes.is_empty() {
        return Err(HandlerErr::new(
            "bad_params",
            "could not detect subject codes in the sheet header",
        ));
    }
    Ok(json!({
        "csv": gradesheet::sheet_to_csv(&sheet),
        "headerCodes": sheet.header_codes,
        "rows": sheet.rows.len(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.set" => Some(with_conn(state, req, grades_set)),
        "grades.list" => Some(with_conn(state, req, grades_list)),
        "grades.importSheet" => Some(with_conn(state, req, grades_import_sheet)),
        "grades.importCsv" => Some(with_conn(state, req, grades_import_csv)),
        "grades.sheetToCsv" => Some(with_conn(state, req, |_conn, params| {
            grades_sheet_to_csv(params)
        })),
        _ => None,
    }
}
