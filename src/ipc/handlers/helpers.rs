use rusqlite::Connection;
use serde_json::json;

use crate::db;
use crate::ipc::error::err;
use crate::report::{MarkRow, MasterAttendanceRow, SemesterGradeRow, Snapshot, SubjectRef};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn query(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn update(e: rusqlite::Error) -> Self {
        Self::new("db_update_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn with_conn(
    state: &mut crate::ipc::types::AppState,
    req: &crate::ipc::types::Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => crate::ipc::error::ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Scores and percentages are validated here, at the write boundary. The
/// report engine assumes clamped input and never re-checks.
pub fn check_score_range(value: f64, what: &str) -> Result<(), HandlerErr> {
    if !(0.0..=100.0).contains(&value) || !value.is_finite() {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("{} must be between 0 and 100", what),
            details: Some(json!({ "value": value })),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppConfig {
    pub years: i64,
    pub semesters: i64,
    pub internals_per_semester: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            years: 4,
            semesters: 8,
            internals_per_semester: 2,
        }
    }
}

pub fn load_config(conn: &Connection) -> Result<AppConfig, HandlerErr> {
    let raw = db::settings_get_json(conn, "config")
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let defaults = AppConfig::default();
    let Some(raw) = raw else {
        return Ok(defaults);
    };
    Ok(AppConfig {
        years: raw
            .get("years")
            .and_then(|v| v.as_i64())
            .unwrap_or(defaults.years),
        semesters: raw
            .get("semesters")
            .and_then(|v| v.as_i64())
            .unwrap_or(defaults.semesters),
        internals_per_semester: raw
            .get("internalsPerSemester")
            .and_then(|v| v.as_i64())
            .unwrap_or(defaults.internals_per_semester),
    })
}

/// Owned copy of the record collections the report engine aggregates over.
/// The whole dataset is class-sized, so loading it wholesale per request is
/// the same order of work the dashboard did.
pub struct RecordSet {
    pub marks: Vec<MarkRow>,
    pub lab_marks: Vec<MarkRow>,
    pub master_attendance: Vec<MasterAttendanceRow>,
    pub semester_grades: Vec<SemesterGradeRow>,
}

impl RecordSet {
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            marks: &self.marks,
            lab_marks: &self.lab_marks,
            master_attendance: &self.master_attendance,
            semester_grades: &self.semester_grades,
        }
    }
}

fn load_mark_rows(conn: &Connection, table: &str) -> Result<Vec<MarkRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT student_reg_no, subject_id, semester_id, internal_id, marks FROM {table}"
        ))
        .map_err(HandlerErr::query)?;
    stmt.query_map([], |r| {
        Ok(MarkRow {
            student_reg_no: r.get(0)?,
            subject_id: r.get(1)?,
            semester_id: r.get(2)?,
            internal_id: r.get(3)?,
            marks: r.get(4)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::query)
}

pub fn load_records(conn: &Connection) -> Result<RecordSet, HandlerErr> {
    let marks = load_mark_rows(conn, "marks")?;
    let lab_marks = load_mark_rows(conn, "lab_marks")?;

    let mut stmt = conn
        .prepare("SELECT student_reg_no, semester_id, internal_id, percentage FROM master_attendance")
        .map_err(HandlerErr::query)?;
    let master_attendance = stmt
        .query_map([], |r| {
            Ok(MasterAttendanceRow {
                student_reg_no: r.get(0)?,
                semester_id: r.get(1)?,
                internal_id: r.get(2)?,
                percentage: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut stmt = conn
        .prepare("SELECT student_reg_no, semester_id, results FROM semester_grades")
        .map_err(HandlerErr::query)?;
    let semester_grades = stmt
        .query_map([], |r| {
            Ok(SemesterGradeRow {
                student_reg_no: r.get(0)?,
                semester_id: r.get(1)?,
                results: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(RecordSet {
        marks,
        lab_marks,
        master_attendance,
        semester_grades,
    })
}

/// The semester roster is the union of registered subjects and staff
/// assignments, merged by code so the two views cannot diverge in report
/// output. Sorted by code for stable column order.
pub fn semester_roster(
    conn: &Connection,
    semester_id: i64,
) -> Result<Vec<SubjectRef>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, code, name FROM subjects WHERE semester_id = ? ORDER BY code")
        .map_err(HandlerErr::query)?;
    let mut roster: Vec<SubjectRef> = stmt
        .query_map([semester_id], |r| {
            Ok(SubjectRef {
                id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut stmt = conn
        .prepare("SELECT subject_code, subject_name FROM staff WHERE semester_id = ?")
        .map_err(HandlerErr::query)?;
    let assignments: Vec<(String, String)> = stmt
        .query_map([semester_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    for (code, name) in assignments {
        if !roster.iter().any(|s| s.code == code) {
            roster.push(SubjectRef {
                id: code.clone(),
                code,
                name,
            });
        }
    }
    roster.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(roster)
}

pub fn student_reg_nos(conn: &Connection) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT register_number FROM students ORDER BY register_number")
        .map_err(HandlerErr::query)?;
    stmt.query_map([], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub register_number: String,
    pub roll_number: String,
    pub name: String,
    pub parent_contact: Option<String>,
}

pub fn load_students(conn: &Connection) -> Result<Vec<StudentRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT register_number, roll_number, name, parent_contact
             FROM students
             ORDER BY register_number",
        )
        .map_err(HandlerErr::query)?;
    stmt.query_map([], |r| {
        Ok(StudentRow {
            register_number: r.get(0)?,
            roll_number: r.get(1)?,
            name: r.get(2)?,
            parent_contact: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::query)
}

pub fn find_student(
    conn: &Connection,
    reg_no: &str,
) -> Result<Option<StudentRow>, HandlerErr> {
    use rusqlite::OptionalExtension;
    conn.query_row(
        "SELECT register_number, roll_number, name, parent_contact
         FROM students
         WHERE register_number = ?",
        [reg_no],
        |r| {
            Ok(StudentRow {
                register_number: r.get(0)?,
                roll_number: r.get(1)?,
                name: r.get(2)?,
                parent_contact: r.get(3)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::query)
}

/// Writes canonicalize the record key to the subject code when the supplied
/// id resolves to a registered subject. Unknown ids are stored as-is; the
/// engine's dual match picks them up.
pub fn canonical_subject_key(conn: &Connection, subject_id: &str) -> Result<String, HandlerErr> {
    use rusqlite::OptionalExtension;
    let code: Option<String> = conn
        .query_row("SELECT code FROM subjects WHERE id = ?", [subject_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::query)?;
    Ok(code.unwrap_or_else(|| subject_id.to_string()))
}
