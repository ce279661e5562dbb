use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "advisor.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            register_number TEXT PRIMARY KEY,
            roll_number TEXT NOT NULL,
            name TEXT NOT NULL,
            parent_contact TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    ensure_students_updated_at(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            assigned_staff TEXT,
            staff_password TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_semester ON subjects(semester_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_code ON subjects(code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            subject_code TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            password TEXT NOT NULL,
            UNIQUE(name, semester_id, subject_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_semester ON staff(semester_id)",
        [],
    )?;

    for table in ["marks", "lab_marks"] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table}(
                    id TEXT PRIMARY KEY,
                    student_reg_no TEXT NOT NULL,
                    subject_id TEXT NOT NULL,
                    semester_id INTEGER NOT NULL,
                    internal_id INTEGER NOT NULL,
                    marks REAL NOT NULL,
                    updated_at TEXT,
                    UNIQUE(student_reg_no, subject_id, semester_id, internal_id)
                )"
            ),
            [],
        )?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_student ON {table}(student_reg_no)"),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_cycle ON {table}(semester_id, internal_id)"
            ),
            [],
        )?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_reg_no TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            internal_id INTEGER NOT NULL,
            percentage REAL NOT NULL,
            updated_at TEXT,
            UNIQUE(student_reg_no, subject_id, semester_id, internal_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_reg_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS master_attendance(
            id TEXT PRIMARY KEY,
            student_reg_no TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            internal_id INTEGER NOT NULL,
            percentage REAL NOT NULL,
            updated_at TEXT,
            UNIQUE(student_reg_no, semester_id, internal_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_master_attendance_student
         ON master_attendance(student_reg_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS semester_grades(
            id TEXT PRIMARY KEY,
            student_reg_no TEXT NOT NULL,
            semester_id INTEGER NOT NULL,
            results TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE(student_reg_no, semester_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_semester_grades_student
         ON semester_grades(student_reg_no)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Older workspaces may hold record rows keyed by the subject's surrogate
    // id. Code is the canonical key; rewrite what resolves, the report
    // engine's dual match covers anything left behind.
    canonicalize_record_subject_keys(&conn)?;

    Ok(conn)
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn canonicalize_record_subject_keys(conn: &Connection) -> anyhow::Result<()> {
    for table in ["marks", "lab_marks", "attendance"] {
        conn.execute(
            &format!(
                "UPDATE {table}
                 SET subject_id = (SELECT code FROM subjects WHERE subjects.id = {table}.subject_id)
                 WHERE EXISTS (SELECT 1 FROM subjects WHERE subjects.id = {table}.subject_id)
                   AND NOT EXISTS (
                       SELECT 1 FROM {table} AS other
                       WHERE other.student_reg_no = {table}.student_reg_no
                         AND other.semester_id = {table}.semester_id
                         AND other.internal_id = {table}.internal_id
                         AND other.subject_id =
                             (SELECT code FROM subjects WHERE subjects.id = {table}.subject_id)
                   )"
            ),
            [],
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        None => Ok(None),
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
