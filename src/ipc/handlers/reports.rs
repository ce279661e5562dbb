use rusqlite::Connection;
use serde_json::json;

use crate::ipc::types::{AppState, Request};
use crate::report::{self, GradeResults, MarkValue};

use super::helpers::{
    find_student, load_config, load_records, load_students, required_i64, required_str,
    semester_roster, student_reg_nos, with_conn, HandlerErr,
};

fn csv_cell(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn mark_cell(value: MarkValue) -> String {
    match value {
        MarkValue::Absent => "AB".to_string(),
        MarkValue::Present(v) => format!("{}", v),
    }
}

fn write_out(path: &str, content: &str) -> Result<(), HandlerErr> {
    std::fs::write(path, content).map_err(|e| {
        HandlerErr::bad_params(format!("cannot write {}: {}", path, e))
    })
}

fn report_internal(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let reg_no = required_str(params, "studentRegNo")?;
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;
    if find_student(conn, &reg_no)?.is_none() {
        return Err(HandlerErr::new("not_found", "student not found"));
    }

    let roster = semester_roster(conn, semester_id)?;
    let records = load_records(conn)?;
    let report =
        report::internal_report(records.snapshot(), &reg_no, semester_id, internal_id, &roster);
    Ok(json!({ "report": report }))
}

fn report_semester_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let reg_no = required_str(params, "studentRegNo")?;
    let semester_id = required_i64(params, "semesterId")?;
    if find_student(conn, &reg_no)?.is_none() {
        return Err(HandlerErr::new("not_found", "student not found"));
    }

    let config = load_config(conn)?;
    let roster = semester_roster(conn, semester_id)?;
    let records = load_records(conn)?;
    let snapshot = records.snapshot();
    let summary = report::semester_summary(
        snapshot,
        &reg_no,
        semester_id,
        config.internals_per_semester,
        &roster,
    );

    // CGPA spans every semester the student has published results for, not
    // just the one being summarized.
    let all: Vec<GradeResults> = (1..=config.semesters)
        .map(|sem| report::grade_results_for(snapshot, &reg_no, sem))
        .collect();
    let cgpa = report::cgpa(all.iter().map(|g| g.entries()));

    Ok(json!({ "summary": summary, "cgpa": cgpa }))
}

fn report_class_statistics(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;

    let students = student_reg_nos(conn)?;
    let roster = semester_roster(conn, semester_id)?;
    let records = load_records(conn)?;
    let stats = report::class_statistics(
        records.snapshot(),
        &students,
        semester_id,
        internal_id,
        &roster,
    );
    Ok(json!({ "statistics": stats }))
}

/// Class matrix for one internal: a row per student with every roster
/// subject's mark, lab columns only on even internals (lab assessments run
/// on the second cycle), then total, average and master attendance.
fn report_class_csv(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = required_i64(params, "semesterId")?;
    let internal_id = required_i64(params, "internalId")?;

    let roster = semester_roster(conn, semester_id)?;
    let students = load_students(conn)?;
    let records = load_records(conn)?;
    let snapshot = records.snapshot();
    let with_labs = internal_id % 2 == 0;

    let mut csv = String::from("Register Number,Roll Number,Name");
    for subject in &roster {
        csv.push_str(&format!(",{} (Marks)", subject.code));
        if with_labs {
            csv.push_str(&format!(",{} (Lab)", subject.code));
        }
    }
    csv.push_str(",Total,Average,Attendance %\n");

    for student in &students {
        let report = report::internal_report(
            snapshot,
            &student.register_number,
            semester_id,
            internal_id,
            &roster,
        );
        csv.push_str(&csv_cell(&student.register_number));
        csv.push(',');
        csv.push_str(&csv_cell(&student.roll_number));
        csv.push(',');
        csv.push_str(&csv_cell(&student.name));
        for line in &report.subjects {
            csv.push(',');
            csv.push_str(&mark_cell(line.mark));
            if with_labs {
                csv.push(',');
                csv.push_str(&mark_cell(line.lab_mark));
            }
        }
        csv.push_str(&format!(
            ",{},{:.2},{:.2}\n",
            report.total_marks, report.avg_marks, report.attendance_percentage
        ));
    }

    if let Some(path) = params.get("outPath").and_then(|v| v.as_str()) {
        write_out(path, &csv)?;
    }
    Ok(json!({ "csv": csv, "rows": students.len() }))
}

/// University-grade matrix for one semester: sorted union of subject codes as
/// columns, one row per graded student. Unparsable blobs contribute a row
/// with blank grades so the register number still shows up.
fn report_consolidated_csv(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let semester_id = required_i64(params, "semesterId")?;

    let records = load_records(conn)?;
    let students = load_students(conn)?;
    let name_of = |reg: &str| {
        students
            .iter()
            .find(|s| s.register_number == reg)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    };

    let mut graded: Vec<(String, GradeResults)> = records
        .semester_grades
        .iter()
        .filter(|g| g.semester_id == semester_id)
        .map(|g| {
            (
                g.student_reg_no.clone(),
                report::parse_grade_results(&g.results),
            )
        })
        .collect();
    graded.sort_by(|a, b| a.0.cmp(&b.0));

    let mut codes: Vec<String> = Vec::new();
    for (_, results) in &graded {
        for (code, _) in results.entries() {
            if !codes.contains(code) {
                codes.push(code.clone());
            }
        }
    }
    codes.sort();

    let mut csv = String::from("Register Number,Name");
    for code in &codes {
        csv.push(',');
        csv.push_str(code);
    }
    csv.push('\n');

    for (reg_no, results) in &graded {
        csv.push_str(&csv_cell(reg_no));
        csv.push(',');
        csv.push_str(&csv_cell(&name_of(reg_no)));
        for code in &codes {
            csv.push(',');
            if let Some((_, grade)) = results.entries().iter().find(|(c, _)| c == code) {
                csv.push_str(grade);
            }
        }
        csv.push('\n');
    }

    if let Some(path) = params.get("outPath").and_then(|v| v.as_str()) {
        write_out(path, &csv)?;
    }
    Ok(json!({ "csv": csv, "rows": graded.len(), "subjectCodes": codes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.internal" => Some(with_conn(state, req, report_internal)),
        "reports.semesterSummary" => Some(with_conn(state, req, report_semester_summary)),
        "reports.classStatistics" => Some(with_conn(state, req, report_class_statistics)),
        "reports.classCsv" => Some(with_conn(state, req, report_class_csv)),
        "reports.consolidatedCsv" => Some(with_conn(state, req, report_consolidated_csv)),
        _ => None,
    }
}
