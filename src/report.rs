use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A recorded mark or attendance value for one subject, distinguishable from
/// a scored zero. `Absent` serializes as JSON null.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkValue {
    Absent,
    Present(f64),
}

impl MarkValue {
    pub fn as_present(self) -> Option<f64> {
        match self {
            MarkValue::Absent => None,
            MarkValue::Present(v) => Some(v),
        }
    }
}

impl Serialize for MarkValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MarkValue::Absent => serializer.serialize_none(),
            MarkValue::Present(v) => serializer.serialize_f64(*v),
        }
    }
}

/// A subject as resolved by the caller for one semester. The engine does not
/// filter subjects by semester itself; the roster is an input.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRef {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkRow {
    pub student_reg_no: String,
    pub subject_id: String,
    pub semester_id: i64,
    pub internal_id: i64,
    pub marks: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MasterAttendanceRow {
    pub student_reg_no: String,
    pub semester_id: i64,
    pub internal_id: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemesterGradeRow {
    pub student_reg_no: String,
    pub semester_id: i64,
    pub results: String,
}

/// Read-only snapshot of the collections the engine aggregates over. The
/// engine assumes scores were clamped to [0, 100] at the write boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot<'a> {
    pub marks: &'a [MarkRow],
    pub lab_marks: &'a [MarkRow],
    pub master_attendance: &'a [MasterAttendanceRow],
    pub semester_grades: &'a [SemesterGradeRow],
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLine {
    pub subject_code: String,
    pub subject_name: String,
    pub mark: MarkValue,
    pub lab_mark: MarkValue,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InternalReport {
    pub internal_id: i64,
    pub total_marks: f64,
    pub avg_marks: f64,
    pub attendance_percentage: f64,
    pub subjects: Vec<SubjectLine>,
}

/// Parsed state of a stored university result blob. Corrupt JSON degrades to
/// `Pending` rather than failing the summary.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeResults {
    Missing,
    Pending,
    Parsed(Vec<(String, String)>),
}

impl GradeResults {
    pub fn entries(&self) -> &[(String, String)] {
        match self {
            GradeResults::Parsed(entries) => entries,
            _ => &[],
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            GradeResults::Missing => "missing",
            GradeResults::Pending => "pending",
            GradeResults::Parsed(_) => "published",
        }
    }
}

impl Serialize for GradeResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("status", self.status())?;
        match self {
            GradeResults::Parsed(entries) => {
                let grades: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|(code, grade)| {
                        serde_json::json!({ "subjectCode": code, "grade": grade })
                    })
                    .collect();
                map.serialize_entry("grades", &grades)?;
            }
            _ => {
                map.serialize_entry("grades", &Vec::<serde_json::Value>::new())?;
            }
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SemesterSummary {
    pub semester_id: i64,
    pub internals: Vec<InternalReport>,
    pub attendance_percentage: f64,
    pub grades: GradeResults,
    pub gpa: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    pub student_count: usize,
    pub class_avg_mark: f64,
    pub class_avg_attendance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improved,
    Declined,
    Stable,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Trend::Improved => "improved",
            Trend::Declined => "declined",
            Trend::Stable => "stable",
        }
    }
}

/// Historical rows may carry the subject's surrogate id or its code in
/// `subject_id`; code is canonical going forward, the dual match is the
/// compatibility shim for rows written before canonicalization.
fn subject_key_matches(record_subject_id: &str, subject: &SubjectRef) -> bool {
    record_subject_id == subject.id || record_subject_id == subject.code
}

fn lookup_mark(
    rows: &[MarkRow],
    reg_no: &str,
    semester_id: i64,
    internal_id: i64,
    subject: &SubjectRef,
) -> MarkValue {
    rows.iter()
        .find(|r| {
            r.student_reg_no == reg_no
                && r.semester_id == semester_id
                && r.internal_id == internal_id
                && subject_key_matches(&r.subject_id, subject)
        })
        .map(|r| MarkValue::Present(r.marks))
        .unwrap_or(MarkValue::Absent)
}

fn lookup_master_attendance(
    rows: &[MasterAttendanceRow],
    reg_no: &str,
    semester_id: i64,
    internal_id: i64,
) -> f64 {
    rows.iter()
        .find(|r| {
            r.student_reg_no == reg_no
                && r.semester_id == semester_id
                && r.internal_id == internal_id
        })
        .map(|r| r.percentage)
        .unwrap_or(0.0)
}

/// One student's report for a single internal assessment cycle. Every lookup
/// miss degrades to absent/0 so a brand-new student still renders a report.
pub fn internal_report(
    snapshot: Snapshot<'_>,
    reg_no: &str,
    semester_id: i64,
    internal_id: i64,
    subjects: &[SubjectRef],
) -> InternalReport {
    let mut lines: Vec<SubjectLine> = Vec::with_capacity(subjects.len());
    let mut total = 0.0;
    let mut present = 0usize;

    for subject in subjects {
        let mark = lookup_mark(snapshot.marks, reg_no, semester_id, internal_id, subject);
        let lab_mark = lookup_mark(snapshot.lab_marks, reg_no, semester_id, internal_id, subject);
        if let Some(v) = mark.as_present() {
            total += v;
            present += 1;
        }
        lines.push(SubjectLine {
            subject_code: subject.code.clone(),
            subject_name: subject.name.clone(),
            mark,
            lab_mark,
        });
    }

    let avg = if present > 0 {
        total / present as f64
    } else {
        0.0
    };

    InternalReport {
        internal_id,
        total_marks: total,
        avg_marks: avg,
        attendance_percentage: lookup_master_attendance(
            snapshot.master_attendance,
            reg_no,
            semester_id,
            internal_id,
        ),
        subjects: lines,
    }
}

pub fn parse_grade_results(raw: &str) -> GradeResults {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return GradeResults::Pending,
    };
    let Some(map) = value.as_object() else {
        return GradeResults::Pending;
    };
    let mut entries: Vec<(String, String)> = Vec::with_capacity(map.len());
    for (code, grade) in map {
        let Some(grade) = grade.as_str() else {
            return GradeResults::Pending;
        };
        entries.push((code.clone(), grade.to_string()));
    }
    // serde_json maps iterate sorted by key, so grade rows come out ordered
    // by subject code.
    GradeResults::Parsed(entries)
}

pub fn grade_results_for(
    snapshot: Snapshot<'_>,
    reg_no: &str,
    semester_id: i64,
) -> GradeResults {
    snapshot
        .semester_grades
        .iter()
        .find(|g| g.student_reg_no == reg_no && g.semester_id == semester_id)
        .map(|g| parse_grade_results(&g.results))
        .unwrap_or(GradeResults::Missing)
}

/// All internals of one semester plus the derived semester attendance (mean
/// of the per-internal attendance percentages) and the university results.
pub fn semester_summary(
    snapshot: Snapshot<'_>,
    reg_no: &str,
    semester_id: i64,
    internals_per_semester: i64,
    subjects: &[SubjectRef],
) -> SemesterSummary {
    let count = internals_per_semester.max(1);
    let internals: Vec<InternalReport> = (1..=count)
        .map(|internal_id| internal_report(snapshot, reg_no, semester_id, internal_id, subjects))
        .collect();
    let attendance = internals
        .iter()
        .map(|r| r.attendance_percentage)
        .sum::<f64>()
        / internals.len() as f64;
    let grades = grade_results_for(snapshot, reg_no, semester_id);
    let gpa = gpa(grades.entries());

    SemesterSummary {
        semester_id,
        internals,
        attendance_percentage: attendance,
        grades,
        gpa,
    }
}

/// Class averages are the mean of each student's per-report average, not a
/// pooled mean over individual subject scores. Downstream displays depend on
/// this exact definition.
pub fn class_statistics(
    snapshot: Snapshot<'_>,
    student_reg_nos: &[String],
    semester_id: i64,
    internal_id: i64,
    subjects: &[SubjectRef],
) -> ClassStatistics {
    if student_reg_nos.is_empty() {
        return ClassStatistics {
            student_count: 0,
            class_avg_mark: 0.0,
            class_avg_attendance: 0.0,
        };
    }

    let mut sum_avg = 0.0;
    let mut sum_att = 0.0;
    for reg_no in student_reg_nos {
        let report = internal_report(snapshot, reg_no, semester_id, internal_id, subjects);
        sum_avg += report.avg_marks;
        sum_att += report.attendance_percentage;
    }
    let n = student_reg_nos.len() as f64;

    ClassStatistics {
        student_count: student_reg_nos.len(),
        class_avg_mark: sum_avg / n,
        class_avg_attendance: sum_att / n,
    }
}

/// Anna University style letter-to-point table. Unknown grades count as 0.
pub fn grade_point(letter: &str) -> f64 {
    match letter {
        "O" => 10.0,
        "A+" => 9.0,
        "A" => 8.0,
        "B+" => 7.0,
        "B" => 6.0,
        "C" => 5.0,
        _ => 0.0,
    }
}

/// Flat mean of grade points across one semester's results. Empty input is 0.
pub fn gpa(results: &[(String, String)]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let total: f64 = results.iter().map(|(_, grade)| grade_point(grade)).sum();
    total / results.len() as f64
}

/// Flat mean across the union of subjects in every semester with grades, not
/// a mean of per-semester GPAs. No credit-hours entity exists, so there is
/// nothing to weight by.
pub fn cgpa<'a, I>(all_results: I) -> f64
where
    I: IntoIterator<Item = &'a [(String, String)]>,
{
    let mut total = 0.0;
    let mut count = 0usize;
    for results in all_results {
        for (_, grade) in results {
            total += grade_point(grade);
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    total / count as f64
}

pub fn trend(current_avg: f64, previous_avg: f64) -> Trend {
    let diff = current_avg - previous_avg;
    if diff > 0.0 {
        Trend::Improved
    } else if diff < 0.0 {
        Trend::Declined
    } else {
        Trend::Stable
    }
}
