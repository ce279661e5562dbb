//! Parent-facing message templates. These interpolate report engine output;
//! the numbers themselves are computed in `report` and arrive here done.

use crate::report::{GradeResults, InternalReport, MarkValue, SemesterSummary, Trend};

fn mark_text(mark: MarkValue) -> String {
    match mark {
        MarkValue::Absent => "-".to_string(),
        MarkValue::Present(v) => format_number(v),
    }
}

/// Whole marks print without a decimal tail, everything else with two places.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{:.2}", v)
    }
}

pub fn compose_internal_message(
    student_name: &str,
    register_number: &str,
    semester_id: i64,
    report: &InternalReport,
    previous: Option<&InternalReport>,
) -> String {
    let subject_lines: Vec<String> = report
        .subjects
        .iter()
        .map(|line| format!("*{}*: {}", line.subject_name, mark_text(line.mark)))
        .collect();

    let trend_line = previous
        .map(|prev| {
            let label = match crate::report::trend(report.avg_marks, prev.avg_marks) {
                Trend::Improved => "Improved",
                Trend::Declined => "Needs Attention",
                Trend::Stable => "Stable",
            };
            format!("\n*Performance Trend*: {}", label)
        })
        .unwrap_or_default();

    format!(
        "*Academic Report - Sem {} Int {}*\n\n*Name*: {}\n*Reg No*: {}\n\n*Marks*:\n{}\n\n*Total*: {}\n*Avg*: {:.2}\n*Attendance*: {}%{}",
        semester_id,
        report.internal_id,
        student_name,
        register_number,
        subject_lines.join("\n"),
        format_number(report.total_marks),
        report.avg_marks,
        format_number(report.attendance_percentage),
        trend_line,
    )
}

pub fn compose_semester_message(
    student_name: &str,
    register_number: &str,
    summary: &SemesterSummary,
) -> String {
    let grades_block = match &summary.grades {
        GradeResults::Parsed(entries) => entries
            .iter()
            .map(|(code, grade)| format!("   - {}: {}", code, grade))
            .collect::<Vec<_>>()
            .join("\n"),
        GradeResults::Pending => "Result Pending".to_string(),
        GradeResults::Missing => "N/A".to_string(),
    };

    let mut body = format!(
        "*CONSOLIDATED ACADEMIC REPORT*\n*Semester {} Summary*\n\n*Name*: {}\n*Reg No*: {}\n",
        summary.semester_id, student_name, register_number,
    );
    for internal in &summary.internals {
        let lines: Vec<String> = internal
            .subjects
            .iter()
            .map(|line| format!("   - {}: {}", line.subject_code, mark_text(line.mark)))
            .collect();
        body.push_str(&format!(
            "\n*INTERNAL ASSESSMENT {}*:\n{}\n   *Int {} Avg*: {:.2}%\n",
            internal.internal_id,
            lines.join("\n"),
            internal.internal_id,
            internal.avg_marks,
        ));
    }
    body.push_str(&format!(
        "\n*ATTENDANCE*: {:.2}%\n\n*UNIVERSITY GRADES*:\n{}\n\n_This is an automated academic update for your reference._",
        summary.attendance_percentage, grades_block,
    ));
    body
}

/// WhatsApp deep link for a composed message. This is a string the UI opens
/// in a browser, not a transport.
pub fn wa_link(phone: &str, message: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("https://wa.me/{}?text={}", digits, percent_encode(message))
}

fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 3);
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// One `phone,"message"` row per student, the format bulk auto-senders eat.
pub fn bulk_csv_row(phone: &str, message: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{},\"{}\"", digits, message.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{InternalReport, SubjectLine};

    fn sample_report(internal_id: i64, avg: f64) -> InternalReport {
        InternalReport {
            internal_id,
            total_marks: avg * 2.0,
            avg_marks: avg,
            attendance_percentage: 90.0,
            subjects: vec![
                SubjectLine {
                    subject_code: "CS101".to_string(),
                    subject_name: "Data Structures".to_string(),
                    mark: MarkValue::Present(avg),
                    lab_mark: MarkValue::Absent,
                },
                SubjectLine {
                    subject_code: "CS102".to_string(),
                    subject_name: "Operating Systems".to_string(),
                    mark: MarkValue::Absent,
                    lab_mark: MarkValue::Absent,
                },
            ],
        }
    }

    #[test]
    fn internal_message_carries_marks_totals_and_trend() {
        let current = sample_report(2, 72.0);
        let previous = sample_report(1, 65.0);
        let msg =
            compose_internal_message("Arun Kumar", "310621104001", 1, &current, Some(&previous));
        assert!(msg.contains("*Name*: Arun Kumar"));
        assert!(msg.contains("*Reg No*: 310621104001"));
        assert!(msg.contains("*Data Structures*: 72"));
        assert!(msg.contains("*Operating Systems*: -"));
        assert!(msg.contains("*Avg*: 72.00"));
        assert!(msg.contains("*Attendance*: 90%"));
        assert!(msg.contains("*Performance Trend*: Improved"));
    }

    #[test]
    fn first_internal_has_no_trend_line() {
        let current = sample_report(1, 65.0);
        let msg = compose_internal_message("Arun", "310621104001", 1, &current, None);
        assert!(!msg.contains("Performance Trend"));
    }

    #[test]
    fn wa_link_strips_phone_punctuation_and_encodes_text() {
        let link = wa_link("+91 98765 43210", "Total: 140 & more");
        assert!(link.starts_with("https://wa.me/919876543210?text="));
        assert!(link.contains("Total%3A%20140%20%26%20more"));
    }

    #[test]
    fn bulk_row_escapes_embedded_quotes() {
        assert_eq!(
            bulk_csv_row("+91-9876543210", "said \"hi\""),
            "919876543210,\"said \"\"hi\"\"\""
        );
    }
}
