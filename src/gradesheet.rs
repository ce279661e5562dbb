//! Parsers for university result sheets. The UI extracts plain text from the
//! published PDF before handing it over; this module only deals with the
//! text layout: a header row of subject codes followed by one row per
//! student, register number first, letter grades at the tail of the line.

const GRADE_TOKENS: &[&str] = &[
    "O", "A+", "A", "B+", "B", "C", "U", "UA", "RA", "AB", "W", "I", "SA",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGradeRow {
    pub register_number: String,
    pub student_name: String,
    pub results: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSheet {
    pub semester_id: Option<i64>,
    pub header_codes: Vec<String>,
    pub rows: Vec<ParsedGradeRow>,
}

pub fn is_grade_token(token: &str) -> bool {
    GRADE_TOKENS.contains(&token) || token.starts_with("WH")
}

/// Subject codes look like CS3451, MA8402, NM1074: a short run of uppercase
/// letters followed by a short run of digits, nothing else.
pub fn is_subject_code(token: &str) -> bool {
    let letters: String = token.chars().take_while(|c| c.is_ascii_uppercase()).collect();
    let rest = &token[letters.len()..];
    if letters.is_empty() || letters.len() > 6 {
        return false;
    }
    if rest.is_empty() || rest.len() > 6 {
        return false;
    }
    rest.chars().all(|c| c.is_ascii_digit())
}

/// University register numbers are exactly 12 digits, not embedded in a
/// longer digit run.
fn find_register_number(line: &str) -> Option<(String, usize)> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i - start == 12 {
            return Some((line[start..i].to_string(), i));
        }
    }
    None
}

fn detect_semester(text: &str) -> Option<i64> {
    let lower = text.to_ascii_lowercase();
    let at = lower.find("semester no")?;
    let tail = &text[at + "semester no".len()..];
    let digits: String = tail
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().ok()
}

fn extract_name(tokens: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for token in tokens {
        if is_grade_token(token) || is_subject_code(token) {
            break;
        }
        if !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphabetic() || c == '.' || c == ',')
        {
            parts.push(token);
        }
    }
    parts.join(" ")
}

/// The tail of a data row should be one token per header subject. A long
/// non-grade token in that window means the columns did not line up (wrapped
/// name, merged cells), so the row is dropped rather than mis-assigned.
fn align_tail(tokens: &[&str], header_codes: &[String]) -> Option<Vec<(String, String)>> {
    if tokens.len() < header_codes.len() {
        return None;
    }
    let start = tokens.len() - header_codes.len();
    let mut results = Vec::with_capacity(header_codes.len());
    for (i, code) in header_codes.iter().enumerate() {
        let token = tokens[start + i];
        if !is_grade_token(token) && token.len() > 3 {
            return None;
        }
        results.push((code.clone(), token.to_string()));
    }
    Some(results)
}

pub fn parse_result_sheet(text: &str) -> ParsedSheet {
    let lines: Vec<&str> = text.lines().collect();

    // Header rows carry three or more subject codes and no register number.
    // Multi-line headers merge in reading order.
    let mut header_codes: Vec<String> = Vec::new();
    for line in &lines {
        if find_register_number(line).is_some() {
            continue;
        }
        let found: Vec<String> = line
            .split_whitespace()
            .filter(|t| is_subject_code(t))
            .map(|t| t.to_string())
            .collect();
        if found.len() >= 3 {
            for code in found {
                if !header_codes.contains(&code) {
                    header_codes.push(code);
                }
            }
        }
    }

    let mut rows: Vec<ParsedGradeRow> = Vec::new();
    for line in &lines {
        let Some((register_number, end)) = find_register_number(line) else {
            continue;
        };
        let remainder = line[end..].trim();
        let tokens: Vec<&str> = remainder.split_whitespace().collect();
        let student_name = extract_name(&tokens);

        let results = if !header_codes.is_empty() {
            align_tail(&tokens, &header_codes)
        } else {
            // No header detected: accept a single "CODE GRADE" pair per row.
            tokens
                .iter()
                .position(|t| is_subject_code(t))
                .and_then(|pos| {
                    let code = tokens[pos];
                    let grade = tokens.get(pos + 1)?;
                    is_grade_token(grade).then(|| vec![(code.to_string(), grade.to_string())])
                })
        };

        if let Some(results) = results {
            rows.push(ParsedGradeRow {
                register_number,
                student_name,
                results,
            });
        }
    }

    ParsedSheet {
        semester_id: detect_semester(text),
        header_codes,
        rows,
    }
}

/// Result-sheet text rendered as a CSV matrix, no store involved.
pub fn sheet_to_csv(sheet: &ParsedSheet) -> String {
    let mut out = String::from("Register Number,Student Name");
    for code in &sheet.header_codes {
        out.push(',');
        out.push_str(code);
    }
    out.push('\n');

    for row in &sheet.rows {
        out.push_str(&row.register_number);
        out.push(',');
        out.push_str(if row.student_name.is_empty() {
            "Unknown"
        } else {
            &row.student_name
        });
        for code in &sheet.header_codes {
            out.push(',');
            if let Some((_, grade)) = row.results.iter().find(|(c, _)| c == code) {
                out.push_str(grade);
            }
        }
        out.push('\n');
    }
    out
}

/// Advisor-edited grade CSV: a Register Number column plus one column per
/// subject code. Name columns are passed through, blank grades are skipped.
pub fn parse_grade_csv(content: &str) -> anyhow::Result<Vec<ParsedGradeRow>> {
    let mut lines = content.lines();
    let Some(header_line) = lines.next() else {
        return Ok(Vec::new());
    };

    let headers: Vec<&str> = header_line.split(',').map(|h| h.trim()).collect();
    let mut reg_no_index: Option<usize> = None;
    let mut name_index: Option<usize> = None;
    let mut subject_columns: Vec<(usize, String)> = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        if header.eq_ignore_ascii_case("Register Number")
            || header.eq_ignore_ascii_case("Reg No")
            || header.eq_ignore_ascii_case("RegNo")
        {
            reg_no_index = Some(i);
        } else if header.eq_ignore_ascii_case("Name")
            || header.eq_ignore_ascii_case("Student Name")
        {
            name_index = Some(i);
        } else if !header.eq_ignore_ascii_case("S.No") && !header.is_empty() {
            subject_columns.push((i, header.to_string()));
        }
    }
    let Some(reg_no_index) = reg_no_index else {
        anyhow::bail!("CSV must contain a 'Register Number' column");
    };

    let mut rows = Vec::new();
    for line in lines {
        let tokens: Vec<&str> = line.split(',').map(|t| t.trim()).collect();
        let Some(reg_no) = tokens.get(reg_no_index).filter(|t| !t.is_empty()) else {
            continue;
        };
        let student_name = name_index
            .and_then(|i| tokens.get(i))
            .unwrap_or(&"")
            .to_string();
        let mut results = Vec::new();
        for (column, code) in &subject_columns {
            if let Some(grade) = tokens.get(*column).filter(|t| !t.is_empty()) {
                results.push((code.clone(), grade.to_string()));
            }
        }
        if !results.is_empty() {
            rows.push(ParsedGradeRow {
                register_number: reg_no.to_string(),
                student_name,
                results,
            });
        }
    }
    Ok(rows)
}
