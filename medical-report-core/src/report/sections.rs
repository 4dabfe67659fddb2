use serde::{Deserialize, Serialize};

pub const AT_A_GLANCE_HEADING: &str = "AT-A-GLANCE SUMMARY";
pub const COMPREHENSIVE_ANALYSIS_HEADING: &str = "COMPREHENSIVE ANALYSIS";
pub const DATA_SUMMARIES_HEADING: &str = "DATA SUMMARIES";
pub const TERMINOLOGY_HEADING: &str = "MEDICAL TERMINOLOGY";

/// Display view of a report: the short summary and everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSections {
    pub at_a_glance: String,
    pub detailed: String,
}

pub fn split_report_sections(content: &str) -> ReportSections {
    ReportSections {
        at_a_glance: extract_at_a_glance(content),
        detailed: strip_at_a_glance(content),
    }
}

/// Body of the at-a-glance section, trimmed. Empty when the report has none.
pub fn extract_at_a_glance(content: &str) -> String {
    match locate_at_a_glance(content) {
        Some(span) => content[span.body_start..span.end].trim().to_string(),
        None => String::new(),
    }
}

/// The report without its at-a-glance section; whatever precedes it (the title) is kept.
pub fn strip_at_a_glance(content: &str) -> String {
    let Some(span) = locate_at_a_glance(content) else {
        return content.to_string();
    };

    let head = content[..span.start].trim_end();
    let tail = &content[span.end..];
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (false, true) => head.to_string(),
        (false, false) => format!("{head}\n\n{tail}"),
    }
}

/// Byte offsets of the section: heading line start, body start, and the start of the
/// next level-1 or level-2 heading (or the end of the content).
struct SectionSpan {
    start: usize,
    body_start: usize,
    end: usize,
}

fn locate_at_a_glance(content: &str) -> Option<SectionSpan> {
    let mut offset = 0;
    let mut found: Option<(usize, usize)> = None;

    for line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let Some((level, title)) = heading(line) else {
            continue;
        };
        match found {
            None if title.to_ascii_uppercase().starts_with(AT_A_GLANCE_HEADING) => {
                found = Some((line_start, offset));
            }
            Some((start, body_start)) if level <= 2 => {
                return Some(SectionSpan {
                    start,
                    body_start,
                    end: line_start,
                });
            }
            _ => {}
        }
    }

    found.map(|(start, body_start)| SectionSpan {
        start,
        body_start,
        end: content.len(),
    })
}

/// ATX heading level and title, e.g. `## Title` -> `(2, "Title")`.
fn heading(line: &str) -> Option<(usize, &str)> {
    let line = line.trim_start();
    let level = line.bytes().take_while(|b| *b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((level, rest.trim()))
}
