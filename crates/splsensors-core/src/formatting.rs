//! Text rendering helpers shared by the CSV exports and the console summary.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Timestamp layout used in every exported table, e.g. `17 Oct 2020 03:15:24.420`.
pub const REPORT_TIMESTAMP_FORMAT: &str = "%d %b %Y %H:%M:%S%.3f";

/// Format a count with thousands separators.
///
/// # Examples
///
/// ```
/// use splsensors_core::formatting::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
pub fn format_count(value: usize) -> String {
    group_thousands(&value.to_string())
}

/// Render an optional timestamp for a report cell; `None` becomes an empty cell.
pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format(REPORT_TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// Render optional seconds with millisecond precision; `None` and NaN become
/// an empty cell.
pub fn format_seconds(secs: Option<f64>) -> String {
    match secs {
        Some(s) if s.is_finite() => format!("{:.3}", s),
        _ => String::new(),
    }
}

/// Format an elapsed wall-clock duration as `H:MM:SS.mmm`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use splsensors_core::formatting::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(1_234)), "0:00:01.234");
/// assert_eq!(format_duration(Duration::from_secs(3_725)), "1:02:05.000");
/// ```
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;
    format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Render a GitHub-flavoured markdown table. Columns are padded to the widest
/// cell; rows shorter than the header are padded with empty cells.
pub fn markdown_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render_row = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let cell = cells.get(i).copied().unwrap_or("");
                format!(" {:<width$} ", cell, width = *w)
            })
            .collect();
        format!("|{}|", padded.join("|"))
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(render_row(headers.to_vec()));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    out.push(format!("|{}|", rule.join("|")));
    for row in rows {
        out.push(render_row(row.iter().map(String::as_str).collect()));
    }
    out.join("\n")
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = s.len() % 3;
    for (i, c) in s.chars().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
