//! Excel (`.xlsx`) text extraction.
//!
//! Each worksheet is rendered as a plain-text table: the first row is the header, every cell is
//! right-aligned to its column width, and columns are separated by one space. Worksheets are
//! separated by a blank line; empty worksheets contribute nothing. Date-formatted cells render
//! as ISO dates, with the time of day only when it is not midnight.

use calamine::{Data, ExcelDateTime, Reader, Xlsx, open_workbook_from_rs};
use std::io::Cursor;

use super::ExtractionError;

const FORMAT: &str = "Excel";

/// Render every worksheet of an `.xlsx` workbook as text.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|error| ExtractionError::malformed(FORMAT, error))?;

    let mut tables = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|error| ExtractionError::malformed(FORMAT, format!("{name}: {error}")))?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        tracing::debug!(sheet = %name, rows = rows.len(), "Worksheet read");
        let table = render_table(&rows);
        if !table.is_empty() {
            tables.push(table);
        }
    }

    Ok(tables.join("\n\n"))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#ERROR: {e:?}"),
        Data::DateTime(dt) => date_text(dt),
        Data::DateTimeIso(dt) => dt.clone(),
        Data::DurationIso(d) => d.clone(),
    }
}

fn date_text(value: &ExcelDateTime) -> String {
    if value.is_duration() {
        let total = (value.as_f64() * 86_400.0).round() as i64;
        return format!("{:02}:{:02}:{:02}", total / 3600, total % 3600 / 60, total % 60);
    }
    match value.as_datetime() {
        Some(datetime) => {
            let time = datetime.format("%H:%M:%S").to_string();
            if time == "00:00:00" {
                datetime.format("%Y-%m-%d").to_string()
            } else {
                format!("{} {time}", datetime.format("%Y-%m-%d"))
            }
        }
        None => value.as_f64().to_string(),
    }
}

/// Right-align every cell to its column width and join columns with a single space.
fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 || rows.iter().flatten().all(|cell| cell.trim().is_empty()) {
        return String::new();
    }

    let mut widths = vec![0usize; columns];
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            widths[index] = widths[index].max(cell.chars().count());
        }
    }

    rows.iter()
        .map(|row| {
            widths
                .iter()
                .enumerate()
                .map(|(index, width)| {
                    let cell = row.get(index).map(String::as_str).unwrap_or("");
                    format!("{cell:>width$}")
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
