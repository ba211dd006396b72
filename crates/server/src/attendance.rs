//! Attendance highlighting for uploaded `.xlsx` workbooks.
//!
//! All sheets are combined into one table: the first sheet is taken whole and
//! every further sheet contributes its rows below its own header row. Row 4
//! of the combined table holds the subject headers, column A the student
//! names. Attendance below [`ATTENDANCE_THRESHOLD`] highlights both the name
//! and the attendance cell, and a bar chart of the subject column is added.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use rust_xlsxwriter::{Chart, ChartType, Color, Format, FormatPattern, Workbook, Worksheet};
use thiserror::Error;

/// Zero-based index of the header row (row 4 in the sheet).
pub(crate) const HEADER_ROW: usize = 3;
pub(crate) const NAME_COLUMN: usize = 0;
pub(crate) const ATTENDANCE_THRESHOLD: f64 = 80.0;
pub(crate) const OUTPUT_FILE: &str = "output_highlighted_with_chart.xlsx";
pub(crate) const SHEET_NAME: &str = "Combined_Data";

const HIGHLIGHT_RGB: u32 = 0xFFFF00;

#[derive(Debug, Error)]
pub(crate) enum AttendanceError {
    #[error("failed to read workbook: {0}")]
    Read(#[from] calamine::XlsxError),
    #[error("No valid data found in the file")]
    NoData,
    #[error("Subject {0} not found")]
    SubjectNotFound(String),
    #[error("failed to write report workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),
}

/// Cells addressed from A1, rows may be ragged.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Table {
    pub(crate) rows: Vec<Vec<Data>>,
}

impl Table {
    fn cell(&self, row: usize, col: usize) -> Option<&Data> {
        self.rows.get(row).and_then(|cells| cells.get(col))
    }
}

#[derive(Debug)]
pub(crate) struct AttendanceReport {
    pub(crate) subject_column: usize,
    /// Zero-based rows whose attendance fell below the threshold.
    pub(crate) highlighted_rows: Vec<usize>,
    pub(crate) workbook: Vec<u8>,
}

pub(crate) fn read_table(bytes: &[u8]) -> Result<Table, AttendanceError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let mut table = Table::default();

    for (index, sheet_name) in workbook.sheet_names().into_iter().enumerate() {
        let range = workbook.worksheet_range(&sheet_name)?;
        let Some((first_row, first_col)) = range.start() else {
            continue;
        };

        let mut rows: Vec<Vec<Data>> = range
            .rows()
            .map(|cells| {
                let mut row = vec![Data::Empty; first_col as usize];
                row.extend(cells.iter().cloned());
                row
            })
            .collect();

        if index == 0 || table.rows.is_empty() {
            let mut padded = vec![Vec::new(); first_row as usize];
            padded.append(&mut rows);
            table.rows = padded;
        } else if rows.len() > 1 {
            table.rows.extend(rows.into_iter().skip(1));
        }
    }

    if table.rows.iter().all(|row| row.iter().all(is_empty)) {
        return Err(AttendanceError::NoData);
    }
    Ok(table)
}

fn is_empty(cell: &Data) -> bool {
    matches!(cell, Data::Empty)
}

/// Finds the subject column in the header row. Header cells are trimmed and
/// compared case-insensitively against the lowercased subject.
pub(crate) fn find_subject_column(table: &Table, subject_name: &str) -> Option<usize> {
    let subject_name = subject_name.to_lowercase();
    table.rows.get(HEADER_ROW)?.iter().position(|cell| match cell {
        Data::String(header) => header.trim().to_lowercase() == subject_name,
        _ => false,
    })
}

/// Numeric attendance of a cell; strings may carry `%` and `,`.
pub(crate) fn attendance_value(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(v) => Some(*v as f64),
        Data::Float(v) => Some(*v),
        Data::String(raw) => raw.replace(['%', ','], "").trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn low_attendance_rows(table: &Table, subject_column: usize) -> Vec<usize> {
    (HEADER_ROW + 1..table.rows.len())
        .filter(|&row| {
            table
                .cell(row, subject_column)
                .and_then(attendance_value)
                .is_some_and(|value| value < ATTENDANCE_THRESHOLD)
        })
        .collect()
}

pub(crate) fn build_report(
    table: &Table,
    subject_name: &str,
) -> Result<AttendanceReport, AttendanceError> {
    let subject_name = subject_name.to_lowercase();
    let subject_column = find_subject_column(table, &subject_name)
        .ok_or_else(|| AttendanceError::SubjectNotFound(subject_name.clone()))?;
    let highlighted_rows = low_attendance_rows(table, subject_column);
    let workbook = render_workbook(table, subject_column, &highlighted_rows, &subject_name)?;

    Ok(AttendanceReport {
        subject_column,
        highlighted_rows,
        workbook,
    })
}

pub(crate) fn process_workbook(
    bytes: &[u8],
    subject_name: &str,
) -> Result<AttendanceReport, AttendanceError> {
    let table = read_table(bytes)?;
    build_report(&table, subject_name)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn render_workbook(
    table: &Table,
    subject_column: usize,
    highlighted_rows: &[usize],
    subject_name: &str,
) -> Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    let plain = Format::new();
    let highlight = Format::new()
        .set_pattern(FormatPattern::Solid)
        .set_background_color(Color::RGB(HIGHLIGHT_RGB));

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet().set_name(SHEET_NAME)?;

    for (row, cells) in table.rows.iter().enumerate() {
        let row_highlighted = highlighted_rows.contains(&row);
        for (col, cell) in cells.iter().enumerate() {
            let format = if row_highlighted && (col == NAME_COLUMN || col == subject_column) {
                &highlight
            } else {
                &plain
            };
            // xlsx sources are bounded to u32 rows and u16 columns.
            write_cell(worksheet, row as u32, col as u16, cell, format)?;
        }
    }

    let last_row = table.rows.len().saturating_sub(1) as u32;
    let header_row = HEADER_ROW as u32;
    let name_col = NAME_COLUMN as u16;
    let subject_col = subject_column as u16;

    let title = format!("Attendance Bar Chart - {}", capitalize(subject_name));
    let mut chart = Chart::new(ChartType::Column);
    chart.title().set_name(title.as_str());
    chart.x_axis().set_name("Students");
    chart.y_axis().set_name("Attendance (%)");
    chart
        .add_series()
        .set_name((SHEET_NAME, header_row, subject_col))
        .set_categories((SHEET_NAME, header_row + 1, name_col, last_row, name_col))
        .set_values((SHEET_NAME, header_row + 1, subject_col, last_row, subject_col));
    worksheet.insert_chart(header_row + 5, subject_col + 3, &chart)?;

    workbook.save_to_buffer()
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Data,
    format: &Format,
) -> Result<(), rust_xlsxwriter::XlsxError> {
    match cell {
        Data::Empty => {}
        Data::Int(v) => {
            worksheet.write_number_with_format(row, col, *v as f64, format)?;
        }
        Data::Float(v) => {
            worksheet.write_number_with_format(row, col, *v, format)?;
        }
        Data::Bool(v) => {
            worksheet.write_boolean_with_format(row, col, *v, format)?;
        }
        Data::String(v) => {
            worksheet.write_string_with_format(row, col, v, format)?;
        }
        other => {
            worksheet.write_string_with_format(row, col, other.to_string(), format)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/attendance_tests.rs"]
mod tests;
