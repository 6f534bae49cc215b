//! Failure report: failed records written to a spreadsheet for reprocessing.

use crate::error::{Error, Result};
use crate::source::Record;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column holding the spreadsheet row a failed record came from.
pub const ROW_NUMBER_COLUMN: &str = "original_row_number";

/// Column holding the failure message.
pub const REASON_COLUMN: &str = "failure_reason";

/// A failed record plus diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    /// Original fields of the record
    pub fields: Record,

    /// Spreadsheet row number of the record (1-based, header included)
    pub original_row_number: usize,

    /// Why the record failed
    pub failure_reason: String,
}

impl FailureRecord {
    /// Creates a failure record for the record found at spreadsheet row
    /// `original_row_number` (see [`RecordSet::row_number`]).
    ///
    /// [`RecordSet::row_number`]: crate::RecordSet::row_number
    #[must_use]
    pub fn new(
        fields: Record,
        original_row_number: usize,
        failure_reason: impl Into<String>,
    ) -> Self {
        Self {
            fields,
            original_row_number,
            failure_reason: failure_reason.into(),
        }
    }
}

/// Writes failed records to a spreadsheet at `path`.
///
/// Nothing is written when `failures` is empty. An existing file is
/// overwritten. Returns the path of the written report.
///
/// # Errors
///
/// Returns [`Error::ReportWrite`] if the workbook cannot be built or saved.
pub fn report_failures(failures: &[FailureRecord], path: &Path) -> Result<Option<PathBuf>> {
    if failures.is_empty() {
        return Ok(None);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::report_write(path, e))?;
    }

    build_workbook(failures)
        .and_then(|mut workbook| workbook.save(path))
        .map_err(|e| Error::report_write(path, e))?;

    info!(
        "Wrote {} failed record(s) to {}",
        failures.len(),
        path.display()
    );

    Ok(Some(path.to_path_buf()))
}

/// Columns of the report: every original field in first-seen order, then
/// the two diagnostic columns.
fn report_columns(failures: &[FailureRecord]) -> Vec<&str> {
    let mut columns: Vec<&str> = Vec::new();
    for failure in failures {
        for column in failure.fields.columns() {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
    }
    columns.push(ROW_NUMBER_COLUMN);
    columns.push(REASON_COLUMN);
    columns
}

fn build_workbook(failures: &[FailureRecord]) -> std::result::Result<Workbook, XlsxError> {
    let columns = report_columns(failures);
    let field_count = columns.len() - 2;
    let header = Format::new().set_bold();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("failures")?;

    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *name, &header)?;
    }

    for (row, failure) in failures.iter().enumerate() {
        let row = (row + 1) as u32;

        for (col, name) in columns[..field_count].iter().enumerate() {
            let value = failure.fields.get(name).unwrap_or_default();
            sheet.write_string(row, col as u16, value)?;
        }

        sheet.write_number(row, field_count as u16, failure.original_row_number as f64)?;
        sheet.write_string(row, (field_count + 1) as u16, &failure.failure_reason)?;
    }

    sheet.set_freeze_panes(1, 0)?;
    sheet.autofit();

    Ok(workbook)
}
