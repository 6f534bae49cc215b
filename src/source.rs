//! Record source: loads spreadsheet rows as field-name → string mappings.

use crate::error::{Error, Result};
use crate::template::is_template_identifier;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDateTime, Timelike};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One input row as an ordered field-name → value mapping.
///
/// All records of a load share the same column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Record {
    /// Creates a record, padding missing trailing values with empty strings.
    #[must_use]
    pub fn new(columns: Arc<[String]>, mut values: Vec<String>) -> Self {
        values.resize(columns.len(), String::new());
        Self { columns, values }
    }

    /// Returns the value of a field, if the column exists.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == field)
            .map(|pos| self.values[pos].as_str())
    }

    /// Returns the value of the first column.
    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// Iterates over `(field, value)` pairs in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    /// Returns the column names of this record.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in self.fields() {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// Header and records of one spreadsheet load.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    columns: Arc<[String]>,
    records: Vec<Record>,
    header_row: usize,
}

impl RecordSet {
    /// Builds a record set from a header and raw rows.
    #[must_use]
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let columns = normalize_headers(header);
        let records = rows
            .into_iter()
            .map(|row| Record::new(Arc::clone(&columns), row))
            .collect();
        Self {
            columns,
            records,
            header_row: 0,
        }
    }

    /// Places the header at 0-based sheet row `row` (leading rows were blank).
    #[must_use]
    pub const fn with_header_row(mut self, row: usize) -> Self {
        self.header_row = row;
        self
    }

    /// Returns the 1-based spreadsheet row of the record at 0-based `index`.
    #[must_use]
    pub const fn row_number(&self, index: usize) -> usize {
        self.header_row + index + 2
    }

    /// Returns the normalized column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the records in source order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Loads all records from the first sheet of a spreadsheet.
///
/// Every cell is read as text and blank cells become empty strings. The
/// first row is the header and is not returned as a record.
///
/// # Errors
///
/// Returns [`Error::Read`] if the file is missing, unreadable, malformed or
/// has no worksheets.
pub fn load_records(path: &Path) -> Result<RecordSet> {
    debug!("Opening spreadsheet {}", path.display());

    let mut workbook = open_workbook_auto(path).map_err(|e| Error::read(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::read(path, "workbook contains no worksheets"))?
        .map_err(|e| Error::read(path, e))?;

    // Ranges start at the first non-empty cell.
    let header_row = range.start().map_or(0, |(row, _)| row as usize);

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        warn!("Spreadsheet {} is empty", path.display());
        return Ok(RecordSet::default());
    };

    let header: Vec<String> = header.iter().map(cell_to_string).collect();
    let rows: Vec<Vec<String>> = rows
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    let set = RecordSet::from_rows(header, rows).with_header_row(header_row);

    for column in set.columns() {
        if !is_template_identifier(column) {
            warn!(
                "Column '{}' is not a template identifier; reference it as row[\"{}\"]",
                column, column
            );
        }
    }

    info!(
        "Loaded {} records with {} columns from {}",
        set.len(),
        set.columns().len(),
        path.display()
    );

    Ok(set)
}

/// Trims header names, names blank headers by position and suffixes duplicates.
fn normalize_headers(raw: Vec<String>) -> Arc<[String]> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    raw.into_iter()
        .enumerate()
        .map(|(pos, name)| {
            let trimmed = name.trim();
            let base = if trimmed.is_empty() {
                format!("column_{}", pos + 1)
            } else {
                trimmed.to_string()
            };

            let count = seen.entry(base.clone()).or_insert(0);
            let unique = if *count == 0 {
                base
            } else {
                warn!("Duplicate column '{}' renamed to '{}.{}'", base, base, count);
                format!("{base}.{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or_else(|| dt.as_f64().to_string(), format_datetime),
        other => other.to_string(),
    }
}

fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    #[test]
    fn test_load_records_reads_all_cells_as_text() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("data.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(0, 1, "amount").unwrap();
        sheet.write_string(0, 2, "note").unwrap();
        sheet.write_string(1, 0, "Alice").unwrap();
        sheet.write_number(1, 1, 42.0).unwrap();
        sheet.write_string(1, 2, "first").unwrap();
        sheet.write_string(2, 0, "Bob").unwrap();
        sheet.write_number(2, 1, 2.5).unwrap();
        workbook.save(path.path()).unwrap();

        let set = load_records(path.path()).unwrap();

        assert_eq!(set.columns(), ["name", "amount", "note"]);
        assert_eq!(set.len(), 2);

        let first = &set.records()[0];
        assert_eq!(first.get("name"), Some("Alice"));
        assert_eq!(first.get("amount"), Some("42"));
        assert_eq!(first.get("note"), Some("first"));

        let second = &set.records()[1];
        assert_eq!(second.get("amount"), Some("2.5"));
        assert_eq!(second.get("note"), Some(""));
    }

    #[test]
    fn test_load_records_formats_dates() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("dates.xlsx");

        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "signed").unwrap();
        let date = ExcelDateTime::from_ymd(2025, 8, 14).unwrap();
        sheet
            .write_datetime_with_format(1, 0, &date, &date_format)
            .unwrap();
        workbook.save(path.path()).unwrap();

        let set = load_records(path.path()).unwrap();
        assert_eq!(set.records()[0].get("signed"), Some("2025-08-14"));
    }

    #[test]
    fn test_load_records_missing_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = load_records(&temp.path().join("missing.xlsx"));

        let err = result.unwrap_err();
        assert!(err.is_read());
        assert!(err.to_string().contains("missing.xlsx"));
    }

    #[test]
    fn test_load_records_malformed_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("broken.xlsx");
        path.write_str("this is not a workbook").unwrap();

        let err = load_records(path.path()).unwrap_err();
        assert!(err.is_read());
    }

    #[test]
    fn test_load_records_header_only() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("header.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        workbook.save(path.path()).unwrap();

        let set = load_records(path.path()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.columns(), ["name"]);
    }

    #[test]
    fn test_load_records_after_blank_rows() {
        let temp = assert_fs::TempDir::new().unwrap();
        let path = temp.child("offset.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(2, 0, "name").unwrap();
        sheet.write_string(3, 0, "Alice").unwrap();
        sheet.write_string(4, 0, "Bob").unwrap();
        workbook.save(path.path()).unwrap();

        let set = load_records(path.path()).unwrap();

        assert_eq!(set.columns(), ["name"]);
        assert_eq!(set.records()[0].get("name"), Some("Alice"));
        assert_eq!(set.row_number(0), 4);
        assert_eq!(set.row_number(1), 5);
    }

    #[test]
    fn test_row_number_without_offset() {
        let set = RecordSet::from_rows(vec!["a".into()], vec![vec!["1".into()]]);
        assert_eq!(set.row_number(0), 2);
    }

    #[test]
    fn test_normalize_headers() {
        let columns = normalize_headers(vec![
            " name ".to_string(),
            String::new(),
            "name".to_string(),
            "name".to_string(),
        ]);
        assert_eq!(&*columns, ["name", "column_2", "name.1", "name.2"]);
    }

    #[test]
    fn test_record_pads_missing_values() {
        let set = RecordSet::from_rows(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into()]],
        );
        let record = &set.records()[0];
        assert_eq!(record.get("b"), Some(""));
        assert_eq!(record.get("c"), None);
        assert_eq!(record.first_value(), Some("1"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_record_serializes_as_ordered_map() {
        let set = RecordSet::from_rows(
            vec!["z".into(), "a".into()],
            vec![vec!["1".into(), "2".into()]],
        );
        let json = serde_json::to_string(&set.records()[0]).unwrap();
        assert_eq!(json, r#"{"z":"1","a":"2"}"#);
    }
}
