//! Header-addressed CSV tables.
//!
//! The commands read and write loosely-typed CSV files: a handful of known
//! columns plus arbitrary user attribute columns. [`Table`] keeps every cell
//! as text and offers the column edits the upload and transform commands
//! need. Typing happens at the edges ([`Table::u64_at`], [`Table::f64_at`],
//! [`infer_value`]).

mod columns;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::TatorError;

pub use columns::LocalizationColumns;

/// An in-memory CSV file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    source: PathBuf,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
            source: PathBuf::from("<table>"),
        }
    }

    /// Reads a CSV file with a header row.
    pub fn read_csv(path: &Path) -> Result<Self, TatorError> {
        let file = File::open(path).map_err(TatorError::Io)?;
        Self::from_reader(BufReader::new(file), path)
    }

    /// Reads CSV text with a header row.
    pub fn from_csv_str(csv: &str) -> Result<Self, TatorError> {
        Self::from_reader(csv.as_bytes(), Path::new("<string>"))
    }

    fn from_reader<R: Read>(reader: R, path: &Path) -> Result<Self, TatorError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let parse_err = |source| TatorError::CsvParse {
            path: path.to_path_buf(),
            source,
        };

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(parse_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result.map_err(parse_err)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            headers,
            rows,
            source: path.to_path_buf(),
        })
    }

    /// Writes the table as CSV.
    pub fn write_csv(&self, path: &Path) -> Result<(), TatorError> {
        let file = File::create(path).map_err(TatorError::Io)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer, path)?;
        writer.flush().map_err(TatorError::Io)
    }

    /// Renders the table as CSV text.
    pub fn to_csv_string(&self) -> Result<String, TatorError> {
        let path = Path::new("<string>");
        let mut bytes = Vec::new();
        self.write_to(&mut bytes, path)?;
        String::from_utf8(bytes).map_err(|e| TatorError::CsvInvalid {
            path: path.to_path_buf(),
            message: format!("Invalid UTF-8 in output: {e}"),
        })
    }

    fn write_to<W: Write>(&self, writer: W, path: &Path) -> Result<(), TatorError> {
        let write_err = |source| TatorError::CsvWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.headers).map_err(write_err)?;
        for row in &self.rows {
            csv_writer.write_record(row).map_err(write_err)?;
        }
        csv_writer
            .into_inner()
            .map_err(|e| TatorError::Io(e.into_error()))?;
        Ok(())
    }

    /// Builds a table from keyed records.
    ///
    /// Columns appear in this order: the `leading` columns, every other key
    /// sorted by name, then the `trailing` columns. A leading or trailing
    /// column is only emitted when at least one record has it. Missing cells
    /// are empty.
    pub fn from_records(
        leading: &[&str],
        records: &[BTreeMap<String, String>],
        trailing: &[&str],
    ) -> Self {
        let present: BTreeSet<&str> = records
            .iter()
            .flat_map(|record| record.keys().map(String::as_str))
            .collect();

        let mut headers: Vec<String> = leading
            .iter()
            .filter(|col| present.contains(**col))
            .map(|col| col.to_string())
            .collect();
        headers.extend(
            present
                .iter()
                .filter(|key| !leading.contains(*key) && !trailing.contains(*key))
                .map(|key| key.to_string()),
        );
        headers.extend(
            trailing
                .iter()
                .filter(|col| present.contains(**col))
                .map(|col| col.to_string()),
        );

        let rows = records
            .iter()
            .map(|record| {
                headers
                    .iter()
                    .map(|header| record.get(header).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Self {
            headers,
            rows,
            source: PathBuf::from("<records>"),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Where the table was read from, for error messages.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, TatorError> {
        self.column(name).ok_or_else(|| TatorError::CsvInvalid {
            path: self.source.clone(),
            message: format!(
                "missing required column '{}' (found: {})",
                name,
                self.headers.join(", ")
            ),
        })
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|cells| cells.get_mut(col)) {
            *cell = value.into();
        }
    }

    /// Renames a column; fails when `old` does not exist.
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<(), TatorError> {
        let idx = self.require_column(old)?;
        self.headers[idx] = new.to_string();
        Ok(())
    }

    /// Sets every cell of `name` to `value`, adding the column if needed.
    pub fn set_constant(&mut self, name: &str, value: &str) {
        let idx = self.ensure_column(name);
        for row in &mut self.rows {
            row[idx] = value.to_string();
        }
    }

    /// Returns the index of `name`, appending an empty column if needed.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column(name) {
            return idx;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Removes a column if present.
    pub fn drop_column(&mut self, name: &str) {
        if let Some(idx) = self.column(name) {
            self.headers.remove(idx);
            for row in &mut self.rows {
                if idx < row.len() {
                    row.remove(idx);
                }
            }
        }
    }

    /// Stable sort by the given columns, comparing numerically where both
    /// cells are numbers.
    pub fn sort_by_columns(&mut self, cols: &[usize]) {
        self.rows.sort_by(|a, b| {
            cols.iter().fold(Ordering::Equal, |acc, &col| {
                acc.then_with(|| compare_cells(&a[col], &b[col]))
            })
        });
    }

    /// Parses a non-negative integer cell. Integral floats such as `12.0` are
    /// accepted.
    pub fn u64_at(&self, row: usize, col: usize) -> Result<u64, TatorError> {
        let raw = self.cell(row, col).trim();
        if let Ok(value) = raw.parse::<u64>() {
            return Ok(value);
        }
        match raw.parse::<f64>() {
            Ok(value) if value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 => {
                Ok(value as u64)
            }
            _ => Err(self.cell_error(row, col, "a non-negative integer")),
        }
    }

    pub fn f64_at(&self, row: usize, col: usize) -> Result<f64, TatorError> {
        let raw = self.cell(row, col).trim();
        raw.parse::<f64>()
            .map_err(|_| self.cell_error(row, col, "a number"))
    }

    fn cell_error(&self, row: usize, col: usize, expected: &str) -> TatorError {
        TatorError::CsvInvalid {
            path: self.source.clone(),
            message: format!(
                "row {}, column '{}': expected {}, found '{}'",
                row + 1,
                self.headers.get(col).map(String::as_str).unwrap_or("?"),
                expected,
                self.cell(row, col)
            ),
        }
    }
}

fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Types a CSV cell for use as a server attribute.
///
/// Empty cells yield `None` (the attribute is omitted). Booleans, integers and
/// finite floats are recognized; everything else stays a string.
pub fn infer_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed {
        "true" | "True" | "TRUE" => return Some(Value::Bool(true)),
        "false" | "False" | "FALSE" => return Some(Value::Bool(false)),
        _ => {}
    }

    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::from(int));
    }

    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            return Some(Value::from(float));
        }
    }

    Some(Value::String(raw.to_string()))
}
