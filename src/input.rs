//! Reading uploaded CSV and spreadsheet files into input tables

use crate::error::{BoxError, DetectorError, Result};
use crate::types::{Cell, InputTable};
use calamine::{open_workbook_auto, Data, Reader};
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Spreadsheet,
}

impl InputFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(InputFormat::Csv),
            "xlsx" | "xls" => Ok(InputFormat::Spreadsheet),
            _ => Err(DetectorError::UnsupportedFormat(ext)),
        }
    }
}

/// Read an uploaded file. The first row is the header.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<InputTable> {
    let path = path.as_ref();
    let table = match InputFormat::from_path(path)? {
        InputFormat::Csv => {
            let file = std::fs::File::open(path).map_err(|e| input_error(path, e))?;
            read_csv(file).map_err(|e| input_error(path, e))?
        }
        InputFormat::Spreadsheet => read_spreadsheet(path)?,
    };

    info!(
        path = %path.display(),
        rows = table.row_count(),
        columns = table.column_count(),
        "Input file read"
    );
    Ok(table)
}

/// Parse CSV content with a header row.
pub fn read_csv<R: Read>(reader: R) -> std::result::Result<InputTable, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::parse).collect());
    }
    Ok(InputTable::new(columns, rows))
}

fn read_spreadsheet(path: &Path) -> Result<InputTable> {
    let mut workbook = open_workbook_auto(path).map_err(|e| input_error(path, e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| input_error(path, "workbook has no worksheets"))?
        .map_err(|e| input_error(path, e.to_string()))?;

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Ok(InputTable::default()),
    };
    let rows = rows
        .map(|row| row.iter().map(spreadsheet_cell).collect())
        .collect();
    Ok(InputTable::new(columns, rows))
}

fn spreadsheet_cell(data: &Data) -> Cell {
    match data {
        Data::Int(v) => Cell::Number(*v as f64),
        Data::Float(v) => Cell::from(*v),
        Data::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
        Data::String(s) => Cell::parse(s),
        Data::Empty | Data::Error(_) => Cell::Missing,
        other => Cell::Text(other.to_string()),
    }
}

fn input_error(path: &Path, source: impl Into<BoxError>) -> DetectorError {
    DetectorError::Input {
        path: path.to_path_buf(),
        source: source.into(),
    }
}
