//! Row-oriented tabular input as uploaded by the user

use std::fmt;

/// A single cell of an uploaded table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Markers treated as missing when reading text cells.
    pub const NA_MARKERS: [&'static str; 11] = [
        "", "NA", "N/A", "NaN", "nan", "-NaN", "null", "NULL", "None", "#N/A", "<NA>",
    ];

    /// Interpret a raw text field: NA markers become missing, numbers are parsed.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if Self::NA_MARKERS.contains(&trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_nan() => Cell::Missing,
            Ok(value) => Cell::Number(value),
            Err(_) => Cell::Text(raw.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        if value.is_nan() {
            Cell::Missing
        } else {
            Cell::Number(value)
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map(Cell::from).unwrap_or(Cell::Missing)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(v) => write!(f, "{}", v),
            Cell::Text(s) => f.write_str(s),
            Cell::Missing => Ok(()),
        }
    }
}

/// Uploaded dataset: named columns and independent rows.
///
/// Column names are kept exactly as uploaded; lookups go through
/// [`InputTable::column_index`], which compares trimmed names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl InputTable {
    /// Build a table, padding short rows with missing cells.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Missing);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Build a table from column-major numeric data (`None` is missing).
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<Option<f64>>)>) -> Self {
        let n_rows = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let mut names = Vec::with_capacity(columns.len());
        let mut rows = vec![Vec::with_capacity(columns.len()); n_rows];
        for (name, values) in columns {
            names.push(name.into());
            for (i, row) in rows.iter_mut().enumerate() {
                row.push(values.get(i).copied().flatten().into());
            }
        }
        Self::new(names, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column whose trimmed name equals `name`.
    ///
    /// Validation rejects uploads where a required name matches twice.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.columns.iter().position(|c| c.trim() == name)
    }

    /// Iterate over one column's cells.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Original row identities (positional, starting at zero).
    pub fn row_indices(&self) -> Vec<usize> {
        (0..self.rows.len()).collect()
    }
}
