use std::fmt;

/// One typed cell of a [`Frame`].
///
/// Numeric coercion happens upstream (in the reshaper); a cell that failed
/// coercion is `Null`, never a zero or an empty string dressed up as data.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Str(String),
    Int(i64),
    Float(f64),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Cell::Int(i) => Some(i as f64),
            Cell::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    /// Text rendering used by the CSV writer and the console preview.
    /// `Null` renders as an empty field.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Str(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Str(s)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Str(s.to_string())
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<Option<String>> for Cell {
    fn from(s: Option<String>) -> Self {
        s.map_or(Cell::Null, Cell::Str)
    }
}

impl From<Option<i32>> for Cell {
    fn from(i: Option<i32>) -> Self {
        i.map_or(Cell::Null, |i| Cell::Int(i64::from(i)))
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Null, Cell::Float)
    }
}

/// An ordered, rectangular record set: named columns plus rows of [`Cell`]s.
///
/// This is the single currency between the fetch/normalize/reshape pipeline
/// and the output writers. It carries no dtype metadata; writers inspect the
/// cells themselves where a format needs column types.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn new<I, S>(columns: I) -> Frame
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Frame {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append one row. Panics if the row width does not match the column
    /// count; rows are always built column-by-column inside this crate.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        assert_eq!(
            row.len(),
            self.columns.len(),
            "row width {} does not match {} columns",
            row.len(),
            self.columns.len()
        );
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Width-aligned text rendering of the first `limit` rows, header
    /// included. Used for the console preview when no destination is given.
    pub fn preview(&self, limit: usize) -> String {
        let shown = &self.rows[..self.rows.len().min(limit)];
        let mut widths: Vec<usize> = self.columns.iter().map(String::len).collect();
        let rendered: Vec<Vec<String>> = shown
            .iter()
            .map(|row| row.iter().map(Cell::to_string).collect())
            .collect();
        for row in &rendered {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        let mut out = String::new();
        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:>width$}", c, width = w))
            .collect();
        out.push_str(header.join("  ").trim_end());
        for row in &rendered {
            out.push('\n');
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:>width$}", c, width = w))
                .collect();
            out.push_str(line.join("  ").trim_end());
        }
        out
    }
}
