//! Raw cell values and numeric coercion.
//!
//! Every value read from a workbook is classified exactly once, at the
//! calamine boundary, into one of three shapes. Nothing downstream inspects
//! calamine types again.

use calamine::{Data, Range};

/// A single worksheet value after boundary classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    /// Builds a text cell; convenient in tests and fixtures.
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Trimmed textual rendering used for labels and district names.
    /// Numbers render without exponent notation; empty cells render as "".
    pub fn label(&self) -> String {
        match self {
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Empty => String::new(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Text(b.to_string()),
            // Serial day number, the same value the sheet stores.
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// Parses a cell into a finite number, or `None` ("missing").
///
/// Accepts whatever `f64::from_str` accepts after trimming (signs, decimals,
/// exponents) but rejects NaN and infinities, so `Some` is always finite.
/// Text such as "n.d." or "no disponible" is a normal miss, not an error.
pub fn coerce(cell: &Cell) -> Option<f64> {
    let value = match cell {
        Cell::Number(n) => *n,
        Cell::Text(s) => s.trim().parse::<f64>().ok()?,
        Cell::Empty => return None,
    };
    value.is_finite().then_some(value)
}

/// Plain decimal rendering: `2`, `2.5`, `-3`, never `2e3` and never `-0`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    format!("{}", value)
}

/// A rectangular view over one sheet, addressed from cell A1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    /// Builds a grid from string literals, mapping "" to `Cell::Empty`.
    #[cfg(test)]
    pub fn from_strings<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|s| match s.as_ref() {
                        "" => Cell::Empty,
                        other => Cell::text(other),
                    })
                    .collect()
            })
            .collect();
        Self { rows }
    }

    /// Converts a calamine range, padding leading rows/columns so that
    /// index 0 is always sheet row 1 / column A regardless of where the
    /// used range starts.
    pub fn from_range(range: &Range<Data>) -> Self {
        let (start_row, start_col) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row];
        for row in range.rows() {
            let mut cells = Vec::with_capacity(start_col + row.len());
            cells.resize(start_col, Cell::Empty);
            cells.extend(row.iter().map(Cell::from));
            rows.push(cells);
        }
        Self { rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Out-of-bounds access yields `None`, never a panic.
    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }
}
