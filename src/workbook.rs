//! Worksheets are exposed as absolutely positioned [`Grid`]s: row 0 is the
//! first physical row and column 0 is column A, regardless of where the used
//! range of the sheet starts. Header offsets published for a report family are
//! physical row numbers, so the locator depends on this.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Data, Range, Reader, Sheets, open_workbook_auto};

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(value) => {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Cell::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    Some((*value as i64).to_string())
                } else {
                    Some(value.to_string())
                }
            }
            Cell::Bool(value) => Some(value.to_string()),
        }
    }

    fn from_data(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(value) if value.trim().is_empty() => Cell::Empty,
            Data::String(value) => Cell::Text(value.clone()),
            Data::Int(value) => Cell::Number(*value as f64),
            Data::Float(value) => Cell::Number(*value),
            Data::Bool(value) => Cell::Bool(*value),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text().unwrap_or_default())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

pub(crate) static EMPTY_CELL: Cell = Cell::Empty;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn row(&self, index: usize) -> Option<&[Cell]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn rows_after(&self, index: usize) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().skip(index + 1).map(Vec::as_slice)
    }

    fn from_range(range: &Range<Data>) -> Self {
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<Cell>> = (0..start_row).map(|_| Vec::new()).collect();
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; start_col as usize];
            cells.extend(row.iter().map(Cell::from_data));
            rows.push(cells);
        }
        Self { rows }
    }
}

pub trait Workbook {
    fn sheet_names(&self) -> Vec<String>;
    fn sheet(&mut self, name: &str) -> Result<Option<Grid>, IngestError>;
}

pub struct ExcelWorkbook {
    inner: Sheets<BufReader<File>>,
}

impl ExcelWorkbook {
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let inner = open_workbook_auto(path).map_err(|err| IngestError::WorkbookOpen {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(Self { inner })
    }
}

impl Workbook for ExcelWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.inner.sheet_names()
    }

    fn sheet(&mut self, name: &str) -> Result<Option<Grid>, IngestError> {
        if !self.inner.sheet_names().iter().any(|sheet| sheet == name) {
            return Ok(None);
        }
        let range = self
            .inner
            .worksheet_range(name)
            .map_err(|err| IngestError::SheetRead {
                sheet: name.to_string(),
                message: err.to_string(),
            })?;
        Ok(Some(Grid::from_range(&range)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: Vec<(String, Grid)>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: &str, rows: Vec<Vec<Cell>>) -> Self {
        self.sheets.push((name.to_string(), Grid::new(rows)));
        self
    }
}

impl Workbook for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn sheet(&mut self, name: &str) -> Result<Option<Grid>, IngestError> {
        Ok(self
            .sheets
            .iter()
            .find(|(sheet, _)| sheet == name)
            .map(|(_, grid)| grid.clone()))
    }
}
