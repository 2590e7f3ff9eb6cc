use tracing::{debug, warn};

use crate::error::IngestError;
use crate::workbook::{Cell, Grid, Workbook};

pub const AGGREGATE_SHEET: &str = "NHS Trust by Sector";
pub const AGGREGATE_HEADER_ROWS: [usize; 2] = [13, 14];

pub const SPECIALITY_SHEETS: [&str; 6] = [
    "Occupied by Speciality",
    "Occupied by Specialty",
    "By Speciality",
    "By Specialty",
    "Speciality",
    "Specialty",
];
pub const SPECIALITY_HEADER_OFFSETS: [usize; 8] = [14, 13, 15, 12, 11, 10, 9, 8];

const ORGANISATION_MARKERS: [&str; 3] = ["Org Code", "Org Name", "Organization"];

#[derive(Debug, Clone)]
pub struct LocatedSheet {
    pub sheet: String,
    pub header_rows: Vec<usize>,
    pub grid: Grid,
}

impl LocatedSheet {
    pub fn last_header_row(&self) -> usize {
        self.header_rows.last().copied().unwrap_or(0)
    }

    pub fn data_rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.grid.rows_after(self.last_header_row())
    }

    pub fn header_labels(&self) -> Vec<String> {
        let row = self.last_header_row();
        (0..self.grid.width())
            .map(|column| self.grid.cell(row, column).as_text().unwrap_or_default())
            .collect()
    }
}

pub fn locate_aggregate(workbook: &mut dyn Workbook) -> Result<LocatedSheet, IngestError> {
    let names = workbook.sheet_names();
    let sheet = match find_sheet(&names, AGGREGATE_SHEET) {
        Some(name) => name,
        None => {
            let first = names.first().ok_or(IngestError::EmptyWorkbook)?.clone();
            warn!(
                expected = AGGREGATE_SHEET,
                fallback = %first,
                "aggregate sheet not found by name; using first worksheet"
            );
            first
        }
    };

    let grid = workbook
        .sheet(&sheet)?
        .ok_or_else(|| IngestError::SheetRead {
            sheet: sheet.clone(),
            message: "worksheet disappeared while reading".to_string(),
        })?;

    let last_header = AGGREGATE_HEADER_ROWS[AGGREGATE_HEADER_ROWS.len() - 1];
    if grid.height() <= last_header {
        return Err(IngestError::HeaderNotFound {
            sheet,
            row: last_header,
        });
    }

    Ok(LocatedSheet {
        sheet,
        header_rows: AGGREGATE_HEADER_ROWS.to_vec(),
        grid,
    })
}

pub fn locate_speciality(workbook: &mut dyn Workbook) -> Option<LocatedSheet> {
    let names = workbook.sheet_names();

    let named = SPECIALITY_SHEETS
        .iter()
        .filter_map(|wanted| find_sheet(&names, wanted));
    for sheet in named {
        if let Some(located) = try_speciality_sheet(workbook, &sheet) {
            return Some(located);
        }
    }

    let scanned = names
        .iter()
        .filter(|name| name.to_lowercase().contains("special"));
    for sheet in scanned {
        if let Some(located) = try_speciality_sheet(workbook, sheet) {
            return Some(located);
        }
    }

    warn!("no speciality worksheet with organisation columns found");
    None
}

fn try_speciality_sheet(workbook: &mut dyn Workbook, sheet: &str) -> Option<LocatedSheet> {
    let grid = match workbook.sheet(sheet) {
        Ok(Some(grid)) => grid,
        Ok(None) => return None,
        Err(err) => {
            warn!(sheet, error = %err, "skipping unreadable speciality candidate");
            return None;
        }
    };

    let header_row = SPECIALITY_HEADER_OFFSETS
        .iter()
        .copied()
        .find(|&row| names_organisation(&grid, row))?;
    debug!(sheet, header_row, "speciality header located");

    Some(LocatedSheet {
        sheet: sheet.to_string(),
        header_rows: vec![header_row],
        grid,
    })
}

fn names_organisation(grid: &Grid, row: usize) -> bool {
    grid.row(row).is_some_and(|cells| {
        cells.iter().filter_map(Cell::as_text).any(|label| {
            ORGANISATION_MARKERS
                .iter()
                .any(|marker| label.contains(marker))
        })
    })
}

fn find_sheet(names: &[String], wanted: &str) -> Option<String> {
    names
        .iter()
        .find(|name| name.trim().eq_ignore_ascii_case(wanted))
        .cloned()
}
