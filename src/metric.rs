use tracing::debug;

use crate::columns::ResolvedColumns;
use crate::domain::{AggregateRecord, Period};
use crate::workbook::{Cell, EMPTY_CELL};

pub fn coerce_number(cell: &Cell) -> Option<f64> {
    let value = match cell {
        Cell::Number(value) => *value,
        Cell::Text(text) => text.trim().replace(',', "").parse::<f64>().ok()?,
        Cell::Empty | Cell::Bool(_) => return None,
    };
    value.is_finite().then_some(value)
}

pub fn occupancy_rate(beds_available: i64, beds_occupied: i64) -> f64 {
    if beds_available > 0 {
        beds_occupied as f64 / beds_available as f64 * 100.0
    } else {
        0.0
    }
}

pub fn derive_aggregate(
    row: &[Cell],
    columns: &ResolvedColumns,
    period: Period,
) -> Option<AggregateRecord> {
    let cell = |index: usize| row.get(index).unwrap_or(&EMPTY_CELL);

    let available = coerce_number(cell(columns.beds_available.index))?;
    let occupied = coerce_number(cell(columns.beds_occupied.index))?;
    if available < 0.0 || occupied < 0.0 {
        return None;
    }

    let beds_available = available.round() as i64;
    let beds_occupied = occupied.round() as i64;

    Some(AggregateRecord {
        organisation_code: cell(columns.organisation_code.index)
            .as_text()
            .unwrap_or_default(),
        organisation_name: cell(columns.organisation_name.index)
            .as_text()
            .unwrap_or_default(),
        beds_available,
        beds_occupied,
        occupancy_rate: occupancy_rate(beds_available, beds_occupied),
        quarter: period.quarter,
        year: period.year,
    })
}

pub fn derive_aggregates<'a>(
    rows: impl Iterator<Item = &'a [Cell]>,
    columns: &ResolvedColumns,
    period: Period,
) -> Vec<AggregateRecord> {
    let mut dropped = 0usize;
    let mut records = Vec::new();
    for row in rows {
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        match derive_aggregate(row, columns, period) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(dropped, kept = records.len(), "dropped aggregate rows without bed counts");
    }
    records
}
