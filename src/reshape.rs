use tracing::{debug, warn};

use crate::domain::{Period, SpecialityRecord};
use crate::locator::LocatedSheet;
use crate::metric::coerce_number;
use crate::workbook::{Cell, EMPTY_CELL};

pub const ORG_CODE_HEADER: &str = "Org Code";
pub const ORG_NAME_HEADER: &str = "Org Name";
pub const REGION_CODE_HEADER: &str = "Region Code";
pub const NON_SPECIALITY_HEADERS: [&str; 5] =
    ["Year", "Period End", REGION_CODE_HEADER, ORG_CODE_HEADER, ORG_NAME_HEADER];

const ROLL_UP_CODES: [&str; 2] = ["england", "total"];

pub fn split_speciality_header(header: &str) -> (String, String) {
    let header = header.trim();
    match header.split_once(char::is_whitespace) {
        Some((code, name)) if !name.trim().is_empty() => {
            (code.to_string(), name.trim().to_string())
        }
        _ => (header.to_string(), header.to_string()),
    }
}

pub fn is_roll_up(organisation_code: &str) -> bool {
    let code = organisation_code.trim();
    ROLL_UP_CODES
        .iter()
        .any(|roll_up| code.eq_ignore_ascii_case(roll_up))
}

pub fn reshape_specialities(located: &LocatedSheet, period: Period) -> Vec<SpecialityRecord> {
    reshape_rows(&located.header_labels(), located.data_rows(), period)
}

pub fn reshape_rows<'a>(
    headers: &[String],
    rows: impl Iterator<Item = &'a [Cell]>,
    period: Period,
) -> Vec<SpecialityRecord> {
    let position = |wanted: &str| headers.iter().position(|label| label == wanted);
    let (Some(code_col), Some(name_col)) = (position(ORG_CODE_HEADER), position(ORG_NAME_HEADER))
    else {
        warn!("speciality sheet lacks Org Code/Org Name columns; skipping");
        return Vec::new();
    };
    let region_col = position(REGION_CODE_HEADER);

    let specialities: Vec<(usize, String, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, label)| {
            !label.is_empty() && !NON_SPECIALITY_HEADERS.contains(&label.as_str())
        })
        .map(|(index, label)| {
            let (code, name) = split_speciality_header(label);
            (index, code, name)
        })
        .collect();

    let mut skipped_rows = 0usize;
    let mut records = Vec::new();
    for row in rows {
        let cell = |index: usize| row.get(index).unwrap_or(&EMPTY_CELL);
        let (Some(organisation_code), Some(organisation_name)) =
            (cell(code_col).as_text(), cell(name_col).as_text())
        else {
            skipped_rows += 1;
            continue;
        };
        if is_roll_up(&organisation_code) {
            continue;
        }
        let region_code = region_col
            .and_then(|index| cell(index).as_text())
            .unwrap_or_default();

        for (index, speciality_code, speciality_name) in &specialities {
            let Some(value) = coerce_number(cell(*index)) else {
                continue;
            };
            let beds_occupied = value.trunc() as i64;
            if value <= 0.0 || beds_occupied <= 0 {
                continue;
            }
            records.push(SpecialityRecord {
                organisation_code: organisation_code.clone(),
                organisation_name: organisation_name.clone(),
                region_code: region_code.clone(),
                speciality_code: speciality_code.clone(),
                speciality_name: speciality_name.clone(),
                beds_occupied,
                quarter: period.quarter,
                year: period.year,
            });
        }
    }

    debug!(
        specialities = specialities.len(),
        records = records.len(),
        skipped_rows,
        "speciality sheet reshaped"
    );
    records
}
