use std::collections::HashMap;
use std::fmt;

use crate::error::IngestError;
use crate::workbook::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateField {
    OrganisationCode,
    OrganisationName,
    BedsAvailable,
    BedsOccupied,
}

impl AggregateField {
    pub const ALL: [AggregateField; 4] = [
        AggregateField::OrganisationCode,
        AggregateField::OrganisationName,
        AggregateField::BedsAvailable,
        AggregateField::BedsOccupied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateField::OrganisationCode => "organisation_code",
            AggregateField::OrganisationName => "organisation_name",
            AggregateField::BedsAvailable => "beds_available",
            AggregateField::BedsOccupied => "beds_occupied",
        }
    }
}

impl fmt::Display for AggregateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
pub struct SchemaMapping {
    pub version: &'static str,
    pub keywords: &'static [(AggregateField, &'static str)],
}

pub static KH03_V1: SchemaMapping = SchemaMapping {
    version: "kh03-v1",
    keywords: &[
        (AggregateField::OrganisationCode, "org code"),
        (AggregateField::OrganisationName, "org name"),
        (AggregateField::BedsAvailable, "available_total"),
        (AggregateField::BedsOccupied, "occupied_total"),
    ],
};

pub const DEFAULT_SCHEMA_VERSION: &str = "kh03-v1";

pub fn mapping_for(version: &str) -> Result<&'static SchemaMapping, IngestError> {
    match version.trim() {
        "kh03-v1" => Ok(&KH03_V1),
        other => Err(IngestError::UnknownSchemaVersion(other.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub mapping_version: &'static str,
    pub organisation_code: ResolvedColumn,
    pub organisation_name: ResolvedColumn,
    pub beds_available: ResolvedColumn,
    pub beds_occupied: ResolvedColumn,
}

/// Blank cells in upper rows inherit the nearest label to their left, the way
/// merged header cells read. Remaining blanks become `col{column}_level_{row}`.
pub fn flatten_headers(grid: &Grid, header_rows: &[usize]) -> Vec<String> {
    let width = grid.width();
    let last_level = header_rows.len().saturating_sub(1);

    let levels: Vec<Vec<String>> = header_rows
        .iter()
        .enumerate()
        .map(|(level, &row)| {
            let mut carried: Option<String> = None;
            (0..width)
                .map(|column| match grid.cell(row, column).as_text() {
                    Some(text) => {
                        carried = Some(text.clone());
                        text
                    }
                    None if level < last_level => carried
                        .clone()
                        .unwrap_or_else(|| placeholder(column, level)),
                    None => placeholder(column, level),
                })
                .collect()
        })
        .collect();

    (0..width)
        .map(|column| {
            levels
                .iter()
                .map(|labels| labels[column].as_str())
                .collect::<Vec<_>>()
                .join("_")
                .trim()
                .to_lowercase()
        })
        .collect()
}

fn placeholder(column: usize, level: usize) -> String {
    format!("col{column}_level_{level}")
}

pub fn resolve_columns(
    sheet: &str,
    headers: &[String],
    mapping: &SchemaMapping,
) -> Result<ResolvedColumns, IngestError> {
    let mut found = HashMap::new();
    for (field, keyword) in mapping.keywords {
        if let Some(index) = headers.iter().position(|label| label.contains(keyword)) {
            found.entry(*field).or_insert_with(|| ResolvedColumn {
                index,
                label: headers[index].clone(),
            });
        }
    }

    let unresolved = || IngestError::UnresolvedColumns {
        sheet: sheet.to_string(),
        missing: AggregateField::ALL
            .iter()
            .filter(|field| !found.contains_key(*field))
            .map(|field| field.as_str().to_string())
            .collect(),
    };

    let (
        Some(organisation_code),
        Some(organisation_name),
        Some(beds_available),
        Some(beds_occupied),
    ) = (
        found.get(&AggregateField::OrganisationCode).cloned(),
        found.get(&AggregateField::OrganisationName).cloned(),
        found.get(&AggregateField::BedsAvailable).cloned(),
        found.get(&AggregateField::BedsOccupied).cloned(),
    )
    else {
        return Err(unresolved());
    };

    Ok(ResolvedColumns {
        mapping_version: mapping.version,
        organisation_code,
        organisation_name,
        beds_available,
        beds_occupied,
    })
}
