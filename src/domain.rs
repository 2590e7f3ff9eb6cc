use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub fn from_digit(digit: u32) -> Option<Self> {
        match digit {
            1 => Some(Quarter::Q1),
            2 => Some(Quarter::Q2),
            3 => Some(Quarter::Q3),
            4 => Some(Quarter::Q4),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Quarter {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        let digits = normalized.strip_prefix('Q').unwrap_or(&normalized);
        digits
            .parse::<u32>()
            .ok()
            .and_then(Quarter::from_digit)
            .ok_or_else(|| IngestError::InvalidQuarter(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub quarter: Quarter,
}

impl Period {
    pub fn new(quarter: Quarter, year: i32) -> Self {
        Self { year, quarter }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quarter, self.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Aggregate,
    Speciality,
}

impl ReportKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            ReportKind::Aggregate => "bed_occupancy",
            ReportKind::Speciality => "bed_occupancy_by_speciality",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Aggregate => write!(f, "aggregate"),
            ReportKind::Speciality => write!(f, "speciality"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub organisation_code: String,
    pub organisation_name: String,
    pub beds_available: i64,
    pub beds_occupied: i64,
    pub occupancy_rate: f64,
    pub quarter: Quarter,
    pub year: i32,
}

impl AggregateRecord {
    pub fn period(&self) -> Period {
        Period::new(self.quarter, self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialityRecord {
    pub organisation_code: String,
    pub organisation_name: String,
    pub region_code: String,
    pub speciality_code: String,
    pub speciality_name: String,
    pub beds_occupied: i64,
    pub quarter: Quarter,
    pub year: i32,
}

impl SpecialityRecord {
    pub fn period(&self) -> Period {
        Period::new(self.quarter, self.year)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_quarter_variants() {
        assert_eq!("Q3".parse::<Quarter>().unwrap(), Quarter::Q3);
        assert_eq!("q4".parse::<Quarter>().unwrap(), Quarter::Q4);
        assert_eq!(" 2 ".parse::<Quarter>().unwrap(), Quarter::Q2);
    }

    #[test]
    fn parse_quarter_invalid() {
        let err = "Q5".parse::<Quarter>().unwrap_err();
        assert_matches!(err, IngestError::InvalidQuarter(_));
        let err = "quarter".parse::<Quarter>().unwrap_err();
        assert_matches!(err, IngestError::InvalidQuarter(_));
    }

    #[test]
    fn quarter_serializes_upper_case() {
        let json = serde_json::to_string(&Quarter::Q1).unwrap();
        assert_eq!(json, "\"Q1\"");
    }

    #[test]
    fn periods_order_by_year_then_quarter() {
        let mut periods = vec![
            Period::new(Quarter::Q1, 2024),
            Period::new(Quarter::Q4, 2023),
            Period::new(Quarter::Q2, 2023),
        ];
        periods.sort();
        assert_eq!(periods[0], Period::new(Quarter::Q2, 2023));
        assert_eq!(periods[2], Period::new(Quarter::Q1, 2024));
        assert_eq!(periods[1].to_string(), "Q4 2023");
    }
}
