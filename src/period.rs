use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use tracing::warn;

use crate::domain::{Period, Quarter};
use crate::error::IngestError;

static STORAGE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+_").unwrap());
static QUARTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)quarter[\s_-]*(\d)|q(\d)").unwrap());
static FINANCIAL_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})-(\d{2})").unwrap());
static BARE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSource {
    Matched,
    Defaulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferredPeriod {
    pub period: Period,
    pub quarter_source: PeriodSource,
    pub year_source: PeriodSource,
}

impl InferredPeriod {
    pub fn is_defaulted(&self) -> bool {
        self.quarter_source == PeriodSource::Defaulted
            || self.year_source == PeriodSource::Defaulted
    }

    pub fn strict(self, source_ref: &str) -> Result<Period, IngestError> {
        let component = match (self.quarter_source, self.year_source) {
            (PeriodSource::Defaulted, _) => "quarter",
            (_, PeriodSource::Defaulted) => "year",
            _ => return Ok(self.period),
        };
        Err(IngestError::AmbiguousPeriod {
            component,
            source_ref: source_ref.to_string(),
        })
    }
}

pub fn infer_period(source_ref: &str) -> InferredPeriod {
    let inferred = infer_period_at(source_ref, chrono::Local::now().year());
    if inferred.is_defaulted() {
        warn!(
            source = source_ref,
            period = %inferred.period,
            "period could not be fully inferred; defaults applied"
        );
    }
    inferred
}

pub fn infer_period_at(source_ref: &str, fallback_year: i32) -> InferredPeriod {
    let name = file_name(source_ref);
    let cleaned = STORAGE_PREFIX.replace(name, "");

    let quarter = QUARTER.captures(&cleaned).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|digit| digit.as_str().parse::<u32>().ok())
            .and_then(Quarter::from_digit)
    });

    let year = FINANCIAL_YEAR
        .captures(&cleaned)
        .or_else(|| BARE_YEAR.captures(&cleaned))
        .and_then(|caps| caps.get(1))
        .and_then(|year| year.as_str().parse::<i32>().ok());

    InferredPeriod {
        period: Period::new(quarter.unwrap_or(Quarter::Q1), year.unwrap_or(fallback_year)),
        quarter_source: source_of(quarter.is_some()),
        year_source: source_of(year.is_some()),
    }
}

fn source_of(matched: bool) -> PeriodSource {
    if matched {
        PeriodSource::Matched
    } else {
        PeriodSource::Defaulted
    }
}

pub(crate) fn file_name(source_ref: &str) -> &str {
    let trimmed = if source_ref.contains("://") {
        source_ref
            .split(['?', '#'])
            .next()
            .unwrap_or(source_ref)
    } else {
        source_ref
    };
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}
