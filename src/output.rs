use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};
use crate::domain::{AggregateRecord, SpecialityRecord};
use crate::store::{AvailablePeriods, OrganisationMatch};

#[derive(Debug, Serialize)]
struct RecordsResult<'a, T> {
    count: usize,
    data: &'a [T],
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_aggregate(records: &[AggregateRecord]) -> io::Result<()> {
        Self::print_json(&RecordsResult {
            count: records.len(),
            data: records,
        })
    }

    pub fn print_speciality(records: &[SpecialityRecord]) -> io::Result<()> {
        Self::print_json(&RecordsResult {
            count: records.len(),
            data: records,
        })
    }

    pub fn print_periods(periods: &AvailablePeriods) -> io::Result<()> {
        Self::print_json(periods)
    }

    pub fn print_organisations(result: &OrganisationMatch) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}
