use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::columns::{SchemaMapping, flatten_headers, resolve_columns};
use crate::domain::{AggregateRecord, Period, Quarter, SpecialityRecord};
use crate::error::IngestError;
use crate::fetch::{SourceFetcher, is_remote, temp_workbook};
use crate::locator::{locate_aggregate, locate_speciality};
use crate::metric::derive_aggregates;
use crate::period::infer_period;
use crate::reshape::reshape_specialities;
use crate::store::{RecordStore, ReplaceOutcome, write_json_atomic};
use crate::workbook::{ExcelWorkbook, Workbook};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub upload: bool,
    pub strict_period: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    Upload,
}

impl SourceKind {
    pub fn detect(source_ref: &str, upload: bool) -> Self {
        if upload || !is_remote(source_ref) {
            SourceKind::Upload
        } else {
            SourceKind::Url
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: String,
    pub records_processed: usize,
    pub speciality_records: usize,
    pub quarter: Quarter,
    pub year: i32,
    pub period_defaulted: bool,
    pub schema_version: &'static str,
    pub source: SourceKind,
    pub source_location: String,
    pub aggregate: ReplaceOutcome,
    pub speciality: ReplaceOutcome,
    pub finished_at: String,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub period: Period,
    pub period_defaulted: bool,
    pub aggregates: Vec<AggregateRecord>,
    pub specialities: Vec<SpecialityRecord>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<S: RecordStore, F: SourceFetcher> {
    store: S,
    fetcher: F,
    mapping: &'static SchemaMapping,
    summary_dir: Option<Utf8PathBuf>,
}

impl<S: RecordStore, F: SourceFetcher> App<S, F> {
    pub fn new(store: S, fetcher: F, mapping: &'static SchemaMapping) -> Self {
        Self {
            store,
            fetcher,
            mapping,
            summary_dir: None,
        }
    }

    pub fn with_summary_dir(mut self, summary_dir: Option<Utf8PathBuf>) -> Self {
        self.summary_dir = summary_dir;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// `source_ref` names the published file and drives period inference.
    /// `local_file`, when given, is read instead of fetching `source_ref`.
    /// The scratch copy of the workbook is removed on every exit path.
    pub fn ingest(
        &mut self,
        source_ref: &str,
        local_file: Option<&str>,
        options: &IngestOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, IngestError> {
        let location = local_file.unwrap_or(source_ref);
        let scratch = temp_workbook(location)?;

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {location}"),
            elapsed: None,
        });
        let start = Instant::now();
        let bytes = self.fetcher.fetch(location, scratch.path())?;
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {bytes} bytes"),
            elapsed: Some(start.elapsed()),
        });

        let mut workbook = ExcelWorkbook::open(scratch.path())?;
        let summary = self.ingest_workbook(&mut workbook, source_ref, options, sink)?;
        drop(workbook);
        scratch
            .close()
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        Ok(summary)
    }

    pub fn ingest_workbook(
        &mut self,
        workbook: &mut dyn Workbook,
        source_ref: &str,
        options: &IngestOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, IngestError> {
        let (period, period_defaulted) = resolve_period(source_ref, options.strict_period)?;

        sink.event(ProgressEvent {
            message: format!("phase=Extract; aggregate for {period}"),
            elapsed: None,
        });
        let aggregates = extract_aggregates(workbook, self.mapping, period)?;
        let aggregate = self.store.replace_aggregate(&aggregates)?;

        sink.event(ProgressEvent {
            message: "phase=Extract; speciality".to_string(),
            elapsed: None,
        });
        let specialities = extract_specialities(workbook, period);
        let speciality = self.store.replace_speciality(&specialities)?;

        let summary = RunSummary {
            status: "success".to_string(),
            records_processed: aggregates.len(),
            speciality_records: specialities.len(),
            quarter: period.quarter,
            year: period.year,
            period_defaulted,
            schema_version: self.mapping.version,
            source: SourceKind::detect(source_ref, options.upload),
            source_location: source_ref.to_string(),
            aggregate,
            speciality,
            finished_at: iso_timestamp(),
        };
        info!(
            %period,
            records = summary.records_processed,
            speciality_records = summary.speciality_records,
            "ingest finished"
        );

        if let Some(dir) = &self.summary_dir {
            let path = dir.join(summary_file_name());
            write_json_atomic(&path, &summary)?;
            sink.event(ProgressEvent {
                message: format!("phase=Store; summary {path}"),
                elapsed: None,
            });
        }

        Ok(summary)
    }
}

pub fn extract(
    workbook: &mut dyn Workbook,
    source_ref: &str,
    mapping: &SchemaMapping,
    strict_period: bool,
) -> Result<Extraction, IngestError> {
    let (period, period_defaulted) = resolve_period(source_ref, strict_period)?;
    Ok(Extraction {
        period,
        period_defaulted,
        aggregates: extract_aggregates(workbook, mapping, period)?,
        specialities: extract_specialities(workbook, period),
    })
}

fn resolve_period(source_ref: &str, strict: bool) -> Result<(Period, bool), IngestError> {
    let inferred = infer_period(source_ref);
    let period = if strict {
        inferred.strict(source_ref)?
    } else {
        inferred.period
    };
    Ok((period, inferred.is_defaulted()))
}

fn extract_aggregates(
    workbook: &mut dyn Workbook,
    mapping: &SchemaMapping,
    period: Period,
) -> Result<Vec<AggregateRecord>, IngestError> {
    let located = locate_aggregate(workbook)?;
    let headers = flatten_headers(&located.grid, &located.header_rows);
    let columns = resolve_columns(&located.sheet, &headers, mapping)?;
    let aggregates = derive_aggregates(located.data_rows(), &columns, period);
    info!(
        sheet = %located.sheet,
        mapping = mapping.version,
        records = aggregates.len(),
        "aggregate sheet extracted"
    );
    Ok(aggregates)
}

fn extract_specialities(workbook: &mut dyn Workbook, period: Period) -> Vec<SpecialityRecord> {
    match locate_speciality(workbook) {
        Some(located) => {
            let records = reshape_specialities(&located, period);
            info!(sheet = %located.sheet, records = records.len(), "speciality sheet extracted");
            records
        }
        None => {
            warn!("continuing without speciality data");
            Vec::new()
        }
    }
}

fn summary_file_name() -> String {
    format!(
        "pipeline_run_{}.json",
        chrono::Utc::now().format("%Y%m%dT%H%M%S%.6fZ")
    )
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
