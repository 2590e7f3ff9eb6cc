use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use rust_xlsxwriter::Workbook as XlsxWorkbook;

use bed_occupancy_etl::app::{App, IngestOptions, SourceKind};
use bed_occupancy_etl::columns::KH03_V1;
use bed_occupancy_etl::domain::{Period, Quarter, ReportKind};
use bed_occupancy_etl::error::IngestError;
use bed_occupancy_etl::fetch::SourceFetcher;
use bed_occupancy_etl::output::JsonOutput;
use bed_occupancy_etl::store::{PeriodFilter, SqliteStore};

const SOURCE: &str = "https://www.england.nhs.uk/statistics/wp-content/uploads/sites/2/2024/02/\
Beds-Open-Overnight-Web_File-Final-Quarter-3-2023-24.xlsx";

#[derive(Default, Clone)]
struct RecordingFetcher {
    destinations: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingFetcher {
    fn destinations(&self) -> Vec<PathBuf> {
        self.destinations.lock().unwrap().clone()
    }
}

impl SourceFetcher for RecordingFetcher {
    fn fetch(&self, location: &str, destination: &Path) -> Result<u64, IngestError> {
        self.destinations
            .lock()
            .unwrap()
            .push(destination.to_path_buf());
        fs::copy(location, destination).map_err(|err| IngestError::Filesystem(err.to_string()))
    }
}

struct FailingFetcher {
    destinations: Arc<Mutex<Vec<PathBuf>>>,
}

impl SourceFetcher for FailingFetcher {
    fn fetch(&self, _location: &str, destination: &Path) -> Result<u64, IngestError> {
        self.destinations
            .lock()
            .unwrap()
            .push(destination.to_path_buf());
        Err(IngestError::FetchStatus {
            status: 404,
            message: "not found".to_string(),
        })
    }
}

fn write_fixture(path: &Path, occupied_label: &str, with_speciality: bool) {
    let mut workbook = XlsxWorkbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("NHS Trust by Sector").unwrap();
        sheet
            .write_string(0, 0, "Bed Availability and Occupancy Data")
            .unwrap();
        sheet.write_string(13, 2, "Available").unwrap();
        sheet.write_string(13, 4, occupied_label).unwrap();
        for (column, label) in [
            "Org Code",
            "Org Name",
            "Total",
            "General & Acute",
            "Total",
            "General & Acute",
        ]
        .iter()
        .enumerate()
        {
            sheet.write_string(14, column as u16, *label).unwrap();
        }

        sheet.write_string(15, 0, "RWE").unwrap();
        sheet
            .write_string(15, 1, "University Hospitals of Leicester")
            .unwrap();
        sheet.write_number(15, 2, 1200.0).unwrap();
        sheet.write_number(15, 3, 1000.0).unwrap();
        sheet.write_number(15, 4, 1100.0).unwrap();
        sheet.write_number(15, 5, 950.0).unwrap();

        sheet.write_string(16, 0, "RAL").unwrap();
        sheet.write_string(16, 1, "Royal Free London").unwrap();
        sheet.write_number(16, 2, 800.0).unwrap();
        sheet.write_number(16, 3, 700.0).unwrap();
        sheet.write_string(16, 4, "-").unwrap();
        sheet.write_number(16, 5, 650.0).unwrap();

        sheet.write_string(17, 0, "RJ1").unwrap();
        sheet.write_string(17, 1, "Guy's and St Thomas'").unwrap();
        sheet.write_number(17, 2, 0.0).unwrap();
        sheet.write_number(17, 3, 0.0).unwrap();
        sheet.write_number(17, 4, 0.0).unwrap();
        sheet.write_number(17, 5, 0.0).unwrap();
    }

    if with_speciality {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Occupied by Speciality").unwrap();
        sheet
            .write_string(0, 0, "Occupied beds by speciality")
            .unwrap();
        for (column, label) in [
            "Year",
            "Period End",
            "Region Code",
            "Org Code",
            "Org Name",
            "100 General Surgery",
            "300 General Medicine",
            "430 Geriatric Medicine",
        ]
        .iter()
        .enumerate()
        {
            sheet.write_string(14, column as u16, *label).unwrap();
        }

        sheet.write_string(15, 0, "2023-24").unwrap();
        sheet.write_string(15, 1, "December 2023").unwrap();
        sheet.write_string(15, 2, "Y56").unwrap();
        sheet.write_string(15, 3, "RWE").unwrap();
        sheet
            .write_string(15, 4, "University Hospitals of Leicester")
            .unwrap();
        sheet.write_number(15, 5, 120.0).unwrap();
        sheet.write_number(15, 6, 0.0).unwrap();
        sheet.write_number(15, 7, 44.7).unwrap();

        sheet.write_string(16, 0, "2023-24").unwrap();
        sheet.write_string(16, 1, "December 2023").unwrap();
        sheet.write_string(16, 3, "England").unwrap();
        sheet.write_string(16, 4, "England").unwrap();
        sheet.write_number(16, 5, 5000.0).unwrap();
        sheet.write_number(16, 6, 6000.0).unwrap();
        sheet.write_number(16, 7, 7000.0).unwrap();
    }

    workbook.save(path).unwrap();
}

fn fixture(dir: &Path, occupied_label: &str, with_speciality: bool) -> String {
    let path = dir.join("fixture.xlsx");
    write_fixture(&path, occupied_label, with_speciality);
    path.to_string_lossy().into_owned()
}

#[test]
fn ingest_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(dir.path(), "Occupied", true);
    let fetcher = RecordingFetcher::default();
    let store = SqliteStore::open_in_memory().unwrap();
    let mut app = App::new(store, fetcher.clone(), &KH03_V1);

    let summary = app
        .ingest(SOURCE, Some(&file), &IngestOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(summary.status, "success");
    assert_eq!(summary.records_processed, 2);
    assert_eq!(summary.speciality_records, 2);
    assert_eq!(summary.quarter, Quarter::Q3);
    assert_eq!(summary.year, 2023);
    assert_eq!(summary.source, SourceKind::Url);
    assert_eq!(summary.source_location, SOURCE);

    let aggregates = app.store().aggregate(PeriodFilter::default()).unwrap();
    assert_eq!(aggregates.len(), 2);
    assert_eq!(aggregates[0].organisation_code, "RWE");
    assert_eq!(aggregates[0].beds_available, 1200);
    assert_eq!(aggregates[0].beds_occupied, 1100);
    for record in &aggregates {
        let expected = if record.beds_available > 0 {
            record.beds_occupied as f64 / record.beds_available as f64 * 100.0
        } else {
            0.0
        };
        assert_eq!(record.occupancy_rate, expected);
    }

    let specialities = app.store().speciality(PeriodFilter::default()).unwrap();
    assert_eq!(specialities.len(), 2);
    assert!(specialities.iter().all(|record| record.beds_occupied > 0));
    assert!(
        specialities
            .iter()
            .all(|record| record.organisation_code != "England")
    );
    assert_eq!(specialities[1].speciality_code, "430");
    assert_eq!(specialities[1].speciality_name, "Geriatric Medicine");
    assert_eq!(specialities[1].beds_occupied, 44);

    let scratch = fetcher.destinations();
    assert_eq!(scratch.len(), 1);
    assert!(!scratch[0].exists());
}

#[test]
fn scratch_file_takes_the_local_file_extension() {
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(dir.path(), "Occupied", true);
    let fetcher = RecordingFetcher::default();
    let store = SqliteStore::open_in_memory().unwrap();
    let mut app = App::new(store, fetcher.clone(), &KH03_V1);
    let reference = SOURCE.trim_end_matches('x');
    assert!(reference.ends_with("Quarter-3-2023-24.xls"));

    let summary = app
        .ingest(reference, Some(&file), &IngestOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(summary.records_processed, 2);
    assert_eq!(summary.speciality_records, 2);
    assert_eq!(summary.source_location, reference);

    let scratch = fetcher.destinations();
    assert_eq!(scratch.len(), 1);
    assert!(scratch[0].to_string_lossy().ends_with(".xlsx"));
    assert!(!scratch[0].exists());
}

#[test]
fn reingest_replaces_the_period() {
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(dir.path(), "Occupied", true);
    let store = SqliteStore::open_in_memory().unwrap();
    let mut app = App::new(store, RecordingFetcher::default(), &KH03_V1);

    let first = app
        .ingest(SOURCE, Some(&file), &IngestOptions::default(), &JsonOutput)
        .unwrap();
    let second = app
        .ingest(SOURCE, Some(&file), &IngestOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(first.aggregate.deleted, 0);
    assert_eq!(second.aggregate.deleted, 2);
    let period = Period::new(Quarter::Q3, 2023);
    assert_eq!(
        app.store()
            .count_for_period(ReportKind::Aggregate, period)
            .unwrap(),
        2
    );
    assert_eq!(
        app.store()
            .count_for_period(ReportKind::Speciality, period)
            .unwrap(),
        2
    );
}

#[test]
fn missing_speciality_sheet_still_loads_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(dir.path(), "Occupied", false);
    let store = SqliteStore::open_in_memory().unwrap();
    let mut app = App::new(store, RecordingFetcher::default(), &KH03_V1);

    let summary = app
        .ingest(SOURCE, Some(&file), &IngestOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(summary.records_processed, 2);
    assert_eq!(summary.speciality_records, 0);
    assert!(
        app.store()
            .speciality(PeriodFilter::default())
            .unwrap()
            .is_empty()
    );
}

#[test]
fn unresolved_columns_store_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(dir.path(), "Beds in use", true);
    let fetcher = RecordingFetcher::default();
    let store = SqliteStore::open_in_memory().unwrap();
    let mut app = App::new(store, fetcher.clone(), &KH03_V1);

    let err = app
        .ingest(SOURCE, Some(&file), &IngestOptions::default(), &JsonOutput)
        .unwrap_err();
    assert!(err.is_input_error());
    assert_matches!(err, IngestError::UnresolvedColumns { ref missing, .. } if missing == &vec!["beds_occupied".to_string()]);

    assert!(
        app.store()
            .aggregate(PeriodFilter::default())
            .unwrap()
            .is_empty()
    );
    assert!(
        app.store()
            .speciality(PeriodFilter::default())
            .unwrap()
            .is_empty()
    );
    assert!(!fetcher.destinations()[0].exists());
}

#[test]
fn strict_period_rejects_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(dir.path(), "Occupied", true);
    let store = SqliteStore::open_in_memory().unwrap();
    let mut app = App::new(store, RecordingFetcher::default(), &KH03_V1);
    let options = IngestOptions {
        upload: true,
        strict_period: true,
    };

    let err = app
        .ingest("beds-latest.xlsx", Some(&file), &options, &JsonOutput)
        .unwrap_err();
    assert_matches!(err, IngestError::AmbiguousPeriod { component: "quarter", .. });
    assert!(
        app.store()
            .aggregate(PeriodFilter::default())
            .unwrap()
            .is_empty()
    );
}

#[test]
fn fetch_failure_removes_scratch_file() {
    let destinations = Arc::new(Mutex::new(Vec::new()));
    let fetcher = FailingFetcher {
        destinations: Arc::clone(&destinations),
    };
    let store = SqliteStore::open_in_memory().unwrap();
    let mut app = App::new(store, fetcher, &KH03_V1);

    let err = app
        .ingest(SOURCE, None, &IngestOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, IngestError::FetchStatus { status: 404, .. });

    let scratch = destinations.lock().unwrap().clone();
    assert_eq!(scratch.len(), 1);
    assert!(!scratch[0].exists());
}

#[test]
fn summary_is_written_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let file = fixture(dir.path(), "Occupied", true);
    let summary_dir = Utf8PathBuf::from_path_buf(dir.path().join("runs")).unwrap();
    let store = SqliteStore::open_in_memory().unwrap();
    let mut app = App::new(store, RecordingFetcher::default(), &KH03_V1)
        .with_summary_dir(Some(summary_dir.clone()));
    let options = IngestOptions {
        upload: true,
        strict_period: false,
    };

    app.ingest(SOURCE, Some(&file), &options, &JsonOutput)
        .unwrap();

    let written = fs::read_dir(summary_dir.as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect::<Vec<_>>();
    assert_eq!(written.len(), 1);
    let name = written[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("pipeline_run_"));
    assert!(name.ends_with(".json"));

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
    assert_eq!(summary["status"], "success");
    assert_eq!(summary["records_processed"], 2);
    assert_eq!(summary["source"], "upload");
    assert_eq!(summary["quarter"], "Q3");
}
