use std::collections::BTreeMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use tracing::info;

use crate::domain::{AggregateRecord, Period, Quarter, ReportKind, SpecialityRecord};
use crate::error::IngestError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS bed_occupancy (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organisation_code TEXT NOT NULL,
    organisation_name TEXT NOT NULL,
    quarter TEXT NOT NULL,
    year INTEGER NOT NULL,
    beds_available INTEGER NOT NULL,
    beds_occupied INTEGER NOT NULL,
    occupancy_rate REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bed_occupancy_period ON bed_occupancy (year, quarter);
CREATE INDEX IF NOT EXISTS idx_bed_occupancy_org ON bed_occupancy (organisation_code);

CREATE TABLE IF NOT EXISTS bed_occupancy_by_speciality (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organisation_code TEXT NOT NULL,
    organisation_name TEXT NOT NULL,
    region_code TEXT NOT NULL,
    speciality TEXT NOT NULL,
    speciality_code TEXT NOT NULL,
    quarter TEXT NOT NULL,
    year INTEGER NOT NULL,
    beds_occupied INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_speciality_period ON bed_occupancy_by_speciality (year, quarter);
CREATE INDEX IF NOT EXISTS idx_speciality_org ON bed_occupancy_by_speciality (organisation_code);
CREATE INDEX IF NOT EXISTS idx_speciality_code ON bed_occupancy_by_speciality (speciality_code);
";

const AGGREGATE_COLUMNS: &str = "organisation_code, organisation_name, beds_available, \
    beds_occupied, occupancy_rate, quarter, year";
const SPECIALITY_COLUMNS: &str = "organisation_code, organisation_name, region_code, \
    speciality_code, speciality, beds_occupied, quarter, year";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    pub period: Option<Period>,
    pub deleted: usize,
    pub inserted: usize,
}

impl ReplaceOutcome {
    pub fn empty() -> Self {
        Self {
            period: None,
            deleted: 0,
            inserted: 0,
        }
    }
}

/// A replace deletes every stored row of the batch's period and inserts the
/// batch in one transaction. An empty batch carries no period and changes
/// nothing. Concurrent replaces of the same period are not serialized here.
pub trait RecordStore {
    fn replace_aggregate(
        &mut self,
        records: &[AggregateRecord],
    ) -> Result<ReplaceOutcome, IngestError>;
    fn replace_speciality(
        &mut self,
        records: &[SpecialityRecord],
    ) -> Result<ReplaceOutcome, IngestError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodFilter {
    pub year: Option<i32>,
    pub quarter: Option<Quarter>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailablePeriods {
    pub available_years: Vec<i32>,
    pub periods_by_year: BTreeMap<i32, Vec<Quarter>>,
    pub total_periods: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganisationMatch {
    pub organisations_found: usize,
    pub total_records: usize,
    pub data: Vec<AggregateRecord>,
}

pub struct SqliteStore {
    conn: Connection,
    path: Option<Utf8PathBuf>,
}

impl SqliteStore {
    pub fn open(path: &Utf8Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path())?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, IngestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn aggregate(&self, filter: PeriodFilter) -> Result<Vec<AggregateRecord>, IngestError> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM bed_occupancy \
             WHERE (?1 IS NULL OR year = ?1) AND (?2 IS NULL OR quarter = ?2) ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![filter.year, filter.quarter], aggregate_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn speciality(&self, filter: PeriodFilter) -> Result<Vec<SpecialityRecord>, IngestError> {
        let sql = format!(
            "SELECT {SPECIALITY_COLUMNS} FROM bed_occupancy_by_speciality \
             WHERE (?1 IS NULL OR year = ?1) AND (?2 IS NULL OR quarter = ?2) ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![filter.year, filter.quarter], speciality_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn sample(&self, limit: usize) -> Result<Vec<AggregateRecord>, IngestError> {
        let sql = format!("SELECT {AGGREGATE_COLUMNS} FROM bed_occupancy ORDER BY id LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], aggregate_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn organisation_by_code(&self, code: &str) -> Result<Vec<AggregateRecord>, IngestError> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM bed_occupancy \
             WHERE organisation_code = ?1 ORDER BY year, quarter"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![code.trim()], aggregate_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn organisations_by_name(&self, part: &str) -> Result<OrganisationMatch, IngestError> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM bed_occupancy \
             WHERE organisation_name LIKE '%' || ?1 || '%' ORDER BY organisation_name, year, quarter"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![part.trim()], aggregate_from_row)?;
        let data = rows.collect::<Result<Vec<_>, _>>()?;

        let mut names = data
            .iter()
            .map(|record| record.organisation_name.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();

        Ok(OrganisationMatch {
            organisations_found: names.len(),
            total_records: data.len(),
            data,
        })
    }

    pub fn available_periods(&self) -> Result<AvailablePeriods, IngestError> {
        let mut stmt = self.conn.prepare(
            "SELECT year, quarter FROM bed_occupancy \
             UNION SELECT year, quarter FROM bed_occupancy_by_speciality",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Period::new(row.get::<_, Quarter>(1)?, row.get(0)?))
        })?;

        let mut periods_by_year: BTreeMap<i32, Vec<Quarter>> = BTreeMap::new();
        let mut total_periods = 0usize;
        for period in rows {
            let period = period?;
            periods_by_year
                .entry(period.year)
                .or_default()
                .push(period.quarter);
            total_periods += 1;
        }
        for quarters in periods_by_year.values_mut() {
            quarters.sort();
        }

        Ok(AvailablePeriods {
            available_years: periods_by_year.keys().copied().collect(),
            periods_by_year,
            total_periods,
        })
    }

    pub fn count_for_period(&self, kind: ReportKind, period: Period) -> Result<usize, IngestError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE quarter = ?1 AND year = ?2",
            kind.table_name()
        );
        let count: i64 = self
            .conn
            .query_row(&sql, params![period.quarter, period.year], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl RecordStore for SqliteStore {
    fn replace_aggregate(
        &mut self,
        records: &[AggregateRecord],
    ) -> Result<ReplaceOutcome, IngestError> {
        let Some(period) = batch_period(records, AggregateRecord::period)? else {
            return Ok(ReplaceOutcome::empty());
        };

        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM bed_occupancy WHERE quarter = ?1 AND year = ?2",
            params![period.quarter, period.year],
        )?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO bed_occupancy ({AGGREGATE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ))?;
            for record in records {
                insert.execute(params![
                    record.organisation_code,
                    record.organisation_name,
                    record.beds_available,
                    record.beds_occupied,
                    record.occupancy_rate,
                    record.quarter,
                    record.year,
                ])?;
            }
        }
        tx.commit()?;

        info!(
            table = ReportKind::Aggregate.table_name(),
            %period,
            deleted,
            inserted = records.len(),
            "replaced period"
        );
        Ok(ReplaceOutcome {
            period: Some(period),
            deleted,
            inserted: records.len(),
        })
    }

    fn replace_speciality(
        &mut self,
        records: &[SpecialityRecord],
    ) -> Result<ReplaceOutcome, IngestError> {
        let Some(period) = batch_period(records, SpecialityRecord::period)? else {
            return Ok(ReplaceOutcome::empty());
        };

        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM bed_occupancy_by_speciality WHERE quarter = ?1 AND year = ?2",
            params![period.quarter, period.year],
        )?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO bed_occupancy_by_speciality ({SPECIALITY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))?;
            for record in records {
                insert.execute(params![
                    record.organisation_code,
                    record.organisation_name,
                    record.region_code,
                    record.speciality_code,
                    record.speciality_name,
                    record.beds_occupied,
                    record.quarter,
                    record.year,
                ])?;
            }
        }
        tx.commit()?;

        info!(
            table = ReportKind::Speciality.table_name(),
            %period,
            deleted,
            inserted = records.len(),
            "replaced period"
        );
        Ok(ReplaceOutcome {
            period: Some(period),
            deleted,
            inserted: records.len(),
        })
    }
}

fn batch_period<T>(
    records: &[T],
    period_of: impl Fn(&T) -> Period,
) -> Result<Option<Period>, IngestError> {
    let Some(first) = records.first().map(&period_of) else {
        return Ok(None);
    };
    if let Some(other) = records.iter().map(&period_of).find(|period| *period != first) {
        return Err(IngestError::MixedPeriods {
            first: first.to_string(),
            other: other.to_string(),
        });
    }
    Ok(Some(first))
}

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<AggregateRecord> {
    Ok(AggregateRecord {
        organisation_code: row.get(0)?,
        organisation_name: row.get(1)?,
        beds_available: row.get(2)?,
        beds_occupied: row.get(3)?,
        occupancy_rate: row.get(4)?,
        quarter: row.get(5)?,
        year: row.get(6)?,
    })
}

fn speciality_from_row(row: &Row<'_>) -> rusqlite::Result<SpecialityRecord> {
    Ok(SpecialityRecord {
        organisation_code: row.get(0)?,
        organisation_name: row.get(1)?,
        region_code: row.get(2)?,
        speciality_code: row.get(3)?,
        speciality_name: row.get(4)?,
        beds_occupied: row.get(5)?,
        quarter: row.get(6)?,
        year: row.get(7)?,
    })
}

impl ToSql for Quarter {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Quarter {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err: IngestError| FromSqlError::Other(Box::new(err)))
    }
}

pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| IngestError::Filesystem(err.to_string()))?;
    fs::write(tmp_path.as_std_path(), &content)
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    Ok(())
}
