//! Crime incident ingestion.
//!
//! Reads a tabular crime dataset, resolves which columns hold latitude,
//! longitude and the risk score, and keeps only rows with usable values.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use tracing::{debug, info};

use crate::Error;

/// A single geolocated incident with its non-negative risk score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrimeRecord {
    pub lat: f64,
    pub lon: f64,
    pub score: f64,
}

/// Optional explicit column names. Unset names are auto-detected.
#[derive(Debug, Clone, Default)]
pub struct ColumnHints {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

/// Header positions chosen for a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrimeColumns {
    pub latitude: (usize, String),
    pub longitude: (usize, String),
    pub score: (usize, String),
}

#[derive(Debug, Clone)]
pub struct CrimeDataset {
    pub records: Vec<CrimeRecord>,
    pub columns: CrimeColumns,
    /// Rows discarded for absent/zero coordinates or an unusable score.
    pub dropped: usize,
}

impl CrimeDataset {
    pub fn from_path(path: &Path, hints: &ColumnHints) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| {
            Error::DataSourceUnavailable(format!("{}: {e}", path.display()))
        })?;
        info!("Reading crime data from {}", path.display());
        Self::from_reader(file, hints)
    }

    pub fn from_reader<R: Read>(reader: R, hints: &ColumnHints) -> Result<Self, Error> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| Error::DataSourceUnavailable(e.to_string()))?
            .clone();
        let columns = resolve_columns(&headers, hints)?;
        info!(
            "Crime columns: lat={}, lon={}, score={}",
            columns.latitude.1, columns.longitude.1, columns.score.1
        );

        let mut records = Vec::new();
        let mut dropped = 0;
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => {
                    return Err(Error::DataSourceUnavailable(e.to_string()));
                }
                Err(e) => {
                    debug!("Skipping malformed crime row: {e}");
                    dropped += 1;
                    continue;
                }
            };
            match parse_row(&row, &columns) {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }

        info!("Crime records loaded: {} ({} dropped)", records.len(), dropped);
        Ok(Self {
            records,
            columns,
            dropped,
        })
    }
}

fn parse_row(row: &StringRecord, columns: &CrimeColumns) -> Option<CrimeRecord> {
    let lat = parse_coordinate(row.get(columns.latitude.0)?)?;
    let lon = parse_coordinate(row.get(columns.longitude.0)?)?;
    let score: f64 = row.get(columns.score.0)?.trim().parse().ok()?;
    if !score.is_finite() || score < 0.0 {
        return None;
    }
    Some(CrimeRecord { lat, lon, score })
}

/// Zero counts as an absent coordinate, not a location on the equator.
fn parse_coordinate(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    (value.is_finite() && value != 0.0).then_some(value)
}

/// Picks the latitude, longitude and score columns from a header row.
///
/// Auto-detection is a case-insensitive substring match (`lat`; `lon` or
/// `lng`; `score`). When several headers match, the lexically smallest name
/// wins so the choice does not depend on column order.
pub fn resolve_columns(headers: &StringRecord, hints: &ColumnHints) -> Result<CrimeColumns, Error> {
    let latitude = match &hints.latitude {
        Some(name) => find_exact(headers, name),
        None => find_by_substring(headers, &["lat"]),
    }
    .ok_or(Error::MissingCoordinateColumn("latitude"))?;

    let longitude = match &hints.longitude {
        Some(name) => find_exact(headers, name),
        None => find_by_substring(headers, &["lon", "lng"]),
    }
    .ok_or(Error::MissingCoordinateColumn("longitude"))?;

    let score = find_by_substring(headers, &["score"])
        .ok_or_else(|| Error::MissingScoreColumn(headers.iter().collect::<Vec<_>>().join(", ")))?;

    Ok(CrimeColumns {
        latitude,
        longitude,
        score,
    })
}

fn find_exact(headers: &StringRecord, name: &str) -> Option<(usize, String)> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .map(|i| (i, name.to_string()))
}

fn find_by_substring(headers: &StringRecord, needles: &[&str]) -> Option<(usize, String)> {
    headers
        .iter()
        .enumerate()
        .filter(|(_, h)| {
            let lower = h.to_lowercase();
            needles.iter().any(|n| lower.contains(n))
        })
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, h)| (i, h.trim().to_string()))
}
