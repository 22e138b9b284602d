//! Delimited point tables in, assignment tables out.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use hashbrown::HashMap;
use tracing::{info, warn};

use crate::error::LoadError;
use crate::models::{AssignmentResult, PointRecord};

/// Names of the coordinate columns in a point table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointColumns {
    pub lon: String,
    pub lat: String,
}

impl Default for PointColumns {
    fn default() -> Self {
        Self {
            lon: "Long".to_string(),
            lat: "Lat".to_string(),
        }
    }
}

/// Points read from a CSV file. Payload cells follow `header` order.
#[derive(Debug, Clone)]
pub struct PointTable {
    pub header: Vec<String>,
    pub points: Vec<PointRecord<Vec<String>>>,
}

/// A payload that can be written as table cells
pub trait TableRecord {
    fn cells(&self) -> Vec<String>;
}

impl TableRecord for Vec<String> {
    fn cells(&self) -> Vec<String> {
        self.clone()
    }
}

/// Column layout of an assignment table:
/// `[region, payload columns..., lon, lat]`
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub region_column: String,
    pub payload_header: Vec<String>,
    pub lon_column: String,
    pub lat_column: String,
}

impl OutputLayout {
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(self.region_column.as_str())
            .chain(self.payload_header.iter().map(String::as_str))
            .chain([self.lon_column.as_str(), self.lat_column.as_str()])
            .collect()
    }
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::io(path, e))?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(reader)
}

/// Load points from a CSV (or `.csv.gz`) file.
///
/// Coordinates that are empty or not numbers are read as NaN so the engine
/// reports them per point instead of failing the whole table.
pub fn read_points(path: &Path, columns: &PointColumns) -> Result<PointTable, LoadError> {
    info!("Loading points from {}", path.display());

    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(open_maybe_gz(path)?);

    let headers = csv_reader
        .headers()
        .map_err(|e| LoadError::csv(path, e))?
        .clone();

    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| LoadError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            })
    };
    let lon_idx = position(&columns.lon)?;
    let lat_idx = position(&columns.lat)?;

    let payload_idx: Vec<usize> = (0..headers.len())
        .filter(|i| *i != lon_idx && *i != lat_idx)
        .collect();
    let header = payload_idx
        .iter()
        .map(|i| headers[*i].to_string())
        .collect();

    let mut points = Vec::new();
    let mut unparsed = 0usize;
    for result in csv_reader.records() {
        let record = result.map_err(|e| LoadError::csv(path, e))?;
        let coordinate = |idx: usize| {
            record
                .get(idx)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN)
        };
        let (lon, lat) = (coordinate(lon_idx), coordinate(lat_idx));
        if lon.is_nan() || lat.is_nan() {
            unparsed += 1;
        }

        let payload = payload_idx
            .iter()
            .map(|i| record.get(*i).unwrap_or_default().to_string())
            .collect();
        points.push(PointRecord::new(lon, lat, payload));
    }

    if unparsed > 0 {
        warn!(
            "{} rows in {} have missing or unreadable coordinates",
            unparsed,
            path.display()
        );
    }
    info!("Loaded {} points", points.len());

    Ok(PointTable { header, points })
}

/// Write one row per point. Unmatched and rejected points get an empty
/// region cell; rejected coordinates that are not finite are left empty.
///
/// Returns the number of rejected rows.
pub fn write_assignments<P: TableRecord>(
    path: &Path,
    layout: &OutputLayout,
    results: &[AssignmentResult<P>],
) -> Result<usize, LoadError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| LoadError::csv(path, e))?;
    writer
        .write_record(layout.header())
        .map_err(|e| LoadError::csv(path, e))?;

    let mut rejected = 0;
    for result in results {
        let (region, payload, lon, lat) = match result {
            Ok(a) => (a.region_name(), &a.payload, a.lon, a.lat),
            Err(r) => {
                warn!("Row {} written without a region: {}", r.index, r.error);
                rejected += 1;
                ("", &r.payload, r.lon, r.lat)
            }
        };

        let mut record = Vec::with_capacity(layout.payload_header.len() + 3);
        record.push(region.to_string());
        record.extend(payload.cells());
        record.push(coordinate_cell(lon));
        record.push(coordinate_cell(lat));
        writer
            .write_record(&record)
            .map_err(|e| LoadError::csv(path, e))?;
    }

    writer.flush().map_err(|e| LoadError::io(path, e))?;
    info!(
        "Wrote {} rows to {} ({} rejected)",
        results.len(),
        path.display(),
        rejected
    );
    Ok(rejected)
}

fn coordinate_cell(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

/// Count rows per non-empty value of `region_column` in an assignment table.
pub fn read_region_counts(
    path: &Path,
    region_column: &str,
) -> Result<HashMap<String, f64>, LoadError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(open_maybe_gz(path)?);

    let region_idx = csv_reader
        .headers()
        .map_err(|e| LoadError::csv(path, e))?
        .iter()
        .position(|h| h == region_column)
        .ok_or_else(|| LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: region_column.to_string(),
        })?;

    let mut counts = HashMap::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| LoadError::csv(path, e))?;
        match record.get(region_idx) {
            Some(region) if !region.is_empty() => {
                *counts.entry(region.to_string()).or_insert(0.0) += 1.0;
            }
            _ => {}
        }
    }
    Ok(counts)
}
