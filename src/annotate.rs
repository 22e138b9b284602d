//! Per-region tables for choropleth maps.
//!
//! Everything here builds new values from its inputs; regions and earlier
//! annotations are never modified in place.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use geo::{Centroid, MultiPolygon, Point};
use hashbrown::HashMap;
use serde::Deserialize;
use tracing::info;

use crate::error::LoadError;
use crate::models::{normalize_name, AssignmentResult, Region};

/// A region with its centre and a set of named values.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedRegion {
    pub name: Arc<str>,
    pub geometry: MultiPolygon<f64>,
    pub center: Option<Point<f64>>,
    pub properties: BTreeMap<String, f64>,
}

impl AnnotatedRegion {
    pub fn from_region(region: &Region) -> Self {
        let geometry = region.geometry();
        Self {
            name: Arc::clone(&region.name),
            center: geometry.centroid(),
            geometry,
            properties: BTreeMap::new(),
        }
    }

    /// Copy of this region with `key` set from `values`, 0 when the region
    /// has no entry.
    pub fn with_property(&self, key: &str, values: &HashMap<String, f64>) -> Self {
        let value = values.get(&*self.name).copied().unwrap_or(0.0);
        let mut properties = self.properties.clone();
        properties.insert(key.to_string(), value);
        Self {
            properties,
            ..self.clone()
        }
    }

    pub fn property(&self, key: &str) -> Option<f64> {
        self.properties.get(key).copied()
    }
}

/// Annotate every region with its centroid, keeping input order.
pub fn annotate_regions(regions: &[Region]) -> Vec<AnnotatedRegion> {
    regions.iter().map(AnnotatedRegion::from_region).collect()
}

/// Join one value table onto a whole collection.
pub fn join_property(
    regions: &[AnnotatedRegion],
    key: &str,
    values: &HashMap<String, f64>,
) -> Vec<AnnotatedRegion> {
    let unknown = values
        .keys()
        .filter(|name| !regions.iter().any(|r| &*r.name == name.as_str()))
        .count();
    if unknown > 0 {
        info!(
            "{} values for '{}' have no matching region and were ignored",
            unknown, key
        );
    }
    regions
        .iter()
        .map(|r| r.with_property(key, values))
        .collect()
}

/// Number of matched points per region name
pub fn count_by_region<P>(results: &[AssignmentResult<P>]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for assignment in results.iter().flatten() {
        if let Some(region) = &assignment.region {
            *counts.entry(region.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

#[derive(Debug, Clone, Deserialize)]
struct TripRow {
    #[serde(rename = "originNB")]
    origin: String,
    #[serde(rename = "destinationNB")]
    destination: String,
    #[serde(rename = "regularTripSample")]
    trips: f64,
}

/// Origin → destination neighbourhood trip counts.
#[derive(Debug, Clone, Default)]
pub struct TripMatrix {
    rows: Vec<TripRow>,
}

impl TripMatrix {
    /// Load a CSV with `originNB`, `destinationNB` and `regularTripSample` columns.
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        info!("Loading trip matrix from {}", path.display());

        let file = File::open(path).map_err(|e| LoadError::io(path, e))?;
        let mut reader = csv::Reader::from_reader(file);

        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let mut row: TripRow = record.map_err(|e| LoadError::csv(path, e))?;
            row.origin = normalize_name(&row.origin);
            row.destination = normalize_name(&row.destination);
            rows.push(row);
        }

        info!("Loaded {} trip rows", rows.len());
        Ok(Self { rows })
    }

    /// Distinct origins in first-seen order
    pub fn origins(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.origin.as_str()) {
                seen.push(row.origin.as_str());
            }
        }
        seen
    }

    /// Trips from `origin` keyed by destination. Repeated pairs are summed.
    pub fn from_origin(&self, origin: &str) -> HashMap<String, f64> {
        let origin = normalize_name(origin);
        let mut values = HashMap::new();
        for row in self.rows.iter().filter(|r| r.origin == origin) {
            *values.entry(row.destination.clone()).or_insert(0.0) += row.trips;
        }
        values
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssignError;
    use crate::models::{Assignment, Rejected};
    use geo::polygon;
    use std::io::Write;

    fn regions() -> Vec<Region> {
        vec![
            Region::new(
                "A",
                vec![polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 2.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0)]],
            ),
            Region::new(
                "B",
                vec![polygon![(x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 0.0)]],
            ),
        ]
    }

    #[test]
    fn test_centers() {
        let annotated = annotate_regions(&regions());
        let center = annotated[1].center.unwrap();
        assert!((center.x() - 3.0).abs() < 1e-9);
        assert!((center.y() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_join_defaults_to_zero() {
        let annotated = annotate_regions(&regions());
        let mut values = HashMap::new();
        values.insert("A".to_string(), 12.0);
        values.insert("Elsewhere".to_string(), 3.0);

        let joined = join_property(&annotated, "TRIPS", &values);
        assert_eq!(joined[0].property("TRIPS"), Some(12.0));
        assert_eq!(joined[1].property("TRIPS"), Some(0.0));
        // Input left untouched
        assert!(annotated[0].properties.is_empty());
    }

    #[test]
    fn test_count_by_region() {
        let hit = |name: &str| -> AssignmentResult<()> {
            Ok(Assignment {
                region: Some(Arc::from(name)),
                payload: (),
                lon: 0.0,
                lat: 0.0,
            })
        };
        let results = vec![
            hit("A"),
            hit("B"),
            hit("A"),
            Ok(Assignment {
                region: None,
                payload: (),
                lon: 9.0,
                lat: 9.0,
            }),
            Err(Rejected {
                index: 4,
                error: AssignError::InvalidInput {
                    lon: f64::NAN,
                    lat: 0.0,
                },
                payload: (),
                lon: f64::NAN,
                lat: 0.0,
            }),
        ];

        let counts = count_by_region(&results);
        assert_eq!(counts.get("A"), Some(&2));
        assert_eq!(counts.get("B"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_trip_matrix_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "originNB,destinationNB,regularTripSample").unwrap();
        writeln!(file, "ALTITUDE 100,MAROLLES,14").unwrap();
        writeln!(file, "ALTITUDE 100,SABLON ,3").unwrap();
        writeln!(file, "MAROLLES,ALTITUDE  100,7").unwrap();
        writeln!(file, "ALTITUDE 100,MAROLLES,1").unwrap();

        let matrix = TripMatrix::read(file.path()).unwrap();
        assert_eq!(matrix.len(), 4);
        assert_eq!(matrix.origins(), vec!["ALTITUDE 100", "MAROLLES"]);

        let from = matrix.from_origin("ALTITUDE 100");
        assert_eq!(from.get("MAROLLES"), Some(&15.0));
        assert_eq!(from.get("SABLON"), Some(&3.0));

        let back = matrix.from_origin("MAROLLES");
        assert_eq!(back.get("ALTITUDE 100"), Some(&7.0));
    }
}
