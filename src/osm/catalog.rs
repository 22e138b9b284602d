//! OSM feature exports turned into measurable, assignable points.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use geo::{BoundingRect, Centroid, Geometry, Rect};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::FeatureKind;
use crate::error::{LoadError, ProjectionError};
use crate::geojson_io::read_collection;
use crate::models::PointRecord;
use crate::projection::{area_km2, length_m, UtmProjection, UtmZone};
use crate::table::TableRecord;

/// Type of OSM object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmType {
    Node,
    Way,
    Relation,
}

impl fmt::Display for OsmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsmType::Node => write!(f, "node"),
            OsmType::Way => write!(f, "way"),
            OsmType::Relation => write!(f, "relation"),
        }
    }
}

impl FromStr for OsmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(OsmType::Node),
            "way" => Ok(OsmType::Way),
            "relation" => Ok(OsmType::Relation),
            other => Err(format!("unknown OSM type '{}'", other)),
        }
    }
}

/// Split `way/123` into its type and number. Ids without a type are kept whole.
pub fn split_osm_id(raw: &str) -> (Option<OsmType>, String) {
    match raw.split_once('/') {
        Some((kind, id)) => (kind.parse().ok(), id.to_string()),
        None => (None, raw.to_string()),
    }
}

/// One OSM feature with its derived measurements
#[derive(Debug, Clone, PartialEq)]
pub struct OsmFeature {
    pub id: String,
    pub osm_type: Option<OsmType>,
    pub name: Option<String>,
    /// Value of the kind's extra tag (amenity or landuse)
    pub tag: Option<String>,
    pub geometry: Geometry<f64>,
    pub area_km2: f64,
    pub length_m: Option<f64>,
    /// Centroid
    pub lon: f64,
    pub lat: f64,
}

/// Payload carried through the assignment for OSM features
#[derive(Debug, Clone, PartialEq)]
pub struct OsmFeatureRow {
    pub kind: FeatureKind,
    pub id: String,
    pub osm_type: Option<OsmType>,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub area_km2: f64,
    pub length_m: Option<f64>,
}

impl OsmFeatureRow {
    /// Column names matching [`TableRecord::cells`] for `kind`
    pub fn header(kind: FeatureKind) -> Vec<String> {
        let mut header = vec!["ID".to_string(), "TYPE".to_string(), "NAME".to_string()];
        if let Some(tag) = kind.tag_property() {
            header.push(tag.to_ascii_uppercase());
        }
        header.push("AREA".to_string());
        if kind.measures_length() {
            header.push("length".to_string());
        }
        header
    }
}

impl TableRecord for OsmFeatureRow {
    fn cells(&self) -> Vec<String> {
        let mut cells = vec![
            self.id.clone(),
            self.osm_type.map(|t| t.to_string()).unwrap_or_default(),
            self.name.clone().unwrap_or_default(),
        ];
        if self.kind.tag_property().is_some() {
            cells.push(self.tag.clone().unwrap_or_default());
        }
        cells.push(self.area_km2.to_string());
        if self.kind.measures_length() {
            cells.push(self.length_m.map(|l| l.to_string()).unwrap_or_default());
        }
        cells
    }
}

/// All features of one OSM export, cleaned and measured.
#[derive(Debug, Clone)]
pub struct OsmCatalog {
    kind: FeatureKind,
    zone: UtmZone,
    features: Vec<OsmFeature>,
}

impl OsmCatalog {
    /// Load an OSM GeoJSON export. `zone` overrides the UTM zone used for
    /// areas and lengths; by default it is picked from the data's extent.
    pub fn load(path: &Path, kind: FeatureKind, zone: Option<UtmZone>) -> Result<Self, LoadError> {
        info!("Loading {} features from {}", kind, path.display());
        let collection = read_collection(path)?;
        Self::from_collection(collection, kind, zone).map_err(LoadError::from)
    }

    /// Fails only when no projection into the chosen zone can be built;
    /// features that cannot be measured are skipped.
    pub fn from_collection(
        collection: geojson::FeatureCollection,
        kind: FeatureKind,
        zone: Option<UtmZone>,
    ) -> Result<Self, ProjectionError> {
        let total = collection.features.len();
        let mut parsed = Vec::with_capacity(total);

        for (index, feature) in collection.features.into_iter().enumerate() {
            let Some(raw_id) = feature
                .property(kind.id_property())
                .and_then(geojson::JsonValue::as_str)
                .map(str::to_string)
            else {
                warn!(
                    "Feature {} has no '{}' property, skipping",
                    index,
                    kind.id_property()
                );
                continue;
            };
            let name = string_property(&feature, "name");
            let tag = kind
                .tag_property()
                .and_then(|key| string_property(&feature, key));

            let Some(geometry) = feature.geometry else {
                debug!("Feature {} has no geometry, skipping", raw_id);
                continue;
            };
            let geometry = match Geometry::<f64>::try_from(geometry.value) {
                Ok(g) => g,
                Err(e) => {
                    warn!("Feature {} has unusable geometry: {}", raw_id, e);
                    continue;
                }
            };

            if kind.drops_lines() && matches!(geometry, Geometry::LineString(_)) {
                continue;
            }

            let (osm_type, id) = split_osm_id(&raw_id);
            parsed.push(OsmFeature {
                id,
                osm_type,
                name,
                tag,
                geometry,
                area_km2: 0.0,
                length_m: None,
                lon: f64::NAN,
                lat: f64::NAN,
            });
        }

        if kind.dedups() {
            let mut seen = HashSet::new();
            parsed.retain(|f| seen.insert((f.osm_type, f.id.clone())));
        }

        let zone = zone
            .or_else(|| extent(&parsed).map(|r| UtmZone::for_lon_lat(r.center().x, r.center().y)))
            .unwrap_or_else(|| UtmZone::for_lon_lat(0.0, 0.0));
        let projection = UtmProjection::new(zone)?;

        let mut features = Vec::with_capacity(parsed.len());
        for mut feature in parsed {
            let Some(center) = feature.geometry.centroid() else {
                debug!("Feature {} has no centroid, skipping", feature.id);
                continue;
            };
            let measured = area_km2(&feature.geometry, &projection).and_then(|area| {
                let length = if kind.measures_length() {
                    Some(length_m(&feature.geometry, &projection)?)
                } else {
                    None
                };
                Ok((area, length))
            });
            let (area, length) = match measured {
                Ok(m) => m,
                Err(e) => {
                    warn!("Feature {} cannot be measured: {}", feature.id, e);
                    continue;
                }
            };
            feature.lon = center.x();
            feature.lat = center.y();
            feature.area_km2 = area;
            feature.length_m = length;
            features.push(feature);
        }

        if kind.fills_zero_area() {
            fill_zero_areas(&mut features);
        }

        info!(
            "Prepared {} of {} {} features (UTM zone {})",
            features.len(),
            total,
            kind,
            zone
        );

        Ok(Self {
            kind,
            zone,
            features,
        })
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    pub fn features(&self) -> &[OsmFeature] {
        &self.features
    }

    /// Feature centroids as points for the assignment engine
    pub fn to_points(&self) -> Vec<PointRecord<OsmFeatureRow>> {
        self.features
            .iter()
            .map(|f| {
                PointRecord::new(
                    f.lon,
                    f.lat,
                    OsmFeatureRow {
                        kind: self.kind,
                        id: f.id.clone(),
                        osm_type: f.osm_type,
                        name: f.name.clone(),
                        tag: f.tag.clone(),
                        area_km2: f.area_km2,
                        length_m: f.length_m,
                    },
                )
            })
            .collect()
    }
}

fn string_property(feature: &geojson::Feature, key: &str) -> Option<String> {
    feature
        .property(key)
        .and_then(geojson::JsonValue::as_str)
        .map(str::to_string)
}

fn extent(features: &[OsmFeature]) -> Option<Rect<f64>> {
    features
        .iter()
        .filter_map(|f| f.geometry.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
}

/// Replace zero areas by the median of the non-zero ones.
fn fill_zero_areas(features: &mut [OsmFeature]) {
    let mut non_zero: Vec<f64> = features
        .iter()
        .map(|f| f.area_km2)
        .filter(|a| *a != 0.0)
        .collect();

    let Some(median) = median(&mut non_zero) else {
        return;
    };

    let mut filled = 0;
    for feature in features.iter_mut().filter(|f| f.area_km2 == 0.0) {
        feature.area_km2 = median;
        filled += 1;
    }
    debug!("Filled {} zero areas with median {} km²", filled, median);
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::GeoJson;

    fn collection(text: &str) -> geojson::FeatureCollection {
        match text.parse::<GeoJson>().unwrap() {
            GeoJson::FeatureCollection(fc) => fc,
            _ => panic!("not a collection"),
        }
    }

    // ~100 m x 100 m and ~200 m x 100 m blocks near the Bourse
    const HEALTH: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"id": "way/10", "name": "Clinique A", "amenity": "hospital"},
             "geometry": {"type": "Polygon", "coordinates": [[
                [4.3500, 50.8480], [4.3500, 50.8489], [4.3514, 50.8489], [4.3514, 50.8480], [4.3500, 50.8480]
             ]]}},
            {"type": "Feature",
             "properties": {"id": "way/10", "name": "Clinique A", "amenity": "hospital"},
             "geometry": {"type": "Point", "coordinates": [4.3507, 50.8484]}},
            {"type": "Feature",
             "properties": {"id": "node/11", "name": "Pharmacie", "amenity": "pharmacy"},
             "geometry": {"type": "Point", "coordinates": [4.3530, 50.8470]}},
            {"type": "Feature",
             "properties": {"id": "way/12", "amenity": "clinic"},
             "geometry": {"type": "Polygon", "coordinates": [[
                [4.3600, 50.8400], [4.3600, 50.8409], [4.3628, 50.8409], [4.3628, 50.8400], [4.3600, 50.8400]
             ]]}},
            {"type": "Feature",
             "properties": {"name": "No id"},
             "geometry": {"type": "Point", "coordinates": [4.3, 50.8]}}
        ]
    }"#;

    #[test]
    fn test_split_osm_id() {
        assert_eq!(split_osm_id("way/42"), (Some(OsmType::Way), "42".to_string()));
        assert_eq!(split_osm_id("relation/7"), (Some(OsmType::Relation), "7".to_string()));
        assert_eq!(split_osm_id("1234"), (None, "1234".to_string()));
    }

    #[test]
    fn test_health_catalog() {
        let catalog =
            OsmCatalog::from_collection(collection(HEALTH), FeatureKind::Health, None).unwrap();
        assert_eq!(catalog.zone().number(), 31);

        let features = catalog.features();
        // Duplicate way/10 and the feature without id are gone
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].id, "10");
        assert_eq!(features[0].osm_type, Some(OsmType::Way));
        assert_eq!(features[0].tag.as_deref(), Some("hospital"));
        assert!(features[2].name.is_none());

        let small = features[0].area_km2;
        let large = features[2].area_km2;
        assert!(small > 0.009 && small < 0.011, "small = {}", small);
        assert!(large > 0.019 && large < 0.021, "large = {}", large);

        // Pharmacy point gets the median of the two footprints
        assert!((features[1].area_km2 - (small + large) / 2.0).abs() < 1e-12);
        assert!((features[1].lon - 4.3530).abs() < 1e-12);
    }

    #[test]
    fn test_sustenance_keeps_zero_area() {
        let catalog =
            OsmCatalog::from_collection(collection(HEALTH), FeatureKind::Sustenance, None).unwrap();
        // No dedup for this kind
        assert_eq!(catalog.features().len(), 4);
        assert_eq!(catalog.features()[1].area_km2, 0.0);
    }

    #[test]
    fn test_lanes_length_and_residential_drops_lines() {
        let lanes = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"@id": "way/1", "name": "Rue Haute"},
                 "geometry": {"type": "LineString", "coordinates": [[4.35, 50.835], [4.35, 50.844]]}}
            ]
        }"#;

        let catalog =
            OsmCatalog::from_collection(collection(lanes), FeatureKind::Lanes, None).unwrap();
        let length = catalog.features()[0].length_m.unwrap();
        assert!((length - 1001.0).abs() < 5.0, "length = {}", length);

        let rows = catalog.to_points();
        assert_eq!(
            OsmFeatureRow::header(FeatureKind::Lanes),
            vec!["ID", "TYPE", "NAME", "AREA", "length"]
        );
        let cells = rows[0].payload.cells();
        assert_eq!(cells.len(), 5);
        assert_eq!(cells[..3], ["1", "way", "Rue Haute"]);

        let residential =
            OsmCatalog::from_collection(collection(lanes), FeatureKind::Residential, None).unwrap();
        assert!(residential.features().is_empty());
    }

    #[test]
    fn test_points_carry_rows() {
        let catalog =
            OsmCatalog::from_collection(collection(HEALTH), FeatureKind::Health, None).unwrap();
        let points = catalog.to_points();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1].payload.name.as_deref(), Some("Pharmacie"));
        assert_eq!(
            OsmFeatureRow::header(FeatureKind::Health),
            vec!["ID", "TYPE", "NAME", "AMENITY", "AREA"]
        );
        assert_eq!(points[1].payload.cells()[3], "pharmacy");
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), None);
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0]), Some(2.5));
    }
}
