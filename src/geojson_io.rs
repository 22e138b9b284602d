//! GeoJSON region loading and annotated output.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use tracing::{debug, info};

use crate::annotate::AnnotatedRegion;
use crate::error::{AssignError, LoadError};
use crate::models::region::polygon_from_positions;
use crate::models::{normalize_name, Region};

/// Read a GeoJSON FeatureCollection file.
pub fn read_collection(path: &Path) -> Result<FeatureCollection, LoadError> {
    let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    match text.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(fc)) => Ok(fc),
        Ok(_) => Err(LoadError::NotACollection(path.to_path_buf())),
        Err(e) => Err(LoadError::geojson(path, e)),
    }
}

/// Load neighbourhood regions, named by the string property `name_property`.
///
/// Polygon features become one part (holes kept); MultiPolygon features
/// become one part per polygon. Feature order is kept since it decides
/// ties during assignment.
pub fn load_regions(path: &Path, name_property: &str) -> Result<Vec<Region>, LoadError> {
    info!("Loading regions from {}", path.display());
    let collection = read_collection(path)?;
    let regions = regions_from_collection(&collection, name_property)?;
    info!("Loaded {} regions", regions.len());
    Ok(regions)
}

pub fn regions_from_collection(
    collection: &FeatureCollection,
    name_property: &str,
) -> Result<Vec<Region>, LoadError> {
    collection
        .features
        .iter()
        .enumerate()
        .map(|(index, feature)| region_from_feature(index, feature, name_property))
        .collect()
}

fn region_from_feature(
    index: usize,
    feature: &Feature,
    name_property: &str,
) -> Result<Region, LoadError> {
    let name = feature
        .property(name_property)
        .and_then(JsonValue::as_str)
        .map(normalize_name)
        .ok_or_else(|| LoadError::MissingProperty {
            index,
            property: name_property.to_string(),
        })?;

    let geometry = feature
        .geometry
        .as_ref()
        .ok_or(LoadError::MissingGeometry { index })?;

    let polygons: Vec<&geojson::PolygonType> = match &geometry.value {
        geojson::Value::Polygon(rings) => vec![rings],
        geojson::Value::MultiPolygon(polygons) => polygons.iter().collect(),
        other => {
            return Err(LoadError::UnsupportedGeometry {
                index,
                kind: value_kind(other).to_string(),
            })
        }
    };

    let mut parts = Vec::with_capacity(polygons.len());
    for (part, rings) in polygons.into_iter().enumerate() {
        let polygon =
            polygon_from_positions(rings).map_err(|reason| AssignError::MalformedRegion {
                region: name.clone(),
                part,
                reason,
            })?;
        parts.push(polygon);
    }

    debug!("Region '{}' has {} parts", name, parts.len());
    Ok(Region::new(name, parts))
}

fn value_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Build a FeatureCollection from annotated regions.
///
/// Each feature carries `name_property`, `CENTER_LONG`, `CENTER_LAT` and
/// every annotated value.
pub fn annotated_collection(regions: &[AnnotatedRegion], name_property: &str) -> FeatureCollection {
    let features = regions
        .iter()
        .map(|region| {
            let mut properties = JsonObject::new();
            properties.insert(
                name_property.to_string(),
                JsonValue::String(region.name.to_string()),
            );
            if let Some(center) = region.center {
                properties.insert("CENTER_LONG".to_string(), JsonValue::from(center.x()));
                properties.insert("CENTER_LAT".to_string(), JsonValue::from(center.y()));
            }
            for (key, value) in &region.properties {
                properties.insert(key.clone(), JsonValue::from(*value));
            }

            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &region.geometry,
                ))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Write annotated regions as GeoJSON.
pub fn write_annotated(
    path: &Path,
    regions: &[AnnotatedRegion],
    name_property: &str,
) -> Result<(), LoadError> {
    let collection = annotated_collection(regions, name_property);
    let file = fs::File::create(path).map_err(|e| LoadError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection).map_err(|e| LoadError::io(path, e.into()))?;
    writer.flush().map_err(|e| LoadError::io(path, e))?;
    info!("Wrote {} regions to {}", regions.len(), path.display());
    Ok(())
}
