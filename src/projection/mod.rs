//! Planar measurements for WGS84 geometries.
//!
//! Area and length are never taken in degrees: geometries are first
//! projected into a UTM zone suited to where they are.

mod utm;

pub use utm::{UtmProjection, UtmZone};

use geo::{Area, Geometry, LineString};

use crate::error::ProjectionError;

/// Area in km² after projecting. Points and lines have no area.
pub fn area_km2(
    geometry: &Geometry<f64>,
    projection: &UtmProjection,
) -> Result<f64, ProjectionError> {
    Ok(projection.project_geometry(geometry)?.unsigned_area() / 1e6)
}

/// Length in metres of the linear parts of a geometry, after projecting.
///
/// Polygon outlines are not counted.
pub fn length_m(
    geometry: &Geometry<f64>,
    projection: &UtmProjection,
) -> Result<f64, ProjectionError> {
    Ok(planar_length(&projection.project_geometry(geometry)?))
}

fn planar_length(geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::Line(line) => line.dx().hypot(line.dy()),
        Geometry::LineString(ls) => line_string_length(ls),
        Geometry::MultiLineString(mls) => mls.0.iter().map(line_string_length).sum(),
        Geometry::GeometryCollection(gc) => gc.0.iter().map(planar_length).sum(),
        _ => 0.0,
    }
}

fn line_string_length(ls: &LineString<f64>) -> f64 {
    ls.lines().map(|l| l.dx().hypot(l.dy())).sum()
}
