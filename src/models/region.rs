//! Named regions made of one or more polygon parts.

use std::sync::Arc;

use geo::{Area, Coord, LineString, MultiPolygon, Polygon, Validation};

use crate::error::AssignError;

/// A named area, e.g. a Brussels neighbourhood.
///
/// Parts are tested in order during assignment, so their order is significant.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: Arc<str>,
    pub parts: Vec<Polygon<f64>>,
}

impl Region {
    pub fn new(name: impl Into<Arc<str>>, parts: Vec<Polygon<f64>>) -> Self {
        Self {
            name: name.into(),
            parts,
        }
    }

    /// Build a region from raw rings, one ring per part.
    ///
    /// Vertices are `[lon, lat]` or `[lon, lat, elevation]`; elevation is dropped.
    pub fn from_rings(
        name: impl Into<Arc<str>>,
        rings: &[Vec<Vec<f64>>],
    ) -> Result<Self, AssignError> {
        let name = name.into();
        let parts = rings
            .iter()
            .enumerate()
            .map(|(part, ring)| {
                polygon_from_positions(std::slice::from_ref(ring)).map_err(|reason| {
                    AssignError::MalformedRegion {
                        region: name.to_string(),
                        part,
                        reason,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { name, parts })
    }

    /// Check every part is usable for containment tests.
    pub fn validate(&self) -> Result<(), AssignError> {
        if self.parts.is_empty() {
            return Err(AssignError::MalformedRegion {
                region: self.name.to_string(),
                part: 0,
                reason: "region has no polygon parts".to_string(),
            });
        }

        for (part, polygon) in self.parts.iter().enumerate() {
            validate_part(polygon).map_err(|reason| AssignError::MalformedRegion {
                region: self.name.to_string(),
                part,
                reason,
            })?;
        }
        Ok(())
    }

    pub fn geometry(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(self.parts.clone())
    }
}

/// Trim a region name and collapse inner whitespace runs to one space.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turn GeoJSON-style positions into a polygon: first ring is the exterior,
/// the rest are holes.
pub(crate) fn polygon_from_positions(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, String> {
    let mut converted = Vec::with_capacity(rings.len());
    for (ring_idx, ring) in rings.iter().enumerate() {
        let mut coords = Vec::with_capacity(ring.len());
        for (vertex, position) in ring.iter().enumerate() {
            if position.len() < 2 {
                return Err(format!(
                    "ring {} vertex {} has {} coordinates",
                    ring_idx,
                    vertex,
                    position.len()
                ));
            }
            coords.push(Coord {
                x: position[0],
                y: position[1],
            });
        }
        converted.push(LineString::new(coords));
    }

    let mut rings = converted.into_iter();
    let exterior = rings.next().ok_or_else(|| "polygon has no rings".to_string())?;
    Ok(Polygon::new(exterior, rings.collect()))
}

fn validate_part(polygon: &Polygon<f64>) -> Result<(), String> {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    for ring in rings {
        if let Some(c) = ring.coords().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(format!("non-finite vertex ({}, {})", c.x, c.y));
        }
        let distinct = distinct_vertices(ring);
        if distinct.len() < 3 {
            return Err(format!("ring has {} distinct vertices", distinct.len()));
        }
    }

    // Self-intersecting rings, holes crossing or outside the exterior
    polygon
        .check_validation()
        .map_err(|e| format!("invalid polygon: {}", e))?;

    if polygon.unsigned_area() == 0.0 {
        return Err("exterior ring has zero area".to_string());
    }

    Ok(())
}

/// Ring vertices with consecutive duplicates and the closing vertex removed
fn distinct_vertices(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for c in ring.coords() {
        if out.last() != Some(c) {
            out.push(*c);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}
