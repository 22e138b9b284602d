//! Universal Transverse Mercator zones on the WGS84 ellipsoid.

use std::fmt;
use std::str::FromStr;

use geo::{BoundingRect, Centroid, Coord, Geometry, MapCoords};
use proj::Proj;
use serde::Deserialize;

use crate::error::ProjectionError;

/// A 6° UTM zone and hemisphere, e.g. 31N for Brussels (EPSG:32631).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct UtmZone {
    number: u8,
    north: bool,
}

impl UtmZone {
    pub fn new(number: u8, north: bool) -> Option<Self> {
        (1..=60).contains(&number).then_some(Self { number, north })
    }

    /// Standard zone for a WGS84 position (no Norway/Svalbard exceptions)
    pub fn for_lon_lat(lon: f64, lat: f64) -> Self {
        let number = ((lon + 180.0) / 6.0).floor().clamp(0.0, 59.0) as u8 + 1;
        Self {
            number,
            north: lat >= 0.0,
        }
    }

    /// Zone of the geometry's centroid, or of its bounding box centre.
    pub fn for_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        let center = geometry
            .centroid()
            .map(|p| p.0)
            .or_else(|| geometry.bounding_rect().map(|r| r.center()))?;
        Some(Self::for_lon_lat(center.x, center.y))
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn is_north(&self) -> bool {
        self.north
    }

    pub fn central_meridian(&self) -> f64 {
        f64::from(self.number) * 6.0 - 183.0
    }

    pub fn epsg(&self) -> u32 {
        let base = if self.north { 32600 } else { 32700 };
        base + u32::from(self.number)
    }
}

/// WGS84 (EPSG:4326) to UTM transform for one zone, backed by PROJ.
pub struct UtmProjection {
    zone: UtmZone,
    proj: Proj,
}

impl UtmProjection {
    pub fn new(zone: UtmZone) -> Result<Self, ProjectionError> {
        let epsg = zone.epsg();
        let proj = Proj::new_known_crs("EPSG:4326", &format!("EPSG:{}", epsg), None)
            .map_err(|source| ProjectionError::Create { epsg, source })?;
        Ok(Self { zone, proj })
    }

    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    /// Project a lon/lat coordinate (degrees) to easting/northing (metres).
    pub fn project(&self, c: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        let (x, y) = self
            .proj
            .convert((c.x, c.y))
            .map_err(|source| ProjectionError::Transform {
                x: c.x,
                y: c.y,
                source,
            })?;
        Ok(Coord { x, y })
    }

    pub fn project_geometry(
        &self,
        geometry: &Geometry<f64>,
    ) -> Result<Geometry<f64>, ProjectionError> {
        geometry.try_map_coords(|c| self.project(c))
    }
}

impl fmt::Debug for UtmProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtmProjection")
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for UtmZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, if self.north { 'N' } else { 'S' })
    }
}

/// Accepts `31`, `31N`, `31s` or an EPSG code such as `32631`.
impl FromStr for UtmZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("invalid UTM zone '{}'", s);

        if let Ok(code) = s.parse::<u32>() {
            let (number, north) = match code {
                1..=60 => (code, true),
                32601..=32660 => (code - 32600, true),
                32701..=32760 => (code - 32700, false),
                _ => return Err(invalid()),
            };
            return Self::new(number as u8, north).ok_or_else(invalid);
        }

        let mut chars = s.chars();
        let north = match chars.next_back() {
            Some('N' | 'n') => true,
            Some('S' | 's') => false,
            _ => return Err(invalid()),
        };
        let number: u8 = chars.as_str().parse().map_err(|_| invalid())?;
        Self::new(number, north).ok_or_else(invalid)
    }
}

impl TryFrom<String> for UtmZone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
