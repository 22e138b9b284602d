//! OSM export categories and the column rules each one follows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category of an OSM GeoJSON export (overpass-turbo style).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    University,
    Health,
    Residential,
    Sport,
    Sustenance,
    Culture,
    Shop,
    Office,
    Tourism,
    Lanes,
    Parking,
}

impl FeatureKind {
    pub fn all() -> &'static [FeatureKind] {
        &[
            FeatureKind::University,
            FeatureKind::Health,
            FeatureKind::Residential,
            FeatureKind::Sport,
            FeatureKind::Sustenance,
            FeatureKind::Culture,
            FeatureKind::Shop,
            FeatureKind::Office,
            FeatureKind::Tourism,
            FeatureKind::Lanes,
            FeatureKind::Parking,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::University => "university",
            FeatureKind::Health => "health",
            FeatureKind::Residential => "residential",
            FeatureKind::Sport => "sport",
            FeatureKind::Sustenance => "sustenance",
            FeatureKind::Culture => "culture",
            FeatureKind::Shop => "shop",
            FeatureKind::Office => "office",
            FeatureKind::Tourism => "tourism",
            FeatureKind::Lanes => "lanes",
            FeatureKind::Parking => "parking",
        }
    }

    /// Property holding the `type/number` OSM id
    pub fn id_property(&self) -> &'static str {
        match self {
            FeatureKind::Residential | FeatureKind::Lanes | FeatureKind::Parking => "@id",
            _ => "id",
        }
    }

    /// Extra OSM tag kept as a column
    pub fn tag_property(&self) -> Option<&'static str> {
        match self {
            FeatureKind::University
            | FeatureKind::Health
            | FeatureKind::Sustenance
            | FeatureKind::Culture => Some("amenity"),
            FeatureKind::Residential => Some("landuse"),
            _ => None,
        }
    }

    /// Bare LineString features are dropped
    pub fn drops_lines(&self) -> bool {
        matches!(self, FeatureKind::Residential | FeatureKind::Sport)
    }

    /// Only the first feature per OSM id is kept
    pub fn dedups(&self) -> bool {
        matches!(
            self,
            FeatureKind::University | FeatureKind::Health | FeatureKind::Residential
        )
    }

    /// Zero areas (point features) are replaced by the median non-zero area
    pub fn fills_zero_area(&self) -> bool {
        matches!(
            self,
            FeatureKind::University
                | FeatureKind::Health
                | FeatureKind::Culture
                | FeatureKind::Office
                | FeatureKind::Tourism
        )
    }

    pub fn measures_length(&self) -> bool {
        matches!(self, FeatureKind::Lanes)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        FeatureKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = FeatureKind::all().iter().map(|k| k.as_str()).collect();
                format!("unknown feature kind '{}' (expected one of {})", s, known.join(", "))
            })
    }
}
