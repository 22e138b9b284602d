//! OSM feature exports (amenities, land use, lanes, parking).
//!
//! Each export category has its own id/tag columns and clean-up rules; the
//! resulting features are measured in a UTM zone and handed to the
//! assignment engine as centroid points.

mod catalog;
mod kind;

pub use catalog::{split_osm_id, OsmCatalog, OsmFeature, OsmFeatureRow, OsmType};
pub use kind::FeatureKind;
