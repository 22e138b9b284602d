//! Spatial index over region parts.

use geo::{BoundingRect, Intersects, Point};
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use crate::models::Region;

/// Bounding box of one polygon part, keyed by its position in the input
#[derive(Debug, Clone)]
pub struct IndexedPart {
    pub region: usize,
    pub part: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedPart {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over the parts of an ordered region collection.
///
/// Lookups return the same answer as scanning regions and parts in order:
/// among the candidate parts that contain the point, the lowest
/// (region, part) position wins.
pub struct RegionIndex {
    tree: RTree<IndexedPart>,
    regions: Vec<Region>,
}

impl RegionIndex {
    pub fn build(regions: Vec<Region>) -> Self {
        let mut indexed = Vec::new();
        for (region_idx, region) in regions.iter().enumerate() {
            for (part_idx, polygon) in region.parts.iter().enumerate() {
                if let Some(rect) = polygon.bounding_rect() {
                    indexed.push(IndexedPart {
                        region: region_idx,
                        part: part_idx,
                        envelope: AABB::from_corners(
                            [rect.min().x, rect.min().y],
                            [rect.max().x, rect.max().y],
                        ),
                    });
                }
            }
        }

        let tree = RTree::bulk_load(indexed);
        info!(
            "Spatial index built with {} parts over {} regions",
            tree.size(),
            regions.len()
        );

        Self { tree, regions }
    }

    /// Position of the first region containing the point (boundary inclusive)
    pub fn first_match(&self, point: &Point<f64>) -> Option<usize> {
        let query_envelope = AABB::from_point([point.x(), point.y()]);

        let mut candidates: Vec<&IndexedPart> = self
            .tree
            .locate_in_envelope_intersecting(&query_envelope)
            .collect();
        candidates.sort_unstable_by_key(|c| (c.region, c.part));

        candidates
            .into_iter()
            .find(|c| self.regions[c.region].parts[c.part].intersects(point))
            .map(|c| c.region)
    }

    /// Ordered scan without the index
    pub fn first_match_linear(&self, point: &Point<f64>) -> Option<usize> {
        self.regions
            .iter()
            .position(|region| region.parts.iter().any(|part| part.intersects(point)))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Number of indexed parts
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
