//! Batch assignment of points to regions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashSet;
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{CancelToken, RegionIndex};
use crate::error::AssignError;
use crate::models::{Assignment, AssignmentResult, PointRecord, Region, Rejected};

/// How a batch is run. None of these affect the results.
#[derive(Clone, Default)]
pub struct AssignOptions {
    /// Spread points across the rayon pool
    pub parallel: bool,
    pub cancel: Option<CancelToken>,
    /// Advanced once per processed point
    pub progress: Option<ProgressBar>,
}

impl AssignOptions {
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Stateless spatial join over an immutable region collection.
pub struct AssignmentEngine {
    index: RegionIndex,
}

impl AssignmentEngine {
    /// Validate the regions and build the lookup index.
    ///
    /// Fails on the first malformed part, or when `regions` is empty.
    pub fn new(regions: Vec<Region>) -> Result<Self, AssignError> {
        if regions.is_empty() {
            return Err(AssignError::NoRegions);
        }

        for region in &regions {
            region.validate()?;
        }

        let mut seen = HashSet::new();
        for region in &regions {
            if !seen.insert(Arc::clone(&region.name)) {
                warn!(
                    "Duplicate region name '{}': later entries only win where earlier ones do not match",
                    region.name
                );
            }
        }

        let parts: usize = regions.iter().map(|r| r.parts.len()).sum();
        info!(
            "Assignment engine ready with {} regions ({} polygon parts)",
            regions.len(),
            parts
        );

        Ok(Self {
            index: RegionIndex::build(regions),
        })
    }

    pub fn regions(&self) -> &[Region] {
        self.index.regions()
    }

    /// First region, in input order, whose polygon contains the point.
    ///
    /// Points on an edge or vertex count as contained.
    pub fn find_first_match(&self, lon: f64, lat: f64) -> Result<Option<&Region>, AssignError> {
        let point = checked_point(lon, lat)?;
        Ok(self
            .index
            .first_match(&point)
            .map(|idx| &self.regions()[idx]))
    }

    /// Same as [`find_first_match`](Self::find_first_match) without the R-tree.
    pub fn find_first_match_linear(
        &self,
        lon: f64,
        lat: f64,
    ) -> Result<Option<&Region>, AssignError> {
        let point = checked_point(lon, lat)?;
        Ok(self
            .index
            .first_match_linear(&point)
            .map(|idx| &self.regions()[idx]))
    }

    /// Assign every point, keeping input order.
    ///
    /// A point with invalid coordinates produces an error entry at its
    /// position; the rest of the batch still runs. The whole call only fails
    /// when the cancel token fires.
    pub fn assign<P>(
        &self,
        points: &[PointRecord<P>],
        options: &AssignOptions,
    ) -> Result<Vec<AssignmentResult<P>>, AssignError>
    where
        P: Clone + Send + Sync,
    {
        info!(
            "Assigning {} points to {} regions ({})",
            points.len(),
            self.regions().len(),
            if options.parallel { "parallel" } else { "sequential" }
        );

        let results = if options.parallel {
            self.assign_parallel(points, options)?
        } else {
            self.assign_sequential(points, options)?
        };

        let matched = results
            .iter()
            .filter(|r| matches!(r, Ok(a) if a.is_matched()))
            .count();
        let invalid = results.iter().filter(|r| r.is_err()).count();
        info!(
            "Assigned {} points: {} matched, {} unmatched, {} invalid",
            results.len(),
            matched,
            results.len() - matched - invalid,
            invalid
        );

        Ok(results)
    }

    fn assign_sequential<P: Clone>(
        &self,
        points: &[PointRecord<P>],
        options: &AssignOptions,
    ) -> Result<Vec<AssignmentResult<P>>, AssignError> {
        let mut results = Vec::with_capacity(points.len());

        for (processed, point) in points.iter().enumerate() {
            if options.is_cancelled() {
                return Err(AssignError::Cancelled { processed });
            }
            results.push(self.assign_one(processed, point));
            if let Some(pb) = &options.progress {
                pb.inc(1);
            }
        }

        Ok(results)
    }

    fn assign_parallel<P>(
        &self,
        points: &[PointRecord<P>],
        options: &AssignOptions,
    ) -> Result<Vec<AssignmentResult<P>>, AssignError>
    where
        P: Clone + Send + Sync,
    {
        let processed = AtomicUsize::new(0);

        // Indexed collect keeps input order regardless of scheduling
        let results: Option<Vec<AssignmentResult<P>>> = points
            .par_iter()
            .enumerate()
            .map(|(index, point)| {
                if options.is_cancelled() {
                    return None;
                }
                let result = self.assign_one(index, point);
                processed.fetch_add(1, Ordering::Relaxed);
                if let Some(pb) = &options.progress {
                    pb.inc(1);
                }
                Some(result)
            })
            .collect();

        results.ok_or_else(|| AssignError::Cancelled {
            processed: processed.load(Ordering::Relaxed),
        })
    }

    fn assign_one<P: Clone>(&self, index: usize, point: &PointRecord<P>) -> AssignmentResult<P> {
        match self.find_first_match(point.lon, point.lat) {
            Ok(region) => Ok(Assignment {
                region: region.map(|r| Arc::clone(&r.name)),
                payload: point.payload.clone(),
                lon: point.lon,
                lat: point.lat,
            }),
            Err(error) => {
                debug!("Point {} rejected: {}", index, error);
                Err(Rejected {
                    index,
                    error,
                    payload: point.payload.clone(),
                    lon: point.lon,
                    lat: point.lat,
                })
            }
        }
    }
}

fn checked_point(lon: f64, lat: f64) -> Result<geo::Point<f64>, AssignError> {
    if lon.is_finite() && lat.is_finite() {
        Ok(geo::Point::new(lon, lat))
    } else {
        Err(AssignError::InvalidInput { lon, lat })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(name: &str, x0: f64, y0: f64, size: f64) -> Region {
        Region::new(
            name,
            vec![polygon![
                (x: x0, y: y0),
                (x: x0, y: y0 + size),
                (x: x0 + size, y: y0 + size),
                (x: x0 + size, y: y0),
            ]],
        )
    }

    /// Squares A = [0,2]x[0,2] and B = [2,4]x[0,2], sharing the edge x = 2
    fn adjacent_squares() -> AssignmentEngine {
        AssignmentEngine::new(vec![square("A", 0.0, 0.0, 2.0), square("B", 2.0, 0.0, 2.0)])
            .unwrap()
    }

    fn names<P>(results: &[AssignmentResult<P>]) -> Vec<Option<String>> {
        results
            .iter()
            .map(|r| {
                r.as_ref()
                    .ok()
                    .and_then(|a| a.region.as_deref().map(str::to_string))
            })
            .collect()
    }

    #[test]
    fn test_adjacent_squares_scenario() {
        let engine = adjacent_squares();
        let points = vec![
            PointRecord::new(1.0, 1.0, "inside-a"),
            PointRecord::new(3.0, 1.0, "inside-b"),
            PointRecord::new(2.0, 1.0, "shared-edge"),
            PointRecord::new(10.0, 10.0, "far"),
        ];

        let results = engine.assign(&points, &AssignOptions::sequential()).unwrap();
        assert_eq!(
            names(&results),
            vec![Some("A".into()), Some("B".into()), Some("A".into()), None]
        );

        let far = results[3].as_ref().unwrap();
        assert!(!far.is_matched());
        assert_eq!(far.region_name(), "");
        assert_eq!(far.payload, "far");
        assert_eq!((far.lon, far.lat), (10.0, 10.0));
    }

    #[test]
    fn test_shared_edge_follows_region_order() {
        let engine =
            AssignmentEngine::new(vec![square("B", 2.0, 0.0, 2.0), square("A", 0.0, 0.0, 2.0)])
                .unwrap();
        let region = engine.find_first_match(2.0, 1.0).unwrap().unwrap();
        assert_eq!(&*region.name, "B");
    }

    #[test]
    fn test_vertex_counts_as_match() {
        let engine = adjacent_squares();
        let region = engine.find_first_match(0.0, 0.0).unwrap().unwrap();
        assert_eq!(&*region.name, "A");
        let region = engine.find_first_match(4.0, 2.0).unwrap().unwrap();
        assert_eq!(&*region.name, "B");
    }

    #[test]
    fn test_second_part_matches() {
        let mut region = square("Split", 0.0, 0.0, 1.0);
        region.parts.push(square("_", 10.0, 10.0, 1.0).parts.remove(0));
        let engine = AssignmentEngine::new(vec![square("Other", 5.0, 5.0, 1.0), region]).unwrap();

        let found = engine.find_first_match(10.5, 10.5).unwrap().unwrap();
        assert_eq!(&*found.name, "Split");
    }

    #[test]
    fn test_empty_regions_rejected() {
        assert!(matches!(
            AssignmentEngine::new(vec![]),
            Err(AssignError::NoRegions)
        ));
    }

    #[test]
    fn test_malformed_region_rejected_eagerly() {
        let bad = Region::from_rings("Bad", &[vec![vec![0.0, 0.0], vec![1.0, 1.0]]]).unwrap();
        let result = AssignmentEngine::new(vec![square("A", 0.0, 0.0, 2.0), bad]);
        match result {
            Err(AssignError::MalformedRegion { region, part, .. }) => {
                assert_eq!(region, "Bad");
                assert_eq!(part, 0);
            }
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("malformed region accepted"),
        }
    }

    #[test]
    fn test_invalid_point_is_isolated() {
        let engine = adjacent_squares();
        let points = vec![
            PointRecord::new(1.0, 1.0, 0),
            PointRecord::new(f64::NAN, 1.0, 1),
            PointRecord::new(f64::INFINITY, 1.0, 2),
            PointRecord::new(3.0, 1.0, 3),
        ];

        let results = engine.assign(&points, &AssignOptions::sequential()).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        let rejected = results[1].as_ref().unwrap_err();
        assert_eq!(rejected.index, 1);
        assert_eq!(rejected.payload, 1);
        assert!(matches!(rejected.error, AssignError::InvalidInput { .. }));
        assert!(matches!(
            results[2],
            Err(Rejected {
                index: 2,
                error: AssignError::InvalidInput { .. },
                ..
            })
        ));
        assert_eq!(results[3].as_ref().unwrap().region_name(), "B");
    }

    #[test]
    fn test_parallel_keeps_rejections_in_place() {
        let engine = adjacent_squares();
        let points: Vec<PointRecord<usize>> = (0..1_000)
            .map(|i| {
                let x = if i % 7 == 3 { f64::NAN } else { (i % 50) as f64 * 0.1 };
                PointRecord::new(x, 1.0, i)
            })
            .collect();

        let sequential = engine.assign(&points, &AssignOptions::sequential()).unwrap();
        let parallel = engine.assign(&points, &AssignOptions::parallel()).unwrap();
        assert_eq!(sequential, parallel);

        for (i, result) in parallel.iter().enumerate() {
            match result {
                Ok(assignment) => {
                    assert_ne!(i % 7, 3);
                    assert_eq!(assignment.payload, i);
                }
                Err(rejected) => {
                    assert_eq!(i % 7, 3);
                    assert_eq!(rejected.index, i);
                    assert_eq!(rejected.payload, i);
                }
            }
        }
    }

    #[test]
    fn test_parallel_preserves_order() {
        let engine = adjacent_squares();
        let points: Vec<PointRecord<usize>> = (0..2_000)
            .map(|i| {
                let x = (i % 50) as f64 * 0.1;
                PointRecord::new(x, 1.0, i)
            })
            .collect();

        let sequential = engine.assign(&points, &AssignOptions::sequential()).unwrap();
        let parallel = engine.assign(&points, &AssignOptions::parallel()).unwrap();

        assert_eq!(sequential, parallel);
        for (i, result) in parallel.iter().enumerate() {
            assert_eq!(result.as_ref().unwrap().payload, i);
        }
    }

    #[test]
    fn test_repeated_runs_identical() {
        let engine = adjacent_squares();
        let points: Vec<PointRecord<()>> = [(2.0, 0.5), (2.0, 2.0), (0.0, 1.0), (4.5, 1.0)]
            .iter()
            .map(|(x, y)| PointRecord::new(*x, *y, ()))
            .collect();

        let first = engine.assign(&points, &AssignOptions::parallel()).unwrap();
        let second = engine.assign(&points, &AssignOptions::parallel()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cancelled_batch() {
        let engine = adjacent_squares();
        let points = vec![PointRecord::new(1.0, 1.0, ()); 10];
        let token = CancelToken::new();
        token.cancel();

        let sequential =
            engine.assign(&points, &AssignOptions::sequential().with_cancel(token.clone()));
        assert_eq!(sequential, Err(AssignError::Cancelled { processed: 0 }));

        let parallel = engine.assign(&points, &AssignOptions::parallel().with_cancel(token));
        assert!(matches!(parallel, Err(AssignError::Cancelled { .. })));
    }

    /// Payload that fires its token when the engine copies it into a result
    #[derive(Debug)]
    struct Tripwire(Option<CancelToken>);

    impl Clone for Tripwire {
        fn clone(&self) -> Self {
            if let Some(token) = &self.0 {
                token.cancel();
            }
            Tripwire(None)
        }
    }

    fn tripwire_batch(len: usize, at: usize, token: &CancelToken) -> Vec<PointRecord<Tripwire>> {
        (0..len)
            .map(|i| {
                let trigger = (i == at).then(|| token.clone());
                PointRecord::new(1.0, 1.0, Tripwire(trigger))
            })
            .collect()
    }

    #[test]
    fn test_cancel_during_sequential_batch() {
        let engine = adjacent_squares();
        let token = CancelToken::new();
        let points = tripwire_batch(10, 4, &token);

        let result = engine.assign(&points, &AssignOptions::sequential().with_cancel(token));
        match result {
            Err(AssignError::Cancelled { processed }) => assert_eq!(processed, 5),
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("batch was not cancelled"),
        }
    }

    #[test]
    fn test_cancel_during_parallel_batch() {
        let engine = adjacent_squares();
        let token = CancelToken::new();
        let points = tripwire_batch(200, 50, &token);

        // One worker makes the stopping point deterministic
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        let result = pool.install(|| {
            engine.assign(&points, &AssignOptions::parallel().with_cancel(token))
        });
        match result {
            Err(AssignError::Cancelled { processed }) => {
                assert!(processed > 0 && processed < points.len(), "{processed}");
            }
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("batch was not cancelled"),
        }
    }

    #[test]
    fn test_progress_counts_points() {
        let engine = adjacent_squares();
        let points = vec![PointRecord::new(1.0, 1.0, ()); 25];
        let pb = ProgressBar::hidden();

        engine
            .assign(&points, &AssignOptions::parallel().with_progress(pb.clone()))
            .unwrap();
        assert_eq!(pb.position(), 25);
    }

    #[test]
    fn test_linear_search_agrees() {
        let engine = adjacent_squares();
        for (x, y) in [(1.0, 1.0), (2.0, 1.0), (3.0, 0.0), (-1.0, 0.0)] {
            let indexed = engine.find_first_match(x, y).unwrap().map(|r| r.name.clone());
            let linear = engine
                .find_first_match_linear(x, y)
                .unwrap()
                .map(|r| r.name.clone());
            assert_eq!(indexed, linear);
        }
    }
}
