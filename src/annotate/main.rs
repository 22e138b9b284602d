//! Builds annotated neighbourhood GeoJSON for choropleth maps: centres,
//! per-neighbourhood counts from assignment tables, and trip-matrix slices.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use quartier::annotate::{annotate_regions, join_property, TripMatrix};
use quartier::geojson_io::{load_regions, write_annotated};
use quartier::table::read_region_counts;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "annotate")]
#[command(about = "Annotate neighbourhood polygons with counts and trip flows")]
struct Args {
    /// Neighbourhood GeoJSON file
    #[arg(short, long)]
    regions: PathBuf,

    /// Feature property holding the neighbourhood name
    #[arg(long, default_value = "NAME_FRE")]
    name_property: String,

    /// Trip matrix CSV (originNB, destinationNB, regularTripSample)
    #[arg(long)]
    trips: Option<PathBuf>,

    /// Origin neighbourhood whose outgoing trips are joined
    #[arg(long, requires = "trips", conflicts_with = "all_origins")]
    origin: Option<String>,

    /// Join the outgoing trips of every origin in the matrix
    #[arg(long, requires = "trips")]
    all_origins: bool,

    /// Assignment tables to count per neighbourhood (property `<file stem>_COUNT`)
    #[arg(long, num_args = 1..)]
    counts: Vec<PathBuf>,

    /// Output GeoJSON file
    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let regions = load_regions(&args.regions, &args.name_property)
        .with_context(|| format!("Failed to load regions from {}", args.regions.display()))?;
    let mut annotated = annotate_regions(&regions);

    for path in &args.counts {
        let counts = read_region_counts(path, &args.name_property)
            .with_context(|| format!("Failed to count {}", path.display()))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("points")
            .trim_end_matches(".csv");
        let key = format!("{}_COUNT", stem);
        info!("Joining {} as {}", path.display(), key);
        annotated = join_property(&annotated, &key, &counts);
    }

    if let Some(trips_path) = &args.trips {
        let matrix = TripMatrix::read(trips_path)
            .with_context(|| format!("Failed to read trips from {}", trips_path.display()))?;
        if matrix.is_empty() {
            warn!("Trip matrix {} has no rows", trips_path.display());
        }

        let origins: Vec<String> = if args.all_origins {
            matrix.origins().into_iter().map(str::to_string).collect()
        } else if let Some(origin) = &args.origin {
            vec![origin.clone()]
        } else {
            warn!("--trips given without --origin or --all-origins; no trips joined");
            Vec::new()
        };

        for origin in &origins {
            let values = matrix.from_origin(origin);
            if values.is_empty() {
                warn!("No trips leave {}", origin);
            }
            let key = format!("RegularTrips_From_{}", origin);
            annotated = join_property(&annotated, &key, &values);
        }
    }

    write_annotated(&args.output, &annotated, &args.name_property)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    info!("Annotation complete");
    Ok(())
}
