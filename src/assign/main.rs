//! Neighbourhood assignment pipeline.
//!
//! Loads neighbourhood polygons, assigns CSV point tables or OSM exports to
//! the neighbourhood containing each point, and writes the joined tables.

mod batch;
mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use quartier::annotate::count_by_region;
use quartier::geojson_io::load_regions;
use quartier::osm::{FeatureKind, OsmCatalog, OsmFeatureRow};
use quartier::projection::UtmZone;
use quartier::table::{read_points, write_assignments, OutputLayout, PointColumns, TableRecord};
use quartier::{AssignOptions, AssignmentEngine, PointRecord};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug, Clone)]
#[command(name = "assign")]
#[command(about = "Assign point data to the neighbourhood that contains it")]
struct Args {
    /// Neighbourhood GeoJSON file
    #[arg(short, long)]
    regions: Option<PathBuf>,

    /// Feature property holding the neighbourhood name
    #[arg(long, default_value = "NAME_FRE")]
    name_property: String,

    /// CSV (or .csv.gz) file with the points to assign
    #[arg(short, long, conflicts_with = "osm")]
    points: Option<PathBuf>,

    /// OSM GeoJSON export to assign instead of a CSV
    #[arg(long, requires = "kind")]
    osm: Option<PathBuf>,

    /// Category of the OSM export
    #[arg(long)]
    kind: Option<FeatureKind>,

    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Longitude column of the point CSV
    #[arg(long, default_value = "Long")]
    lon_column: String,

    /// Latitude column of the point CSV
    #[arg(long, default_value = "Lat")]
    lat_column: String,

    /// UTM zone for OSM areas and lengths (e.g. 31N or 32631); derived from the data if unset
    #[arg(long)]
    utm_zone: Option<UtmZone>,

    /// Assign on a single thread
    #[arg(long)]
    sequential: bool,

    /// Worker threads for parallel assignment
    #[arg(long)]
    threads: Option<usize>,

    /// TOML file describing a batch of datasets
    #[arg(long, conflicts_with_all = ["points", "osm"])]
    config: Option<PathBuf>,
}

/// Where a dataset's points come from
#[derive(Debug, Clone)]
pub(crate) enum Source {
    Table { path: PathBuf, columns: PointColumns },
    Osm { path: PathBuf, kind: FeatureKind },
}

#[derive(Debug, Clone)]
pub(crate) struct Dataset {
    pub name: String,
    pub source: Source,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub name_property: String,
    pub utm_zone: Option<UtmZone>,
    pub parallel: bool,
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

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    if let Some(config_path) = &args.config {
        return batch::run_batch(config_path, &args);
    }

    info!("Quartier assignment");

    let regions_path = args
        .regions
        .as_ref()
        .context("--regions is required unless --config is given")?;
    let engine = build_engine(regions_path, &args.name_property)?;

    let source = match (&args.points, &args.osm, args.kind) {
        (Some(path), None, _) => Source::Table {
            path: path.clone(),
            columns: PointColumns {
                lon: args.lon_column.clone(),
                lat: args.lat_column.clone(),
            },
        },
        (None, Some(path), Some(kind)) => Source::Osm {
            path: path.clone(),
            kind,
        },
        _ => anyhow::bail!("Pass either --points or --osm with --kind"),
    };

    let input = match &source {
        Source::Table { path, .. } | Source::Osm { path, .. } => path.clone(),
    };
    let name = dataset_name(&input);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| input.with_file_name(format!("{}.assigned.csv", name)));

    let dataset = Dataset {
        name,
        source,
        output,
    };
    let settings = RunSettings {
        name_property: args.name_property.clone(),
        utm_zone: args.utm_zone,
        parallel: !args.sequential,
    };

    run_dataset(&engine, &dataset, &settings)
}

/// File name without its data and compression extensions,
/// e.g. `parking` for `parking.csv.gz`
fn dataset_name(path: &Path) -> String {
    let mut name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("points");
    for extension in [".gz", ".csv", ".geojson", ".json"] {
        name = name.strip_suffix(extension).unwrap_or(name);
    }
    if name.is_empty() {
        "points".to_string()
    } else {
        name.to_string()
    }
}

/// Load the neighbourhoods and validate them into an engine
pub(crate) fn build_engine(regions_path: &Path, name_property: &str) -> Result<AssignmentEngine> {
    let regions = load_regions(regions_path, name_property)
        .with_context(|| format!("Failed to load regions from {}", regions_path.display()))?;
    AssignmentEngine::new(regions).context("Invalid neighbourhood regions")
}

/// Assign one dataset and write its output table
pub(crate) fn run_dataset(
    engine: &AssignmentEngine,
    dataset: &Dataset,
    settings: &RunSettings,
) -> Result<()> {
    info!("Dataset: {}", dataset.name);

    match &dataset.source {
        Source::Table { path, columns } => {
            let table = read_points(path, columns)
                .with_context(|| format!("Failed to read points from {}", path.display()))?;
            let layout = OutputLayout {
                region_column: settings.name_property.clone(),
                payload_header: table.header,
                lon_column: columns.lon.clone(),
                lat_column: columns.lat.clone(),
            };
            assign_and_write(engine, &table.points, &layout, dataset, settings)
        }
        Source::Osm { path, kind } => {
            let catalog = OsmCatalog::load(path, *kind, settings.utm_zone)
                .with_context(|| format!("Failed to read OSM features from {}", path.display()))?;
            let layout = OutputLayout {
                region_column: settings.name_property.clone(),
                payload_header: OsmFeatureRow::header(*kind),
                lon_column: "LON".to_string(),
                lat_column: "LAT".to_string(),
            };
            assign_and_write(engine, &catalog.to_points(), &layout, dataset, settings)
        }
    }
}

fn assign_and_write<P>(
    engine: &AssignmentEngine,
    points: &[PointRecord<P>],
    layout: &OutputLayout,
    dataset: &Dataset,
    settings: &RunSettings,
) -> Result<()>
where
    P: TableRecord + Clone + Send + Sync,
{
    // Create progress bar
    let pb = ProgressBar::new(points.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
            )?
            .progress_chars("#>-"),
    );

    let options = AssignOptions {
        parallel: settings.parallel,
        cancel: None,
        progress: Some(pb.clone()),
    };
    let results = engine.assign(points, &options)?;
    pb.finish_with_message("Assignment complete");

    let counts = count_by_region(&results);
    info!(
        "{} of {} neighbourhoods received points",
        counts.len(),
        engine.regions().len()
    );
    for (region, count) in &counts {
        debug!("{}: {}", region, count);
    }

    let rejected = write_assignments(&dataset.output, layout, &results)
        .with_context(|| format!("Failed to write {}", dataset.output.display()))?;
    if rejected > 0 {
        warn!(
            "{} points of {} had invalid coordinates and were written without a neighbourhood",
            rejected, dataset.name
        );
    }

    info!("Wrote {}", dataset.output.display());
    Ok(())
}
