use std::path::Path;

use anyhow::Result;
use tracing::{error, info};

use quartier::table::PointColumns;

use crate::config::Config;
use crate::{build_engine, run_dataset, Args, Dataset, RunSettings, Source};

/// Assign every dataset listed in a TOML config against one set of regions.
///
/// A failing dataset is logged and skipped; the run reports failure at the end.
pub fn run_batch(config_path: &Path, args: &Args) -> Result<()> {
    let config = Config::load_from_file(config_path)?;

    info!(
        "Starting batch assignment for {} datasets",
        config.datasets.len()
    );

    if let Some(dir) = &config.global.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    // Regions are validated once and shared by every dataset
    let engine = build_engine(&config.global.regions, &config.global.name_property)?;

    let settings = RunSettings {
        name_property: config.global.name_property.clone(),
        utm_zone: args.utm_zone.or(config.global.utm_zone),
        parallel: !(args.sequential || config.global.sequential),
    };

    let mut failed = Vec::new();
    for dataset_config in &config.datasets {
        let source = match dataset_config.kind {
            Some(kind) => Source::Osm {
                path: dataset_config.path.clone(),
                kind,
            },
            None => Source::Table {
                path: dataset_config.path.clone(),
                columns: PointColumns {
                    lon: dataset_config.lon_column.clone(),
                    lat: dataset_config.lat_column.clone(),
                },
            },
        };
        let dataset = Dataset {
            name: dataset_config.name.clone(),
            source,
            output: config.output_path(dataset_config),
        };

        if let Err(e) = run_dataset(&engine, &dataset, &settings) {
            error!("Assignment failed for {}: {:?}", dataset.name, e);
            failed.push(dataset.name);
            continue;
        }
        info!("Dataset {} complete.", dataset.name);
    }

    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} datasets failed: {}",
            failed.len(),
            config.datasets.len(),
            failed.join(", ")
        );
    }

    info!("Batch complete");
    Ok(())
}
