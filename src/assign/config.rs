use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use quartier::osm::FeatureKind;
use quartier::projection::UtmZone;

/// Batch run description, e.g.:
///
/// ```toml
/// [global]
/// regions = "data/RBC_Neighborhoods_gps.json"
/// output_dir = "out"
///
/// [[datasets]]
/// name = "parking"
/// path = "data/parking.csv"
///
/// [[datasets]]
/// name = "health"
/// path = "data/osm/health.geojson"
/// kind = "health"
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalConfig {
    pub regions: PathBuf,
    #[serde(default = "default_name_property")]
    pub name_property: String,
    pub output_dir: Option<PathBuf>,
    pub utm_zone: Option<UtmZone>,
    #[serde(default)]
    pub sequential: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetConfig {
    pub name: String,
    pub path: PathBuf,
    pub output: Option<PathBuf>,
    /// Set for OSM GeoJSON exports; CSV point tables leave it out
    pub kind: Option<FeatureKind>,
    #[serde(default = "default_lon_column")]
    pub lon_column: String,
    #[serde(default = "default_lat_column")]
    pub lat_column: String,
}

fn default_name_property() -> String {
    "NAME_FRE".to_string()
}

fn default_lon_column() -> String {
    "Long".to_string()
}

fn default_lat_column() -> String {
    "Lat".to_string()
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Explicit output, else `<output_dir>/<name>_assigned.csv`
    pub fn output_path(&self, dataset: &DatasetConfig) -> PathBuf {
        if let Some(output) = &dataset.output {
            return output.clone();
        }
        let file_name = format!("{}_assigned.csv", dataset.name);
        match &self.global.output_dir {
            Some(dir) => dir.join(file_name),
            None => PathBuf::from(file_name),
        }
    }
}
