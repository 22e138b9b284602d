//! Error types for region loading and spatial assignment.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the assignment engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssignError {
    /// A polygon part could not be used for containment tests.
    #[error("region '{region}' part {part} is malformed: {reason}")]
    MalformedRegion {
        region: String,
        part: usize,
        reason: String,
    },

    /// A point has non-finite coordinates.
    #[error("point has invalid coordinates ({lon}, {lat})")]
    InvalidInput { lon: f64, lat: f64 },

    /// No regions were supplied, so nothing could ever match.
    #[error("region collection is empty")]
    NoRegions,

    /// The batch was stopped through its cancel token.
    #[error("assignment cancelled after {processed} points")]
    Cancelled { processed: usize },
}

/// Errors raised while reading or writing region and point files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid GeoJSON in {path}: {source}")]
    GeoJson {
        path: PathBuf,
        #[source]
        source: Box<geojson::Error>,
    },

    #[error("expected a FeatureCollection in {0}")]
    NotACollection(PathBuf),

    #[error("feature {index} has no geometry")]
    MissingGeometry { index: usize },

    #[error("feature {index} has unsupported geometry type {kind}")]
    UnsupportedGeometry { index: usize, kind: String },

    #[error("feature {index} is missing string property '{property}'")]
    MissingProperty { index: usize, property: String },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("column '{column}' not found in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error(transparent)]
    Assign(#[from] AssignError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Errors raised while projecting WGS84 coordinates into a UTM zone.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("cannot build projection to EPSG:{epsg}: {source}")]
    Create {
        epsg: u32,
        #[source]
        source: proj::ProjCreateError,
    },

    #[error("cannot project ({x}, {y}): {source}")]
    Transform {
        x: f64,
        y: f64,
        #[source]
        source: proj::ProjError,
    },
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        LoadError::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn geojson(path: impl Into<PathBuf>, source: geojson::Error) -> Self {
        LoadError::GeoJson {
            path: path.into(),
            source: Box::new(source),
        }
    }
}
