//! Quartier - assign point data to Brussels neighbourhoods
//!
//! This library provides the spatial join and its supporting loaders for the
//! `assign` and `annotate` binaries.

pub mod annotate;
pub mod error;
pub mod geojson_io;
pub mod models;
pub mod osm;
pub mod pip;
pub mod projection;
pub mod table;

pub use error::{AssignError, LoadError, ProjectionError};
pub use models::{Assignment, AssignmentResult, PointRecord, Region, Rejected};
pub use pip::{AssignOptions, AssignmentEngine, CancelToken};
