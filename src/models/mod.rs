//! Core data models for the spatial join.

pub mod assignment;
pub mod point;
pub mod region;

pub use assignment::{Assignment, AssignmentResult, Rejected};
pub use point::PointRecord;
pub use region::{normalize_name, Region};
