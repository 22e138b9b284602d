//! Point-in-Polygon (PIP) neighbourhood assignment.
//!
//! Validates regions once, indexes their parts in an R-tree and assigns each
//! point to the first region (in input order) whose polygon contains it.

mod cancel;
mod engine;
mod index;

pub use cancel::CancelToken;
pub use engine::{AssignOptions, AssignmentEngine};
pub use index::RegionIndex;
