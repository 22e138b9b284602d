//! Output of a spatial join.

use std::sync::Arc;

use crate::error::AssignError;

/// One joined point: the enclosing region (if any) plus the untouched input.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<P> {
    /// Name of the first region containing the point
    pub region: Option<Arc<str>>,
    pub payload: P,
    pub lon: f64,
    pub lat: f64,
}

impl<P> Assignment<P> {
    pub fn is_matched(&self) -> bool {
        self.region.is_some()
    }

    /// Region name, or an empty string when unmatched
    pub fn region_name(&self) -> &str {
        self.region.as_deref().unwrap_or("")
    }
}

/// A point the engine could not assign, kept with its input so the row
/// can still be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected<P> {
    /// Position of the point in its batch
    pub index: usize,
    pub error: AssignError,
    pub payload: P,
    pub lon: f64,
    pub lat: f64,
}

/// Per-point outcome. Rejections stay at the position of the offending point.
pub type AssignmentResult<P> = Result<Assignment<P>, Rejected<P>>;
