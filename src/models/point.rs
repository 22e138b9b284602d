//! Point records fed into the assignment engine.

/// A located record with an opaque payload carried through the join.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord<P> {
    pub lon: f64,
    pub lat: f64,
    pub payload: P,
}

impl<P> PointRecord<P> {
    pub fn new(lon: f64, lat: f64, payload: P) -> Self {
        Self { lon, lat, payload }
    }
}
