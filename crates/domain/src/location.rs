//! Geographic value object.

use serde::{Deserialize, Serialize};

/// A point in coordinate space.
///
/// Coordinates are plain latitude/longitude degrees; distance semantics are
/// the concern of the dispatch scoring strategy, not of this type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a point from latitude/longitude degrees.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_roundtrip() {
        let point = GeoPoint::new(40.7128, -74.0060);
        let json = serde_json::to_string(&point).unwrap();
        let back: GeoPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(point, back);
    }
}
