//! Pluggable driver proximity scoring.

use domain::GeoPoint;

/// Scores a driver's proximity to a pickup point; lower is closer.
///
/// The engine only compares scores, so any monotonic distance measure
/// works. Implementations must be cheap: the engine scores every eligible
/// driver on each dispatch.
pub trait DistanceScorer: Send + Sync {
    /// Returns the proximity score between a driver and the restaurant.
    fn score(&self, driver: &GeoPoint, restaurant: &GeoPoint) -> f64;
}

/// Straight-line distance in raw coordinate space.
///
/// The reference behavior: a placeholder, not geodesic distance. Good
/// enough for ranking drivers within one city; swap in
/// [`HaversineScorer`] where coordinate distortion matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLineScorer;

impl DistanceScorer for StraightLineScorer {
    fn score(&self, driver: &GeoPoint, restaurant: &GeoPoint) -> f64 {
        let dlat = driver.latitude - restaurant.latitude;
        let dlon = driver.longitude - restaurant.longitude;
        (dlat * dlat + dlon * dlon).sqrt()
    }
}

/// Great-circle distance in kilometers over a spherical earth.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineScorer;

const EARTH_RADIUS_KM: f64 = 6371.0;

impl DistanceScorer for HaversineScorer {
    fn score(&self, driver: &GeoPoint, restaurant: &GeoPoint) -> f64 {
        let lat1 = driver.latitude.to_radians();
        let lat2 = restaurant.latitude.to_radians();
        let dlat = (restaurant.latitude - driver.latitude).to_radians();
        let dlon = (restaurant.longitude - driver.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}
