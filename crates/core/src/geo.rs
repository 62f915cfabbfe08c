//! Geographic coordinates and great-circle distance.

use crate::constants::EARTH_MEAN_RADIUS_M;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// A WGS84 position in decimal degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Checks that the point is finite and within the latitude/longitude ranges.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(CoreError::InvalidInput(format!(
                "coordinates must be finite: ({}, {})",
                self.latitude, self.longitude
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoreError::InvalidInput(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoreError::InvalidInput(format!(
                "longitude out of range: {}",
                self.longitude
            )));
        }
        Ok(())
    }

    /// Haversine distance to `other` in metres on a spherical earth.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        // Clamp guards asin against rounding just above 1.0 for antipodal points.
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_MEAN_RADIUS_M * c
    }
}
