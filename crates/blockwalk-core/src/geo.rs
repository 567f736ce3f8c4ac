//! Coordinates and great-circle distance.
//!
//! Distances use the haversine formula on a spherical Earth with
//! radius 6371 km. Working radii in blockwalk are sub-kilometer but a
//! campaign's extent spans tens of kilometers, so no planar
//! approximation is used anywhere.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A WGS-84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    /// Latitude in decimal degrees, in `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in decimal degrees, in `[-180, 180]`.
    pub longitude: f64,
}

impl Coordinates {
    /// Creates validated coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinates`] if either component is
    /// non-finite or outside its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidCoordinates {
                message: format!("latitude {latitude} out of range [-90, 90]"),
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidCoordinates {
                message: format!("longitude {longitude} out of range [-180, 180]"),
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Returns the haversine distance to `other` in meters.
    #[must_use]
    pub fn distance_meters(&self, other: &Self) -> f64 {
        haversine_meters(*self, *other)
    }
}

/// Haversine great-circle distance between two points in meters.
///
/// Matches the distance computed by the address catalog collaborator
/// bit-for-bit: same formula, same Earth radius, no planar shortcut.
#[must_use]
pub fn haversine_meters(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin() * (d_lon / 2.0).sin();
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Haversine great-circle distance between two points in kilometers.
#[must_use]
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    haversine_meters(a, b) / 1000.0
}
