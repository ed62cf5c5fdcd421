//! # Position Source
//!
//! GPS collaborator consumed by the recorder, and the great-circle distance
//! used to accumulate ride distance.

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geodetic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Current GPS state as seen by the recorder
#[cfg_attr(test, mockall::automock)]
pub trait PositionSource: Send + Sync {
    /// Current fix, `None` when the receiver has no valid fix
    fn fix(&self) -> Option<Coordinate>;

    /// Current altitude in meters, `None` when not valid
    fn altitude(&self) -> Option<i16>;

    /// Whether the rider is moving
    fn is_moving(&self) -> bool;

    /// Great-circle distance in meters between two coordinates
    fn distance(&self, from: Coordinate, to: Coordinate) -> f64 {
        haversine_distance(from, to)
    }
}

/// Haversine great-circle distance in meters
///
/// # Examples
///
/// ```
/// use ride_recorder::position::{haversine_distance, Coordinate};
///
/// let a = Coordinate::new(0.0, 0.0);
/// let b = Coordinate::new(0.0, 1.0);
/// let d = haversine_distance(a, b);
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
pub fn haversine_distance(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}
