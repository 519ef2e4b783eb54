//! Great-circle distance on a spherical Earth.
//!
//! Proximity thresholds in this game are tens of meters, so distances use the
//! haversine form of the central angle, which keeps its precision for points
//! that are close together. The Earth is modelled as a sphere with the IUGG
//! mean radius [`EARTH_RADIUS_M`]; changing that constant shifts every capture
//! radius, so it is fixed here rather than configurable.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position in degrees, longitude first (GeoJSON order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.is_finite() {
            Ok(())
        } else {
            Err(EngineError::InvalidCoordinate {
                lng: self.lng,
                lat: self.lat,
            })
        }
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self::new(lng, lat)
    }
}

/// Central angle between two positions, in radians.
pub fn central_angle(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = lat2 - lat1;
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

pub fn radians_to_meters(radians: f64) -> f64 {
    radians * EARTH_RADIUS_M
}

/// Distance in meters between two positions.
///
/// Fails with [`EngineError::InvalidCoordinate`] if either input is NaN or
/// infinite. Ranges are not checked.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> EngineResult<f64> {
    a.validate()?;
    b.validate()?;
    Ok(radians_to_meters(central_angle(a, b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    #[test]
    fn distance_to_self_is_zero() {
        for c in [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(-93.4006, 45.0596),
            Coordinate::new(179.9, -89.9),
        ] {
            assert_eq!(distance_meters(c, c).unwrap(), 0.0);
        }
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Coordinate::new(-93.4006, 45.0596);
        let b = Coordinate::new(-93.3979, 45.0431);
        let ab = distance_meters(a, b).unwrap();
        let ba = distance_meters(b, a).unwrap();
        assert!((ab - ba).abs() < EPS);
        assert!(ab > 0.0);
    }

    #[test]
    fn meridian_segments_add_up() {
        let a = Coordinate::new(10.0, 40.0);
        let b = Coordinate::new(10.0, 40.5);
        let c = Coordinate::new(10.0, 41.25);
        let ab = distance_meters(a, b).unwrap();
        let bc = distance_meters(b, c).unwrap();
        let ac = distance_meters(a, c).unwrap();
        assert!((ab + bc - ac).abs() < 1e-3);
    }

    #[test]
    fn short_range_matches_arc_length() {
        // 0.0001 degrees of latitude along a meridian.
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.0001)).unwrap();
        let expected = 0.0001_f64.to_radians() * EARTH_RADIUS_M;
        assert!((d - expected).abs() < 1e-6);
        assert!((d - 11.119).abs() < 0.01);
    }

    #[test]
    fn one_degree_on_equator() {
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 0.0)).unwrap();
        assert!((d - 111_194.93).abs() < 0.1);
    }

    #[test]
    fn antipodes_are_half_circumference() {
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(180.0, 0.0)).unwrap();
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1e-3);
    }

    #[test]
    fn nan_input_is_rejected() {
        let err = distance_meters(Coordinate::new(f64::NAN, 0.0), Coordinate::new(0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidCoordinate { .. }));

        let err = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, f64::INFINITY))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidCoordinate { .. }));
    }
}
