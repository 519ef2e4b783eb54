use thiserror::Error;

use crate::beacons::BeaconId;

/// Errors raised by the proximity engine and its geometry.
///
/// Storage and configuration failures travel as `anyhow::Error`; only the
/// conditions the game loop reacts to get a variant here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid coordinate (lng={lng}, lat={lat})")]
    InvalidCoordinate { lng: f64, lat: f64 },

    #[error("unknown beacon {0}")]
    UnknownBeacon(BeaconId),

    #[error("no beacons loaded")]
    NoBeaconsLoaded,

    #[error("beacon reset of {reset_secs}s is out of range (max {max_secs}s)")]
    InvalidResetDuration { reset_secs: u64, max_secs: u64 },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
