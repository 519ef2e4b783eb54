use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Beacon identity. Derived from the coordinate pair, so two beacons placed
/// at the same spot share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeaconId(String);

impl BeaconId {
    pub fn from_coordinate(coordinate: Coordinate) -> Self {
        // `+ 0.0` folds -0.0 into 0.0 so both spell "0".
        Self(format!("{}|{}", coordinate.lng + 0.0, coordinate.lat + 0.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BeaconId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Visible => "visible",
            Visibility::Hidden => "hidden",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CooldownState {
    OnCooldown,
    Capturable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beacon {
    pub id: BeaconId,
    pub coordinate: Coordinate,
    pub visibility: Visibility,
    /// Source bucket the beacon was loaded from, e.g. `troy`.
    pub group: Option<String>,
    pub value: u32,
    pub captured_at: DateTime<Utc>,
    pub reset_secs: u64,
    /// Cached by [`Beacon::refresh`]; never the source of truth.
    pub remaining_secs: u64,
}

impl Beacon {
    /// Seconds of cooldown left at `now`.
    ///
    /// Elapsed time is rounded to the nearest second. A capture timestamp in
    /// the future counts as zero elapsed, so the result stays within
    /// `0..=reset_secs`.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u64 {
        let elapsed_ms = (now - self.captured_at).num_milliseconds().max(0) as u64;
        let elapsed_secs = elapsed_ms.saturating_add(500) / 1000;
        self.reset_secs.saturating_sub(elapsed_secs)
    }

    pub fn refresh(&mut self, now: DateTime<Utc>) {
        self.remaining_secs = self.remaining_at(now);
    }

    pub fn state(&self) -> CooldownState {
        if self.remaining_secs == 0 {
            CooldownState::Capturable
        } else {
            CooldownState::OnCooldown
        }
    }

    pub fn is_capturable(&self) -> bool {
        self.state() == CooldownState::Capturable
    }

    pub fn view(&self) -> BeaconView {
        BeaconView {
            id: self.id.clone(),
            coordinate: self.coordinate,
            visibility: self.visibility,
            value: self.value,
            remaining_secs: self.remaining_secs,
            state: self.state(),
        }
    }
}

/// Read-only shape handed to the rendering layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeaconView {
    pub id: BeaconId,
    pub coordinate: Coordinate,
    pub visibility: Visibility,
    pub value: u32,
    pub remaining_secs: u64,
    pub state: CooldownState,
}
