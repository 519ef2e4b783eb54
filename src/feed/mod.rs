//! Location sources. The engine consumes one [`LocationSample`] at a time and
//! doesn't care whether it came from a device or a simulation.

mod ndjson;
mod simulated;

pub use ndjson::{NdjsonFeed, ThreadedNdjsonFeed};
pub use simulated::SimulatedFeed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub coordinate: Coordinate,
    pub received_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(coordinate: Coordinate, received_at: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            received_at,
        }
    }
}

#[async_trait]
pub trait LocationFeed: Send {
    /// Waits for the next position. `None` once the feed is exhausted.
    async fn next_sample(&mut self) -> Option<LocationSample>;
}

#[async_trait]
impl LocationFeed for Box<dyn LocationFeed> {
    async fn next_sample(&mut self) -> Option<LocationSample> {
        (**self).next_sample().await
    }
}
