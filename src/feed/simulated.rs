use async_trait::async_trait;
use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::time::{Duration, Interval, MissedTickBehavior};

use crate::geo::{Coordinate, EARTH_RADIUS_M};

use super::{LocationFeed, LocationSample};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Stand-in for device geolocation when none is available.
///
/// Every `interval` it flips a coin weighted by `emit_probability` and, on
/// success, reports a point scattered up to `jitter_m` meters around
/// `center`. Never ends.
pub struct SimulatedFeed {
    center: Coordinate,
    jitter_m: f64,
    emit_probability: f64,
    ticker: Interval,
    rng: StdRng,
}

impl SimulatedFeed {
    pub fn new(center: Coordinate, interval: Duration, jitter_m: f64, emit_probability: f64) -> Self {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            center,
            jitter_m: jitter_m.max(0.0),
            emit_probability: emit_probability.clamp(0.0, 1.0),
            ticker,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn scatter(&mut self) -> Coordinate {
        if self.jitter_m == 0.0 {
            return self.center;
        }
        let distance = self.jitter_m * self.rng.gen::<f64>().sqrt();
        let bearing = self.rng.gen_range(0.0..std::f64::consts::TAU);

        let north = distance * bearing.cos();
        let east = distance * bearing.sin();
        let d_lat = (north / EARTH_RADIUS_M).to_degrees();
        let d_lng = (east / (EARTH_RADIUS_M * self.center.lat.to_radians().cos())).to_degrees();

        Coordinate::new(self.center.lng + d_lng, self.center.lat + d_lat)
    }
}

#[async_trait]
impl LocationFeed for SimulatedFeed {
    async fn next_sample(&mut self) -> Option<LocationSample> {
        loop {
            self.ticker.tick().await;
            if self.rng.gen::<f64>() < self.emit_probability {
                let coordinate = self.scatter();
                log_debug!("simulated position {:.6}, {:.6}", coordinate.lng, coordinate.lat);
                return Some(LocationSample::new(coordinate, Utc::now()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::distance_meters;

    #[tokio::test]
    async fn samples_stay_within_jitter_radius() {
        let center = Coordinate::new(-93.4006, 45.0596);
        let mut feed = SimulatedFeed::new(center, Duration::from_millis(1), 15.0, 1.0).with_seed(5);

        for _ in 0..50 {
            let sample = feed.next_sample().await.unwrap();
            let d = distance_meters(center, sample.coordinate).unwrap();
            assert!(d <= 15.0 + 1e-6, "sample {d}m from center");
        }
    }

    #[tokio::test]
    async fn zero_jitter_reports_the_center() {
        let center = Coordinate::new(2.35, 48.85);
        let mut feed = SimulatedFeed::new(center, Duration::from_millis(1), 0.0, 1.0).with_seed(1);
        assert_eq!(feed.next_sample().await.unwrap().coordinate, center);
    }

    #[tokio::test]
    async fn skips_ticks_according_to_probability() {
        let center = Coordinate::new(0.0, 0.0);
        let mut feed = SimulatedFeed::new(center, Duration::from_millis(1), 5.0, 0.4).with_seed(9);
        // Still yields eventually; a skipped tick just waits for the next one.
        for _ in 0..5 {
            assert!(feed.next_sample().await.is_some());
        }
    }
}
