use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::Rng;

use crate::error::{EngineError, EngineResult};

use super::{Beacon, BeaconBucket, BeaconId, BeaconView};

/// Longest cooldown a beacon may have: one year.
pub const MAX_RESET_SECS: u64 = 365 * 24 * 60 * 60;

/// Defaults applied to buckets that don't carry their own overrides.
#[derive(Debug, Clone, Copy)]
pub struct CatalogDefaults {
    pub value: u32,
    pub reset_secs: u64,
}

impl Default for CatalogDefaults {
    fn default() -> Self {
        Self {
            value: 1,
            reset_secs: 600,
        }
    }
}

/// Owns every beacon and is the only writer of capture timestamps.
#[derive(Debug, Clone)]
pub struct BeaconCatalog {
    beacons: Vec<Beacon>,
    index: HashMap<BeaconId, usize>,
}

impl BeaconCatalog {
    /// Builds the catalog from bucketed coordinates.
    ///
    /// Each beacon gets a capture timestamp in the past so the initial
    /// cooldowns are spread out: roughly half start capturable, the rest
    /// have between 0 and `reset_secs` left. Later duplicates of a
    /// coordinate are dropped.
    pub fn load<R: Rng>(
        buckets: &[BeaconBucket],
        defaults: CatalogDefaults,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> EngineResult<Self> {
        let mut beacons = Vec::new();
        let mut index = HashMap::new();

        for bucket in buckets {
            let value = bucket.value.unwrap_or(defaults.value);
            let reset_secs = bucket.reset_secs.unwrap_or(defaults.reset_secs);
            if reset_secs > MAX_RESET_SECS {
                return Err(EngineError::InvalidResetDuration {
                    reset_secs,
                    max_secs: MAX_RESET_SECS,
                });
            }

            for &coordinate in &bucket.coordinates {
                if let Err(err) = coordinate.validate() {
                    warn!("Skipping beacon in {:?}: {err}", bucket.group);
                    continue;
                }

                let id = BeaconId::from_coordinate(coordinate);
                if index.contains_key(&id) {
                    warn!("Duplicate beacon {id} skipped");
                    continue;
                }

                let remaining = seed_remaining_secs(reset_secs, rng);
                let captured_at = seeded_capture_time(now, reset_secs - remaining).ok_or(
                    EngineError::InvalidResetDuration {
                        reset_secs,
                        max_secs: MAX_RESET_SECS,
                    },
                )?;

                let mut beacon = Beacon {
                    id: id.clone(),
                    coordinate,
                    visibility: bucket.visibility,
                    group: bucket.group.clone(),
                    value,
                    captured_at,
                    reset_secs,
                    remaining_secs: reset_secs,
                };
                beacon.refresh(now);

                index.insert(id, beacons.len());
                beacons.push(beacon);
            }
        }

        if beacons.is_empty() {
            return Err(EngineError::NoBeaconsLoaded);
        }

        let capturable = beacons.iter().filter(|b| b.is_capturable()).count();
        info!(
            "Loaded {} beacons from {} buckets ({} capturable now)",
            beacons.len(),
            buckets.len(),
            capturable
        );

        Ok(Self { beacons, index })
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    pub fn beacons(&self) -> &[Beacon] {
        &self.beacons
    }

    pub fn get(&self, id: &BeaconId) -> Option<&Beacon> {
        self.index.get(id).map(|&i| &self.beacons[i])
    }

    /// Recomputes every beacon's remaining cooldown from the wall clock.
    pub fn refresh_cooldowns(&mut self, now: DateTime<Utc>) {
        for beacon in &mut self.beacons {
            beacon.refresh(now);
        }
    }

    /// Restarts the beacon's cooldown at full duration.
    pub(crate) fn mark_captured(&mut self, id: &BeaconId, now: DateTime<Utc>) -> EngineResult<()> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| EngineError::UnknownBeacon(id.clone()))?;
        let beacon = &mut self.beacons[i];
        beacon.captured_at = now;
        beacon.remaining_secs = beacon.reset_secs;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<BeaconView> {
        self.beacons.iter().map(Beacon::view).collect()
    }
}

fn seeded_capture_time(now: DateTime<Utc>, elapsed_secs: u64) -> Option<DateTime<Utc>> {
    let elapsed = Duration::try_seconds(i64::try_from(elapsed_secs).ok()?)?;
    now.checked_sub_signed(elapsed)
}

/// `max(0, round(R - U[0,1) * 2R))`
fn seed_remaining_secs<R: Rng>(reset_secs: u64, rng: &mut R) -> u64 {
    let reset = reset_secs as f64;
    let draw = (reset - rng.gen::<f64>() * reset * 2.0).round();
    (draw.max(0.0) as u64).min(reset_secs)
}
