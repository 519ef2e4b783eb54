use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::{
    beacons::{BeaconCatalog, BeaconId, BeaconView, Visibility},
    error::{EngineError, EngineResult},
    feed::LocationSample,
    geo::{distance_meters, Coordinate},
    ledger::{CaptureLedger, KeyValueStore},
};

pub const DEFAULT_PROXIMITY_THRESHOLD_M: f64 = 20.0;

/// Emitted once per beacon captured; the hook for haptics and notifications.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    pub beacon_id: BeaconId,
    pub coordinate: Coordinate,
    pub visibility: Visibility,
    pub value: u32,
    pub distance_m: f64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub total_points: u64,
    pub captured: Vec<CaptureEvent>,
    /// Set when a capture could not be written to storage. The capture
    /// still counts.
    pub persist_warning: Option<String>,
}

/// Applies location samples to the beacon catalog and the capture ledger.
///
/// The engine owns both; callers only ever see [`BeaconView`] snapshots and
/// totals. Taking `&mut self` per sample keeps updates strictly sequential.
pub struct ProximityEngine<S> {
    catalog: BeaconCatalog,
    ledger: CaptureLedger<S>,
    threshold_m: f64,
}

impl<S: KeyValueStore> ProximityEngine<S> {
    pub fn new(catalog: BeaconCatalog, ledger: CaptureLedger<S>, threshold_m: f64) -> Self {
        Self {
            catalog,
            ledger,
            threshold_m,
        }
    }

    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    /// Processes one position.
    ///
    /// Every capturable beacon within the threshold is captured, then all
    /// cooldowns are recomputed for `sample.received_at`. Invalid samples
    /// are rejected before anything changes.
    pub async fn on_location_sample(
        &mut self,
        sample: &LocationSample,
    ) -> EngineResult<UpdateOutcome> {
        if self.catalog.is_empty() {
            return Err(EngineError::NoBeaconsLoaded);
        }
        sample.coordinate.validate()?;

        let now = sample.received_at;

        let mut captured = Vec::new();
        for beacon in self.catalog.beacons() {
            let distance_m = distance_meters(beacon.coordinate, sample.coordinate)?;
            if distance_m <= self.threshold_m && beacon.is_capturable() {
                captured.push(CaptureEvent {
                    beacon_id: beacon.id.clone(),
                    coordinate: beacon.coordinate,
                    visibility: beacon.visibility,
                    value: beacon.value,
                    distance_m,
                    captured_at: now,
                });
            }
        }

        let mut persist_warning = None;
        for event in &captured {
            if let Err(err) = self.catalog.mark_captured(&event.beacon_id, now) {
                debug_assert!(false, "captured beacon vanished from catalog: {err}");
                return Err(err);
            }
            info!(
                "Captured {} beacon {} at {:.1}m (+{})",
                event.visibility, event.beacon_id, event.distance_m, event.value
            );

            // Each append rewrites the full ledger, so a later success also
            // recovers an earlier failed write.
            if let Err(err) = self
                .ledger
                .append(event.beacon_id.clone(), event.value, now)
                .await
            {
                warn!("Capture of {} not persisted: {err:#}", event.beacon_id);
                persist_warning = Some(format!("{err:#}"));
            }
        }

        self.catalog.refresh_cooldowns(now);

        Ok(UpdateOutcome {
            total_points: self.ledger.total_points(),
            captured,
            persist_warning,
        })
    }

    pub fn current_beacons(&self) -> Vec<BeaconView> {
        self.catalog.snapshot()
    }

    pub fn total_points(&self) -> u64 {
        self.ledger.total_points()
    }

    pub fn points_since(&self, since: DateTime<Utc>) -> u64 {
        self.ledger.points_since(since)
    }

    pub fn ledger(&self) -> &CaptureLedger<S> {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacons::{BeaconBucket, CatalogDefaults, CooldownState};
    use crate::ledger::{MemoryStore, DEFAULT_LEDGER_KEY};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Duration;
    use rand::{rngs::StdRng, SeedableRng};

    struct ReadOnlyStore;

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: String) -> anyhow::Result<()> {
            Err(anyhow!("storage is read-only"))
        }
    }

    /// Catalog whose beacons all became capturable before `now`.
    fn ready_catalog(coords: &[Coordinate], now: DateTime<Utc>) -> BeaconCatalog {
        let mut rng = StdRng::seed_from_u64(0);
        let buckets = vec![BeaconBucket::new(Visibility::Visible, coords.to_vec())];
        let mut catalog = BeaconCatalog::load(
            &buckets,
            CatalogDefaults::default(),
            now - Duration::seconds(700),
            &mut rng,
        )
        .unwrap();
        for beacon in coords {
            catalog
                .mark_captured(&BeaconId::from_coordinate(*beacon), now - Duration::seconds(700))
                .unwrap();
        }
        catalog.refresh_cooldowns(now);
        catalog
    }

    async fn engine_at(
        coords: &[Coordinate],
        now: DateTime<Utc>,
    ) -> ProximityEngine<MemoryStore> {
        let ledger = CaptureLedger::load(MemoryStore::new(), DEFAULT_LEDGER_KEY).await;
        ProximityEngine::new(ready_catalog(coords, now), ledger, DEFAULT_PROXIMITY_THRESHOLD_M)
    }

    fn sample(lng: f64, lat: f64, at: DateTime<Utc>) -> LocationSample {
        LocationSample::new(Coordinate::new(lng, lat), at)
    }

    #[tokio::test]
    async fn captures_nearby_ready_beacon() {
        let now = Utc::now();
        let mut engine = engine_at(&[Coordinate::new(0.0, 0.0)], now).await;

        let outcome = engine.on_location_sample(&sample(0.0, 0.0001, now)).await.unwrap();
        assert_eq!(outcome.captured.len(), 1);
        assert_eq!(outcome.total_points, 1);
        assert!(outcome.persist_warning.is_none());
        assert!((outcome.captured[0].distance_m - 11.12).abs() < 0.01);
        assert_eq!(engine.ledger().len(), 1);

        let view = &engine.current_beacons()[0];
        assert_eq!(view.state, CooldownState::OnCooldown);
        assert_eq!(view.remaining_secs, 600);
    }

    #[tokio::test]
    async fn far_beacon_is_ignored() {
        let now = Utc::now();
        let mut engine = engine_at(&[Coordinate::new(0.0, 0.0)], now).await;
        // ~1000 m north.
        let outcome = engine.on_location_sample(&sample(0.0, 0.009, now)).await.unwrap();
        assert!(outcome.captured.is_empty());
        assert_eq!(outcome.total_points, 0);
    }

    #[tokio::test]
    async fn threshold_is_inclusive_and_configurable() {
        let now = Utc::now();
        let ledger = CaptureLedger::load(MemoryStore::new(), DEFAULT_LEDGER_KEY).await;
        let catalog = ready_catalog(&[Coordinate::new(0.0, 0.0)], now);
        let mut engine = ProximityEngine::new(catalog, ledger, 100.0);
        assert_eq!(engine.threshold_m(), 100.0);

        // ~55.6 m away: outside the urban radius, inside the sparse one.
        let outcome = engine.on_location_sample(&sample(0.0, 0.0005, now)).await.unwrap();
        assert_eq!(outcome.captured.len(), 1);
    }

    #[tokio::test]
    async fn cooldown_blocks_then_releases_recapture() {
        let now = Utc::now();
        let mut engine = engine_at(&[Coordinate::new(0.0, 0.0)], now).await;
        let here = |at| sample(0.0, 0.0001, at);

        engine.on_location_sample(&here(now)).await.unwrap();
        let again = engine
            .on_location_sample(&here(now + Duration::seconds(1)))
            .await
            .unwrap();
        assert!(again.captured.is_empty());
        assert_eq!(again.total_points, 1);

        // Cooldown is refreshed on this tick, capture happens on the next.
        let released = engine
            .on_location_sample(&here(now + Duration::seconds(600)))
            .await
            .unwrap();
        assert!(released.captured.is_empty());
        assert_eq!(engine.current_beacons()[0].state, CooldownState::Capturable);

        let recaptured = engine
            .on_location_sample(&here(now + Duration::seconds(601)))
            .await
            .unwrap();
        assert_eq!(recaptured.captured.len(), 1);
        assert_eq!(recaptured.total_points, 2);
        assert_eq!(engine.ledger().len(), 2);
    }

    #[tokio::test]
    async fn cooldowns_tick_while_far_away() {
        let now = Utc::now();
        let mut engine = engine_at(&[Coordinate::new(0.0, 0.0)], now).await;
        engine.on_location_sample(&sample(0.0, 0.0, now)).await.unwrap();

        engine
            .on_location_sample(&sample(50.0, 50.0, now + Duration::seconds(100)))
            .await
            .unwrap();
        assert_eq!(engine.current_beacons()[0].remaining_secs, 500);
    }

    #[tokio::test]
    async fn captures_every_ready_beacon_in_range() {
        let now = Utc::now();
        let coords = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.00005, 0.0),
            Coordinate::new(1.0, 1.0),
        ];
        let mut engine = engine_at(&coords, now).await;

        let outcome = engine.on_location_sample(&sample(0.0, 0.00005, now)).await.unwrap();
        assert_eq!(outcome.captured.len(), 2);
        assert_eq!(outcome.total_points, 2);
    }

    #[tokio::test]
    async fn invalid_sample_changes_nothing() {
        let now = Utc::now();
        let mut engine = engine_at(&[Coordinate::new(0.0, 0.0)], now).await;
        let before = engine.current_beacons();

        let err = engine
            .on_location_sample(&sample(f64::NAN, 0.0, now + Duration::seconds(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidCoordinate { .. }));
        assert_eq!(engine.current_beacons(), before);
        assert_eq!(engine.total_points(), 0);
    }

    #[tokio::test]
    async fn storage_failure_keeps_capture() {
        let now = Utc::now();
        let ledger = CaptureLedger::load(ReadOnlyStore, DEFAULT_LEDGER_KEY).await;
        let catalog = ready_catalog(&[Coordinate::new(0.0, 0.0)], now);
        let mut engine = ProximityEngine::new(catalog, ledger, DEFAULT_PROXIMITY_THRESHOLD_M);

        let outcome = engine.on_location_sample(&sample(0.0, 0.0, now)).await.unwrap();
        assert_eq!(outcome.total_points, 1);
        assert_eq!(outcome.captured.len(), 1);
        assert!(outcome
            .persist_warning
            .as_deref()
            .unwrap()
            .contains("read-only"));
        assert_eq!(engine.current_beacons()[0].state, CooldownState::OnCooldown);
    }

    #[tokio::test]
    async fn weekly_points_use_capture_time() {
        let now = Utc::now();
        let mut engine = engine_at(&[Coordinate::new(0.0, 0.0)], now).await;
        engine.on_location_sample(&sample(0.0, 0.0, now)).await.unwrap();

        assert_eq!(engine.points_since(now - Duration::days(7)), 1);
        assert_eq!(engine.points_since(now + Duration::seconds(1)), 0);
    }
}
