use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    beacons::BeaconView,
    error::{EngineError, EngineResult},
    feed::{LocationFeed, LocationSample},
    ledger::KeyValueStore,
};

use super::{CaptureEvent, ProximityEngine, UpdateOutcome};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

/// What the map and score display render after each update.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSnapshot {
    pub total_points: u64,
    pub beacons: Vec<BeaconView>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Drives a [`LocationFeed`] into a [`ProximityEngine`].
///
/// Samples are handed over through a single-slot channel: while an update
/// is running, newer samples overwrite older unprocessed ones, and only the
/// latest is applied next.
pub struct GameController<S> {
    engine: Arc<Mutex<ProximityEngine<S>>>,
    events: broadcast::Sender<CaptureEvent>,
    snapshot: Arc<watch::Sender<ScoreSnapshot>>,
}

impl<S> Clone for GameController<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            events: self.events.clone(),
            snapshot: Arc::clone(&self.snapshot),
        }
    }
}

impl<S: KeyValueStore + 'static> GameController<S> {
    pub fn new(engine: ProximityEngine<S>) -> Self {
        let initial = ScoreSnapshot {
            total_points: engine.total_points(),
            beacons: engine.current_beacons(),
            updated_at: None,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot, _) = watch::channel(initial);

        Self {
            engine: Arc::new(Mutex::new(engine)),
            events,
            snapshot: Arc::new(snapshot),
        }
    }

    /// Capture notifications, one per beacon.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    pub fn watch_score(&self) -> watch::Receiver<ScoreSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> ScoreSnapshot {
        self.snapshot.borrow().clone()
    }

    pub async fn total_points(&self) -> u64 {
        self.engine.lock().await.total_points()
    }

    pub async fn points_since(&self, since: DateTime<Utc>) -> u64 {
        self.engine.lock().await.points_since(since)
    }

    /// Applies one sample and publishes the result.
    pub async fn process(&self, sample: LocationSample) -> EngineResult<UpdateOutcome> {
        let (outcome, beacons) = {
            let mut engine = self.engine.lock().await;
            let outcome = engine.on_location_sample(&sample).await?;
            (outcome, engine.current_beacons())
        };

        self.snapshot.send_replace(ScoreSnapshot {
            total_points: outcome.total_points,
            beacons,
            updated_at: Some(sample.received_at),
        });
        for event in &outcome.captured {
            // No subscribers is fine.
            let _ = self.events.send(event.clone());
        }

        Ok(outcome)
    }

    /// Runs until the feed ends or `cancel_token` fires.
    pub async fn run<F>(&self, mut feed: F, cancel_token: CancellationToken) -> Result<()>
    where
        F: LocationFeed + 'static,
    {
        let (sample_tx, mut sample_rx) = watch::channel::<Option<LocationSample>>(None);

        let pump_token = cancel_token.child_token();
        let stop_pump = pump_token.clone();
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = feed.next_sample() => match next {
                        Some(sample) => {
                            if sample_tx.send(Some(sample)).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = pump_token.cancelled() => break,
                }
            }
        });

        loop {
            tokio::select! {
                changed = sample_rx.changed() => {
                    if changed.is_err() {
                        log_info!("location feed ended");
                        break;
                    }
                    let sample = *sample_rx.borrow_and_update();
                    if let Some(sample) = sample {
                        self.handle_sample(sample).await;
                    }
                }
                _ = cancel_token.cancelled() => {
                    log_info!("game loop shutting down");
                    break;
                }
            }
        }

        stop_pump.cancel();
        pump.await.context("location feed task failed to join")
    }

    async fn handle_sample(&self, sample: LocationSample) {
        match self.process(sample).await {
            Ok(outcome) => {
                if !outcome.captured.is_empty() {
                    log_info!(
                        "{} beacon(s) captured, score now {}",
                        outcome.captured.len(),
                        outcome.total_points
                    );
                }
                if let Some(warning) = outcome.persist_warning {
                    log_warn!("score not saved yet: {warning}");
                }
            }
            Err(err @ EngineError::InvalidCoordinate { .. }) => {
                log_warn!("rejected location sample: {err}");
            }
            Err(EngineError::NoBeaconsLoaded) => {
                log_debug!("no beacons loaded, ignoring sample");
            }
            Err(
                err @ (EngineError::UnknownBeacon(_) | EngineError::InvalidResetDuration { .. }),
            ) => {
                log_error!("engine invariant violated: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacons::{BeaconBucket, BeaconCatalog, CatalogDefaults, Visibility};
    use crate::feed::SimulatedFeed;
    use crate::geo::Coordinate;
    use crate::ledger::{CaptureLedger, MemoryStore, DEFAULT_LEDGER_KEY};
    use async_trait::async_trait;
    use chrono::Duration;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::VecDeque;

    struct ScriptedFeed(VecDeque<LocationSample>);

    #[async_trait]
    impl LocationFeed for ScriptedFeed {
        async fn next_sample(&mut self) -> Option<LocationSample> {
            self.0.pop_front()
        }
    }

    async fn controller(now: DateTime<Utc>) -> GameController<MemoryStore> {
        let mut rng = StdRng::seed_from_u64(4);
        let buckets = vec![BeaconBucket::new(
            Visibility::Visible,
            vec![Coordinate::new(0.0, 0.0)],
        )
        .with_reset_secs(0)];
        // A zero reset makes the beacon capturable on every visit.
        let catalog =
            BeaconCatalog::load(&buckets, CatalogDefaults::default(), now, &mut rng).unwrap();
        let ledger = CaptureLedger::load(MemoryStore::new(), DEFAULT_LEDGER_KEY).await;
        GameController::new(ProximityEngine::new(catalog, ledger, 20.0))
    }

    #[tokio::test]
    async fn process_publishes_events_and_snapshot() {
        let now = Utc::now();
        let game = controller(now).await;
        let mut events = game.subscribe();
        let mut score = game.watch_score();
        assert_eq!(score.borrow().total_points, 0);
        assert_eq!(score.borrow().beacons.len(), 1);

        let outcome = game
            .process(LocationSample::new(Coordinate::new(0.0, 0.0001), now))
            .await
            .unwrap();
        assert_eq!(outcome.total_points, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.value, 1);
        assert!(score.has_changed().unwrap());
        let snapshot = score.borrow_and_update().clone();
        assert_eq!(snapshot.total_points, 1);
        assert_eq!(snapshot.updated_at, Some(now));
        assert_eq!(game.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn invalid_sample_is_an_error_but_not_published() {
        let now = Utc::now();
        let game = controller(now).await;
        let score = game.watch_score();

        let err = game
            .process(LocationSample::new(Coordinate::new(f64::NAN, 0.0), now))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidCoordinate { .. }));
        assert!(!score.has_changed().unwrap());
    }

    #[tokio::test]
    async fn run_drains_feed_and_applies_last_sample() {
        let now = Utc::now();
        let game = controller(now).await;

        // Only the final sample is near the beacon. Intermediate samples may
        // be dropped, the final one never is.
        let mut samples: VecDeque<_> = (1..=20)
            .map(|i| LocationSample::new(Coordinate::new(1.0, i as f64), now + Duration::seconds(i)))
            .collect();
        samples.push_back(LocationSample::new(
            Coordinate::new(0.0, 0.0),
            now + Duration::seconds(30),
        ));

        game.run(ScriptedFeed(samples), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(game.total_points().await, 1);
        assert_eq!(game.snapshot().total_points, 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let now = Utc::now();
        let game = controller(now).await;
        let feed = SimulatedFeed::new(
            Coordinate::new(50.0, 50.0),
            std::time::Duration::from_millis(5),
            1.0,
            1.0,
        )
        .with_seed(2);

        let token = CancellationToken::new();
        let stopper = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            stopper.cancel();
        });

        game.run(feed, token).await.unwrap();
        assert_eq!(game.total_points().await, 0);
        assert!(game.snapshot().updated_at.is_some());
    }
}
