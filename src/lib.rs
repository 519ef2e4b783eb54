pub mod beacons;
pub mod cli;
pub mod db;
pub mod engine;
pub mod error;
pub mod feed;
pub mod geo;
pub mod ledger;
pub mod settings;
pub mod utils;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use beacons::{load_buckets, BeaconCatalog};
use cli::Cli;
use db::Database;
use engine::{GameController, ProximityEngine};
use feed::{LocationFeed, NdjsonFeed, SimulatedFeed, ThreadedNdjsonFeed};
use ledger::{CaptureLedger, KeyValueStore, MemoryStore};
use settings::{FeedKind, GameSettings};

pub const DATABASE_FILE: &str = "beacon-hunt.sqlite3";

pub async fn run(cli: Cli) -> Result<()> {
    utils::logging::init(cli.debug || utils::logging::debug_from_env());

    info!("Beacon Hunt starting up...");

    let mut settings = GameSettings::load(&cli.config)?;
    cli.apply(&mut settings);
    if cli.write_config {
        settings.save(&cli.config)?;
        info!("Wrote settings to {}", cli.config.display());
    }

    let base_dir = settings_base_dir(&cli.config);
    let buckets = load_buckets(&settings.beacon_sources, &base_dir)?;
    let catalog = {
        let mut rng = rand::thread_rng();
        BeaconCatalog::load(&buckets, settings.catalog_defaults(), Utc::now(), &mut rng)
            .context("failed to build the beacon catalog; check beaconSources")?
    };
    info!(
        "Loaded {} beacons, capture radius {}m",
        catalog.len(),
        settings.proximity_threshold_m
    );

    let feed = open_feed(&settings).await?;

    if cli.ephemeral {
        info!("Running without persistence; captures are kept in memory");
        play(MemoryStore::new(), catalog, &settings, feed).await
    } else {
        let database = Database::new(cli.data_dir.join(DATABASE_FILE))?;
        info!("Saving captures to {}", database.path().display());
        play(database, catalog, &settings, feed).await
    }
}

fn settings_base_dir(config: &Path) -> PathBuf {
    match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn open_feed(settings: &GameSettings) -> Result<Box<dyn LocationFeed>> {
    let feed = &settings.feed;
    Ok(match feed.kind {
        FeedKind::Simulated => {
            let mut simulated = SimulatedFeed::new(
                feed.center(),
                feed.interval(),
                feed.jitter_m,
                feed.emit_probability,
            );
            if let Some(seed) = feed.seed {
                simulated = simulated.with_seed(seed);
            }
            Box::new(simulated)
        }
        FeedKind::Stdin => Box::new(ThreadedNdjsonFeed::stdin()?),
        FeedKind::File => {
            let Some(path) = feed.path.as_deref() else {
                bail!("file feed selected but no track path was given");
            };
            Box::new(NdjsonFeed::open(path).await?.paced(feed.interval()))
        }
    })
}

async fn play<S>(
    store: S,
    catalog: BeaconCatalog,
    settings: &GameSettings,
    feed: Box<dyn LocationFeed>,
) -> Result<()>
where
    S: KeyValueStore + 'static,
{
    let ledger = CaptureLedger::load(store, settings.ledger_key.clone())
        .await
        .with_write_timeout(settings.storage_timeout());
    info!(
        "Restored {} captures worth {} points",
        ledger.len(),
        ledger.total_points()
    );

    let engine = ProximityEngine::new(catalog, ledger, settings.proximity_threshold_m);
    let game = GameController::new(engine);

    let cancel_token = CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    // Capture events go to stdout, one JSON object per line.
    let mut events = game.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!("Failed to serialize capture event: {err}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dropped {skipped} capture notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = game.run(feed, cancel_token).await;

    let week_ago = Utc::now() - Duration::days(7);
    info!(
        "Final score: {} points ({} in the last week)",
        game.total_points().await,
        game.points_since(week_ago).await
    );

    drop(game);
    if let Err(err) = printer.await {
        warn!("Capture printer task failed: {err}");
    }

    result
}
