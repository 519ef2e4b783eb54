use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    beacons::{BeaconSource, CatalogDefaults, Visibility},
    geo::Coordinate,
    ledger::DEFAULT_LEDGER_KEY,
};

/// Groups shipped in `data/beacons`.
pub const DEFAULT_GROUPS: [&str; 4] = ["troy", "jug", "polaris-shortpath", "polaris-longpath"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum FeedKind {
    Simulated,
    Stdin,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Profile {
    /// Dense city blocks, 20 m capture radius.
    Urban,
    /// Trails and parks, 100 m capture radius.
    Sparse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedSettings {
    pub kind: FeedKind,
    /// Track file for `File`.
    pub path: Option<PathBuf>,
    pub interval_ms: u64,
    /// `[lng, lat]` the simulated feed scatters around.
    pub center: [f64; 2],
    pub jitter_m: f64,
    pub emit_probability: f64,
    pub seed: Option<u64>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            kind: FeedKind::Simulated,
            path: None,
            interval_ms: 1000,
            center: [-93.4006, 45.0596],
            jitter_m: 15.0,
            emit_probability: 0.4,
            seed: None,
        }
    }
}

impl FeedSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::from(self.center)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GameSettings {
    pub proximity_threshold_m: f64,
    pub beacon_reset_secs: u64,
    pub default_beacon_value: u32,
    pub beacon_sources: Vec<BeaconSource>,
    pub ledger_key: String,
    pub storage_timeout_ms: u64,
    pub feed: FeedSettings,
}

impl Default for GameSettings {
    fn default() -> Self {
        let beacon_sources = [Visibility::Visible, Visibility::Hidden]
            .into_iter()
            .flat_map(|visibility| {
                DEFAULT_GROUPS
                    .iter()
                    .map(move |group| BeaconSource::conventional(group, visibility))
            })
            .collect();

        Self {
            proximity_threshold_m: 20.0,
            beacon_reset_secs: 600,
            default_beacon_value: 1,
            beacon_sources,
            ledger_key: DEFAULT_LEDGER_KEY.to_string(),
            storage_timeout_ms: 250,
            feed: FeedSettings::default(),
        }
    }
}

impl GameSettings {
    pub fn urban() -> Self {
        Self::default().with_profile(Profile::Urban)
    }

    pub fn sparse() -> Self {
        Self::default().with_profile(Profile::Sparse)
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.proximity_threshold_m = match profile {
            Profile::Urban => 20.0,
            Profile::Sparse => 100.0,
        };
        self
    }

    /// Reads settings from `path`. A missing file gives the defaults, as
    /// does a file that doesn't parse. Out-of-range values are replaced by
    /// their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let mut settings: Self = serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!("Ignoring unparseable settings in {}: {err}", path.display());
            Self::default()
        });
        settings.sanitize();
        Ok(settings)
    }

    /// Resets values the game can't run with, warning for each.
    ///
    /// The threshold must be finite and non-negative; point values must be
    /// at least 1.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if !self.proximity_threshold_m.is_finite() || self.proximity_threshold_m < 0.0 {
            warn!(
                "Ignoring proximityThresholdM {}; using {}",
                self.proximity_threshold_m, defaults.proximity_threshold_m
            );
            self.proximity_threshold_m = defaults.proximity_threshold_m;
        }

        if self.default_beacon_value == 0 {
            warn!(
                "Ignoring defaultBeaconValue 0; using {}",
                defaults.default_beacon_value
            );
            self.default_beacon_value = defaults.default_beacon_value;
        }

        for source in &mut self.beacon_sources {
            if source.value == Some(0) {
                warn!(
                    "Ignoring value 0 for beacon source {}; using the default",
                    source.path.display()
                );
                source.value = None;
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn catalog_defaults(&self) -> CatalogDefaults {
        CatalogDefaults {
            value: self.default_beacon_value,
            reset_secs: self.beacon_reset_secs,
        }
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}
