use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

use super::Visibility;

/// Where one bucket of beacon coordinates lives on disk.
///
/// Files hold a JSON array of `[lng, lat]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeaconSource {
    pub group: String,
    pub visibility: Visibility,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_secs: Option<u64>,
}

impl BeaconSource {
    /// Bucket stored at `data/beacons/{group}-{visibility}-beacons.json`.
    pub fn conventional(group: &str, visibility: Visibility) -> Self {
        Self {
            group: group.to_string(),
            visibility,
            path: PathBuf::from("data/beacons")
                .join(format!("{group}-{}-beacons.json", visibility.as_str())),
            value: None,
            reset_secs: None,
        }
    }
}

/// Coordinates of one (visibility, group) bucket, already read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconBucket {
    pub group: Option<String>,
    pub visibility: Visibility,
    pub coordinates: Vec<Coordinate>,
    pub value: Option<u32>,
    pub reset_secs: Option<u64>,
}

impl BeaconBucket {
    pub fn new(visibility: Visibility, coordinates: Vec<Coordinate>) -> Self {
        Self {
            group: None,
            visibility,
            coordinates,
            value: None,
            reset_secs: None,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_value(mut self, value: u32) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_reset_secs(mut self, reset_secs: u64) -> Self {
        self.reset_secs = Some(reset_secs);
        self
    }
}

pub fn parse_coordinates(contents: &str) -> Result<Vec<Coordinate>> {
    let pairs: Vec<[f64; 2]> =
        serde_json::from_str(contents).context("expected a JSON array of [lng, lat] pairs")?;
    Ok(pairs.into_iter().map(Coordinate::from).collect())
}

/// Reads every source into a bucket. Relative paths resolve against `base_dir`.
pub fn load_buckets(sources: &[BeaconSource], base_dir: &Path) -> Result<Vec<BeaconBucket>> {
    sources
        .iter()
        .map(|source| {
            let path = if source.path.is_absolute() {
                source.path.clone()
            } else {
                base_dir.join(&source.path)
            };
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read beacon source {}", path.display()))?;
            let coordinates = parse_coordinates(&contents)
                .with_context(|| format!("failed to parse beacon source {}", path.display()))?;

            Ok(BeaconBucket {
                group: Some(source.group.clone()),
                visibility: source.visibility,
                coordinates,
                value: source.value,
                reset_secs: source.reset_secs,
            })
        })
        .collect()
}
