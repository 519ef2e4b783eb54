//! Durable, append-only record of beacon captures. The score is always
//! recomputed from these records.

pub mod store;

pub use store::{KeyValueStore, MemoryStore};

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::beacons::BeaconId;

pub const DEFAULT_LEDGER_KEY: &str = "beaconsCaptured";
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// One capture event as stored: `{"id": "lng|lat", "timestamp": <epoch ms>, "value": n}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRecord {
    pub id: BeaconId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub value: u32,
}

pub struct CaptureLedger<S> {
    store: S,
    key: String,
    write_timeout: Duration,
    records: Vec<CapturedRecord>,
}

impl<S: KeyValueStore> CaptureLedger<S> {
    /// Restores persisted captures. Missing, unreadable or corrupt state
    /// yields an empty ledger; it never fails.
    pub async fn load(store: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let records = match store.get(&key).await {
            Ok(Some(encoded)) => match serde_json::from_str::<Vec<CapturedRecord>>(&encoded) {
                Ok(records) => records,
                Err(err) => {
                    warn!("Discarding corrupt capture ledger under '{key}': {err}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("Failed to read capture ledger under '{key}': {err:#}");
                Vec::new()
            }
        };

        Self {
            store,
            key,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            records,
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Appends a record and writes the whole ledger through to storage.
    ///
    /// The record stays in memory even when the write fails; the error is
    /// returned so the caller can report it.
    pub async fn append(&mut self, id: BeaconId, value: u32, now: DateTime<Utc>) -> Result<()> {
        self.records.push(CapturedRecord {
            id,
            timestamp: now,
            value,
        });
        self.persist().await
    }

    /// Writes the current records, e.g. to retry after a failed append.
    pub async fn persist(&self) -> Result<()> {
        let encoded =
            serde_json::to_string(&self.records).context("failed to encode capture ledger")?;

        tokio::time::timeout(self.write_timeout, self.store.set(&self.key, encoded))
            .await
            .map_err(|_| {
                anyhow!(
                    "capture ledger write timed out after {}ms",
                    self.write_timeout.as_millis()
                )
            })?
            .with_context(|| format!("failed to write capture ledger under '{}'", self.key))
    }

    pub fn total_points(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.value)).sum()
    }

    /// Points from captures at or after `since`.
    pub fn points_since(&self, since: DateTime<Utc>) -> u64 {
        self.records
            .iter()
            .filter(|r| r.timestamp >= since)
            .map(|r| u64::from(r.value))
            .sum()
    }

    pub fn records(&self) -> &[CapturedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
