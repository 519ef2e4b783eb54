use std::{io::BufRead, path::Path, thread};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines},
    sync::mpsc,
    time::{Duration, Interval, MissedTickBehavior},
};

use crate::geo::Coordinate;

use super::{LocationFeed, LocationSample};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPosition {
    Object { lng: f64, lat: f64 },
    Pair([f64; 2]),
}

impl From<RawPosition> for Coordinate {
    fn from(raw: RawPosition) -> Self {
        match raw {
            RawPosition::Object { lng, lat } => Coordinate::new(lng, lat),
            RawPosition::Pair([lng, lat]) => Coordinate::new(lng, lat),
        }
    }
}

pub fn parse_line(line: &str) -> Result<Option<Coordinate>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let raw: RawPosition = serde_json::from_str(trimmed)
        .with_context(|| format!("expected {{\"lng\":..,\"lat\":..}} or [lng, lat], got '{trimmed}'"))?;
    Ok(Some(raw.into()))
}

fn sample_from_line(line_no: usize, line: &str) -> Option<LocationSample> {
    match parse_line(line) {
        Ok(Some(coordinate)) => Some(LocationSample::new(coordinate, Utc::now())),
        Ok(None) => None,
        Err(err) => {
            log_warn!("skipping line {line_no}: {err:#}");
            None
        }
    }
}

/// Positions read one JSON value per line, e.g. piped from a GPS daemon.
///
/// Blank and malformed lines are skipped. With a pace set, at most one
/// sample is released per tick, which is how recorded tracks are replayed.
pub struct NdjsonFeed<R> {
    lines: Lines<R>,
    pace: Option<Interval>,
    line_no: usize,
}

impl<R: AsyncBufRead + Unpin + Send> NdjsonFeed<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            pace: None,
            line_no: 0,
        }
    }

    pub fn paced(mut self, every: Duration) -> Self {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.pace = Some(ticker);
        self
    }
}

impl NdjsonFeed<BufReader<File>> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("failed to open location track {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LocationFeed for NdjsonFeed<R> {
    async fn next_sample(&mut self) -> Option<LocationSample> {
        if let Some(pace) = self.pace.as_mut() {
            pace.tick().await;
        }

        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    log_info!("location stream ended after {} lines", self.line_no);
                    return None;
                }
                Err(err) => {
                    log_warn!("location stream read failed: {err}");
                    return None;
                }
            };
            self.line_no += 1;

            if let Some(sample) = sample_from_line(self.line_no, &line) {
                return Some(sample);
            }
        }
    }
}

const LINE_BUFFER: usize = 16;

/// Same line format, read by a detached OS thread.
///
/// Used for stdin: a read blocked on a terminal never holds up runtime
/// shutdown, the thread simply dies with the process.
pub struct ThreadedNdjsonFeed {
    lines: mpsc::Receiver<String>,
    line_no: usize,
}

impl ThreadedNdjsonFeed {
    pub fn stdin() -> Result<Self> {
        Self::spawn(std::io::BufReader::new(std::io::stdin()))
    }

    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Result<Self> {
        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);

        thread::Builder::new()
            .name("beacon-hunt-stdin".into())
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if line_tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            log_warn!("location stream read failed: {err}");
                            break;
                        }
                    }
                }
            })
            .context("failed to spawn location reader thread")?;

        Ok(Self {
            lines: line_rx,
            line_no: 0,
        })
    }
}

#[async_trait]
impl LocationFeed for ThreadedNdjsonFeed {
    async fn next_sample(&mut self) -> Option<LocationSample> {
        while let Some(line) = self.lines.recv().await {
            self.line_no += 1;
            if let Some(sample) = sample_from_line(self.line_no, &line) {
                return Some(sample);
            }
        }
        log_info!("location stream ended after {} lines", self.line_no);
        None
    }
}
