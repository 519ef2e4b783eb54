use std::path::PathBuf;

use clap::Parser;

use crate::settings::{FeedKind, GameSettings, Profile};

#[derive(Debug, Parser)]
#[command(name = "beacon-hunt")]
#[command(about = "Walk up to beacons to capture them for points")]
#[command(version)]
pub struct Cli {
    /// Settings file; beacon source paths resolve relative to its directory
    #[arg(short, long, default_value = "beacon-hunt.json")]
    pub config: PathBuf,

    /// Where the capture database lives
    #[arg(long, default_value = ".beacon-hunt")]
    pub data_dir: PathBuf,

    /// Location source
    #[arg(long, value_enum)]
    pub feed: Option<FeedKind>,

    /// Recorded track (one JSON position per line); implies `--feed file`
    #[arg(long)]
    pub feed_file: Option<PathBuf>,

    /// Capture radius in meters, overrides the profile
    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long, value_enum)]
    pub profile: Option<Profile>,

    /// Keep captures in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Write the effective settings back to the config file
    #[arg(long)]
    pub write_config: bool,

    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Layers command-line overrides on top of file settings.
    pub fn apply(&self, settings: &mut GameSettings) {
        if let Some(profile) = self.profile {
            *settings = std::mem::take(settings).with_profile(profile);
        }
        if let Some(threshold) = self.threshold {
            settings.proximity_threshold_m = threshold;
        }
        if let Some(kind) = self.feed {
            settings.feed.kind = kind;
        }
        if let Some(path) = &self.feed_file {
            settings.feed.kind = FeedKind::File;
            settings.feed.path = Some(path.clone());
        }
        settings.sanitize();
    }
}
