pub mod controller;
pub mod proximity;

pub use controller::{GameController, ScoreSnapshot};
pub use proximity::{CaptureEvent, ProximityEngine, UpdateOutcome, DEFAULT_PROXIMITY_THRESHOLD_M};
