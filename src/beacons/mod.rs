pub mod catalog;
pub mod model;
pub mod sources;

pub use catalog::{BeaconCatalog, CatalogDefaults, MAX_RESET_SECS};
pub use model::{Beacon, BeaconId, BeaconView, CooldownState, Visibility};
pub use sources::{load_buckets, BeaconBucket, BeaconSource};
