use crate::config::FleetConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Coarse lock over the fleet configuration and its status.
/// Collection holds it for writing during a whole run.
pub type SharedFleet = Arc<RwLock<FleetConfig>>;

pub fn new_fleet(config: FleetConfig) -> SharedFleet {
    Arc::new(RwLock::new(config))
}
