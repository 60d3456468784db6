//! fleetlog kernel - fleet log collection engine
//!
//! Collects diagnostic logs from every instance of every group over remote
//! sessions, writes them into one run directory and records per group, per
//! instance which files were produced. Each instance is collected at most
//! once; per-instance failures are reported, never fatal to the run.
//!
//! Components, leaf first:
//! - `governor`: token bucket shared by all collectors
//! - `session`: remote session traits + SSH transport
//! - `sink`: run directory and file naming
//! - `discovery`: static and discovered command sets
//! - `collector`: per-instance protocol
//! - `aggregator`: merges results into the fleet status
//! - `fetcher`: fan-out / fan-in over the whole fleet

pub mod aggregator;
pub mod archive;
pub mod collector;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod governor;
pub mod models;
pub mod session;
pub mod sink;
pub mod state;
pub mod status;

pub use config::{load_config, FleetConfig};
pub use error::{CollectError, FetchError, SessionError};
pub use fetcher::{FetchSummary, LogFetcher};
pub use models::{Instance, InstanceLogs};
pub use status::{FleetStatus, StatusStore};
