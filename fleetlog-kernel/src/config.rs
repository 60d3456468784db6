//! Fleet configuration, loaded from YAML.
//!
//! The configuration file doubles as the persistent status store: `sync()`
//! writes the whole document, status included, back to where it was loaded.

use crate::error::FetchError;
use crate::status::{FleetStatus, StatusStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_ENV: &str = "FLEETLOG_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "fleetlog.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    pub name: String,
    pub log_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(default)]
    pub remote_access: RemoteAccessConf,
    #[serde(default)]
    pub fetch: FetchConf,
    #[serde(default)]
    pub status: FleetStatus,
    /// Where this document lives on disk; set by `load_config`
    #[serde(skip)]
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAccessConf {
    pub user_name: String,
    pub private_key_path: PathBuf,
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConf {
    #[serde(default = "default_qps")]
    pub qps: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Upper bound on concurrently open sessions; unlimited when absent
    #[serde(default)]
    pub max_sessions: Option<usize>,
}

fn default_log_level() -> String { "info".into() }
fn default_enable() -> bool { true }
fn default_ssh_binary() -> String { "ssh".into() }
fn default_ssh_port() -> u16 { 22 }
fn default_connect_timeout() -> u64 { 15 }
fn default_command_timeout() -> u64 { 120 }
fn default_connect_retries() -> u32 { 3 }
fn default_qps() -> f64 { 150.0 }
fn default_burst() -> u32 { 10 }

impl Default for RemoteAccessConf {
    fn default() -> Self {
        Self {
            user_name: "ec2-user".into(),
            private_key_path: PathBuf::new(),
            ssh_binary: default_ssh_binary(),
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            connect_retries: default_connect_retries(),
        }
    }
}

impl Default for FetchConf {
    fn default() -> Self {
        Self {
            qps: default_qps(),
            burst: default_burst(),
            max_sessions: None,
        }
    }
}

impl FleetConfig {
    pub fn new(name: &str, log_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            log_dir: log_dir.into(),
            log_level: default_log_level(),
            enable: default_enable(),
            remote_access: RemoteAccessConf::default(),
            fetch: FetchConf::default(),
            status: FleetStatus::default(),
            config_path: config_path.into(),
        }
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        if self.name.trim().is_empty() {
            return Err(FetchError::InvalidConfig("empty name".into()));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(FetchError::InvalidConfig("empty log_dir".into()));
        }
        if !(self.fetch.qps > 0.0) {
            return Err(FetchError::InvalidConfig(format!(
                "fetch.qps must be positive, got {}",
                self.fetch.qps
            )));
        }
        if self.fetch.burst == 0 {
            return Err(FetchError::InvalidConfig("fetch.burst must be at least 1".into()));
        }
        if self.fetch.max_sessions == Some(0) {
            return Err(FetchError::InvalidConfig("fetch.max_sessions must be at least 1".into()));
        }
        Ok(())
    }

    /// Remote commands run verbosely when the fleet logs at debug level
    pub fn verbose(&self) -> bool {
        self.log_level.eq_ignore_ascii_case("debug")
    }
}

/// Resolves the configuration path: explicit argument, then `FLEETLOG_CONFIG`
pub fn config_path(arg: Option<String>) -> PathBuf {
    arg.or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into())
        .into()
}

pub async fn load_config(path: &Path) -> Result<FleetConfig, FetchError> {
    let txt = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FetchError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
    let mut cfg: FleetConfig = serde_yaml::from_str(&txt)?;
    cfg.config_path = path.to_path_buf();
    cfg.validate()?;
    if cfg.status.expected_instances() == 0 {
        warn!(config = %path.display(), "configuration lists no instances");
    }
    Ok(cfg)
}

impl StatusStore for FleetConfig {
    fn status(&self) -> &FleetStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut FleetStatus {
        &mut self.status
    }

    fn sync(&self) -> Result<(), FetchError> {
        let body = serde_yaml::to_string(self)?;
        let sync_err = |source| FetchError::Sync {
            path: self.config_path.clone(),
            source,
        };

        // write next to the target, then rename over it
        let mut tmp = self.config_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, body).map_err(sync_err)?;
        std::fs::rename(&tmp, &self.config_path).map_err(sync_err)?;

        debug!(config = %self.config_path.display(), "synced fleet status");
        Ok(())
    }
}
