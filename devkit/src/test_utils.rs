/*!
Test harness for log collection

Sets up a throwaway log directory and configuration file, wires the mock
connector into a `LogFetcher` and offers assertions over what a run left on
disk.
*/

use crate::fixtures::FleetBuilder;
use crate::mock_session::MockConnector;
use anyhow::Result;
use fleetlog_kernel::config::load_config;
use fleetlog_kernel::sink::instance_prefix;
use fleetlog_kernel::state::new_fleet;
use fleetlog_kernel::{FleetConfig, Instance, LogFetcher, StatusStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub struct TestHarness {
    pub dir: TempDir,
    pub connector: MockConnector,
    pub config_path: PathBuf,
    pub log_dir: PathBuf,
    pub cancel: CancellationToken,
}

impl TestHarness {
    /// Writes the fleet's configuration into a fresh temp directory
    pub fn new(fleet: FleetBuilder, connector: MockConnector) -> Result<Self> {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let dir = tempfile::tempdir()?;
        let config_path = dir.path().join("fleetlog.yaml");
        let log_dir = dir.path().join("logs");
        fleet.build(&log_dir, &config_path).sync()?;

        Ok(Self {
            dir,
            connector,
            config_path,
            log_dir,
            cancel: CancellationToken::new(),
        })
    }

    /// Fresh configuration as currently persisted
    pub async fn reload(&self) -> Result<FleetConfig> {
        Ok(load_config(&self.config_path).await?)
    }

    /// Fetcher over the persisted configuration and the mock connector
    pub async fn fetcher(&self) -> Result<LogFetcher> {
        let cfg = self.reload().await?;
        Ok(LogFetcher::new(
            new_fleet(cfg),
            Arc::new(self.connector.clone()),
            self.cancel.clone(),
        ))
    }

    /// Number of files in `run_dir` belonging to `instance`
    pub fn files_for(&self, run_dir: &Path, instance: &Instance) -> Result<usize> {
        let prefix = instance_prefix(instance);
        let mut count = 0;
        for entry in std::fs::read_dir(run_dir)? {
            if entry?.file_name().to_string_lossy().starts_with(&prefix) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Polls the persisted status until `n` instances are recorded
    pub async fn wait_for_collected(&self, n: usize, timeout: Duration) -> Result<()> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            if let Ok(cfg) = self.reload().await {
                if cfg.status().collected_instances() >= n {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        anyhow::bail!("timed out waiting for {} collected instances", n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_persists_fleet() {
        let harness = TestHarness::new(
            FleetBuilder::new("demo").instance("ng-a", "i-1"),
            MockConnector::new(),
        )
        .unwrap();

        let cfg = harness.reload().await.unwrap();
        assert_eq!(cfg.name, "demo");
        assert_eq!(cfg.log_dir, harness.log_dir);
        assert_eq!(cfg.status.expected_instances(), 1);
    }
}
