//! Fleet orchestrator.
//!
//! `fetch_logs` spawns one collector task per instance across every group,
//! all sharing a single rate governor, and drains exactly one record per
//! instance from a small bounded channel. The fleet lock is held for the
//! whole run so concurrent invocations serialize.

use crate::aggregator::{Aggregator, Tally};
use crate::archive;
use crate::collector::InstanceCollector;
use crate::discovery::{default_log_commands, default_stages, LogCommand, Stage};
use crate::error::FetchError;
use crate::governor::RateGovernor;
use crate::models::InstanceLogs;
use crate::session::{Connector, RunOptions};
use crate::sink::allocate_run_dir;
use crate::state::SharedFleet;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the channel collectors report through
pub const RESULT_BUFFER: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub run_dir: PathBuf,
    pub expected: usize,
    pub collected: usize,
    pub failed: usize,
    pub total_files: usize,
    pub cancelled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

pub struct LogFetcher {
    fleet: SharedFleet,
    connector: Arc<dyn Connector>,
    stages: Arc<Vec<Stage>>,
    cancel: CancellationToken,
}

impl LogFetcher {
    pub fn new(fleet: SharedFleet, connector: Arc<dyn Connector>, cancel: CancellationToken) -> Self {
        Self {
            fleet,
            connector,
            stages: Arc::new(default_stages(default_log_commands())),
            cancel,
        }
    }

    /// Replaces the static command set run before discovery
    pub fn with_commands(mut self, commands: Vec<LogCommand>) -> Self {
        self.stages = Arc::new(default_stages(commands));
        self
    }

    pub fn with_stages(mut self, stages: Vec<Stage>) -> Self {
        self.stages = Arc::new(stages);
        self
    }

    pub fn fleet(&self) -> &SharedFleet {
        &self.fleet
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Collects every instance of every group once
    pub async fn fetch_logs(&self) -> Result<FetchSummary, FetchError> {
        let log_dir = {
            let cfg = self.fleet.read().await;
            if !cfg.enable {
                return Err(FetchError::Disabled(cfg.name.clone()));
            }
            cfg.validate()?;
            cfg.log_dir.clone()
        };
        create_log_dir(&log_dir).await?;

        let mut cfg = self.fleet.write().await;
        let started_at = OffsetDateTime::now_utc();
        let run_dir = allocate_run_dir(&cfg.log_dir, &format!("{}-logs", cfg.name))?;

        let governor = Arc::new(RateGovernor::new(cfg.fetch.qps, cfg.fetch.burst));
        let sessions = cfg.fetch.max_sessions.map(|n| Arc::new(Semaphore::new(n)));
        let opts = RunOptions::verbose(cfg.verbose());
        let (tx, mut rx) = mpsc::channel::<InstanceLogs>(RESULT_BUFFER);

        let mut expected = 0;
        for (group, status) in &cfg.status.groups {
            info!(group = %group, nodes = status.instances.len(), "fetching logs");
            expected += status.instances.len();

            for instance in status.instances.values() {
                let collector = InstanceCollector::new(
                    group,
                    instance.clone(),
                    self.connector.clone(),
                    governor.clone(),
                    self.stages.clone(),
                    &run_dir,
                    opts,
                    self.cancel.clone(),
                );
                let cancel = self.cancel.clone();
                let sessions = sessions.clone();
                let tx = tx.clone();

                tokio::spawn(async move {
                    if cancel.is_cancelled() {
                        warn!(instance_id = %collector.instance_id(), "exiting fetch logger");
                        return;
                    }
                    let _permit = match &sessions {
                        Some(sem) => match sem.clone().acquire_owned().await {
                            Ok(permit) => Some(permit),
                            Err(_) => return,
                        },
                        None => None,
                    };
                    let record = collector.collect().await;
                    // the receiver is gone once the run was cancelled
                    let _ = tx.send(record).await;
                });
            }
        }
        drop(tx);

        let mut aggregator = Aggregator::new(&mut *cfg);
        let mut cancelled = false;
        for _ in 0..expected {
            let record = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("exiting fetch logger");
                    cancelled = true;
                    break;
                }
                record = rx.recv() => record,
            };
            match record {
                Some(record) => aggregator.absorb(record)?,
                // every remaining collector exited early
                None => break,
            }
        }
        if cancelled {
            // records produced before the cancel was observed still count
            while let Ok(record) = rx.try_recv() {
                aggregator.absorb(record)?;
            }
        }
        let Tally {
            collected,
            failed,
            total_files,
        } = aggregator.finish()?;

        info!(
            log_dir = %run_dir.display(),
            total_downloaded_files = total_files,
            collected,
            failed,
            "wrote all log files"
        );
        Ok(FetchSummary {
            run_dir,
            expected,
            collected,
            failed,
            total_files,
            cancelled,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
        })
    }

    /// Fetches, then copies every collected file and the configuration
    /// file into `artifact_dir`. Returns the number of files copied.
    pub async fn download_logs(&self, artifact_dir: &Path) -> Result<usize, FetchError> {
        self.fetch_logs().await?;

        let cfg = self.fleet.read().await;
        archive::copy_artifacts(&cfg.status, &cfg.config_path, artifact_dir).await
    }
}

async fn create_log_dir(dir: &Path) -> Result<(), FetchError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await.map_err(|source| FetchError::Setup {
        path: dir.to_path_buf(),
        source,
    })
}
