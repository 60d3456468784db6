//! Per-instance collection protocol.
//!
//! One collector owns one remote session for one instance and walks the
//! stages in order. Every remote command passes the shared rate governor
//! first. The first failure aborts the instance; the error travels back as
//! data inside the `InstanceLogs` record.

use crate::discovery::{LogCommand, Stage};
use crate::error::CollectError;
use crate::governor::RateGovernor;
use crate::models::{Instance, InstanceLogs};
use crate::session::{Connector, RemoteSession, RunOptions};
use crate::sink::LogSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct InstanceCollector {
    group: String,
    instance: Instance,
    connector: Arc<dyn Connector>,
    governor: Arc<RateGovernor>,
    stages: Arc<Vec<Stage>>,
    sink: LogSink,
    opts: RunOptions,
    cancel: CancellationToken,
}

impl InstanceCollector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group: &str,
        instance: Instance,
        connector: Arc<dyn Connector>,
        governor: Arc<RateGovernor>,
        stages: Arc<Vec<Stage>>,
        run_dir: &Path,
        opts: RunOptions,
        cancel: CancellationToken,
    ) -> Self {
        let sink = LogSink::new(run_dir, &instance);
        Self {
            group: group.to_string(),
            instance,
            connector,
            governor,
            stages,
            sink,
            opts,
            cancel,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance.instance_id
    }

    /// Runs the whole protocol and folds the outcome into one record
    pub async fn collect(self) -> InstanceLogs {
        match self.run().await {
            Ok(paths) => InstanceLogs::collected(&self.group, self.instance_id(), paths),
            Err(e) => InstanceLogs::failed(&self.group, self.instance_id(), e),
        }
    }

    async fn run(&self) -> Result<Vec<PathBuf>, CollectError> {
        self.gate().await?;
        let mut session = self
            .connector
            .connect(&self.instance)
            .await
            .map_err(|source| CollectError::Connect {
                instance_id: self.instance_id().to_string(),
                source,
            })?;

        let result = self.run_stages(session.as_mut()).await;
        session.close().await;
        result
    }

    async fn run_stages(&self, session: &mut dyn RemoteSession) -> Result<Vec<PathBuf>, CollectError> {
        let mut paths = Vec::new();
        for stage in self.stages.iter() {
            match stage {
                Stage::Fixed(commands) => {
                    self.execute_all(session, commands, &mut paths).await?;
                }
                Stage::Discover(discovery) => {
                    info!(instance_id = %self.instance_id(), "{}", discovery.label());
                    let out = self.run_command(session, discovery.command()).await?;
                    let commands = discovery.expand(&String::from_utf8_lossy(&out));
                    debug!(
                        instance_id = %self.instance_id(),
                        discovered = commands.len(),
                        "expanded discovery output"
                    );
                    self.execute_all(session, &commands, &mut paths).await?;
                }
            }
        }
        Ok(paths)
    }

    async fn execute_all(
        &self,
        session: &mut dyn RemoteSession,
        commands: &[LogCommand],
        paths: &mut Vec<PathBuf>,
    ) -> Result<(), CollectError> {
        for cmd in commands {
            let out = self.run_command(session, &cmd.command).await?;
            paths.push(
                self.sink
                    .persist(&cmd.file_name, cmd.fallback_name.as_deref(), &out)
                    .await?,
            );
        }
        Ok(())
    }

    async fn run_command(&self, session: &mut dyn RemoteSession, command: &str) -> Result<Vec<u8>, CollectError> {
        self.gate().await?;
        session
            .run(command, self.opts)
            .await
            .map_err(|source| CollectError::Command {
                command: command.to_string(),
                instance_id: self.instance_id().to_string(),
                source,
            })
    }

    async fn gate(&self) -> Result<(), CollectError> {
        self.governor
            .acquire(&self.cancel)
            .await
            .map_err(|_| CollectError::Cancelled {
                instance_id: self.instance_id().to_string(),
            })
    }
}
