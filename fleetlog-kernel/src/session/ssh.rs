//! SSH transport built on the system `ssh` client.
//!
//! Every `run` is one non-interactive `ssh` invocation with key auth and
//! host-key prompting disabled. `connect` only probes reachability.

use super::{Connector, RemoteSession, RunOptions};
use crate::config::RemoteAccessConf;
use crate::error::SessionError;
use crate::models::Instance;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

const CONNECT_PROBE: &str = "true";
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SshConnector {
    conf: RemoteAccessConf,
}

impl SshConnector {
    pub fn new(conf: RemoteAccessConf) -> Self {
        Self { conf }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, instance: &Instance) -> Result<Box<dyn RemoteSession>, SessionError> {
        let target = instance.target();
        if target.is_empty() {
            return Err(SessionError::Connect {
                target: instance.instance_id.clone(),
                reason: "instance has neither public IP nor public DNS name".into(),
            });
        }

        let mut session = SshSession {
            conf: self.conf.clone(),
            target: target.to_string(),
            instance_id: instance.instance_id.clone(),
            closed: false,
        };

        let attempts = self.conf.connect_retries.max(1);
        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            match session.exec(CONNECT_PROBE, self.conf.connect_timeout_secs).await {
                Ok(_) => {
                    info!(instance_id = %session.instance_id, target = %session.target, "connected");
                    return Ok(Box::new(session));
                }
                Err(e) => {
                    warn!(instance_id = %session.instance_id, attempt, error = %e, "ssh connect failed");
                    last_reason = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(CONNECT_BACKOFF).await;
                    }
                }
            }
        }

        Err(SessionError::Connect {
            target: session.target,
            reason: last_reason,
        })
    }
}

#[derive(Debug)]
pub struct SshSession {
    conf: RemoteAccessConf,
    target: String,
    instance_id: String,
    closed: bool,
}

impl SshSession {
    fn args(&self, command: &str) -> Vec<String> {
        ssh_args(&self.conf, &self.target, command)
    }

    async fn exec(&self, command: &str, timeout_secs: u64) -> Result<Vec<u8>, SessionError> {
        let output = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            AsyncCommand::new(&self.conf.ssh_binary)
                .args(self.args(command))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SessionError::Timeout {
            command: command.to_string(),
            secs: timeout_secs,
        })??;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(SessionError::Command {
                command: command.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &str, opts: RunOptions) -> Result<Vec<u8>, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if opts.verbose {
            debug!(instance_id = %self.instance_id, command, "running remote command");
        }
        let out = self.exec(command, self.conf.command_timeout_secs).await?;
        if opts.verbose {
            debug!(instance_id = %self.instance_id, command, bytes = out.len(), "remote command finished");
        }
        Ok(out)
    }

    async fn close(&mut self) {
        self.closed = true;
        debug!(instance_id = %self.instance_id, "closed ssh session");
    }
}

/// Arguments for one non-interactive `ssh` invocation
pub(crate) fn ssh_args(conf: &RemoteAccessConf, target: &str, command: &str) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        "LogLevel=ERROR".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", conf.connect_timeout_secs),
        "-p".to_string(),
        conf.port.to_string(),
    ];
    if !conf.private_key_path.as_os_str().is_empty() {
        args.push("-i".to_string());
        args.push(conf.private_key_path.to_string_lossy().into_owned());
    }
    args.push(format!("{}@{}", conf.user_name, target));
    args.push(command.to_string());
    args
}
