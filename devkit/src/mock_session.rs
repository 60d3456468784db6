/*!
Mock remote sessions for testing without SSH

Answers commands from canned outputs, records everything issued, and can
fail connects, fail specific commands or hang forever per instance.
*/

use crate::fixtures::{FIND_VAR_LOG_OUTPUT, LIST_UNITS_OUTPUT};
use async_trait::async_trait;
use fleetlog_kernel::discovery::{FIND_VAR_LOG_CMD, LIST_UNITS_CMD};
use fleetlog_kernel::session::{Connector, RemoteSession, RunOptions};
use fleetlog_kernel::state::{new_state, Shared};
use fleetlog_kernel::{Instance, SessionError};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCommand {
    pub instance_id: String,
    pub command: String,
}

#[derive(Default)]
struct MockState {
    responses: HashMap<String, Vec<u8>>,
    instance_responses: HashMap<(String, String), Vec<u8>>,
    default_response: Vec<u8>,
    fail_connect: HashSet<String>,
    fail_command: HashMap<String, String>,
    hang: HashSet<String>,
    issued: Vec<IssuedCommand>,
    connects: usize,
    closes: usize,
}

/// Mock connector handing out scripted sessions
#[derive(Clone)]
pub struct MockConnector {
    state: Shared<MockState>,
}

impl MockConnector {
    /// Connector answering discovery commands with the canned fixtures
    pub fn new() -> Self {
        let connector = Self {
            state: new_state(MockState {
                default_response: b"canned output\n".to_vec(),
                ..MockState::default()
            }),
        };
        connector
            .respond(LIST_UNITS_CMD, LIST_UNITS_OUTPUT)
            .respond(FIND_VAR_LOG_CMD, FIND_VAR_LOG_OUTPUT)
    }

    /// Output returned for an exact command
    pub fn respond(self, command: &str, output: impl Into<Vec<u8>>) -> Self {
        self.state.lock().responses.insert(command.to_string(), output.into());
        self
    }

    /// Output returned for an exact command on one instance only
    pub fn respond_for(self, instance_id: &str, command: &str, output: impl Into<Vec<u8>>) -> Self {
        self.state
            .lock()
            .instance_responses
            .insert((instance_id.to_string(), command.to_string()), output.into());
        self
    }

    pub fn fail_connect(self, instance_id: &str) -> Self {
        self.state.lock().fail_connect.insert(instance_id.to_string());
        self
    }

    /// Fails the first command on `instance_id` containing `pattern`
    pub fn fail_command(self, instance_id: &str, pattern: &str) -> Self {
        self.state
            .lock()
            .fail_command
            .insert(instance_id.to_string(), pattern.to_string());
        self
    }

    /// Every command on `instance_id` blocks forever
    pub fn hang(self, instance_id: &str) -> Self {
        self.state.lock().hang.insert(instance_id.to_string());
        self
    }

    pub fn issued(&self) -> Vec<IssuedCommand> {
        self.state.lock().issued.clone()
    }

    pub fn issued_for(&self, instance_id: &str) -> Vec<String> {
        self.state
            .lock()
            .issued
            .iter()
            .filter(|c| c.instance_id == instance_id)
            .map(|c| c.command.clone())
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, instance: &Instance) -> Result<Box<dyn RemoteSession>, SessionError> {
        let mut state = self.state.lock();
        if state.fail_connect.contains(&instance.instance_id) {
            return Err(SessionError::Connect {
                target: instance.target().to_string(),
                reason: "connection refused".into(),
            });
        }
        state.connects += 1;
        tracing::debug!(instance_id = %instance.instance_id, "[MOCK] connected");
        Ok(Box::new(MockSession {
            instance_id: instance.instance_id.clone(),
            state: self.state.clone(),
        }))
    }
}

pub struct MockSession {
    instance_id: String,
    state: Shared<MockState>,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn run(&mut self, command: &str, _opts: RunOptions) -> Result<Vec<u8>, SessionError> {
        let (hang, result) = {
            let mut state = self.state.lock();
            state.issued.push(IssuedCommand {
                instance_id: self.instance_id.clone(),
                command: command.to_string(),
            });

            let failing = state
                .fail_command
                .get(&self.instance_id)
                .is_some_and(|pattern| command.contains(pattern.as_str()));
            let result = if failing {
                Err(SessionError::Command {
                    command: command.to_string(),
                    code: Some(1),
                    stderr: "permission denied".into(),
                })
            } else {
                let key = (self.instance_id.clone(), command.to_string());
                Ok(state
                    .instance_responses
                    .get(&key)
                    .or_else(|| state.responses.get(command))
                    .cloned()
                    .unwrap_or_else(|| state.default_response.clone()))
            };
            (state.hang.contains(&self.instance_id), result)
        };

        if hang {
            return std::future::pending().await;
        }
        result
    }

    async fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_commands() {
        let connector = MockConnector::new().respond("uname", "Linux\n");
        let mut session = connector
            .connect(&Instance::new("i-1", "10.0.0.1", ""))
            .await
            .unwrap();

        let out = session.run("uname", RunOptions::default()).await.unwrap();
        assert_eq!(out, b"Linux\n");
        let out = session.run("anything", RunOptions::default()).await.unwrap();
        assert_eq!(out, b"canned output\n");
        session.close().await;

        assert_eq!(connector.issued_for("i-1"), vec!["uname", "anything"]);
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 1);
    }

    #[tokio::test]
    async fn test_mock_instance_responses_win() {
        let connector = MockConnector::new()
            .respond("uname", "Linux\n")
            .respond_for("i-2", "uname", "FreeBSD\n");

        let mut one = connector.connect(&Instance::new("i-1", "10.0.0.1", "")).await.unwrap();
        let mut two = connector.connect(&Instance::new("i-2", "10.0.0.2", "")).await.unwrap();

        assert_eq!(one.run("uname", RunOptions::default()).await.unwrap(), b"Linux\n");
        assert_eq!(two.run("uname", RunOptions::default()).await.unwrap(), b"FreeBSD\n");
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let connector = MockConnector::new()
            .fail_connect("i-down")
            .fail_command("i-1", "journalctl");

        assert!(connector
            .connect(&Instance::new("i-down", "10.0.0.9", ""))
            .await
            .is_err());

        let mut session = connector
            .connect(&Instance::new("i-1", "10.0.0.1", ""))
            .await
            .unwrap();
        let err = session
            .run("sudo journalctl -k", RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Command { .. }));
    }
}
