//! Error taxonomy for log collection
//!
//! - `SessionError`: what the remote transport reports
//! - `CollectError`: per-instance failures, carried as data in result records
//! - `FetchError`: run-level failures that end the whole collection

use std::path::PathBuf;

/// Errors reported by a remote session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },
    #[error("command {command:?} exited with {code:?}: {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("command {command:?} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },
    #[error("session closed")]
    Closed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one instance's collection; never stops sibling instances
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("failed to connect to {instance_id}: {source}")]
    Connect {
        instance_id: String,
        #[source]
        source: SessionError,
    },
    #[error("failed to run command {command:?} for {instance_id}: {source}")]
    Command {
        command: String,
        instance_id: String,
        #[source]
        source: SessionError,
    },
    #[error("failed to create a file {path:?} for {instance_id}: {source}")]
    CreateFile {
        path: PathBuf,
        instance_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write to a file {path:?} for {instance_id}: {source}")]
    WriteFile {
        path: PathBuf,
        instance_id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("rate limiter wait cancelled for {instance_id}")]
    Cancelled { instance_id: String },
}

/// Terminal errors of a collection run
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("log collection is disabled for {0:?}")]
    Disabled(String),
    #[error("failed to prepare {path:?}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to read configuration {path:?}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to sync status to {path:?}: {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("group name {0:?} is unknown")]
    UnknownGroup(String),
    #[error("group {group:?} for instance {instance_id:?} logs are redundant")]
    DuplicateInstance { group: String, instance_id: String },
    #[error("failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
