//! Remote session abstraction.
//!
//! A `Connector` opens one `RemoteSession` per instance; the collector only
//! issues blocking request/response commands through it.

mod ssh;

pub use ssh::{SshConnector, SshSession};

use crate::error::SessionError;
use crate::models::Instance;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub verbose: bool,
}

impl RunOptions {
    pub fn verbose(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
pub trait RemoteSession: Send {
    /// Runs `command` remotely and returns its standard output
    async fn run(&mut self, command: &str, opts: RunOptions) -> Result<Vec<u8>, SessionError>;

    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, instance: &Instance) -> Result<Box<dyn RemoteSession>, SessionError>;
}
