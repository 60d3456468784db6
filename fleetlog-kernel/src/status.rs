//! Fleet status: which instances belong to which group, and which of them
//! already had their logs collected.
//!
//! An instance ID that appears under `logs` is never overwritten; a second
//! record for it is an orchestration bug and surfaces as
//! `FetchError::DuplicateInstance`.

use crate::error::FetchError;
use crate::models::Instance;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStatus {
    /// Membership, keyed by instance ID
    #[serde(default)]
    pub instances: BTreeMap<String, Instance>,
    /// Produced files per collected instance
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub logs: BTreeMap<String, Vec<PathBuf>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetStatus {
    #[serde(default)]
    pub groups: BTreeMap<String, GroupStatus>,
}

impl FleetStatus {
    pub fn add_instance(&mut self, group: &str, instance: Instance) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .instances
            .insert(instance.instance_id.clone(), instance);
    }

    /// Number of result records a full run must drain
    pub fn expected_instances(&self) -> usize {
        self.groups.values().map(|g| g.instances.len()).sum()
    }

    pub fn collected_instances(&self) -> usize {
        self.groups.values().map(|g| g.logs.len()).sum()
    }

    pub fn logs_for(&self, group: &str, instance_id: &str) -> Option<&[PathBuf]> {
        self.groups
            .get(group)
            .and_then(|g| g.logs.get(instance_id))
            .map(Vec::as_slice)
    }

    /// Every recorded file path, group by group
    pub fn all_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.groups
            .values()
            .flat_map(|g| g.logs.values())
            .flatten()
    }

    /// Inserts the file list of a freshly collected instance
    pub fn record_logs(
        &mut self,
        group: &str,
        instance_id: &str,
        paths: Vec<PathBuf>,
    ) -> Result<(), FetchError> {
        let status = self
            .groups
            .get_mut(group)
            .ok_or_else(|| FetchError::UnknownGroup(group.to_string()))?;

        if status.logs.contains_key(instance_id) {
            return Err(FetchError::DuplicateInstance {
                group: group.to_string(),
                instance_id: instance_id.to_string(),
            });
        }

        status.logs.insert(instance_id.to_string(), paths);
        Ok(())
    }
}

/// Durable home of the fleet status
pub trait StatusStore: Send + Sync {
    fn status(&self) -> &FleetStatus;
    fn status_mut(&mut self) -> &mut FleetStatus;
    /// Flushes the current status to durable storage
    fn sync(&self) -> Result<(), FetchError>;
}
