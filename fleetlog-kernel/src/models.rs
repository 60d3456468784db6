use crate::error::CollectError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One remote compute node of the fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub public_dns_name: String,
}

impl Instance {
    pub fn new(instance_id: &str, public_ip: &str, public_dns_name: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            public_ip: public_ip.to_string(),
            public_dns_name: public_dns_name.to_string(),
        }
    }

    /// Address used to reach the instance (IP first, DNS name as fallback)
    pub fn target(&self) -> &str {
        if self.public_ip.is_empty() {
            &self.public_dns_name
        } else {
            &self.public_ip
        }
    }
}

/// Outcome of collecting one instance, emitted exactly once per instance
#[derive(Debug)]
pub struct InstanceLogs {
    pub group: String,
    pub instance_id: String,
    pub paths: Vec<PathBuf>,
    pub error: Option<CollectError>,
}

impl InstanceLogs {
    pub fn collected(group: &str, instance_id: &str, paths: Vec<PathBuf>) -> Self {
        Self {
            group: group.to_string(),
            instance_id: instance_id.to_string(),
            paths,
            error: None,
        }
    }

    pub fn failed(group: &str, instance_id: &str, error: CollectError) -> Self {
        Self {
            group: group.to_string(),
            instance_id: instance_id.to_string(),
            paths: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
