/*!
Canned remote outputs and fleet builders for tests
*/

use fleetlog_kernel::{FleetConfig, Instance};
use std::path::Path;

/// `systemctl list-units` output: two units selected, one inactive, one not-found
pub const LIST_UNITS_OUTPUT: &str = "\
kubelet.service                loaded    active   running Kubernetes Kubelet
containerd.service             loaded    active   running containerd container runtime
auth-rpcgss-module.service     loaded    inactive dead    Kernel Module supporting RPCSEC_GSS
● display-manager.service      not-found inactive dead    display-manager.service
";

/// `find /var/log ! -type d` output
pub const FIND_VAR_LOG_OUTPUT: &str = "/var/log/messages\n/var/log/cloud-init.log\n";

/// Files one fully collected instance produces with the fixtures above:
/// 3 static commands, 2 unit journals, the ENI probe and 2 /var/log files
pub const FILES_PER_INSTANCE: usize = 8;

/// Builds fleet configurations with predictable instance identities
pub struct FleetBuilder {
    name: String,
    members: Vec<(String, Instance)>,
    qps: f64,
    burst: u32,
    max_sessions: Option<usize>,
}

impl FleetBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Vec::new(),
            qps: 1000.0,
            burst: 100,
            max_sessions: None,
        }
    }

    /// Adds `instance_id` to `group`; addresses derive from its position
    pub fn instance(mut self, group: &str, instance_id: &str) -> Self {
        let n = self.members.len() + 1;
        let ip = format!("10.0.0.{}", n);
        let dns = format!("ec2-10-0-0-{}.us-west-2.compute.amazonaws.com", n);
        self.members
            .push((group.to_string(), Instance::new(instance_id, &ip, &dns)));
        self
    }

    pub fn rate(mut self, qps: f64, burst: u32) -> Self {
        self.qps = qps;
        self.burst = burst;
        self
    }

    pub fn max_sessions(mut self, n: usize) -> Self {
        self.max_sessions = Some(n);
        self
    }

    pub fn build(&self, log_dir: &Path, config_path: &Path) -> FleetConfig {
        let mut cfg = FleetConfig::new(&self.name, log_dir, config_path);
        cfg.fetch.qps = self.qps;
        cfg.fetch.burst = self.burst;
        cfg.fetch.max_sessions = self.max_sessions;
        for (group, instance) in &self.members {
            cfg.status.add_instance(group, instance.clone());
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlog_kernel::discovery::{selected_units, var_log_commands};

    #[test]
    fn test_fixtures_match_files_per_instance() {
        let static_commands = fleetlog_kernel::discovery::default_log_commands().len();
        let units = selected_units(LIST_UNITS_OUTPUT).len();
        let files = var_log_commands(FIND_VAR_LOG_OUTPUT).len();
        assert_eq!(static_commands + units + 1 + files, FILES_PER_INSTANCE);
    }

    #[test]
    fn test_fleet_builder() {
        let cfg = FleetBuilder::new("demo")
            .instance("ng-a", "i-1")
            .instance("ng-a", "i-2")
            .instance("ng-b", "i-3")
            .build(Path::new("/tmp/logs"), Path::new("/tmp/fleet.yaml"));

        assert_eq!(cfg.status.expected_instances(), 3);
        assert_eq!(cfg.status.groups["ng-b"].instances["i-3"].public_ip, "10.0.0.3");
        assert!(cfg.validate().is_ok());
    }
}
