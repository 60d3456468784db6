//! Command sets run against every instance.
//!
//! Collection is a list of stages. A fixed stage carries its commands up
//! front; a discovery stage first runs a listing command on the instance and
//! parses its output into more (command, destination file) pairs. Both end
//! up as a plain `Vec<LogCommand>` executed the same way.

use std::collections::HashSet;
use std::path::Path;

pub const KERNEL_JOURNAL_CMD: &str = "sudo journalctl --no-pager --output=short-precise -k";
pub const FULL_JOURNAL_CMD: &str = "sudo journalctl --no-pager --output=short-precise";
pub const LIST_UNITS_CMD: &str = "sudo systemctl list-units -t service --no-pager --no-legend --all";
pub const ENI_CMD: &str = "curl http://localhost:61679/v1/enis";
pub const ENI_FILE: &str = "v1-enis";
pub const FIND_VAR_LOG_CMD: &str = "sudo find /var/log ! -type d";

const UNIT_JOURNAL_CMD: &str = "sudo journalctl --no-pager --output=cat -u";
const STATUS_BULLETS: &[&str] = &["●", "*", "×"];

/// One remote command and the file its output lands in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCommand {
    pub command: String,
    pub file_name: String,
    /// Used instead of `file_name` when an earlier output already took it
    pub fallback_name: Option<String>,
}

impl LogCommand {
    pub fn new(command: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            file_name: file_name.into(),
            fallback_name: None,
        }
    }

    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback_name = Some(name.into());
        self
    }
}

/// Commands every instance runs first
pub fn default_log_commands() -> Vec<LogCommand> {
    vec![
        LogCommand::new(KERNEL_JOURNAL_CMD, "kernel.out.log"),
        LogCommand::new(FULL_JOURNAL_CMD, "journal.out.log"),
        LogCommand::new(LIST_UNITS_CMD, "list-units-systemctl.out.log"),
    ]
}

/// Listing commands whose output expands into more commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// loaded, non-inactive systemd services, journaled one by one
    ServiceUnits,
    /// every regular file under /var/log
    VarLogFiles,
}

impl Discovery {
    pub fn command(&self) -> &'static str {
        match self {
            Discovery::ServiceUnits => LIST_UNITS_CMD,
            Discovery::VarLogFiles => FIND_VAR_LOG_CMD,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Discovery::ServiceUnits => "listing systemd service units",
            Discovery::VarLogFiles => "listing /var/log",
        }
    }

    pub fn expand(&self, output: &str) -> Vec<LogCommand> {
        match self {
            Discovery::ServiceUnits => service_log_commands(output),
            Discovery::VarLogFiles => var_log_commands(output),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Fixed(Vec<LogCommand>),
    Discover(Discovery),
}

/// Full per-instance protocol: static commands, service journals, the IPAM
/// debug probe, then /var/log contents
pub fn default_stages(static_commands: Vec<LogCommand>) -> Vec<Stage> {
    vec![
        Stage::Fixed(static_commands),
        Stage::Discover(Discovery::ServiceUnits),
        Stage::Fixed(vec![LogCommand::new(ENI_CMD, ENI_FILE)]),
        Stage::Discover(Discovery::VarLogFiles),
    ]
}

/// Picks the services worth journaling out of `systemctl list-units` output.
///
/// ```text
/// auditd.service              loaded    active   running Security Auditing Service
/// auth-rpcgss-module.service  loaded    inactive dead    Kernel Module supporting RPCSEC_GSS
/// ```
pub fn selected_units(output: &str) -> Vec<&str> {
    let mut units = Vec::new();
    for line in output.lines() {
        let mut fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first().is_some_and(|f| STATUS_BULLETS.contains(f)) {
            fields.remove(0);
        }
        if fields.len() < 5 {
            continue;
        }
        if fields[1] == "not-found" || fields[2] == "inactive" {
            continue;
        }
        units.push(fields[0]);
    }
    units
}

pub fn service_log_commands(output: &str) -> Vec<LogCommand> {
    let mut seen = HashSet::new();
    selected_units(output)
        .into_iter()
        .filter(|unit| seen.insert(*unit))
        .map(|unit| {
            LogCommand::new(
                format!("{} {}", UNIT_JOURNAL_CMD, shell_words::quote(unit)),
                format!("{}.out.log", unit),
            )
        })
        .collect()
}

/// One `cat` per listed file, named after its base name. The whole path,
/// flattened, is the fallback name when the base name is already taken.
pub fn var_log_commands(output: &str) -> Vec<LogCommand> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|path| !path.trim().is_empty())
        .map(|path| {
            let flat = path.trim_start_matches('/').replace('/', "-");
            let base = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| flat.clone());
            LogCommand::new(format!("sudo cat {}", shell_words::quote(path)), base)
                .with_fallback(flat)
        })
        .collect()
}
