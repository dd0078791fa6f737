//! Settings file management

use serde::{Deserialize, Serialize};
use crate::logs::LogLevel;

/// Project settings, read from `settings.json` and overridden by the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub json_logs: bool,

    /// Login used for every device
    #[serde(default = "default_username")]
    pub username: String,

    /// Private key used instead of a password when set
    #[serde(default)]
    pub ssh_key: Option<String>,

    /// Default SSH port, overridable per device in the inventory
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Upper bound for any single remote command, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Number of devices deployed in parallel
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Templates concatenated, in order, into each intended config
    #[serde(default = "default_templates")]
    pub templates: Vec<String>,

    /// Retention for files in the logs directory
    #[serde(default = "default_log_retention")]
    pub log_retention_days: u64,

    /// Retention for files in the backups directory
    #[serde(default = "default_backup_retention")]
    pub backup_retention_days: u64,
}

fn default_username() -> String {
    "vyos".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_command_timeout() -> u64 {
    30
}

fn default_max_workers() -> usize {
    6
}

fn default_templates() -> Vec<String> {
    vec![
        "base_vyos.j2".to_string(),
        "ospf_vyos.j2".to_string(),
        "bgp_vyos.j2".to_string(),
    ]
}

fn default_log_retention() -> u64 {
    14
}

fn default_backup_retention() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            username: default_username(),
            ssh_key: None,
            ssh_port: default_ssh_port(),
            command_timeout_secs: default_command_timeout(),
            max_workers: default_max_workers(),
            templates: default_templates(),
            log_retention_days: default_log_retention(),
            backup_retention_days: default_backup_retention(),
        }
    }
}

impl Settings {
    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are skipped and described in the returned list, so
    /// the caller can log them once logging is up.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        if let Some(v) = lookup("NET_USERNAME").filter(|v| !v.is_empty()) {
            self.username = v;
        }
        if let Some(v) = lookup("NET_SSH_KEY") {
            self.ssh_key = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            match v.parse() {
                Ok(level) => self.log_level = level,
                Err(e) => warnings.push(format!("Ignoring LOG_LEVEL: {e}")),
            }
        }
        let numeric = [
            parse_override(&lookup, "NET_SSH_PORT", &mut self.ssh_port),
            parse_override(&lookup, "COMMAND_TIMEOUT", &mut self.command_timeout_secs),
            parse_override(&lookup, "MAX_WORKERS", &mut self.max_workers),
            parse_override(&lookup, "LOG_RETENTION_DAYS", &mut self.log_retention_days),
            parse_override(&lookup, "BACKUP_RETENTION_DAYS", &mut self.backup_retention_days),
        ];
        warnings.extend(numeric.into_iter().flatten());
        warnings
    }
}

fn parse_override<F, T>(lookup: &F, key: &str, target: &mut T) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => {
            *target = value;
            None
        }
        Err(_) => Some(format!("Ignoring {key}={raw:?}: not a valid number")),
    }
}
