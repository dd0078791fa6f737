//! Deployment outcome models

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::config::ConfigLine;

/// Pre-change snapshot of a device's running configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupArtifact {
    /// Device the snapshot belongs to
    pub device: String,

    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,

    /// Where the snapshot was written
    pub path: PathBuf,

    /// SHA-256 of the stored text
    pub sha256: String,
}

/// Advisory post-change validation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// False only when a diagnostic command could not be executed
    pub ok: bool,

    /// Labeled command/output pairs
    pub evidence: String,

    /// Validation log written for this report, if persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

/// Outcome of one device's deployment attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    pub name: String,
    pub host: String,

    /// Configuration was pushed to the device
    pub changed: bool,

    /// Deployment succeeded and validation raised no flag
    pub ok: bool,

    pub message: String,

    /// Lines scheduled for the device
    #[serde(default)]
    pub delta: Vec<ConfigLine>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupArtifact>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,

    /// When configuration mode was entered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
}

impl DeployResult {
    /// A blank result for `name`, not yet changed and assumed ok
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            changed: false,
            ok: true,
            message: String::new(),
            delta: Vec::new(),
            backup: None,
            validation: None,
            applied_at: None,
        }
    }

    /// A hard failure that happened before anything was applied
    pub fn failed(name: impl Into<String>, host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            ..Self::new(name, host)
        }
    }
}

/// Dry-run view of what a deployment would do on one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub name: String,
    pub host: String,

    /// Lines that would be pushed
    pub delta: Vec<ConfigLine>,

    /// Running lines absent from the intended config; left in place
    pub running_only: Vec<ConfigLine>,

    /// Set when the device could not be inspected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanResult {
    pub fn has_changes(&self) -> bool {
        !self.delta.is_empty()
    }
}

/// Outcome of a standalone backup of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupOutcome {
    pub name: String,
    pub host: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<BackupArtifact>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackupOutcome {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a standalone validation of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub name: String,
    pub host: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ValidationReport>,

    /// Set when the device could not be reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationOutcome {
    /// Reachable and no diagnostic command failed
    pub fn ok(&self) -> bool {
        self.error.is_none() && self.report.as_ref().is_some_and(|r| r.ok)
    }
}
