//! Device inventory models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A device record as it appears in the inventory file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Management address
    pub host: String,

    /// Per-device SSH port override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Everything else is handed to the renderer as template variables
    #[serde(flatten)]
    pub vars: BTreeMap<String, serde_yaml::Value>,
}

/// A device taking part in a deployment run. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    pub host: String,
    pub port: Option<u16>,
    pub vars: BTreeMap<String, serde_yaml::Value>,
}

impl Device {
    /// Create a device with no template variables
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: None,
            vars: BTreeMap::new(),
        }
    }

    pub fn from_record(name: impl Into<String>, record: DeviceRecord) -> Self {
        Self {
            name: name.into(),
            host: record.host,
            port: record.port,
            vars: record.vars,
        }
    }
}
