//! Inventory loading

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::device::{Device, DeviceRecord};

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    devices: BTreeMap<String, DeviceRecord>,
}

/// Parse inventory YAML of the form `devices: { <name>: { host, port?, ... } }`
pub fn parse_inventory(text: &str) -> Result<BTreeMap<String, Device>, DeployError> {
    let file: InventoryFile = serde_yaml::from_str(text)?;

    let mut devices = BTreeMap::new();
    for (name, record) in file.devices {
        if record.host.trim().is_empty() {
            return Err(DeployError::InventoryError(format!(
                "device '{}' has an empty host",
                name
            )));
        }
        devices.insert(name.clone(), Device::from_record(name, record));
    }
    Ok(devices)
}

/// Load and parse the inventory file
pub async fn load_inventory(file: &File) -> Result<BTreeMap<String, Device>, DeployError> {
    let text = file.read_string().await.map_err(|e| {
        DeployError::InventoryError(format!("cannot read {}: {}", file.path().display(), e))
    })?;
    let devices = parse_inventory(&text)?;
    debug!("Loaded {} devices from {}", devices.len(), file.path().display());
    Ok(devices)
}
