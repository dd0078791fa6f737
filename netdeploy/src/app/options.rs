//! Engine configuration options

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::errors::DeployError;
use crate::models::device::Device;
use crate::session::{ConnectionDescriptor, Credentials};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Configuration handed to the deployment engine.
///
/// Built once per run and passed down explicitly; nothing in the engine reads
/// global state.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Where intended configs are read and artifacts written
    pub layout: StorageLayout,

    /// Upper bound for every single session call, connection included
    pub command_timeout: Duration,

    /// Login used for every device
    pub username: String,

    /// Shared by every descriptor of the run
    pub credentials: Arc<Credentials>,

    /// Port used when the inventory has no per-device override
    pub default_port: u16,
}

impl DeployOptions {
    /// Build options from settings; `password` is only used without an SSH key
    pub fn from_settings(
        layout: StorageLayout,
        settings: &Settings,
        password: Option<String>,
    ) -> Result<Self, DeployError> {
        let credentials = match (&settings.ssh_key, password) {
            (Some(key), _) => Credentials::KeyFile(expand_home(key)),
            (None, Some(password)) if !password.is_empty() => {
                Credentials::Password(SecretString::from(password))
            }
            (None, _) => {
                return Err(DeployError::ConfigError(
                    "no credentials: set NET_SSH_KEY or NET_PASSWORD".to_string(),
                ))
            }
        };

        if settings.command_timeout_secs == 0 {
            return Err(DeployError::ConfigError(
                "command timeout must be at least one second".to_string(),
            ));
        }

        Ok(Self {
            layout,
            command_timeout: Duration::from_secs(settings.command_timeout_secs),
            username: settings.username.clone(),
            credentials: Arc::new(credentials),
            default_port: settings.ssh_port,
        })
    }

    /// Connection descriptor for `device`
    pub fn descriptor_for(&self, device: &Device) -> ConnectionDescriptor {
        ConnectionDescriptor {
            device: device.name.clone(),
            host: device.host.clone(),
            port: device.port.unwrap_or(self.default_port),
            username: self.username.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
