//! Error types for netdeploy

use thiserror::Error;

/// Main error type for the deployment engine
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The session to a device could not be established
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A remote command failed
    #[error("Command error: {0}")]
    CommandError(String),

    /// A remote command did not answer within the per-command timeout
    #[error("Command timed out: {0}")]
    Timeout(String),

    #[error("Backup error: {0}")]
    BackupError(String),

    #[error("Inventory error: {0}")]
    InventoryError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}
