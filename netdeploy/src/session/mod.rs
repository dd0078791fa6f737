//! Remote command sessions
//!
//! The deployment engine only talks to devices through the [`Session`] and
//! [`Connector`] traits. A session is owned by exactly one deployment task for
//! its whole lifetime and is never shared.

#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod ssh;
pub mod timed;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::DeployError;

/// How to authenticate against a device
#[derive(Debug)]
pub enum Credentials {
    /// Password authentication
    Password(SecretString),

    /// Public key authentication with the given private key
    KeyFile(PathBuf),
}

/// Everything needed to open a session to one device
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    /// Inventory name of the device
    pub device: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credentials: Arc<Credentials>,
}

/// A command-execution channel bound to one device
#[async_trait]
pub trait Session: Send {
    /// Run an operational (read-only) command and return its output
    async fn execute_command(&mut self, command: &str) -> Result<String, DeployError>;

    /// Enter configuration mode
    async fn enter_config_mode(&mut self) -> Result<(), DeployError>;

    /// Stage configuration lines; returns the device echo
    async fn push_config_lines(&mut self, lines: &[String]) -> Result<String, DeployError>;

    /// Activate the staged configuration
    async fn commit(&mut self) -> Result<String, DeployError>;

    /// Persist the active configuration across reboots
    async fn save(&mut self) -> Result<String, DeployError>;

    /// Leave configuration mode
    async fn exit_config_mode(&mut self) -> Result<(), DeployError>;

    /// Close the channel
    async fn disconnect(&mut self) -> Result<(), DeployError>;
}

/// Opens sessions. Shared read-only between concurrent deployment tasks.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Session>, DeployError>;
}
