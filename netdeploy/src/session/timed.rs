//! Uniform per-command timeout around any session

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::DeployError;
use crate::session::{ConnectionDescriptor, Connector, Session};

/// Wraps a session so that every call is bounded by the same timeout
pub struct TimedSession {
    inner: Box<dyn Session>,
    timeout: Duration,
}

impl TimedSession {
    pub fn new(inner: Box<dyn Session>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Connect through `connector`, bounding the handshake by `timeout`
    pub async fn connect(
        connector: &dyn Connector,
        descriptor: &ConnectionDescriptor,
        timeout: Duration,
    ) -> Result<Self, DeployError> {
        let inner = match tokio::time::timeout(timeout, connector.connect(descriptor)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DeployError::ConnectionError(format!(
                    "{}:{} did not answer within {:?}",
                    descriptor.host, descriptor.port, timeout
                )))
            }
        };
        Ok(Self::new(inner, timeout))
    }
}

async fn bounded<T, F>(timeout: Duration, label: &str, fut: F) -> Result<T, DeployError>
where
    F: Future<Output = Result<T, DeployError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DeployError::Timeout(format!("'{}' after {:?}", label, timeout)))?
}

#[async_trait]
impl Session for TimedSession {
    async fn execute_command(&mut self, command: &str) -> Result<String, DeployError> {
        bounded(self.timeout, command, self.inner.execute_command(command)).await
    }

    async fn enter_config_mode(&mut self) -> Result<(), DeployError> {
        bounded(self.timeout, "configure", self.inner.enter_config_mode()).await
    }

    async fn push_config_lines(&mut self, lines: &[String]) -> Result<String, DeployError> {
        bounded(self.timeout, "push config", self.inner.push_config_lines(lines)).await
    }

    async fn commit(&mut self) -> Result<String, DeployError> {
        bounded(self.timeout, "commit", self.inner.commit()).await
    }

    async fn save(&mut self) -> Result<String, DeployError> {
        bounded(self.timeout, "save", self.inner.save()).await
    }

    async fn exit_config_mode(&mut self) -> Result<(), DeployError> {
        bounded(self.timeout, "exit", self.inner.exit_config_mode()).await
    }

    async fn disconnect(&mut self) -> Result<(), DeployError> {
        bounded(self.timeout, "disconnect", self.inner.disconnect()).await
    }
}
