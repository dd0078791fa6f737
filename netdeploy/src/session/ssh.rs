//! SSH transport for VyOS devices.
//!
//! Every command runs in its own `ssh` invocation of a `vbash` script, so a
//! session holds no open channel. Configuration mode is emulated: pushed lines
//! are buffered and sent together with `commit` inside one `configure` block.

use std::process::Stdio;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::session::{ConnectionDescriptor, Connector, Credentials, Session};

/// Makes `run`, `configure`, `commit` and `save` available to non-interactive vbash
const SCRIPT_TEMPLATE: &str = "source /opt/vyatta/etc/functions/script-template";

/// Body of the script that applies `lines` in one configuration session.
///
/// A failed `commit` must end the script with a non-zero status, otherwise
/// the trailing `exit` reports success.
pub fn commit_script(lines: &[String]) -> String {
    format!("configure\n{}\ncommit || exit 1\nexit", lines.join("\n"))
}

/// Body of the script that persists the running configuration
pub fn save_script() -> String {
    "configure\nsave || exit 1\nexit".to_string()
}

/// Opens [`SshSession`]s using the system `ssh` client
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Session>, DeployError> {
        let session = SshSession::new(descriptor.clone());
        session.check_reachable().await.map_err(|e| {
            DeployError::ConnectionError(format!(
                "{}@{}:{}: {}",
                descriptor.username, descriptor.host, descriptor.port, e
            ))
        })?;
        debug!("[{}] SSH reachable at {}", descriptor.device, descriptor.host);
        Ok(Box::new(session))
    }
}

/// A VyOS session over per-command SSH invocations
pub struct SshSession {
    descriptor: ConnectionDescriptor,
    /// Lines pushed since entering configuration mode; `None` outside it
    staged: Option<Vec<String>>,
}

impl SshSession {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            staged: None,
        }
    }

    fn ssh_command(&self, remote: &str) -> Command {
        let d = &self.descriptor;
        let mut cmd = match d.credentials.as_ref() {
            Credentials::Password(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e")
                    .env("SSHPASS", password.expose_secret())
                    .arg("ssh");
                cmd
            }
            Credentials::KeyFile(key) => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes", "-i"]).arg(key);
                cmd
            }
        };
        cmd.args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o", "ConnectTimeout=10"])
            .arg("-p")
            .arg(d.port.to_string())
            .arg(format!("{}@{}", d.username, d.host))
            .arg(remote)
            .kill_on_drop(true);
        cmd
    }

    async fn check_reachable(&self) -> Result<(), DeployError> {
        let output = self
            .ssh_command("true")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DeployError::ConnectionError(format!("failed to spawn ssh: {e}")))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DeployError::ConnectionError(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    /// Feed `body` to a remote `vbash -s` and return its stdout
    async fn run_script(&self, body: &str) -> Result<String, DeployError> {
        let mut child = self
            .ssh_command("vbash -s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeployError::CommandError(format!("failed to spawn ssh: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let script = format!("{SCRIPT_TEMPLATE}\n{body}\n");
            stdin.write_all(script.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DeployError::CommandError(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )))
        }
    }

    fn staged_mut(&mut self) -> Result<&mut Vec<String>, DeployError> {
        self.staged
            .as_mut()
            .ok_or_else(|| DeployError::CommandError("not in configuration mode".to_string()))
    }
}

#[async_trait]
impl Session for SshSession {
    async fn execute_command(&mut self, command: &str) -> Result<String, DeployError> {
        debug!("[{}] $ {}", self.descriptor.device, command);
        self.run_script(&format!("run {command}")).await
    }

    async fn enter_config_mode(&mut self) -> Result<(), DeployError> {
        if self.staged.is_some() {
            return Err(DeployError::CommandError(
                "already in configuration mode".to_string(),
            ));
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    async fn push_config_lines(&mut self, lines: &[String]) -> Result<String, DeployError> {
        let staged = self.staged_mut()?;
        staged.extend(lines.iter().cloned());
        Ok(lines.join("\n"))
    }

    async fn commit(&mut self) -> Result<String, DeployError> {
        let lines = std::mem::take(self.staged_mut()?);
        self.run_script(&commit_script(&lines)).await
    }

    async fn save(&mut self) -> Result<String, DeployError> {
        self.staged_mut()?;
        self.run_script(&save_script()).await
    }

    async fn exit_config_mode(&mut self) -> Result<(), DeployError> {
        match self.staged.take() {
            Some(lines) if !lines.is_empty() => {
                warn!(
                    "[{}] leaving configuration mode with {} uncommitted lines",
                    self.descriptor.device,
                    lines.len()
                );
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(DeployError::CommandError(
                "not in configuration mode".to_string(),
            )),
        }
    }

    async fn disconnect(&mut self) -> Result<(), DeployError> {
        self.staged = None;
        Ok(())
    }
}
