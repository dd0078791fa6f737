//! Scripted in-memory devices for exercising the engine without a network.
//!
//! A [`MockDevice`] behaves like a small VyOS box: `show configuration
//! commands` prints its running lines, and committed lines become part of
//! the running configuration. Every call is recorded so callers can assert
//! on the exact sequence of operations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::deploy::RUNNING_CONFIG_COMMAND;
use crate::errors::DeployError;
use crate::session::{ConnectionDescriptor, Connector, Session};

#[derive(Debug, Default)]
struct MockState {
    running: Vec<String>,
    staged: Vec<String>,
    in_config: bool,
    events: Vec<String>,
    refuse_connect: bool,
    fail_commands: HashSet<String>,
    panic_commands: HashSet<String>,
    fail_commit: bool,
    fail_save: bool,
    responses: HashMap<String, String>,
    delay: Duration,
    delays: HashMap<String, Duration>,
}

/// Shared handle to one simulated device
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// A device whose running configuration is `lines`
    pub fn with_running(lines: &[&str]) -> Self {
        let device = Self::default();
        device.lock().running = lines.iter().map(|l| l.to_string()).collect();
        device
    }

    /// Every connection attempt fails
    pub fn refuse_connections(self) -> Self {
        self.lock().refuse_connect = true;
        self
    }

    /// Executing `command` raises a command error
    pub fn fail_command(self, command: &str) -> Self {
        self.lock().fail_commands.insert(command.to_string());
        self
    }

    /// Executing `command` panics inside the calling task
    pub fn panic_on(self, command: &str) -> Self {
        self.lock().panic_commands.insert(command.to_string());
        self
    }

    /// `commit` raises a command error and leaves the staged lines unapplied
    pub fn fail_commit(self) -> Self {
        self.lock().fail_commit = true;
        self
    }

    /// `save` raises a command error; committed lines stay live
    pub fn fail_save(self) -> Self {
        self.lock().fail_save = true;
        self
    }

    /// Canned output for an operational command
    pub fn respond(self, command: &str, output: &str) -> Self {
        self.lock()
            .responses
            .insert(command.to_string(), output.to_string());
        self
    }

    /// Every operation sleeps this long before answering
    pub fn delay(self, delay: Duration) -> Self {
        self.lock().delay = delay;
        self
    }

    /// Only the operation recorded as `event` sleeps this long
    pub fn delay_on(self, event: &str, delay: Duration) -> Self {
        self.lock().delays.insert(event.to_string(), delay);
        self
    }

    /// Recorded operations, in call order
    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    /// Current running configuration
    pub fn running(&self) -> Vec<String> {
        self.lock().running.clone()
    }

    /// Whether configuration mode was ever entered
    pub fn entered_config_mode(&self) -> bool {
        self.lock().events.iter().any(|e| e == "configure")
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: impl Into<String>) -> Duration {
        let event = event.into();
        let mut state = self.lock();
        let delay = state.delays.get(&event).copied().unwrap_or(state.delay);
        state.events.push(event);
        delay
    }
}

/// Connector resolving descriptors to [`MockDevice`]s by host
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    devices: HashMap<String, MockDevice>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device` under `host`
    pub fn with_device(mut self, host: &str, device: MockDevice) -> Self {
        self.devices.insert(host.to_string(), device);
        self
    }

    /// Highest number of sessions that were open at the same time
    pub fn peak_sessions(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Sessions currently open
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn Session>, DeployError> {
        let device = self.devices.get(&descriptor.host).cloned().ok_or_else(|| {
            DeployError::ConnectionError(format!("no route to host {}", descriptor.host))
        })?;

        let delay = device.record("connect");
        tokio::time::sleep(delay).await;
        if device.lock().refuse_connect {
            return Err(DeployError::ConnectionError(format!(
                "connection refused by {}:{}",
                descriptor.host, descriptor.port
            )));
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            device,
            active: self.active.clone(),
            open: true,
        }))
    }
}

/// Session bound to one [`MockDevice`]
pub struct MockSession {
    device: MockDevice,
    active: Arc<AtomicUsize>,
    open: bool,
}

impl MockSession {
    /// A session on `device` that did not go through a connector
    pub fn attach(device: MockDevice) -> Self {
        Self {
            device,
            active: Arc::new(AtomicUsize::new(1)),
            open: true,
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl Session for MockSession {
    async fn execute_command(&mut self, command: &str) -> Result<String, DeployError> {
        let delay = self.device.record(format!("exec:{command}"));
        tokio::time::sleep(delay).await;

        let state = self.device.lock();
        if state.panic_commands.contains(command) {
            drop(state);
            panic!("simulated crash on '{command}'");
        }
        if state.fail_commands.contains(command) {
            return Err(DeployError::CommandError(format!("'{command}' failed")));
        }
        if command == RUNNING_CONFIG_COMMAND {
            return Ok(state.running.join("\n"));
        }
        Ok(state.responses.get(command).cloned().unwrap_or_default())
    }

    async fn enter_config_mode(&mut self) -> Result<(), DeployError> {
        let delay = self.device.record("configure");
        tokio::time::sleep(delay).await;
        self.device.lock().in_config = true;
        Ok(())
    }

    async fn push_config_lines(&mut self, lines: &[String]) -> Result<String, DeployError> {
        let delay = self.device.record(format!("push:{}", lines.len()));
        tokio::time::sleep(delay).await;

        let mut state = self.device.lock();
        if !state.in_config {
            return Err(DeployError::CommandError("not in configuration mode".to_string()));
        }
        state.staged.extend(lines.iter().cloned());
        Ok(lines.join("\n"))
    }

    async fn commit(&mut self) -> Result<String, DeployError> {
        let delay = self.device.record("commit");
        tokio::time::sleep(delay).await;

        let mut state = self.device.lock();
        if state.fail_commit {
            return Err(DeployError::CommandError("commit failed".to_string()));
        }
        let staged = std::mem::take(&mut state.staged);
        for line in staged {
            if !state.running.contains(&line) {
                state.running.push(line);
            }
        }
        Ok("commit ok".to_string())
    }

    async fn save(&mut self) -> Result<String, DeployError> {
        let delay = self.device.record("save");
        tokio::time::sleep(delay).await;
        if self.device.lock().fail_save {
            return Err(DeployError::CommandError("save failed".to_string()));
        }
        Ok("Saving configuration to '/config/config.boot'...\nDone".to_string())
    }

    async fn exit_config_mode(&mut self) -> Result<(), DeployError> {
        let delay = self.device.record("exit");
        tokio::time::sleep(delay).await;
        self.device.lock().in_config = false;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DeployError> {
        self.device.record("disconnect");
        self.close();
        Ok(())
    }
}
