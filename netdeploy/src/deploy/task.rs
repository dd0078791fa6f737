//! Per-device deployment attempt

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::app::options::DeployOptions;
use crate::deploy::backup::BackupStore;
use crate::deploy::delta::compute_delta;
use crate::deploy::fsm::{DeployEvent, DeployFsm, DeployState};
use crate::deploy::validate::{write_log, Validator};
use crate::deploy::RUNNING_CONFIG_COMMAND;
use crate::errors::DeployError;
use crate::models::config::{intended_lines, running_lines};
use crate::models::device::Device;
use crate::models::result::DeployResult;
use crate::session::timed::TimedSession;
use crate::session::{Connector, Session};

/// Message for a device whose running config already contains the intended lines
pub const ALREADY_DESIRED: &str = "already in desired state";

/// Read-only collaborators shared by every task of a run
#[derive(Clone)]
pub struct TaskContext {
    pub options: Arc<DeployOptions>,
    pub connector: Arc<dyn Connector>,
    pub backups: BackupStore,
    pub validator: Arc<Validator>,
}

impl TaskContext {
    pub fn new(options: DeployOptions, connector: Arc<dyn Connector>) -> Self {
        let backups = BackupStore::new(options.layout.backups_dir());
        Self {
            options: Arc::new(options),
            connector,
            backups,
            validator: Arc::new(Validator::default()),
        }
    }
}

/// One deployment attempt against one device.
///
/// Always produces exactly one [`DeployResult`]; errors never escape `run`.
pub struct DeployTask {
    device: Device,
    ctx: TaskContext,
    fsm: DeployFsm,
    result: DeployResult,
}

impl DeployTask {
    pub fn new(device: Device, ctx: TaskContext) -> Self {
        let result = DeployResult::new(&device.name, &device.host);
        Self {
            device,
            ctx,
            fsm: DeployFsm::new(),
            result,
        }
    }

    pub fn state(&self) -> &DeployState {
        self.fsm.state()
    }

    /// Drive the device from `Pending` to `Done` or `Failed`
    pub async fn run(self) -> DeployResult {
        self.run_with_history().await.0
    }

    /// Like [`run`](Self::run), also returning every state visited
    pub async fn run_with_history(mut self) -> (DeployResult, Vec<DeployState>) {
        info!("[{}] deploying to {}", self.device.name, self.device.host);

        let descriptor = self.ctx.options.descriptor_for(&self.device);
        let connect = TimedSession::connect(
            self.ctx.connector.as_ref(),
            &descriptor,
            self.ctx.options.command_timeout,
        )
        .await;

        let mut session = match connect {
            Ok(session) => session,
            Err(e) => return self.fail(e.to_string()),
        };

        let outcome = match self.advance(DeployEvent::Connect) {
            Ok(()) => self.drive(&mut session).await,
            Err(e) => Err(e),
        };

        if let Err(e) = session.disconnect().await {
            warn!("[{}] disconnect failed: {}", self.device.name, e);
        }

        match outcome.and_then(|()| self.advance(DeployEvent::Finish)) {
            Ok(()) => self.finish(),
            Err(message) => self.fail(message),
        }
    }

    async fn drive(&mut self, session: &mut dyn Session) -> Result<(), String> {
        let name = self.device.name.clone();

        let running = session
            .execute_command(RUNNING_CONFIG_COMMAND)
            .await
            .map_err(|e| format!("failed to read running config: {e}"))?;
        let intended_file = self.ctx.options.layout.intended_file(&name);
        let intended = intended_file.read_string().await.map_err(|e| {
            format!(
                "failed to read intended config {}: {}",
                intended_file.path().display(),
                e
            )
        })?;

        let delta = compute_delta(&running_lines(&running), &intended_lines(&intended));
        self.advance(DeployEvent::DeltaComputed(delta.len()))?;
        self.result.delta = delta;

        if self.result.delta.is_empty() {
            self.result.message = ALREADY_DESIRED.to_string();
            return Ok(());
        }
        debug!("[{}] delta has {} lines", name, self.result.delta.len());

        let backup = self
            .ctx
            .backups
            .capture(&name, session)
            .await
            .map_err(|e| format!("backup failed, nothing applied: {e}"))?;
        let backup_path = backup.path.display().to_string();
        self.result.backup = Some(backup);
        self.advance(DeployEvent::BackedUp)?;

        let lines: Vec<String> = self.result.delta.iter().map(|l| l.to_string()).collect();
        self.result.applied_at = Some(Utc::now());
        if let Err(e) = self.apply(session, &lines).await {
            return Err(format!(
                "apply failed: {e}; device may be partially configured, inspect it manually \
                 (pre-change backup: {backup_path})"
            ));
        }
        self.advance(DeployEvent::Applied)?;
        info!("[{}] applied {} lines", name, lines.len());

        let mut report = self.ctx.validator.run(&name, session).await;
        if let Err(e) = write_log(&self.ctx.options.layout.logs_dir(), &name, &mut report).await {
            warn!("[{}] could not write validation log: {}", name, e);
        }
        self.advance(DeployEvent::Validated(report.ok))?;

        self.result.ok = report.ok;
        self.result.message = if report.ok {
            "applied delta and validated".to_string()
        } else {
            format!(
                "applied delta; validation flagged issues, manual rollback recommended \
                 using backup file {backup_path}"
            )
        };
        self.result.validation = Some(report);
        Ok(())
    }

    /// Enter configuration mode, push, commit, save, exit. No undo on failure.
    async fn apply(&mut self, session: &mut dyn Session, lines: &[String]) -> Result<(), DeployError> {
        session.enter_config_mode().await?;
        let mut transcript = session.push_config_lines(lines).await?;
        transcript.push_str(&session.commit().await?);
        // Committed lines are live even if a later step fails
        self.result.changed = true;
        transcript.push_str(&session.save().await?);
        session.exit_config_mode().await?;
        debug!("[{}] apply transcript:\n{}", self.device.name, transcript);
        Ok(())
    }

    fn advance(&mut self, event: DeployEvent) -> Result<(), String> {
        let from = self.fsm.state().clone();
        self.fsm.process(event)?;
        debug!("[{}] {:?} -> {:?}", self.device.name, from, self.fsm.state());
        Ok(())
    }

    fn finish(self) -> (DeployResult, Vec<DeployState>) {
        if self.result.ok {
            info!("[{}] {}", self.device.name, self.result.message);
        } else {
            warn!("[{}] {}", self.device.name, self.result.message);
        }
        (self.result, self.fsm.history().to_vec())
    }

    fn fail(mut self, message: String) -> (DeployResult, Vec<DeployState>) {
        if let Err(e) = self.fsm.process(DeployEvent::Fail(message.clone())) {
            warn!("[{}] {}", self.device.name, e);
        }
        error!("[{}] {}", self.device.name, message);
        self.result.ok = false;
        self.result.message = message;
        (self.result, self.fsm.history().to_vec())
    }
}
