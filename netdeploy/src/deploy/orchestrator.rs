//! Bounded fan-out of per-device jobs.
//!
//! Concurrency is bounded by a semaphore: every device gets its own spawned
//! task, which holds one permit for its whole lifetime. Results are drained
//! from a [`JoinSet`] in completion order. A task that panics or is cancelled
//! is mapped back to its device through the task id.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::deploy::delta::{compute_delta, running_only};
use crate::deploy::task::{DeployTask, TaskContext};
use crate::deploy::validate::write_log;
use crate::deploy::RUNNING_CONFIG_COMMAND;
use crate::errors::DeployError;
use crate::models::config::{intended_lines, running_lines};
use crate::models::device::Device;
use crate::models::result::{BackupOutcome, DeployResult, PlanResult, ValidationOutcome};
use crate::session::timed::TimedSession;
use crate::session::Session;

/// Runs one job per device under a concurrency limit
#[derive(Clone)]
pub struct Orchestrator {
    ctx: TaskContext,
}

impl Orchestrator {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }

    /// Deploy every device, at most `concurrency_limit` at a time.
    ///
    /// Returns one result per device in completion order. Fails only when no
    /// task can be scheduled at all.
    pub async fn run(
        &self,
        devices: &BTreeMap<String, Device>,
        concurrency_limit: usize,
    ) -> Result<Vec<DeployResult>, DeployError> {
        info!(
            "Deploying {} devices with up to {} in parallel",
            devices.len(),
            concurrency_limit
        );

        let ctx = self.ctx.clone();
        fan_out(
            devices,
            concurrency_limit,
            move |device| DeployTask::new(device, ctx.clone()).run(),
            |device, reason| {
                DeployResult::failed(&device.name, &device.host, format!("task aborted: {reason}"))
            },
        )
        .await
    }

    /// Compute every device's delta without changing anything
    pub async fn plan(
        &self,
        devices: &BTreeMap<String, Device>,
        concurrency_limit: usize,
    ) -> Result<Vec<PlanResult>, DeployError> {
        let ctx = self.ctx.clone();
        fan_out(
            devices,
            concurrency_limit,
            move |device| plan_device(device, ctx.clone()),
            |device, reason| PlanResult {
                name: device.name.clone(),
                host: device.host.clone(),
                delta: Vec::new(),
                running_only: Vec::new(),
                error: Some(format!("task aborted: {reason}")),
            },
        )
        .await
    }

    /// Snapshot every device's running configuration into the backup store
    pub async fn backup(
        &self,
        devices: &BTreeMap<String, Device>,
        concurrency_limit: usize,
    ) -> Result<Vec<BackupOutcome>, DeployError> {
        let ctx = self.ctx.clone();
        fan_out(
            devices,
            concurrency_limit,
            move |device| backup_device(device, ctx.clone()),
            |device, reason| BackupOutcome {
                name: device.name.clone(),
                host: device.host.clone(),
                artifact: None,
                error: Some(format!("task aborted: {reason}")),
            },
        )
        .await
    }

    /// Run the diagnostic battery on every device and persist the evidence
    pub async fn validate(
        &self,
        devices: &BTreeMap<String, Device>,
        concurrency_limit: usize,
    ) -> Result<Vec<ValidationOutcome>, DeployError> {
        let ctx = self.ctx.clone();
        fan_out(
            devices,
            concurrency_limit,
            move |device| validate_device(device, ctx.clone()),
            |device, reason| ValidationOutcome {
                name: device.name.clone(),
                host: device.host.clone(),
                report: None,
                error: Some(format!("task aborted: {reason}")),
            },
        )
        .await
    }
}

async fn fan_out<T, F, Fut, A>(
    devices: &BTreeMap<String, Device>,
    concurrency_limit: usize,
    job: F,
    aborted: A,
) -> Result<Vec<T>, DeployError>
where
    T: Send + 'static,
    F: Fn(Device) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    A: Fn(&Device, &str) -> T,
{
    if concurrency_limit == 0 {
        return Err(DeployError::ConfigError(
            "concurrency limit must be at least 1".to_string(),
        ));
    }

    let semaphore = Arc::new(Semaphore::new(concurrency_limit));
    let mut tasks = JoinSet::new();
    let mut owners = HashMap::with_capacity(devices.len());

    for device in devices.values() {
        let sem = Arc::clone(&semaphore);
        let fut = job(device.clone());
        let handle = tasks.spawn(async move {
            // The semaphore is never closed while tasks are alive
            let _permit = sem.acquire_owned().await;
            fut.await
        });
        owners.insert(handle.id(), device);
    }

    let mut results = Vec::with_capacity(devices.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, result)) => {
                owners.remove(&id);
                results.push(result);
            }
            Err(e) => {
                let id = e.id();
                let reason = join_failure(e);
                match owners.remove(&id) {
                    Some(device) => {
                        error!("[{}] task aborted: {}", device.name, reason);
                        results.push(aborted(device, &reason));
                    }
                    None => warn!("Unknown task aborted: {}", reason),
                }
            }
        }
    }

    // Anything unaccounted for still gets exactly one result
    for device in owners.into_values() {
        results.push(aborted(device, "task did not complete"));
    }

    Ok(results)
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return "cancelled".to_string();
    }
    let panic = err.into_panic();
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

async fn connect(ctx: &TaskContext, device: &Device) -> Result<TimedSession, DeployError> {
    let descriptor = ctx.options.descriptor_for(device);
    TimedSession::connect(ctx.connector.as_ref(), &descriptor, ctx.options.command_timeout).await
}

async fn close(mut session: TimedSession, device: &Device) {
    if let Err(e) = session.disconnect().await {
        warn!("[{}] disconnect failed: {}", device.name, e);
    }
}

async fn plan_device(device: Device, ctx: TaskContext) -> PlanResult {
    let mut plan = PlanResult {
        name: device.name.clone(),
        host: device.host.clone(),
        delta: Vec::new(),
        running_only: Vec::new(),
        error: None,
    };

    let intended = match ctx.options.layout.intended_file(&device.name).read_string().await {
        Ok(text) => intended_lines(&text),
        Err(e) => {
            plan.error = Some(format!("no generated config: {e}"));
            return plan;
        }
    };

    let mut session = match connect(&ctx, &device).await {
        Ok(session) => session,
        Err(e) => {
            plan.error = Some(e.to_string());
            return plan;
        }
    };

    match session.execute_command(RUNNING_CONFIG_COMMAND).await {
        Ok(text) => {
            let running = running_lines(&text);
            plan.delta = compute_delta(&running, &intended);
            plan.running_only = running_only(&running, &intended);
        }
        Err(e) => plan.error = Some(format!("failed to read running config: {e}")),
    }

    close(session, &device).await;
    plan
}

async fn backup_device(device: Device, ctx: TaskContext) -> BackupOutcome {
    let mut outcome = BackupOutcome {
        name: device.name.clone(),
        host: device.host.clone(),
        artifact: None,
        error: None,
    };

    let mut session = match connect(&ctx, &device).await {
        Ok(session) => session,
        Err(e) => {
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };

    match ctx.backups.capture(&device.name, &mut session).await {
        Ok(artifact) => outcome.artifact = Some(artifact),
        Err(e) => {
            warn!("[{}] backup failed: {}", device.name, e);
            outcome.error = Some(e.to_string());
        }
    }

    close(session, &device).await;
    outcome
}

async fn validate_device(device: Device, ctx: TaskContext) -> ValidationOutcome {
    let mut outcome = ValidationOutcome {
        name: device.name.clone(),
        host: device.host.clone(),
        report: None,
        error: None,
    };

    let mut session = match connect(&ctx, &device).await {
        Ok(session) => session,
        Err(e) => {
            outcome.error = Some(e.to_string());
            return outcome;
        }
    };

    let mut report = ctx.validator.run(&device.name, &mut session).await;
    close(session, &device).await;

    if let Err(e) = write_log(&ctx.options.layout.logs_dir(), &device.name, &mut report).await {
        warn!("[{}] could not write validation log: {}", device.name, e);
    }
    outcome.report = Some(report);
    outcome
}
