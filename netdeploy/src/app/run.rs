//! Top-level run modes

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::app::options::DeployOptions;
use crate::deploy::orchestrator::Orchestrator;
use crate::deploy::task::TaskContext;
use crate::errors::DeployError;
use crate::inventory::load_inventory;
use crate::render::{render_all, TemplateRenderer};
use crate::report::{
    render_backups, render_plan, render_summary, render_table, render_validations, RunSummary,
};
use crate::retention;
use crate::session::Connector;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// What a run should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Render, then deploy every device
    Deploy,

    /// Render intended configs and stop
    GenerateOnly,

    /// Show each device's delta against the already rendered configs
    Plan,

    /// Snapshot every device's running configuration
    Backup,

    /// Run the diagnostic battery on every device
    Validate,

    /// Apply log and backup retention
    Cleanup,
}

/// Inputs of a run besides the settings
pub struct RunRequest {
    pub layout: StorageLayout,
    pub mode: Mode,
    pub max_workers: usize,
    pub password: Option<String>,
    pub connector: Arc<dyn Connector>,
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every device is ok (or nothing needed doing)
    Success,

    /// At least one device is not ok or has pending changes
    Failure,

    /// A standalone validation flagged at least one device
    ValidationFailed,
}

impl RunOutcome {
    fn from_flag(ok: bool) -> Self {
        if ok {
            RunOutcome::Success
        } else {
            RunOutcome::Failure
        }
    }
}

/// Execute `request` and print the operator-facing report to stdout
pub async fn run(request: RunRequest, settings: &Settings) -> Result<RunOutcome, DeployError> {
    let layout = request.layout.clone();

    if request.mode == Mode::Cleanup {
        let purged = retention::cleanup(
            &layout,
            settings.log_retention_days,
            settings.backup_retention_days,
        )
        .await?;
        println!(
            "Purged {} log files (> {}d) and {} backups (> {}d).",
            purged.logs, settings.log_retention_days, purged.backups, settings.backup_retention_days
        );
        return Ok(RunOutcome::Success);
    }

    let devices = load_inventory(&layout.inventory_file()).await?;
    info!("Loaded {} devices", devices.len());

    if matches!(request.mode, Mode::Deploy | Mode::GenerateOnly) {
        let renderer = TemplateRenderer::load(&layout.templates_dir(), &settings.templates).await?;
        let written = render_all(&renderer, &devices, &layout).await?;
        if request.mode == Mode::GenerateOnly {
            println!(
                "Generated {} device configs in {}",
                written.len(),
                layout.configs_dir().path().display()
            );
            return Ok(RunOutcome::Success);
        }
    }

    let options = DeployOptions::from_settings(layout.clone(), settings, request.password)?;
    let orchestrator = Orchestrator::new(TaskContext::new(options, request.connector));

    match request.mode {
        Mode::Plan => {
            let plans = orchestrator.plan(&devices, request.max_workers).await?;
            print!("{}", render_plan(&plans));
            let clean = plans.iter().all(|p| p.error.is_none() && !p.has_changes());
            return Ok(RunOutcome::from_flag(clean));
        }
        Mode::Backup => {
            layout.backups_dir().create().await?;
            let outcomes = orchestrator.backup(&devices, request.max_workers).await?;
            print!("{}", render_backups(&outcomes));
            return Ok(RunOutcome::from_flag(outcomes.iter().all(|o| o.ok())));
        }
        Mode::Validate => {
            layout.logs_dir().create().await?;
            let outcomes = orchestrator.validate(&devices, request.max_workers).await?;
            print!("{}", render_validations(&outcomes));
            if outcomes.iter().all(|o| o.ok()) {
                return Ok(RunOutcome::Success);
            }
            return Ok(RunOutcome::ValidationFailed);
        }
        _ => {}
    }

    layout.setup().await?;
    let started_at = Utc::now();
    let results = orchestrator.run(&devices, request.max_workers).await?;
    let summary = RunSummary::new(started_at, results);

    print!("{}", render_table(&summary.results));
    println!("{}", render_summary(&summary));
    match summary.write_json(&layout.logs_dir()).await {
        Ok(path) => info!("Run report written to {}", path.display()),
        Err(e) => warn!("Could not write run report: {}", e),
    }

    Ok(RunOutcome::from_flag(summary.all_ok()))
}
