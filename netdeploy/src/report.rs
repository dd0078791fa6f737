//! Rendering of deployment outcomes

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::result::{BackupOutcome, DeployResult, PlanResult, ValidationOutcome};
use crate::utils::{file_stamp, generate_uuid};

/// Aggregate of one deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub changed: usize,
    pub failed: usize,
    pub results: Vec<DeployResult>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, results: Vec<DeployResult>) -> Self {
        Self {
            run_id: generate_uuid(),
            started_at,
            finished_at: Utc::now(),
            total: results.len(),
            changed: results.iter().filter(|r| r.changed).count(),
            failed: results.iter().filter(|r| !r.ok).count(),
            results,
        }
    }

    /// True when every device reported ok
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }

    /// Persist as `run-<stamp>.json` under `dir`
    pub async fn write_json(&self, dir: &Dir) -> Result<PathBuf, DeployError> {
        let file = dir.file(&format!("run-{}.json", file_stamp(&self.started_at)));
        file.write_json(self).await?;
        Ok(file.path().to_path_buf())
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Device / Host / Changed / OK / Message table
pub fn render_table(results: &[DeployResult]) -> String {
    let name_w = results.iter().map(|r| r.name.len()).max().unwrap_or(0).max("Device".len());
    let host_w = results.iter().map(|r| r.host.len()).max().unwrap_or(0).max("Host".len());

    let mut out = format!(
        "{:<name_w$}  {:<host_w$}  {:<7}  {:<3}  {}\n",
        "Device".bold(),
        "Host".bold(),
        "Changed".bold(),
        "OK".bold(),
        "Message".bold(),
    );

    for r in results {
        let changed = format!("{:<7}", yes_no(r.changed));
        let ok = format!("{:<3}", yes_no(r.ok));
        let ok = if r.ok { ok.green() } else { ok.red() };
        let changed = if r.changed { changed.yellow() } else { changed.normal() };
        out.push_str(&format!(
            "{:<name_w$}  {:<host_w$}  {}  {}  {}\n",
            r.name, r.host, changed, ok, r.message
        ));
    }
    out
}

/// One line of totals
pub fn render_summary(summary: &RunSummary) -> String {
    let line = format!(
        "{} devices, {} changed, {} not ok",
        summary.total, summary.changed, summary.failed
    );
    if summary.all_ok() {
        line.green().to_string()
    } else {
        line.red().to_string()
    }
}

/// Dry-run listing: lines to add, and running-only lines that stay in place
pub fn render_plan(plans: &[PlanResult]) -> String {
    let mut out = String::new();
    for plan in plans {
        out.push_str(&format!("\n=== {} ({}) ===\n", plan.name, plan.host).bold().to_string());
        if let Some(err) = &plan.error {
            out.push_str(&format!("{}\n", format!("error: {err}").red()));
            continue;
        }
        if plan.delta.is_empty() {
            out.push_str("No differences.\n");
        } else {
            out.push_str("Delta to apply (lines not present on device):\n");
            for line in &plan.delta {
                out.push_str(&format!("{}\n", format!("+ {line}").green()));
            }
        }
        if !plan.running_only.is_empty() {
            out.push_str("Present on device only (kept, never removed):\n");
            for line in &plan.running_only {
                out.push_str(&format!("{}\n", format!("  {line}").dimmed()));
            }
        }
    }
    out
}

/// One line per device: where its snapshot went, or why it failed
pub fn render_backups(outcomes: &[BackupOutcome]) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        let line = match (&outcome.artifact, &outcome.error) {
            (Some(artifact), None) => {
                format!("[{}] backup saved to {}", outcome.name, artifact.path.display()).normal()
            }
            (_, Some(err)) => format!("[{}] backup failed: {}", outcome.name, err).red(),
            (None, None) => format!("[{}] backup failed: no artifact", outcome.name).red(),
        };
        out.push_str(&format!("{line}
"));
    }
    out
}

/// Per-device evidence blocks followed by a PASS or FLAGGED verdict
pub fn render_validations(outcomes: &[ValidationOutcome]) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        out.push_str(&format!("\n=== {} ({}) ===\n", outcome.name, outcome.host).bold().to_string());
        if let Some(err) = &outcome.error {
            out.push_str(&format!("{}\n", format!("error: {err}").red()));
        }
        if let Some(report) = &outcome.report {
            out.push_str(report.evidence.trim_start_matches('\n'));
            out.push('\n');
        }
        let verdict = if outcome.ok() { "PASS".green() } else { "FLAGGED".red() };
        out.push_str(&format!("{verdict}\n"));
    }
    out
}
