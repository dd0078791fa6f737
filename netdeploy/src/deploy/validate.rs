//! Post-change validation.
//!
//! Validation produces evidence for a human rather than acting as a gate:
//! a check whose expected signature is missing (a core router without a
//! default route, a device not running BGP) only adds a note. The verdict
//! fails solely when the session cannot execute a diagnostic command.

use chrono::Utc;
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::result::ValidationReport;
use crate::session::Session;
use crate::utils::file_stamp;

/// One read-only diagnostic command
#[derive(Debug, Clone)]
pub struct Check {
    pub command: &'static str,

    /// Any of these (case-insensitive) in the output counts as healthy
    pub signatures: &'static [&'static str],

    /// Recorded in the evidence when no signature matches
    pub note: &'static str,
}

impl Check {
    fn matches(&self, output: &str) -> bool {
        let output = output.to_lowercase();
        self.signatures
            .iter()
            .any(|sig| output.contains(&sig.to_lowercase()))
    }
}

/// Routing-protocol neighbors, BGP sessions, default route
pub const DEFAULT_CHECKS: &[Check] = &[
    Check {
        command: "show ip ospf neighbor",
        signatures: &["Full", "Neighbor ID"],
        note: "no OSPF adjacency reported (device may not run OSPF)",
    },
    Check {
        command: "show ip bgp summary",
        signatures: &["Estab", "state"],
        note: "no BGP session summary reported (device may not run BGP)",
    },
    Check {
        command: "show ip route 0.0.0.0/0",
        signatures: &["0.0.0.0/0"],
        note: "no default route present (expected on core nodes)",
    },
];

/// Runs a fixed battery of diagnostics
#[derive(Debug, Clone)]
pub struct Validator {
    checks: Vec<Check>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKS.to_vec())
    }
}

impl Validator {
    pub fn new(checks: Vec<Check>) -> Self {
        Self { checks }
    }

    /// Run every check in order and collect the evidence
    pub async fn run(&self, device: &str, session: &mut dyn Session) -> ValidationReport {
        let mut sections = Vec::with_capacity(self.checks.len());
        let mut ok = true;

        for check in &self.checks {
            match session.execute_command(check.command).await {
                Ok(output) => {
                    let mut section = format!("\n$ {}\n{}", check.command, output.trim_end());
                    if !check.matches(&output) {
                        debug!("[{}] soft check '{}': {}", device, check.command, check.note);
                        section.push_str(&format!("\n# note: {}", check.note));
                    }
                    sections.push(section);
                }
                Err(e) => {
                    warn!("[{}] validation command '{}' failed: {}", device, check.command, e);
                    sections.push(format!("\n$ {}\n# error: {}", check.command, e));
                    ok = false;
                    break;
                }
            }
        }

        ValidationReport {
            ok,
            evidence: sections.join("\n"),
            log_path: None,
        }
    }
}

/// Persist `report` as `<device>.<stamp>.validate.log` under `dir`
pub async fn write_log(
    dir: &Dir,
    device: &str,
    report: &mut ValidationReport,
) -> Result<(), DeployError> {
    let file = dir.file(&format!("{}.{}.validate.log", device, file_stamp(&Utc::now())));
    let verdict = if report.ok { "PASS" } else { "FLAGGED" };
    file.write_string(&format!("# {} validation: {}\n{}\n", device, verdict, report.evidence))
        .await?;
    report.log_path = Some(file.path().to_path_buf());
    Ok(())
}
