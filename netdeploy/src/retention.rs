//! Retention of logs and backups

use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::storage::layout::StorageLayout;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Delete files in `dir` last modified more than `days` days ago.
///
/// A missing directory counts as empty. Files that cannot be removed are
/// skipped. Returns the number of files deleted.
pub async fn purge_older_than(dir: &Dir, days: u64) -> Result<usize, DeployError> {
    if !dir.exists().await {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for (path, modified) in dir.list_files().await? {
        if modified >= cutoff {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Purged {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Could not purge {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

/// Counts of files removed by [`cleanup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSummary {
    pub logs: usize,
    pub backups: usize,
}

/// Apply both retention windows to the project layout
pub async fn cleanup(
    layout: &StorageLayout,
    log_days: u64,
    backup_days: u64,
) -> Result<PurgeSummary, DeployError> {
    let logs = purge_older_than(&layout.logs_dir(), log_days).await?;
    let backups = purge_older_than(&layout.backups_dir(), backup_days).await?;
    info!(
        "Purged {} log files (> {}d) and {} backups (> {}d)",
        logs, log_days, backups, backup_days
    );
    Ok(PurgeSummary { logs, backups })
}
