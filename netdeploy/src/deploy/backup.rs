//! Pre-change backups of running configurations

use chrono::{DateTime, Utc};
use tracing::info;

use crate::deploy::RUNNING_CONFIG_COMMAND;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::result::BackupArtifact;
use crate::session::Session;
use crate::utils::{file_stamp, sha256_hash};

/// Extension of backup artifacts
pub const BACKUP_EXTENSION: &str = "show";

/// Write-once store of running-config snapshots
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: Dir,
}

impl BackupStore {
    pub fn new(dir: Dir) -> Self {
        Self { dir }
    }

    /// Artifact location for `device` captured at `at`
    pub fn artifact_file(&self, device: &str, at: &DateTime<Utc>) -> File {
        self.dir
            .file(&format!("{}.{}.{}", device, file_stamp(at), BACKUP_EXTENSION))
    }

    /// Fetch the running configuration over `session` and persist it verbatim.
    ///
    /// The file is synced before this returns. An artifact already present
    /// under the same key is never overwritten.
    pub async fn capture(
        &self,
        device: &str,
        session: &mut dyn Session,
    ) -> Result<BackupArtifact, DeployError> {
        let text = session.execute_command(RUNNING_CONFIG_COMMAND).await?;
        self.store(device, &text).await
    }

    /// Persist already-fetched running-config `text` for `device`
    pub async fn store(&self, device: &str, text: &str) -> Result<BackupArtifact, DeployError> {
        let captured_at = Utc::now();
        let file = self.artifact_file(device, &captured_at);

        file.write_new(text).await.map_err(|e| match e {
            DeployError::IoError(io) if io.kind() == std::io::ErrorKind::AlreadyExists => {
                DeployError::BackupError(format!(
                    "{} already exists; refusing to overwrite",
                    file.path().display()
                ))
            }
            other => DeployError::BackupError(format!(
                "failed to write {}: {}",
                file.path().display(),
                other
            )),
        })?;

        info!("[{}] backup saved to {}", device, file.path().display());
        Ok(BackupArtifact {
            device: device.to_string(),
            captured_at,
            path: file.path().to_path_buf(),
            sha256: sha256_hash(text.as_bytes()),
        })
    }
}
