//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of a deployment project
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Project root; every other path hangs off it
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Optional `.env` with credentials and overrides
    pub fn env_file(&self) -> File {
        File::new(self.base_dir.join(".env"))
    }

    /// Get the inventory file path
    pub fn inventory_file(&self) -> File {
        File::new(self.base_dir.join("inventory").join("lab.yml"))
    }

    /// Get the templates directory
    pub fn templates_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("templates"))
    }

    /// Get the rendered (intended) configs directory
    pub fn configs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("configs_generated"))
    }

    /// Intended-config artifact for one device
    pub fn intended_file(&self, device: &str) -> File {
        self.configs_dir().file(&format!("{device}.set"))
    }

    /// Get the backups directory
    pub fn backups_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("backups"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create output directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        self.configs_dir().create().await?;
        self.backups_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(".")
    }
}
