//! Project `.env` file.
//!
//! Values are kept in memory rather than exported into the process
//! environment. Variables already set in the environment take precedence.

use std::collections::HashMap;

use crate::errors::DeployError;
use crate::filesys::file::File;

/// Key lookup over the process environment, then the project `.env`
#[derive(Debug, Clone, Default)]
pub struct DotEnv {
    values: HashMap<String, String>,
}

impl DotEnv {
    /// Read `file` if it exists; a missing file yields an empty set
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        let text = file.read_string().await?;
        Self::parse(&text)
            .map_err(|e| DeployError::ConfigError(format!("{}: {}", file.path().display(), e)))
    }

    /// Parse `.env` syntax (quotes, comments, `export`, `${VAR}` expansion)
    pub fn parse(text: &str) -> Result<Self, dotenvy::Error> {
        let values = dotenvy::from_read_iter(text.as_bytes()).collect::<Result<_, _>>()?;
        Ok(Self { values })
    }

    /// Number of entries read from the file
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.values.get(key).cloned())
    }
}
