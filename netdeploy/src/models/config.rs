//! Configuration line models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker that starts a comment line in rendered configs
pub const COMMENT_MARKER: char = '#';

/// A single normalized configuration statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigLine(String);

impl ConfigLine {
    /// Build a line from raw text, trimming surrounding whitespace
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    /// Normalize a raw line, returning `None` for blank and comment lines
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split command output into trimmed lines, keeping order.
///
/// Used for the running side, where blank lines are harmless since they never
/// equal a meaningful intended line.
pub fn running_lines(text: &str) -> Vec<ConfigLine> {
    text.lines().map(ConfigLine::new).collect()
}

/// Parse a rendered artifact into its meaningful lines, in file order
pub fn intended_lines(text: &str) -> Vec<ConfigLine> {
    text.lines().filter_map(ConfigLine::parse).collect()
}
