//! Operator-maintained table of explicit implementation renames.
//!
//! The file is a flat YAML mapping from the old fully-qualified type name to
//! the new one:
//!
//! ```yaml
//! acme.exchange.ExchangeMailSource: acme.mail.MailboxSource
//! ```

use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};

use crate::error::Result;

/// Lookup of the replacement for a renamed implementation
pub trait RenameTable: Send + Sync {
    /// New fully-qualified type name for `old`, if the operator recorded one.
    fn lookup(&self, old: &str) -> Option<String>;
}

/// Rename table held in memory, optionally loaded from a YAML file
#[derive(Debug, Clone, Default)]
pub struct StaticRenameTable {
    renames: HashMap<String, String>,
}

impl StaticRenameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table from a YAML file. A missing file yields an empty table.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No rename table at {}", path.display());
            return Ok(Self::new());
        }

        info!("Class renaming table exists. Loading {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let table = Self::from_yaml(&content)?;
        info!("Found {} class renaming instructions", table.len());
        Ok(table)
    }

    /// Parse the table from YAML. An empty document yields an empty table.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        let renames: HashMap<String, String> = serde_yaml::from_str(content)?;
        Ok(Self { renames })
    }

    /// Record a rename.
    pub fn with_rename(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.renames.insert(old.into(), new.into());
        self
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

impl RenameTable for StaticRenameTable {
    fn lookup(&self, old: &str) -> Option<String> {
        self.renames.get(old).cloned()
    }
}
