//! View manifests
//!
//! One YAML file per view:
//!
//! ```yaml
//! view: clock
//! display_name: Clock
//! description: Current time in a configurable zone
//! standalone: true
//! data_items:
//!   - name: zone
//!     title: Time zone
//!     type: text
//! ```

use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::property::PropertyDescriptor;
use crate::error::{Result, SourcedError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewManifest {
    pub view: String,
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Usable without a backing implementation
    #[serde(default)]
    pub standalone: bool,

    #[serde(default)]
    pub data_items: Vec<PropertyDescriptor>,
}

impl ViewManifest {
    pub fn new(view: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            display_name: display_name.into(),
            description: None,
            standalone: false,
            data_items: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn standalone(mut self) -> Self {
        self.standalone = true;
        self
    }

    pub fn with_data_item(mut self, item: PropertyDescriptor) -> Self {
        self.data_items.push(item);
        self
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: ViewManifest = serde_yaml::from_str(content)?;
        if manifest.view.trim().is_empty() {
            return Err(SourcedError::Catalog("view manifest without view id".to_string()));
        }
        Ok(manifest)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| SourcedError::Catalog(format!("Failed to load view {}: {}", path.display(), e)))
    }
}

/// Load every `*.yml` / `*.yaml` manifest in `dir`, sorted by file name.
///
/// A missing directory yields no manifests.
pub fn load_view_manifests(dir: impl AsRef<Path>) -> Result<Vec<ViewManifest>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        debug!("No view directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yml" || e == "yaml");
        if path.is_file() && is_yaml {
            paths.push(path);
        }
    }
    paths.sort();

    let manifests = paths
        .iter()
        .map(ViewManifest::from_file)
        .collect::<Result<Vec<_>>>()?;
    info!("Loaded {} view manifests from {}", manifests.len(), dir.display());
    Ok(manifests)
}
