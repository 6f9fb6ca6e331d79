//! Instance records
//!
//! An instance is a named configuration of a descriptor that can be started
//! and stopped independently. [`Instance`] is the in-memory form holding the
//! resolved descriptor key; [`InstanceRecord`] is what gets persisted, with
//! the implementation type name kept as a plain string so it survives
//! renames of the connector.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::now_ms;
use crate::keys::DescriptorKey;
use crate::storage::HasId;

/// Default schedule interval for new instances of schedule-driven descriptors
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(15 * 60);

/// A configured instance of a descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    //=== Identity ===
    /// Unique identifier (`Heartbeat__1f0c2a9e_...`)
    pub id: String,

    /// Descriptor this instance configures; immutable once created
    pub descriptor: DescriptorKey,

    /// View the instance renders through
    pub view: String,

    //=== Editable ===
    pub name: String,
    pub enabled: bool,

    /// Schedule interval, only meaningful for schedule-driven descriptors
    pub frequency: Option<Duration>,

    /// Property and data item values, keyed by declared name
    pub properties: BTreeMap<String, String>,

    //=== Audit ===
    pub created_by: String,
    pub last_modified_by: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Instance {
    /// Create a new, disabled instance.
    pub fn new(
        id: impl Into<String>,
        descriptor: DescriptorKey,
        view: impl Into<String>,
        name: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let created_by = created_by.into();
        let now = now_ms();
        Self {
            id: id.into(),
            descriptor,
            view: view.into(),
            name: name.into(),
            enabled: false,
            frequency: None,
            properties: BTreeMap::new(),
            last_modified_by: created_by.clone(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Rebuild an instance from its persisted record and resolved key.
    pub fn from_record(record: InstanceRecord, descriptor: DescriptorKey) -> Self {
        Self {
            id: record.id,
            descriptor,
            view: record.view,
            name: record.name,
            enabled: record.enabled,
            frequency: record.frequency_ms.map(Duration::from_millis),
            properties: record.properties,
            created_by: record.created_by,
            last_modified_by: record.last_modified_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// Persisted form of this instance.
    pub fn to_record(&self) -> InstanceRecord {
        InstanceRecord {
            id: self.id.clone(),
            implementation: self
                .descriptor
                .is_implementation()
                .then(|| self.descriptor.sub_key().to_string()),
            view: self.view.clone(),
            name: self.name.clone(),
            enabled: self.enabled,
            frequency_ms: self.frequency.map(|f| f.as_millis() as u64),
            properties: self.properties.clone(),
            created_by: self.created_by.clone(),
            last_modified_by: self.last_modified_by.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Apply the editable fields of an update. Identity and descriptor stay.
    pub fn apply(&mut self, update: &InstanceUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(frequency) = update.frequency {
            self.frequency = Some(frequency);
        }
        for (name, value) in &update.properties {
            self.properties.insert(name.clone(), value.clone());
        }
        for name in &update.cleared_properties {
            self.properties.remove(name);
        }
        self.touch(&update.modified_by);
    }

    /// Update the modification audit fields.
    pub fn touch(&mut self, modified_by: &str) {
        self.last_modified_by = modified_by.to_string();
        self.updated_at = now_ms();
    }
}

/// Persisted shape of an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,

    /// Fully-qualified implementation type name, absent for view-only instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,

    pub view: String,
    pub name: String,
    pub enabled: bool,

    /// Schedule interval in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_ms: Option<u64>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    pub created_by: String,
    pub last_modified_by: String,

    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl HasId for InstanceRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Changes to the editable fields of an instance
#[derive(Debug, Clone, Default)]
pub struct InstanceUpdate {
    pub id: String,
    pub modified_by: String,
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub frequency: Option<Duration>,
    /// Values to set; merged into the existing values
    pub properties: BTreeMap<String, String>,
    /// Values to remove
    pub cleared_properties: Vec<String>,
}

impl InstanceUpdate {
    pub fn new(id: impl Into<String>, modified_by: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            modified_by: modified_by.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn clear_property(mut self, name: impl Into<String>) -> Self {
        self.cleared_properties.push(name.into());
        self
    }
}

/// Projected run state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// No running handle
    Stopped,
    /// Running handle present and healthy
    Running,
    /// Running handle present but the implementation gave up
    Failed,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Running => "running",
            InstanceStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}
