//! Storage trait definitions and filter types.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Dashboard, InstanceRecord};
use crate::error::Result;

/// Equality filter on a top-level record field.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Field name to filter on
    pub field: String,
    /// Value to compare against
    pub value: serde_json::Value,
}

impl Filter {
    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            value: serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Check if a record matches this filter. A missing field matches null.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        match record.get(&self.field) {
            Some(v) => *v == self.value,
            None => self.value.is_null(),
        }
    }
}

/// Trait for records that have an ID field.
pub trait HasId {
    /// Get the record's unique identifier.
    fn id(&self) -> &str;
}

/// Persistence collaborator for instances and dashboards.
pub trait Storage: Send + Sync {
    /// Load one instance record. Fails with `NotFound` if absent.
    fn load_instance(&self, id: &str) -> Result<InstanceRecord>;

    /// Insert or replace an instance record.
    fn save_instance(&self, record: &InstanceRecord) -> Result<()>;

    /// Delete an instance record. Fails with `NotFound` if absent.
    fn delete_instance(&self, id: &str) -> Result<()>;

    /// Ids of all persisted instances.
    fn list_instance_ids(&self) -> Result<Vec<String>>;

    /// Raw property values of one instance.
    fn get_property_strings(&self, id: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.load_instance(id)?.properties)
    }

    /// Point every record of implementation `old` at `new`; returns how many changed.
    fn rename_implementation(&self, old: &str, new: &str) -> Result<usize>;

    /// All persisted dashboards.
    fn list_dashboards(&self) -> Result<Vec<Dashboard>>;

    /// Insert or replace a dashboard.
    fn save_dashboard(&self, dashboard: &Dashboard) -> Result<()>;

    /// Delete a dashboard. Fails with `NotFound` if absent.
    fn delete_dashboard(&self, id: &str) -> Result<()>;
}
