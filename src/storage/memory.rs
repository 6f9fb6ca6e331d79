//! In-memory storage, for tests and embedding.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::traits::Storage;
use crate::domain::{Dashboard, InstanceRecord};
use crate::error::{Result, SourcedError};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    instances: RwLock<BTreeMap<String, InstanceRecord>>,
    dashboards: RwLock<BTreeMap<String, Dashboard>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn load_instance(&self, id: &str) -> Result<InstanceRecord> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| SourcedError::NotFound(format!("instance {}", id)))
    }

    fn save_instance(&self, record: &InstanceRecord) -> Result<()> {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete_instance(&self, id: &str) -> Result<()> {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SourcedError::NotFound(format!("instance {}", id)))
    }

    fn list_instance_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn rename_implementation(&self, old: &str, new: &str) -> Result<usize> {
        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        let mut renamed = 0;
        for record in instances.values_mut() {
            if record.implementation.as_deref() == Some(old) {
                record.implementation = Some(new.to_string());
                renamed += 1;
            }
        }
        Ok(renamed)
    }

    fn list_dashboards(&self) -> Result<Vec<Dashboard>> {
        Ok(self
            .dashboards
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }

    fn save_dashboard(&self, dashboard: &Dashboard) -> Result<()> {
        self.dashboards
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dashboard.id.clone(), dashboard.clone());
        Ok(())
    }

    fn delete_dashboard(&self, id: &str) -> Result<()> {
        self.dashboards
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SourcedError::NotFound(format!("dashboard {}", id)))
    }
}
