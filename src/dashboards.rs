//! Dashboards and reference-aware instance deletion

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{info, warn};

use crate::domain::{Dashboard, Instance, Widget};
use crate::error::{Result, SourcedError};
use crate::manager::InstanceManager;

/// Outcome of [`DashboardController::delete_instance`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The instance was stopped if needed and removed
    Deleted(Instance),
    /// Nothing was deleted; these dashboards still show the instance
    InUse(Vec<String>),
}

/// Keeps the dashboards and guards instance deletion against dangling widgets.
pub struct DashboardController {
    manager: InstanceManager,
    dashboards: RwLock<BTreeMap<String, Dashboard>>,
}

impl DashboardController {
    /// Create a controller with the dashboards persisted in the manager's storage.
    pub fn load(manager: InstanceManager) -> Result<Self> {
        let dashboards: BTreeMap<String, Dashboard> = manager
            .storage()
            .list_dashboards()?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        info!("Loaded {} dashboards", dashboards.len());
        Ok(Self {
            manager,
            dashboards: RwLock::new(dashboards),
        })
    }

    pub fn manager(&self) -> &InstanceManager {
        &self.manager
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Dashboard>> {
        self.dashboards.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Dashboard>> {
        self.dashboards.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_dashboard(&self, id: &str, title: &str, owner: &str) -> Result<Dashboard> {
        let mut dashboards = self.write();
        if dashboards.contains_key(id) {
            return Err(SourcedError::Conflict(format!("dashboard {} already exists", id)));
        }
        let dashboard = Dashboard::new(id, title, owner);
        self.manager.storage().save_dashboard(&dashboard)?;
        dashboards.insert(id.to_string(), dashboard.clone());
        Ok(dashboard)
    }

    pub fn dashboard(&self, id: &str) -> Result<Dashboard> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| SourcedError::NotFound(format!("dashboard {}", id)))
    }

    /// All dashboards, sorted by id
    pub fn dashboards(&self) -> Vec<Dashboard> {
        self.read().values().cloned().collect()
    }

    pub fn delete_dashboard(&self, id: &str) -> Result<Dashboard> {
        let mut dashboards = self.write();
        if !dashboards.contains_key(id) {
            return Err(SourcedError::NotFound(format!("dashboard {}", id)));
        }
        self.manager.storage().delete_dashboard(id)?;
        dashboards
            .remove(id)
            .ok_or_else(|| SourcedError::NotFound(format!("dashboard {}", id)))
    }

    /// Place an existing instance on a dashboard; returns the widget id.
    pub fn add_widget(&self, dashboard_id: &str, instance_id: &str, title: &str) -> Result<u32> {
        // checked under the write lock so a concurrent delete cannot slip in between
        self.modify(dashboard_id, |dashboard| {
            if !self.manager.contains(instance_id) {
                return Err(SourcedError::NotFound(format!("instance {}", instance_id)));
            }
            Ok(dashboard.add_widget(instance_id, title))
        })
    }

    pub fn remove_widget(&self, dashboard_id: &str, widget_id: u32) -> Result<Widget> {
        self.modify(dashboard_id, |dashboard| {
            dashboard
                .remove_widget(widget_id)
                .ok_or_else(|| SourcedError::NotFound(format!("widget {} on {}", widget_id, dashboard_id)))
        })
    }

    /// Apply `change` to a copy of the dashboard, persist it, then publish it.
    fn modify<T>(&self, dashboard_id: &str, change: impl FnOnce(&mut Dashboard) -> Result<T>) -> Result<T> {
        let mut dashboards = self.write();
        let current = dashboards
            .get(dashboard_id)
            .ok_or_else(|| SourcedError::NotFound(format!("dashboard {}", dashboard_id)))?;

        let mut dashboard = current.clone();
        let outcome = change(&mut dashboard)?;
        self.manager.storage().save_dashboard(&dashboard)?;
        dashboards.insert(dashboard_id.to_string(), dashboard);
        Ok(outcome)
    }

    /// Ids of the dashboards with a widget showing the instance, sorted.
    pub fn dashboards_using(&self, instance_id: &str) -> Vec<String> {
        self.read()
            .values()
            .filter(|d| d.uses(instance_id))
            .map(|d| d.id.clone())
            .collect()
    }

    /// Delete an instance unless dashboards still show it.
    ///
    /// Without `force`, a referenced instance is left intact and the
    /// referencing dashboard ids are returned. With `force`, the widgets are
    /// removed first. A running instance is stopped before removal.
    pub fn delete_instance(&self, instance_id: &str, force: bool) -> Result<DeleteOutcome> {
        // fail with NotFound before touching any dashboard
        self.manager.instance(instance_id)?;

        let using = self.dashboards_using(instance_id);
        if !using.is_empty() && !force {
            info!(
                "Instance {} is still used by dashboards {}",
                instance_id,
                using.join(", ")
            );
            return Ok(DeleteOutcome::InUse(using));
        }

        // stop outside the dashboard lock; a hung stop only stalls this id
        match self.manager.stop(instance_id) {
            Ok(()) | Err(SourcedError::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }

        // held until removal so no widget for the instance appears meanwhile
        let mut dashboards = self.write();
        let using: Vec<String> = dashboards
            .values()
            .filter(|d| d.uses(instance_id))
            .map(|d| d.id.clone())
            .collect();

        if !using.is_empty() {
            if !force {
                // a widget was added while stopping; the instance stays, stopped
                warn!(
                    "Instance {} was placed on dashboards {} during deletion",
                    instance_id,
                    using.join(", ")
                );
                return Ok(DeleteOutcome::InUse(using));
            }
            for id in &using {
                if let Some(dashboard) = dashboards.get(id) {
                    let mut dashboard = dashboard.clone();
                    let removed = dashboard.remove_widgets_of(instance_id);
                    self.manager.storage().save_dashboard(&dashboard)?;
                    info!("Removed {} widgets of {} from dashboard {}", removed, instance_id, id);
                    dashboards.insert(id.clone(), dashboard);
                }
            }
        }

        let instance = self.manager.delete_instance(instance_id)?;
        Ok(DeleteOutcome::Deleted(instance))
    }
}
