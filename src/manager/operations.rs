//! Administrative and bulk operations on top of the lifecycle state machine.

use std::sync::{Arc, PoisonError};

use log::{debug, error, info, warn};

use super::lifecycle::{InstanceManager, UpdateListener};
use crate::domain::{Instance, InstanceStatus, InstanceUpdate};
use crate::error::{Result, SourcedError};
use crate::id::{generate_instance_id, generate_instance_name};
use crate::keys::DescriptorKey;

/// Per-instance failures of a bulk operation
pub type BatchFailures = Vec<(String, SourcedError)>;

impl InstanceManager {
    /// Create, persist and register a new instance of a descriptor.
    ///
    /// The instance starts out disabled, with the descriptor's default values
    /// and, for schedule-driven descriptors, the default frequency.
    pub fn create_instance(&self, descriptor_key: &DescriptorKey, created_by: &str) -> Result<Instance> {
        let descriptor = self.inner.catalog.get(descriptor_key)?;
        let prefix = if descriptor.has_implementation() {
            descriptor_key.simple_name()
        } else {
            descriptor.view()
        };

        let existing: Vec<String> = self.instances().into_iter().map(|i| i.name).collect();
        let name = generate_instance_name(descriptor.display_name(), existing.iter().map(String::as_str));

        let mut instance = Instance::new(
            generate_instance_id(prefix),
            descriptor_key.clone(),
            descriptor.view(),
            name,
            created_by,
        );
        if descriptor.is_scheduled() {
            instance.frequency = Some(self.inner.config.default_frequency);
        }
        instance.properties = descriptor.default_values();

        self.register(instance.clone())?;
        if let Err(e) = self.inner.storage.save_instance(&instance.to_record()) {
            self.unregister(&instance.id)?;
            return Err(e);
        }
        info!("Created instance {} ({}) by {}", instance.id, descriptor_key, created_by);
        Ok(instance)
    }

    /// Merge editable fields, persist, and bring the running state in line.
    ///
    /// A running instance that stays enabled is restarted synchronously so the
    /// new configuration takes effect; one that becomes disabled is stopped.
    /// Concurrent updates of one instance are last-writer-wins. Update
    /// listeners fire only when the instance was restarted.
    pub fn update_instance(&self, update: InstanceUpdate) -> Result<Instance> {
        let (updated, restarted) = self.apply_update(&update)?;
        if restarted {
            // outside the monitor so listeners may call back into the manager
            self.notify_updated(&updated);
        }
        Ok(updated)
    }

    /// Returns the updated instance and whether it was restarted.
    fn apply_update(&self, update: &InstanceUpdate) -> Result<(Instance, bool)> {
        let id = update.id.as_str();
        let slot = self.slot(id)?;
        let _guard = slot.lock();

        let mut updated = slot.instance().clone();
        updated.apply(update);

        let descriptor = self.inner.catalog.get(&updated.descriptor)?;
        descriptor.validate_values(&updated.properties)?;
        // persisted in whole milliseconds
        if updated.frequency.is_some_and(|f| f.as_millis() == 0) {
            return Err(SourcedError::InvalidProperty {
                name: "frequency".to_string(),
                reason: "must be at least 1ms".to_string(),
            });
        }

        self.inner.storage.save_instance(&updated.to_record())?;
        *slot.instance_mut() = updated.clone();
        debug!("Updated instance {} by {}", id, update.modified_by);

        let mut restarted = false;
        if self.is_running(id) {
            self.stop_locked(id, &slot)?;
            if updated.enabled {
                self.start_locked(id, &slot)?;
                restarted = true;
            }
        }
        Ok((updated, restarted))
    }

    pub fn enable(&self, id: &str, modified_by: &str) -> Result<Instance> {
        self.update_instance(InstanceUpdate::new(id, modified_by).with_enabled(true))
    }

    /// Disable an instance, stopping it if it is running.
    pub fn disable(&self, id: &str, modified_by: &str) -> Result<Instance> {
        self.update_instance(InstanceUpdate::new(id, modified_by).with_enabled(false))
    }

    /// Stop if running, then remove from storage and the registry.
    ///
    /// Dashboard references are not checked here; see `DashboardController`.
    pub fn delete_instance(&self, id: &str) -> Result<Instance> {
        let slot = self.slot(id)?;
        let _guard = slot.lock();

        if self.is_running(id) {
            self.stop_locked(id, &slot)?;
        }
        match self.inner.storage.delete_instance(id) {
            Ok(()) | Err(SourcedError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        let instance = self.remove_locked(id, &slot)?;
        info!("Deleted instance {}", id);
        Ok(instance)
    }

    /// Subscribe to instance updates.
    pub fn on_update(&self, listener: UpdateListener) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn notify_updated(&self, instance: &Instance) {
        let listeners: Vec<UpdateListener> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(instance);
        }
    }

    //=== Bulk ===

    /// Start every enabled, implementation-backed instance that is not running.
    ///
    /// Starts run in parallel on the pool; failures are logged and returned
    /// without aborting the batch.
    pub fn start_all(&self) -> BatchFailures {
        let candidates: Vec<String> = self
            .instances()
            .into_iter()
            .filter(|i| i.enabled && !self.is_running(&i.id) && self.has_implementation(i))
            .map(|i| i.id)
            .collect();
        info!("Starting {} instances", candidates.len());

        let tasks: Vec<_> = candidates
            .into_iter()
            .map(|id| {
                let manager = self.clone();
                let task_id = id.clone();
                (id, self.inner.pool.submit(move || manager.start(&task_id)))
            })
            .collect();

        let mut failures = Vec::new();
        for (id, task) in tasks {
            match task.and_then(|t| t.wait()).and_then(|outcome| outcome) {
                Ok(()) | Err(SourcedError::AlreadyRunning(_)) => {}
                Err(e) => {
                    error!("Unable to start instance {}: {}", id, e);
                    failures.push((id, e));
                }
            }
        }
        failures
    }

    /// Stop every running instance.
    pub fn stop_all(&self) -> BatchFailures {
        let mut failures = Vec::new();
        for id in self.running_ids() {
            match self.stop(&id) {
                Ok(()) | Err(SourcedError::NotRunning(_)) | Err(SourcedError::NotFound(_)) => {}
                Err(e) => {
                    error!("Unable to stop instance {}: {}", id, e);
                    failures.push((id, e));
                }
            }
        }
        failures
    }

    /// Nightly maintenance: restart instances whose implementation gave up and
    /// start enabled ones that are not running.
    pub fn restart_failed(&self) -> BatchFailures {
        let mut failures = Vec::new();
        for instance in self.instances() {
            let id = instance.id.as_str();
            let outcome = match self.status(id) {
                Ok(InstanceStatus::Failed) => {
                    info!("Restarting failed instance {}", id);
                    self.restart(id, true)
                }
                Ok(InstanceStatus::Stopped) if instance.enabled && self.has_implementation(&instance) => {
                    info!("Starting stopped instance {}", id);
                    self.start(id)
                }
                _ => Ok(()),
            };
            match outcome {
                Ok(()) | Err(SourcedError::AlreadyRunning(_)) | Err(SourcedError::NotFound(_)) => {}
                Err(e) => {
                    warn!("Nightly restart of {} failed: {}", id, e);
                    failures.push((id.to_string(), e));
                }
            }
        }
        failures
    }

    /// Queue a restart of every running instance that references the shared
    /// object `reference_id` of `reference_type`. Returns the affected ids.
    pub fn restart_instances_using(&self, reference_type: &str, reference_id: &str) -> Result<Vec<String>> {
        let mut restarted = Vec::new();
        for instance in self.instances() {
            if !self.is_running(&instance.id) {
                continue;
            }
            let descriptor = self.inner.catalog.get(&instance.descriptor)?;
            let uses = descriptor
                .references_to(reference_type)
                .into_iter()
                .any(|name| instance.properties.get(name).map(String::as_str) == Some(reference_id));
            if uses {
                self.restart(&instance.id, false)?;
                restarted.push(instance.id);
            }
        }
        if !restarted.is_empty() {
            info!(
                "Restarting {} instances using {} {}",
                restarted.len(),
                reference_type,
                reference_id
            );
        }
        Ok(restarted)
    }

    //=== Loading ===

    /// Register every persisted instance (not started).
    ///
    /// Implementation names are resolved with rename detection; when a rename
    /// was detected the stored records are rewritten to the new name.
    /// Instances that cannot be resolved or registered are logged and skipped.
    /// Returns the number of instances registered.
    pub fn load_from_storage(&self) -> Result<usize> {
        let storage = Arc::clone(&self.inner.storage);
        let mut loaded = 0;
        for id in storage.list_instance_ids()? {
            let record = storage.load_instance(&id)?;
            let resolution = match self
                .inner
                .resolver
                .resolve_parts(record.implementation.as_deref(), &record.view)
            {
                Ok(resolution) => resolution,
                Err(e) => {
                    error!("Unable to load instance {}: {}", id, e);
                    continue;
                }
            };

            if let Some(old) = record.implementation.as_deref().filter(|_| resolution.is_renamed()) {
                storage.rename_implementation(old, resolution.key.sub_key())?;
            }

            match self.register(Instance::from_record(record, resolution.key)) {
                Ok(()) => loaded += 1,
                Err(e) => error!("Unable to register instance {}: {}", id, e),
            }
        }
        info!("Loaded {} instances from storage", loaded);
        Ok(loaded)
    }

    fn has_implementation(&self, instance: &Instance) -> bool {
        self.inner
            .catalog
            .get(&instance.descriptor)
            .is_ok_and(|d| d.has_implementation())
    }
}
