//! Instance registry and start/stop state machine
//!
//! Two levels of locking:
//! - `entries`, one process-wide `RwLock` over the id -> entry map. Status
//!   queries take the read lock; adding or removing entries and handles takes
//!   the write lock. It is never held while a backing implementation runs.
//! - a per-instance monitor serializing every lifecycle operation on one id.
//!   Always acquired before `entries`, never the other way round.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::catalog::DescriptorCatalog;
use crate::connector::{BackingImplementation, ConnectorContext, Telemetry};
use crate::domain::{DEFAULT_FREQUENCY, Instance, InstanceStatus};
use crate::error::{Result, SourcedError};
use crate::keys::IdentityResolver;
use crate::pool::{ElasticPool, PoolConfig};
use crate::storage::Storage;

/// Configuration for the InstanceManager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Pool running restarts and bulk starts
    pub pool: PoolConfig,
    /// Schedule interval of new instances of schedule-driven descriptors
    pub default_frequency: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default().with_name("sourced-lifecycle"),
            default_frequency: DEFAULT_FREQUENCY,
        }
    }
}

impl ManagerConfig {
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_default_frequency(mut self, frequency: Duration) -> Self {
        self.default_frequency = frequency;
        self
    }
}

/// Callback fired after an instance was updated
pub type UpdateListener = Arc<dyn Fn(&Instance) + Send + Sync>;

/// Configuration of one instance plus its lifecycle monitor
pub(super) struct InstanceSlot {
    monitor: Mutex<()>,
    instance: RwLock<Instance>,
}

impl InstanceSlot {
    fn new(instance: Instance) -> Self {
        Self {
            monitor: Mutex::new(()),
            instance: RwLock::new(instance),
        }
    }

    /// Enter the per-instance monitor.
    pub(super) fn lock(&self) -> MutexGuard<'_, ()> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn instance(&self) -> RwLockReadGuard<'_, Instance> {
        self.instance.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn instance_mut(&self) -> RwLockWriteGuard<'_, Instance> {
        self.instance.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A started backing implementation
struct RunningHandle {
    implementation: Box<dyn BackingImplementation>,
    started_at: DateTime<Utc>,
}

pub(super) struct Entry {
    slot: Arc<InstanceSlot>,
    handle: Option<Arc<RunningHandle>>,
}

pub(super) struct ManagerInner {
    pub(super) catalog: Arc<DescriptorCatalog>,
    pub(super) resolver: Arc<IdentityResolver>,
    pub(super) storage: Arc<dyn Storage>,
    pub(super) pool: ElasticPool,
    pub(super) config: ManagerConfig,
    pub(super) listeners: RwLock<Vec<UpdateListener>>,
    entries: RwLock<HashMap<String, Entry>>,
}

/// Owns the registry of instances and their running handles.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct InstanceManager {
    pub(super) inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for InstanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceManager")
            .field("instances", &self.entries().len())
            .field("pool", &self.inner.pool)
            .finish()
    }
}

impl InstanceManager {
    /// Create a new InstanceManager with the given dependencies
    pub fn new(
        catalog: Arc<DescriptorCatalog>,
        resolver: Arc<IdentityResolver>,
        storage: Arc<dyn Storage>,
        config: ManagerConfig,
    ) -> Self {
        let pool = ElasticPool::new(config.pool.clone());
        Self {
            inner: Arc::new(ManagerInner {
                catalog,
                resolver,
                storage,
                pool,
                config,
                listeners: RwLock::new(Vec::new()),
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn catalog(&self) -> &Arc<DescriptorCatalog> {
        &self.inner.catalog
    }

    pub fn resolver(&self) -> &Arc<IdentityResolver> {
        &self.inner.resolver
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    pub fn pool(&self) -> &ElasticPool {
        &self.inner.pool
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    fn entries(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.inner.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.inner.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn slot(&self, id: &str) -> Result<Arc<InstanceSlot>> {
        self.entries()
            .get(id)
            .map(|e| Arc::clone(&e.slot))
            .ok_or_else(|| SourcedError::NotFound(format!("instance {}", id)))
    }

    fn handle(&self, id: &str) -> Option<Arc<RunningHandle>> {
        self.entries().get(id).and_then(|e| e.handle.clone())
    }

    /// Fails with `NotFound` if `slot` is no longer the registered slot of `id`.
    fn ensure_current(&self, id: &str, slot: &Arc<InstanceSlot>) -> Result<()> {
        match self.entries().get(id) {
            Some(entry) if Arc::ptr_eq(&entry.slot, slot) => Ok(()),
            _ => Err(SourcedError::NotFound(format!("instance {}", id))),
        }
    }

    //=== Registry ===

    /// Add an instance to the registry without starting it.
    ///
    /// Fails with `Conflict` if the id is taken, `NotFound` if the descriptor
    /// is unknown and `InvalidProperty` if a value does not fit its descriptor.
    pub fn register(&self, instance: Instance) -> Result<()> {
        let descriptor = self.inner.catalog.get(&instance.descriptor)?;
        descriptor.validate_values(&instance.properties)?;

        let mut entries = self.entries_mut();
        if entries.contains_key(&instance.id) {
            return Err(SourcedError::Conflict(format!("instance {} already exists", instance.id)));
        }
        debug!("Registered instance {} ({})", instance.id, instance.descriptor);
        entries.insert(
            instance.id.clone(),
            Entry {
                slot: Arc::new(InstanceSlot::new(instance)),
                handle: None,
            },
        );
        Ok(())
    }

    /// Remove an instance from the registry, stopping it first if running.
    pub fn unregister(&self, id: &str) -> Result<Instance> {
        let slot = self.slot(id)?;
        let _guard = slot.lock();
        self.ensure_current(id, &slot)?;
        self.remove_locked(id, &slot)
    }

    /// Stop if running and drop the entry. Caller holds the monitor.
    pub(super) fn remove_locked(&self, id: &str, slot: &Arc<InstanceSlot>) -> Result<Instance> {
        if self.handle(id).is_some() {
            self.stop_locked(id, slot)?;
        }
        self.entries_mut().remove(id);
        debug!("Unregistered instance {}", id);
        Ok(slot.instance().clone())
    }

    /// Snapshot of one instance's configuration.
    pub fn instance(&self, id: &str) -> Result<Instance> {
        Ok(self.slot(id)?.instance().clone())
    }

    /// Snapshot of all instances, sorted by id.
    pub fn instances(&self) -> Vec<Instance> {
        let slots: Vec<Arc<InstanceSlot>> = self.entries().values().map(|e| Arc::clone(&e.slot)).collect();
        let mut instances: Vec<Instance> = slots.iter().map(|s| s.instance().clone()).collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances
    }

    /// Ids of all registered instances, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    //=== Lifecycle ===

    /// Start an instance and block until its implementation reports running.
    pub fn start(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let _guard = slot.lock();
        self.start_locked(id, &slot)
    }

    /// Stop an instance and block until its implementation terminated.
    pub fn stop(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let _guard = slot.lock();
        self.stop_locked(id, &slot)
    }

    /// Stop (if running) and start an instance as one task on the pool.
    ///
    /// With `wait` the caller blocks until the task finished and gets its
    /// outcome. Must not be called with `wait` from inside an async runtime.
    pub fn restart(&self, id: &str, wait: bool) -> Result<()> {
        // fail fast on unknown ids instead of inside the task
        self.slot(id)?;

        let manager = self.clone();
        let task_id = id.to_string();
        let task = self.inner.pool.submit(move || manager.restart_now(&task_id))?;
        if wait {
            task.wait()?
        } else {
            debug!("Restart of {} queued", id);
            Ok(())
        }
    }

    /// Stop and start under a single hold of the monitor.
    pub(super) fn restart_now(&self, id: &str) -> Result<()> {
        let slot = self.slot(id)?;
        let _guard = slot.lock();
        info!("Restarting instance {}", id);
        if self.handle(id).is_some() {
            self.stop_locked(id, &slot)?;
        }
        self.start_locked(id, &slot)
    }

    /// Start precondition checks and start. Caller holds the monitor.
    pub(super) fn start_locked(&self, id: &str, slot: &Arc<InstanceSlot>) -> Result<()> {
        self.ensure_current(id, slot)?;
        if self.handle(id).is_some() {
            return Err(SourcedError::AlreadyRunning(id.to_string()));
        }

        let instance = slot.instance().clone();
        if !instance.enabled {
            return Err(SourcedError::NotEnabled(id.to_string()));
        }
        let descriptor = self.inner.catalog.get(&instance.descriptor)?;
        let factory = descriptor
            .implementation()
            .ok_or_else(|| SourcedError::NoImplementation(id.to_string()))?;

        info!("Starting instance {} ({})", id, instance.descriptor);
        let frequency = descriptor
            .is_scheduled()
            .then(|| instance.frequency.unwrap_or(self.inner.config.default_frequency));
        let ctx = ConnectorContext {
            instance_id: instance.id.clone(),
            frequency,
            properties: instance.properties.clone(),
        };

        let mut implementation = factory.create();
        implementation
            .configure(&ctx)
            .map_err(|e| SourcedError::start_failed(id, &e))?;
        implementation
            .start()
            .map_err(|e| SourcedError::start_failed(id, &e))?;

        let handle = Arc::new(RunningHandle {
            implementation,
            started_at: Utc::now(),
        });
        let stored = match self.entries_mut().get_mut(id) {
            Some(entry) => {
                entry.handle = Some(Arc::clone(&handle));
                true
            }
            None => false,
        };
        if !stored {
            if let Err(e) = handle.implementation.stop() {
                warn!("Failed to stop orphaned implementation of {}: {:#}", id, e);
            }
            return Err(SourcedError::NotFound(format!("instance {}", id)));
        }
        info!("Started instance {}", id);
        Ok(())
    }

    /// Stop and drop the handle. Caller holds the monitor.
    pub(super) fn stop_locked(&self, id: &str, slot: &Arc<InstanceSlot>) -> Result<()> {
        self.ensure_current(id, slot)?;
        let handle = self
            .handle(id)
            .ok_or_else(|| SourcedError::NotRunning(id.to_string()))?;

        info!("Stopping instance {}", id);
        // a failed stop keeps the handle so the instance still reports running
        handle
            .implementation
            .stop()
            .map_err(|e| SourcedError::stop_failed(id, &e))?;

        if let Some(entry) = self.entries_mut().get_mut(id) {
            entry.handle = None;
        }
        info!("Stopped instance {}", id);
        Ok(())
    }

    //=== Projections ===

    /// Whether a running handle exists. Unknown ids are not running.
    pub fn is_running(&self, id: &str) -> bool {
        self.handle(id).is_some()
    }

    pub fn status(&self, id: &str) -> Result<InstanceStatus> {
        let handle = {
            let entries = self.entries();
            let entry = entries
                .get(id)
                .ok_or_else(|| SourcedError::NotFound(format!("instance {}", id)))?;
            entry.handle.clone()
        };
        Ok(match handle {
            None => InstanceStatus::Stopped,
            Some(h) if h.implementation.has_failed() => InstanceStatus::Failed,
            Some(_) => InstanceStatus::Running,
        })
    }

    /// Telemetry of a running instance, if its implementation records any.
    pub fn telemetry(&self, id: &str) -> Option<Telemetry> {
        self.handle(id).and_then(|h| h.implementation.telemetry())
    }

    pub fn last_run(&self, id: &str) -> Option<DateTime<Utc>> {
        self.telemetry(id).and_then(|t| t.last_run)
    }

    pub fn last_success(&self, id: &str) -> Option<DateTime<Utc>> {
        self.telemetry(id).and_then(|t| t.last_success)
    }

    pub fn last_failure(&self, id: &str) -> Option<DateTime<Utc>> {
        self.telemetry(id).and_then(|t| t.last_failure)
    }

    /// When the current handle was started.
    pub fn started_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.handle(id).map(|h| h.started_at)
    }

    /// Ids with a running handle, sorted.
    pub fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries()
            .iter()
            .filter(|(_, e)| e.handle.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stop everything and stop accepting pool work.
    pub fn shutdown(&self) {
        for (id, err) in self.stop_all() {
            warn!("Failed to stop {} during shutdown: {}", id, err);
        }
        self.inner.pool.shutdown();
    }
}
