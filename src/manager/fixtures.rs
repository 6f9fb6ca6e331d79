//! Test doubles shared by the manager tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use eyre::eyre;

use super::{InstanceManager, ManagerConfig};
use crate::catalog::{DescriptorBuilder, DescriptorCatalog, PropertyDescriptor, PropertyKind, ViewManifest};
use crate::connector::{BackingImplementation, ConnectorContext, Telemetry};
use crate::keys::{DescriptorKey, IdentityResolver, KeyRegistry, StaticRenameTable};
use crate::pool::PoolConfig;
use crate::storage::MemoryStorage;

/// Knobs and counters shared by every connector a factory creates
#[derive(Default)]
pub struct MockBehavior {
    pub fail_configure: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub failed: AtomicBool,
    pub start_delay_ms: AtomicUsize,
    pub stop_delay_ms: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub last_ctx: Mutex<Option<ConnectorContext>>,
}

impl MockBehavior {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn last_ctx(&self) -> Option<ConnectorContext> {
        self.last_ctx.lock().unwrap().clone()
    }
}

pub struct MockConnector {
    behavior: Arc<MockBehavior>,
}

impl BackingImplementation for MockConnector {
    fn configure(&mut self, ctx: &ConnectorContext) -> eyre::Result<()> {
        *self.behavior.last_ctx.lock().unwrap() = Some(ctx.clone());
        if self.behavior.fail_configure.load(Ordering::SeqCst) {
            return Err(eyre!("bad configuration"));
        }
        Ok(())
    }

    fn start(&self) -> eyre::Result<()> {
        let delay = self.behavior.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        if self.behavior.fail_start.load(Ordering::SeqCst) {
            return Err(eyre!("connection refused"));
        }
        self.behavior.failed.store(false, Ordering::SeqCst);
        self.behavior.starts.fetch_add(1, Ordering::SeqCst);
        let active = self.behavior.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.behavior.max_active.fetch_max(active, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> eyre::Result<()> {
        let delay = self.behavior.stop_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        if self.behavior.fail_stop.load(Ordering::SeqCst) {
            return Err(eyre!("stuck"));
        }
        self.behavior.stops.fetch_add(1, Ordering::SeqCst);
        self.behavior.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn telemetry(&self) -> Option<Telemetry> {
        Some(Telemetry {
            last_run: Some(Utc::now()),
            ..Default::default()
        })
    }

    fn has_failed(&self) -> bool {
        self.behavior.failed.load(Ordering::SeqCst)
    }
}

pub struct Fixture {
    pub manager: InstanceManager,
    pub behavior: Arc<MockBehavior>,
    pub storage: Arc<MemoryStorage>,
    pub registry: Arc<KeyRegistry>,
    /// Scheduled, `threshold: integer`
    pub threshold: DescriptorKey,
    /// `credentials: reference(credentials)`
    pub creds: DescriptorKey,
    /// View-only
    pub clock: DescriptorKey,
}

fn mock_builder(type_name: &str, display_name: &str, behavior: &Arc<MockBehavior>) -> DescriptorBuilder {
    let behavior = Arc::clone(behavior);
    let factory = move || {
        Box::new(MockConnector {
            behavior: Arc::clone(&behavior),
        }) as Box<dyn BackingImplementation>
    };
    DescriptorBuilder::new(type_name, display_name, Arc::new(factory))
        .with_view("number")
        .with_event_type("NumberEvent")
}

pub fn fixture() -> Fixture {
    fixture_with_storage(Arc::new(MemoryStorage::new()))
}

pub fn fixture_with_storage(storage: Arc<MemoryStorage>) -> Fixture {
    let behavior = Arc::new(MockBehavior::default());
    let registry = Arc::new(KeyRegistry::new());

    let connectors = vec![
        mock_builder("acme.Threshold", "Threshold", &behavior)
            .scheduled()
            .with_property(PropertyDescriptor::new("threshold", PropertyKind::Integer).with_default("10")),
        mock_builder("acme.Creds", "Creds", &behavior).with_property(PropertyDescriptor::new(
            "credentials",
            PropertyKind::Reference("credentials".to_string()),
        )),
    ];
    let views = vec![
        ViewManifest::new("number", "Number")
            .with_data_item(PropertyDescriptor::new("unit", PropertyKind::Text)),
        ViewManifest::new("clock", "Clock").standalone(),
    ];
    let catalog = Arc::new(DescriptorCatalog::build(&registry, connectors, views).unwrap());
    let resolver = Arc::new(IdentityResolver::new(
        Arc::clone(&registry),
        Arc::new(StaticRenameTable::new()),
    ));

    let config = ManagerConfig::default().with_pool(
        PoolConfig::default()
            .with_name("test-lifecycle")
            .with_size(1, 8)
            .with_grow_delay(Duration::from_millis(20))
            .with_idle_timeout(Duration::from_millis(200)),
    );
    let manager = InstanceManager::new(catalog, resolver, storage.clone(), config);

    Fixture {
        manager,
        behavior,
        storage,
        threshold: registry.get("class:acme.Threshold").unwrap(),
        creds: registry.get("class:acme.Creds").unwrap(),
        clock: registry.get("widget:clock").unwrap(),
        registry,
    }
}
