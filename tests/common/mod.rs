//! Shared setup for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use eyre::eyre;
use sourced::catalog::{DescriptorBuilder, DescriptorCatalog, PropertyDescriptor, PropertyKind, ViewManifest};
use sourced::connector::{BackingImplementation, ConnectorContext};
use sourced::keys::{IdentityResolver, KeyRegistry, StaticRenameTable};
use sourced::manager::{InstanceManager, ManagerConfig};
use sourced::pool::PoolConfig;
use sourced::storage::Storage;

/// Counters shared by every connector one factory creates
#[derive(Default)]
pub struct Counters {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub fail_start: AtomicBool,
    pub start_delay_ms: AtomicUsize,
}

impl Counters {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

pub struct MockConnector {
    counters: Arc<Counters>,
}

impl BackingImplementation for MockConnector {
    fn configure(&mut self, ctx: &ConnectorContext) -> eyre::Result<()> {
        ctx.parse::<i64>("threshold")?;
        Ok(())
    }

    fn start(&self) -> eyre::Result<()> {
        let delay = self.counters.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        if self.counters.fail_start.load(Ordering::SeqCst) {
            return Err(eyre!("refused"));
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(active, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> eyre::Result<()> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Descriptor `type_name` with one `threshold: integer` property, viewed as `number`.
pub fn threshold_descriptor(type_name: &str, counters: &Arc<Counters>) -> DescriptorBuilder {
    let counters = Arc::clone(counters);
    let factory = move || {
        Box::new(MockConnector {
            counters: Arc::clone(&counters),
        }) as Box<dyn BackingImplementation>
    };
    DescriptorBuilder::new(type_name, "Threshold", Arc::new(factory))
        .with_view("number")
        .with_property(PropertyDescriptor::new("threshold", PropertyKind::Integer))
}

pub fn number_view() -> ViewManifest {
    ViewManifest::new("number", "Number")
}

pub fn fast_pool() -> ManagerConfig {
    ManagerConfig::default().with_pool(
        PoolConfig::default()
            .with_name("it-pool")
            .with_size(1, 8)
            .with_grow_delay(Duration::from_millis(20))
            .with_idle_timeout(Duration::from_millis(200)),
    )
}

/// Manager over the given connectors, storage and renames.
pub fn manager_with(
    connectors: Vec<DescriptorBuilder>,
    storage: Arc<dyn Storage>,
    renames: StaticRenameTable,
) -> InstanceManager {
    let registry = Arc::new(KeyRegistry::new());
    let catalog = DescriptorCatalog::build(&registry, connectors, vec![number_view()]).unwrap();
    let resolver = IdentityResolver::new(Arc::clone(&registry), Arc::new(renames));
    InstanceManager::new(Arc::new(catalog), Arc::new(resolver), storage, fast_pool())
}
