//! Descriptor catalog
//!
//! Built once at startup from the connector declarations compiled into the
//! binary and the view manifests on disk; read-only afterwards.

mod descriptor;
mod property;
mod views;

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::error::{Result, SourcedError};
use crate::keys::{DescriptorKey, KeyRegistry};

pub use descriptor::{Descriptor, DescriptorBuilder};
pub use property::{PropertyDescriptor, PropertyKind};
pub use views::{ViewManifest, load_view_manifests};

/// Immutable index of all descriptors, keyed by canonical key
#[derive(Debug, Default)]
pub struct DescriptorCatalog {
    descriptors: HashMap<String, Arc<Descriptor>>,
}

impl DescriptorCatalog {
    /// Build the catalog, interning every descriptor key in `registry`.
    ///
    /// Data items of a view are attached to every connector declaring that
    /// view. A connector whose view has no manifest fails the build, as do
    /// two manifests for the same view.
    pub fn build(
        registry: &KeyRegistry,
        connectors: Vec<DescriptorBuilder>,
        views: Vec<ViewManifest>,
    ) -> Result<Self> {
        let mut manifests: HashMap<String, ViewManifest> = HashMap::new();
        for manifest in views {
            if manifests.contains_key(&manifest.view) {
                return Err(SourcedError::Catalog(format!(
                    "view {} is declared more than once",
                    manifest.view
                )));
            }
            manifests.insert(manifest.view.clone(), manifest);
        }

        let mut descriptors = HashMap::new();
        for builder in connectors {
            builder.validate()?;
            let manifest = manifests.get(builder.view()).ok_or_else(|| {
                SourcedError::Catalog(format!(
                    "No view found for view id {} of {}",
                    builder.view(),
                    builder.type_name()
                ))
            })?;

            let key = registry.create_implementation_key(builder.type_name(), builder.display_name())?;
            let descriptor = builder.build(key.clone(), &manifest.data_items)?;
            debug!("Loaded descriptor {}", key);
            descriptors.insert(key.key().to_string(), Arc::new(descriptor));
        }

        let mut standalone: Vec<&ViewManifest> = manifests.values().filter(|m| m.standalone).collect();
        standalone.sort_by(|a, b| a.view.cmp(&b.view));
        for manifest in standalone {
            let key = registry.create_view_key(&manifest.view, &manifest.display_name)?;
            let descriptor = Descriptor::view_only(
                key.clone(),
                manifest.display_name.clone(),
                manifest.description.clone(),
                manifest.data_items.clone(),
            );
            debug!("Loaded stand-alone view {}", key);
            descriptors.insert(key.key().to_string(), Arc::new(descriptor));
        }

        info!("Descriptor catalog built with {} descriptors", descriptors.len());
        Ok(Self { descriptors })
    }

    /// Descriptor for a resolved key.
    pub fn get(&self, key: &DescriptorKey) -> Result<Arc<Descriptor>> {
        self.find(key.key())
    }

    /// Descriptor for an exact canonical key string.
    pub fn find(&self, raw: &str) -> Result<Arc<Descriptor>> {
        self.descriptors
            .get(raw)
            .cloned()
            .ok_or_else(|| SourcedError::NotFound(format!("descriptor {}", raw)))
    }

    /// All descriptors, sorted by key
    pub fn all(&self) -> Vec<Arc<Descriptor>> {
        let mut all: Vec<Arc<Descriptor>> = self.descriptors.values().cloned().collect();
        all.sort_by(|a, b| a.key().cmp(b.key()));
        all
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{BackingImplementation, ConnectorContext};

    struct Noop;

    impl BackingImplementation for Noop {
        fn configure(&mut self, _ctx: &ConnectorContext) -> eyre::Result<()> {
            Ok(())
        }

        fn start(&self) -> eyre::Result<()> {
            Ok(())
        }

        fn stop(&self) -> eyre::Result<()> {
            Ok(())
        }
    }

    fn connector(type_name: &str, view: &str) -> DescriptorBuilder {
        let factory = || Box::new(Noop) as Box<dyn BackingImplementation>;
        DescriptorBuilder::new(type_name, type_name, Arc::new(factory))
            .with_view(view)
            .with_event_type("Event")
    }

    fn views() -> Vec<ViewManifest> {
        vec![
            ViewManifest::new("number", "Number")
                .with_data_item(PropertyDescriptor::new("unit", PropertyKind::Text)),
            ViewManifest::new("clock", "Clock").standalone(),
        ]
    }

    #[test]
    fn test_build_merges_classes_and_views() {
        let registry = KeyRegistry::new();
        let catalog = DescriptorCatalog::build(&registry, vec![connector("acme.Count", "number")], views()).unwrap();

        assert_eq!(catalog.len(), 2);
        let count = catalog.find("class:acme.Count").unwrap();
        assert!(count.has_implementation());
        assert_eq!(count.data_items().len(), 1);

        let clock = catalog.find("widget:clock").unwrap();
        assert!(!clock.has_implementation());

        // non-standalone views do not become descriptors on their own
        assert!(catalog.find("widget:number").is_err());

        let key = registry.get("class:acme.Count").unwrap();
        assert!(catalog.get(&key).unwrap().key().ptr_eq(&key));
    }

    #[test]
    fn test_missing_view_fails_build() {
        let registry = KeyRegistry::new();
        let err = DescriptorCatalog::build(&registry, vec![connector("acme.Count", "gauge")], views()).unwrap_err();
        assert!(matches!(err, SourcedError::Catalog(msg) if msg.contains("gauge")));
    }

    #[test]
    fn test_duplicate_connector_fails_build() {
        let registry = KeyRegistry::new();
        let result = DescriptorCatalog::build(
            &registry,
            vec![connector("acme.Count", "number"), connector("acme.Count", "number")],
            views(),
        );
        assert!(matches!(result, Err(SourcedError::DuplicateKey(_))));
    }

    #[test]
    fn test_duplicate_view_fails_build() {
        let registry = KeyRegistry::new();
        let mut manifests = views();
        manifests.push(ViewManifest::new("clock", "Other clock"));
        assert!(matches!(
            DescriptorCatalog::build(&registry, Vec::new(), manifests),
            Err(SourcedError::Catalog(_))
        ));
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let catalog = DescriptorCatalog::default();
        assert!(catalog.is_empty());
        assert!(matches!(catalog.find("class:nope"), Err(SourcedError::NotFound(_))));
    }

    #[test]
    fn test_all_sorted() {
        let registry = KeyRegistry::new();
        let catalog = DescriptorCatalog::build(
            &registry,
            vec![connector("acme.B", "number"), connector("acme.A", "number")],
            views(),
        )
        .unwrap();
        let keys: Vec<String> = catalog.all().iter().map(|d| d.key().key().to_string()).collect();
        assert_eq!(keys, vec!["class:acme.A", "class:acme.B", "widget:clock"]);
    }
}
