//! Descriptors: immutable capability metadata of a connector or a view.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use super::property::PropertyDescriptor;
use crate::connector::ConnectorFactory;
use crate::error::{Result, SourcedError};
use crate::keys::DescriptorKey;

/// Immutable description of what instances of one kind look like
pub struct Descriptor {
    key: DescriptorKey,
    display_name: String,
    description: Option<String>,
    view: String,
    event_type: Option<String>,
    implementation: Option<Arc<dyn ConnectorFactory>>,
    scheduled: bool,
    properties: Vec<PropertyDescriptor>,
    data_items: Vec<PropertyDescriptor>,
}

impl Descriptor {
    /// View-only descriptor built from a stand-alone view.
    pub(super) fn view_only(
        key: DescriptorKey,
        display_name: String,
        description: Option<String>,
        data_items: Vec<PropertyDescriptor>,
    ) -> Self {
        let view = key.sub_key().to_string();
        Self {
            key,
            display_name,
            description,
            view,
            event_type: None,
            implementation: None,
            scheduled: false,
            properties: Vec::new(),
            data_items,
        }
    }

    pub fn key(&self) -> &DescriptorKey {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn implementation(&self) -> Option<&Arc<dyn ConnectorFactory>> {
        self.implementation.as_ref()
    }

    pub fn has_implementation(&self) -> bool {
        self.implementation.is_some()
    }

    /// Whether instances run on a schedule and carry a frequency
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn data_items(&self) -> &[PropertyDescriptor] {
        &self.data_items
    }

    /// Declared property or data item by name
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties
            .iter()
            .chain(self.data_items.iter())
            .find(|p| p.name == name)
    }

    /// Validate a full set of values: every key must be declared and every
    /// value must pass its declaration.
    pub fn validate_values(&self, values: &BTreeMap<String, String>) -> Result<()> {
        for (name, value) in values {
            let property = self.property(name).ok_or_else(|| SourcedError::InvalidProperty {
                name: name.clone(),
                reason: format!("not declared by {}", self.key),
            })?;
            property.validate(value)?;
        }
        Ok(())
    }

    /// Declared defaults, used to seed new instances
    pub fn default_values(&self) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .chain(self.data_items.iter())
            .filter_map(|p| p.default.as_ref().map(|d| (p.name.clone(), d.clone())))
            .collect()
    }

    /// Names of the properties that reference objects of `reference_type`
    pub fn references_to(&self, reference_type: &str) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.references(reference_type))
            .map(|p| p.name.as_str())
            .collect()
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("view", &self.view)
            .field("event_type", &self.event_type)
            .field("has_implementation", &self.has_implementation())
            .field("scheduled", &self.scheduled)
            .field("properties", &self.properties)
            .field("data_items", &self.data_items)
            .finish()
    }
}

/// Declaration of an implementation-backed descriptor, turned into a
/// [`Descriptor`] when the catalog is built.
pub struct DescriptorBuilder {
    type_name: String,
    display_name: String,
    description: Option<String>,
    view: String,
    event_type: Option<String>,
    factory: Arc<dyn ConnectorFactory>,
    scheduled: bool,
    properties: Vec<PropertyDescriptor>,
    hidden_data_items: HashSet<String>,
}

impl DescriptorBuilder {
    /// Start a declaration for the fully-qualified `type_name`.
    pub fn new(
        type_name: impl Into<String>,
        display_name: impl Into<String>,
        factory: Arc<dyn ConnectorFactory>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            display_name: display_name.into(),
            description: None,
            view: String::new(),
            event_type: None,
            factory,
            scheduled: false,
            properties: Vec::new(),
            hidden_data_items: HashSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = view.into();
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn scheduled(mut self) -> Self {
        self.scheduled = true;
        self
    }

    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Do not attach the view's data item `name` to this descriptor.
    pub fn hide_data_item(mut self, name: impl Into<String>) -> Self {
        self.hidden_data_items.insert(name.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    /// Check the declaration on its own, before any view is attached.
    pub(super) fn validate(&self) -> Result<()> {
        if self.view.trim().is_empty() {
            return Err(SourcedError::Catalog(format!("{} does not declare a view", self.type_name)));
        }
        if self.event_type.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(SourcedError::Catalog(format!(
                "{} does not declare an event type",
                self.type_name
            )));
        }

        let mut seen = HashSet::new();
        for property in &self.properties {
            if !seen.insert(property.name.as_str()) {
                return Err(SourcedError::Catalog(format!(
                    "{} declares property {} twice",
                    self.type_name, property.name
                )));
            }
            if let Some(default) = &property.default {
                property.validate(default)?;
            }
        }
        Ok(())
    }

    /// Finish the descriptor, attaching the view's visible data items.
    pub(super) fn build(self, key: DescriptorKey, view_items: &[PropertyDescriptor]) -> Result<Descriptor> {
        let mut data_items = Vec::new();
        for item in view_items {
            if self.hidden_data_items.contains(&item.name) {
                continue;
            }
            if self.properties.iter().any(|p| p.name == item.name) {
                return Err(SourcedError::Catalog(format!(
                    "{} declares property {} which is also a data item of view {}",
                    self.type_name, item.name, self.view
                )));
            }
            data_items.push(item.clone());
        }

        Ok(Descriptor {
            key,
            display_name: self.display_name,
            description: self.description,
            view: self.view,
            event_type: self.event_type,
            implementation: Some(self.factory),
            scheduled: self.scheduled,
            properties: self.properties,
            data_items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PropertyKind;
    use crate::connector::{BackingImplementation, ConnectorContext};
    use crate::keys::KeyRegistry;

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

    fn builder() -> DescriptorBuilder {
        let factory = || Box::new(Noop) as Box<dyn BackingImplementation>;
        DescriptorBuilder::new("acme.Threshold", "Threshold", Arc::new(factory))
            .with_view("number")
            .with_event_type("NumberEvent")
            .with_property(PropertyDescriptor::new("threshold", PropertyKind::Integer).with_default("10"))
    }

    fn view_items() -> Vec<PropertyDescriptor> {
        vec![
            PropertyDescriptor::new("color", PropertyKind::Text).with_default("green"),
            PropertyDescriptor::new("unit", PropertyKind::Text),
        ]
    }

    #[test]
    fn test_validate_requires_view_and_event_type() {
        assert!(builder().validate().is_ok());

        let no_view = builder().with_view("");
        assert!(matches!(no_view.validate(), Err(SourcedError::Catalog(_))));

        let factory = || Box::new(Noop) as Box<dyn BackingImplementation>;
        let no_event = DescriptorBuilder::new("acme.X", "X", Arc::new(factory)).with_view("number");
        assert!(matches!(no_event.validate(), Err(SourcedError::Catalog(_))));
    }

    #[test]
    fn test_validate_rejects_bad_default() {
        let bad = builder().with_property(PropertyDescriptor::new("limit", PropertyKind::Integer).with_default("many"));
        assert!(matches!(bad.validate(), Err(SourcedError::InvalidProperty { .. })));
    }

    #[test]
    fn test_validate_rejects_duplicate_property() {
        let dup = builder().with_property(PropertyDescriptor::new("threshold", PropertyKind::Text));
        assert!(matches!(dup.validate(), Err(SourcedError::Catalog(_))));
    }

    #[test]
    fn test_build_attaches_visible_data_items() {
        let registry = KeyRegistry::new();
        let key = registry.create_implementation_key("acme.Threshold", "Threshold").unwrap();
        let descriptor = builder().hide_data_item("unit").build(key, &view_items()).unwrap();

        assert!(descriptor.has_implementation());
        assert_eq!(descriptor.view(), "number");
        assert_eq!(descriptor.data_items().len(), 1);
        assert!(descriptor.property("color").is_some());
        assert!(descriptor.property("unit").is_none());

        let defaults = descriptor.default_values();
        assert_eq!(defaults.get("threshold").map(String::as_str), Some("10"));
        assert_eq!(defaults.get("color").map(String::as_str), Some("green"));
    }

    #[test]
    fn test_validate_values() {
        let registry = KeyRegistry::new();
        let key = registry.create_implementation_key("acme.Threshold", "Threshold").unwrap();
        let descriptor = builder().build(key, &view_items()).unwrap();

        let ok = BTreeMap::from([
            ("threshold".to_string(), "5".to_string()),
            ("unit".to_string(), "ms".to_string()),
        ]);
        assert!(descriptor.validate_values(&ok).is_ok());

        let undeclared = BTreeMap::from([("nope".to_string(), "1".to_string())]);
        assert!(matches!(
            descriptor.validate_values(&undeclared),
            Err(SourcedError::InvalidProperty { name, .. }) if name == "nope"
        ));

        let invalid = BTreeMap::from([("threshold".to_string(), "x".to_string())]);
        assert!(descriptor.validate_values(&invalid).is_err());
    }

    #[test]
    fn test_view_only_descriptor() {
        let registry = KeyRegistry::new();
        let key = registry.create_view_key("clock", "Clock").unwrap();
        let descriptor = Descriptor::view_only(key, "Clock".to_string(), None, view_items());
        assert!(!descriptor.has_implementation());
        assert_eq!(descriptor.view(), "clock");
        assert!(descriptor.properties().is_empty());
    }
}
