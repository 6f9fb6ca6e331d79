//! Identity map of canonical descriptor keys.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use log::debug;

use super::key::{DescriptorKey, KeyNamespace};
use crate::error::{Result, SourcedError};

/// Process-wide interning table: at most one [`DescriptorKey`] per canonical
/// string. Built at startup and handed to the resolver and the catalog.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: RwLock<HashMap<String, DescriptorKey>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a definitely-new canonical key string.
    ///
    /// Fails with `DuplicateKey` if the string is already registered.
    pub fn create_key(&self, raw: &str, display_name: &str) -> Result<DescriptorKey> {
        let (namespace, _) = KeyNamespace::split(raw)?;
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        if keys.contains_key(raw) {
            return Err(SourcedError::DuplicateKey(raw.to_string()));
        }

        let key = DescriptorKey::new(raw.to_string(), namespace, display_name.to_string());
        keys.insert(raw.to_string(), key.clone());
        debug!("Registered descriptor key {}", raw);
        Ok(key)
    }

    /// Intern the key of an implementation-backed descriptor.
    pub fn create_implementation_key(&self, type_name: &str, display_name: &str) -> Result<DescriptorKey> {
        self.create_key(&KeyNamespace::Implementation.qualify(type_name), display_name)
    }

    /// Intern the key of a view-only descriptor.
    pub fn create_view_key(&self, view: &str, display_name: &str) -> Result<DescriptorKey> {
        self.create_key(&KeyNamespace::View.qualify(view), display_name)
    }

    /// Look up an exact canonical string.
    pub fn get(&self, raw: &str) -> Option<DescriptorKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(raw)
            .cloned()
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(raw)
    }

    /// Snapshot of all keys in one namespace, sorted by key string.
    pub fn keys_in(&self, namespace: KeyNamespace) -> Vec<DescriptorKey> {
        let mut keys: Vec<DescriptorKey> = self
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|k| k.namespace() == namespace)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
