//! Descriptor keys
//!
//! A key is a namespaced string such as `class:acme.jira.JiraIssues`
//! (implementation-backed) or `widget:clock` (view-only). Keys are interned by
//! [`KeyRegistry`](super::KeyRegistry): cloning a key shares the same
//! allocation, and two keys compare equal iff their strings are equal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::{Result, SourcedError};

/// The two key namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyNamespace {
    /// Descriptor backed by a connector implementation (`class:` prefix)
    Implementation,
    /// Stand-alone view without an implementation (`widget:` prefix)
    View,
}

impl KeyNamespace {
    /// String prefix including the trailing colon
    pub fn prefix(&self) -> &'static str {
        match self {
            KeyNamespace::Implementation => "class:",
            KeyNamespace::View => "widget:",
        }
    }

    /// Split a raw key into namespace and sub key.
    pub fn split(raw: &str) -> Result<(KeyNamespace, &str)> {
        let (kind, sub_key) = raw
            .split_once(':')
            .ok_or_else(|| SourcedError::InvalidKey(format!("missing namespace prefix: {}", raw)))?;
        let namespace = match kind {
            "class" => KeyNamespace::Implementation,
            "widget" => KeyNamespace::View,
            other => {
                return Err(SourcedError::InvalidKey(format!(
                    "unknown key namespace '{}' in {}",
                    other, raw
                )));
            }
        };
        if sub_key.is_empty() {
            return Err(SourcedError::InvalidKey(format!("empty key: {}", raw)));
        }
        Ok((namespace, sub_key))
    }

    /// Build the canonical key string for a sub key.
    pub fn qualify(&self, sub_key: &str) -> String {
        format!("{}{}", self.prefix(), sub_key)
    }
}

#[derive(Debug)]
struct KeyInner {
    key: String,
    namespace: KeyNamespace,
    display_name: String,
}

/// Interned descriptor key
#[derive(Clone)]
pub struct DescriptorKey(Arc<KeyInner>);

impl DescriptorKey {
    pub(super) fn new(key: String, namespace: KeyNamespace, display_name: String) -> Self {
        Self(Arc::new(KeyInner {
            key,
            namespace,
            display_name,
        }))
    }

    /// Full canonical key string, including the namespace prefix
    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn namespace(&self) -> KeyNamespace {
        self.0.namespace
    }

    pub fn display_name(&self) -> &str {
        &self.0.display_name
    }

    /// Key without its namespace prefix (type name or view id)
    pub fn sub_key(&self) -> &str {
        &self.0.key[self.0.namespace.prefix().len()..]
    }

    /// Unqualified name: the part after the last `.` of the sub key
    pub fn simple_name(&self) -> &str {
        simple_name(self.sub_key())
    }

    pub fn is_implementation(&self) -> bool {
        self.0.namespace == KeyNamespace::Implementation
    }

    /// Whether both handles point at the same interned key
    pub fn ptr_eq(&self, other: &DescriptorKey) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Unqualified part of a dotted type name.
pub fn simple_name(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

impl PartialEq for DescriptorKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for DescriptorKey {}

impl Hash for DescriptorKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl PartialOrd for DescriptorKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DescriptorKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.key.cmp(&other.0.key)
    }
}

impl fmt::Display for DescriptorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.key)
    }
}

impl fmt::Debug for DescriptorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DescriptorKey({})", self.0.key)
    }
}

impl Serialize for DescriptorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> DescriptorKey {
        let (ns, _) = KeyNamespace::split(raw).unwrap();
        DescriptorKey::new(raw.to_string(), ns, "x".to_string())
    }

    #[test]
    fn test_split_class_key() {
        let (ns, sub) = KeyNamespace::split("class:a.b.Foo").unwrap();
        assert_eq!(ns, KeyNamespace::Implementation);
        assert_eq!(sub, "a.b.Foo");
    }

    #[test]
    fn test_split_widget_key() {
        let (ns, sub) = KeyNamespace::split("widget:clock").unwrap();
        assert_eq!(ns, KeyNamespace::View);
        assert_eq!(sub, "clock");
    }

    #[test]
    fn test_split_rejects_unknown_namespace() {
        assert!(matches!(
            KeyNamespace::split("bean:a.b.Foo"),
            Err(SourcedError::InvalidKey(_))
        ));
        assert!(matches!(KeyNamespace::split("a.b.Foo"), Err(SourcedError::InvalidKey(_))));
        assert!(matches!(KeyNamespace::split("class:"), Err(SourcedError::InvalidKey(_))));
    }

    #[test]
    fn test_sub_key_and_simple_name() {
        let k = key("class:a.b.Foo");
        assert_eq!(k.sub_key(), "a.b.Foo");
        assert_eq!(k.simple_name(), "Foo");
        assert!(k.is_implementation());

        let w = key("widget:clock");
        assert_eq!(w.sub_key(), "clock");
        assert_eq!(w.simple_name(), "clock");
        assert!(!w.is_implementation());
    }

    #[test]
    fn test_equality_by_string() {
        let a = key("class:a.b.Foo");
        let b = key("class:a.b.Foo");
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
        assert_ne!(a, key("class:a.c.Foo"));
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&key("widget:clock")).unwrap();
        assert_eq!(json, "\"widget:clock\"");
    }
}
