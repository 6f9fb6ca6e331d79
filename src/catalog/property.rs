//! Declarative property descriptors
//!
//! Connectors declare their configurable properties up front; views declare
//! data items (per-placement values) the same way. The lifecycle manager
//! validates every stored value against these declarations.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SourcedError};

/// Value type of a property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    #[default]
    Text,
    Password,
    Integer,
    Float,
    Boolean,
    Json,
    /// Id of a shared object of the named type (credentials, connections)
    Reference(String),
}

/// One declared property or data item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,

    #[serde(default, alias = "title")]
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, rename = "type")]
    pub kind: PropertyKind,

    /// Permitted values; empty means unrestricted
    #[serde(default, rename = "values", skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,

    /// Whether values outside `allowed_values` are accepted
    #[serde(default)]
    pub custom_values_allowed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            display_name: String::new(),
            description: None,
            kind,
            allowed_values: Vec::new(),
            custom_values_allowed: false,
            default: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_custom_values(mut self) -> Self {
        self.custom_values_allowed = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Display name, falling back to the property name
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Whether this property refers to shared objects of `reference_type`
    pub fn references(&self, reference_type: &str) -> bool {
        matches!(&self.kind, PropertyKind::Reference(t) if t == reference_type)
    }

    /// Check a raw value against the declaration. Empty means unset and is accepted.
    pub fn validate(&self, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }

        if !self.allowed_values.is_empty()
            && !self.custom_values_allowed
            && !self.allowed_values.iter().any(|v| v == value)
        {
            return Err(self.invalid(format!(
                "'{}' is not one of [{}]",
                value,
                self.allowed_values.join(", ")
            )));
        }

        match &self.kind {
            PropertyKind::Text | PropertyKind::Password | PropertyKind::Reference(_) => Ok(()),
            PropertyKind::Integer => value
                .parse::<i64>()
                .map(|_| ())
                .map_err(|e| self.invalid(format!("'{}' is not an integer: {}", value, e))),
            PropertyKind::Float => value
                .parse::<f64>()
                .map(|_| ())
                .map_err(|e| self.invalid(format!("'{}' is not a number: {}", value, e))),
            PropertyKind::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err(self.invalid(format!("'{}' is not a boolean", value))),
            },
            PropertyKind::Json => serde_json::from_str::<serde_json::Value>(value)
                .map(|_| ())
                .map_err(|e| self.invalid(format!("invalid JSON: {}", e))),
        }
    }

    fn invalid(&self, reason: String) -> SourcedError {
        SourcedError::InvalidProperty {
            name: self.name.clone(),
            reason,
        }
    }
}
