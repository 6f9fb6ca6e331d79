//! Contract between the lifecycle manager and connector bodies.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::{WrapErr, eyre};
use serde::Serialize;

/// Values a backing implementation is configured with before it starts.
#[derive(Debug, Clone, Default)]
pub struct ConnectorContext {
    pub instance_id: String,
    /// Schedule interval; `None` for descriptors that are not schedule-driven
    pub frequency: Option<Duration>,
    pub properties: BTreeMap<String, String>,
}

impl ConnectorContext {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Default::default()
        }
    }

    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Raw property value; empty strings count as unset.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Parse a property value, or `None` if unset.
    pub fn parse<T>(&self, name: &str) -> eyre::Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.property(name)
            .map(|raw| {
                raw.parse::<T>()
                    .wrap_err_with(|| format!("property {} has invalid value '{}'", name, raw))
            })
            .transpose()
    }

    /// Property value that must be present.
    pub fn require(&self, name: &str) -> eyre::Result<&str> {
        self.property(name)
            .ok_or_else(|| eyre!("property {} is required for {}", name, self.instance_id))
    }
}

/// Last-run telemetry a backing implementation may expose
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_failure_description: Option<String>,
}

/// Per-instance connector object, created fresh for every start.
pub trait BackingImplementation: Send + Sync {
    /// Bind the instance's current configuration. Called once, before `start`.
    fn configure(&mut self, ctx: &ConnectorContext) -> eyre::Result<()>;

    /// Start the connector; returns once it is running.
    fn start(&self) -> eyre::Result<()>;

    /// Stop the connector; returns once it has terminated.
    fn stop(&self) -> eyre::Result<()>;

    /// Telemetry, if the implementation records any.
    fn telemetry(&self) -> Option<Telemetry> {
        None
    }

    /// Whether the connector gave up on its own while still holding a handle.
    fn has_failed(&self) -> bool {
        false
    }
}

/// Creates backing implementations for one descriptor.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self) -> Box<dyn BackingImplementation>;
}

impl<F> ConnectorFactory for F
where
    F: Fn() -> Box<dyn BackingImplementation> + Send + Sync,
{
    fn create(&self) -> Box<dyn BackingImplementation> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_property_accessors() {
        let ctx = ConnectorContext::new("i-1")
            .with_property("threshold", "5")
            .with_property("empty", "")
            .with_property("bad", "five");

        assert_eq!(ctx.property("threshold"), Some("5"));
        assert_eq!(ctx.property("empty"), None);
        assert_eq!(ctx.parse::<i64>("threshold").unwrap(), Some(5));
        assert_eq!(ctx.parse::<i64>("missing").unwrap(), None);
        assert!(ctx.parse::<i64>("bad").is_err());
        assert!(ctx.require("empty").is_err());
    }

    #[test]
    fn test_closure_factory() {
        let factory = || Box::new(Noop) as Box<dyn BackingImplementation>;
        let connector = factory.create();
        assert!(connector.telemetry().is_none());
        assert!(!connector.has_failed());
    }
}
