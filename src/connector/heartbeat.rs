//! Builtin heartbeat connector: publishes a configurable message with a
//! sequence number on every run.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use super::scheduled::{EventSink, Producer, ScheduledConnector};
use super::traits::{BackingImplementation, ConnectorContext};
use crate::catalog::{DescriptorBuilder, PropertyDescriptor, PropertyKind, ViewManifest};

/// Fully-qualified implementation type name
pub const HEARTBEAT_TYPE: &str = "sourced.builtin.Heartbeat";
/// View the heartbeat renders through
pub const HEARTBEAT_VIEW: &str = "heartbeat";

#[derive(Debug, Default)]
pub struct Heartbeat {
    message: String,
    sequence: u64,
}

impl Producer for Heartbeat {
    fn configure(&mut self, ctx: &ConnectorContext) -> eyre::Result<()> {
        self.message = ctx.property("message").unwrap_or("alive").to_string();
        Ok(())
    }

    fn produce(&mut self) -> eyre::Result<Option<serde_json::Value>> {
        self.sequence += 1;
        Ok(Some(json!({
            "message": self.message,
            "sequence": self.sequence,
            "at": Utc::now().to_rfc3339(),
        })))
    }
}

/// Descriptor of the heartbeat connector, publishing into `sink`.
pub fn heartbeat_descriptor(sink: Arc<dyn EventSink>) -> DescriptorBuilder {
    let factory = move || {
        Box::new(ScheduledConnector::new(Heartbeat::default(), Arc::clone(&sink))) as Box<dyn BackingImplementation>
    };
    DescriptorBuilder::new(HEARTBEAT_TYPE, "Heartbeat", Arc::new(factory))
        .with_description("Publishes a message at a fixed interval")
        .with_view(HEARTBEAT_VIEW)
        .with_event_type("HeartbeatEvent")
        .scheduled()
        .with_property(
            PropertyDescriptor::new("message", PropertyKind::Text)
                .with_display_name("Message")
                .with_default("alive"),
        )
}

/// View manifest the heartbeat descriptor needs in the catalog.
pub fn heartbeat_view() -> ViewManifest {
    ViewManifest::new(HEARTBEAT_VIEW, "Heartbeat")
        .with_data_item(PropertyDescriptor::new("title", PropertyKind::Text).with_display_name("Title"))
}
