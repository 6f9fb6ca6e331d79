//! Connector contract
//!
//! The lifecycle manager never inspects concrete connector types. It only
//! sees [`BackingImplementation`] objects produced by a descriptor's
//! [`ConnectorFactory`]. [`ScheduledConnector`] covers the common case of a
//! connector that polls something at a fixed interval.

mod heartbeat;
mod scheduled;
mod traits;

pub use heartbeat::{HEARTBEAT_TYPE, HEARTBEAT_VIEW, Heartbeat, heartbeat_descriptor, heartbeat_view};
pub use scheduled::{EventSink, LogSink, MAX_CONSECUTIVE_FAILURES, Producer, ScheduledConnector};
pub use traits::{BackingImplementation, ConnectorContext, ConnectorFactory, Telemetry};
