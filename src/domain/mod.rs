//! Domain types for sourced
//!
//! - Instance: a configured descriptor, its persisted record and update set
//! - Dashboard: widgets placing instances on a dashboard

pub mod dashboard;
pub mod instance;

pub use dashboard::{Dashboard, Widget};
pub use instance::{DEFAULT_FREQUENCY, Instance, InstanceRecord, InstanceStatus, InstanceUpdate};
