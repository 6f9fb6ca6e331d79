//! Instance lifecycle management
//!
//! [`InstanceManager`] owns the registry of configured instances, enforces
//! the start/stop state machine per instance and runs restarts and bulk
//! starts on an elastic worker pool.

mod lifecycle;
mod operations;

#[cfg(test)]
pub(crate) mod fixtures;

pub use lifecycle::{InstanceManager, ManagerConfig, UpdateListener};
pub use operations::BatchFailures;
