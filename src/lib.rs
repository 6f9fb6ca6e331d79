//! Sourced - lifecycle management for configurable data-source connectors
//!
//! Descriptors declare what can be configured; instances are configured
//! descriptors that the [`manager::InstanceManager`] starts and stops through
//! their backing implementations. Descriptor keys survive connector renames
//! via the [`keys::IdentityResolver`].

pub mod catalog;
pub mod connector;
pub mod dashboards;
pub mod domain;
pub mod error;
pub mod id;
pub mod keys;
pub mod manager;
pub mod pool;
pub mod storage;

pub use error::{Result, SourcedError};
