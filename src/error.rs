//! Error types for sourced
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in sourced
#[derive(Debug, Error)]
pub enum SourcedError {
    /// Unknown instance, descriptor or key
    #[error("Not found: {0}")]
    NotFound(String),

    /// An instance with the same identity is already registered
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Start requested for an instance that already has a running handle
    #[error("Instance {0} is already running")]
    AlreadyRunning(String),

    /// Stop requested for an instance without a running handle
    #[error("Instance {0} is not running")]
    NotRunning(String),

    /// Start requested for a disabled instance
    #[error("Instance {0} is not enabled")]
    NotEnabled(String),

    /// Start requested for an instance whose descriptor is view-only
    #[error("Instance {0} does not have a backing implementation")]
    NoImplementation(String),

    /// The backing implementation failed to configure or start
    #[error("Failed to start instance {id}: {reason}")]
    StartFailed { id: String, reason: String },

    /// The backing implementation failed to stop
    #[error("Failed to stop instance {id}: {reason}")]
    StopFailed { id: String, reason: String },

    /// Rename detection found zero or several candidates
    #[error("Unable to resolve key {key}: {reason}")]
    UnresolvableKey { key: String, reason: String },

    /// A canonical key string was registered twice
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A raw key string with no known namespace prefix
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A property value failed validation against its descriptor
    #[error("Invalid property {name}: {reason}")]
    InvalidProperty { name: String, reason: String },

    /// Catalog construction failed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The worker pool no longer accepts submissions
    #[error("Rejected: {0}")]
    Rejected(String),

    /// A worker pool task panicked before producing a result
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML manifest or rename table parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SourcedError {
    /// Wrap a connector error chain into a `StartFailed`
    pub fn start_failed(id: impl Into<String>, err: &eyre::Report) -> Self {
        SourcedError::StartFailed {
            id: id.into(),
            reason: format!("{:#}", err),
        }
    }

    /// Wrap a connector error chain into a `StopFailed`
    pub fn stop_failed(id: impl Into<String>, err: &eyre::Report) -> Self {
        SourcedError::StopFailed {
            id: id.into(),
            reason: format!("{:#}", err),
        }
    }
}

/// Result type alias for sourced operations
pub type Result<T> = std::result::Result<T, SourcedError>;
