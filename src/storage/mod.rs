//! Storage layer for sourced
//!
//! The [`Storage`] trait is the persistence collaborator of the lifecycle
//! manager and the dashboard controller. Two implementations:
//! - [`JsonlStorage`]: one JSONL file per collection with an in-memory cache
//! - [`MemoryStorage`]: process-local maps, for tests and embedding

mod jsonl;
mod memory;
mod traits;

pub use jsonl::JsonlStorage;
pub use memory::MemoryStorage;
pub use traits::{Filter, HasId, Storage};
