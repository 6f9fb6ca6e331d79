//! Elastic worker pool
//!
//! A task queue drained by a dynamically sized group of OS threads. The pool
//! keeps `core_size` workers alive, adds one worker per `grow_delay` while a
//! backlog persists (up to `max_size`), and lets surplus workers exit after
//! `idle_timeout` without work.

mod elastic;
mod handle;

pub use elastic::{ElasticPool, PoolConfig};
pub use handle::TaskHandle;
