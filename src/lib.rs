//! Lock-free slab allocator, FIFO queue, ordered list, promise/future
//! rendezvous, OS thread primitives, and a work-stealing thread pool,
//! all built on one shared tagged-pointer encoding.
//!
//! The building blocks compose: [`queue::Queue`] and [`list::List`]
//! are both backed by a [`slab::SlabPool`]; [`thread`]'s TCB registry
//! is itself a [`list::List`]; [`pool::Pool`] is built from
//! [`thread`], [`queue::Queue`], and [`promise::Promise`]. Every
//! fallible call in the crate returns [`error::Result`].

pub mod error;
pub mod list;
pub mod pool;
pub mod promise;
pub mod queue;
pub mod slab;
pub mod thread;

mod tagged;

pub use error::{Error, Result};
pub use list::List;
pub use pool::{Pool, PoolMetrics};
pub use promise::{Future, Promise};
pub use queue::Queue;
pub use slab::SlabPool;
