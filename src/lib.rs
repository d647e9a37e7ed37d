//! `odb` is an embeddable, in-memory object-database engine: a
//! datastore layer that owns record bytes behind stable addresses, an
//! index layer (red-black tree and ordered linked list) that keys those
//! addresses, and an [`odb::Odb`] context that ties a datastore to a
//! set of indexes, an optional worker-pool scheduler, and an optional
//! memory-sampling watchdog.
//!
//! Every datastore flavour hands out a stable [`address::Address`] the
//! moment a record is added; that address survives compaction (for
//! flavours that compact) because the engine rewrites every index's
//! held addresses in place rather than asking callers to re-resolve
//! anything. Multi-reader/single-writer concurrency on every structure
//! that needs it is provided by [`spinlock::RWSpinlock`], a latch-and-spin
//! primitive favoring short, non-blocking critical sections over
//! `std::sync::RwLock`.
//!
//! Records optionally carry trailing metadata (creation timestamp,
//! query-hit counter) described in [`metadata`]. A context's `prune`
//! predicate plus [`datastore::ArchiveHook`] drive eviction sweeps
//! ([`odb::Odb::remove_sweep`]); [`watchdog::Watchdog`] can trigger those
//! sweeps automatically under memory pressure.

mod address;
mod error;
mod metadata;
mod spinlock;

pub mod archive;
pub mod datastore;
pub mod index;
pub mod odb;
pub mod scheduler;
pub mod watchdog;

pub use crate::address::Address;
pub use crate::error::{Error, Result};
pub use crate::index::Handle;
pub use crate::metadata::MetaFlags;
pub use crate::spinlock::RWSpinlock;

pub use crate::odb::{IndexKind, IndexSpec, Odb, OdbConfig};
