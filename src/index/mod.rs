//! Module `index` owns ordered collections of record [`Address`]es over a
//! datastore (spec §3 "Index", §4.2–§4.4).
//!
//! Two flavours share the same [`Index`] trait: [`rbtree::RbTreeIndex`]
//! (top-down red-black tree with embedded duplicates) and
//! [`linked_list::LinkedListIndex`] (ordered singly-linked list). Both are
//! built by supplying a [`Comparator`] over record payload bytes, an
//! optional [`Merger`], an optional [`KeyExtractor`], and a
//! `drop_duplicates` flag; [`group::IndexGroup`] fans operations out over
//! a set of indexes (and nested groups).

pub mod group;
pub mod linked_list;
pub mod rbtree;

use std::sync::Arc;

use crate::address::Address;
use crate::error::Result;

/// `cmp(a, b)`: negative if `a < b`, zero if equal, positive if `a > b`
/// — mirrors the C `i32 cmp(a, b)` signature named in spec §6, expressed
/// over the two records' raw (or key-extracted) payload bytes.
pub type Comparator = Arc<dyn Fn(&[u8], &[u8]) -> i32 + Send + Sync>;

/// Invoked when a newly inserted address compares equal to one already
/// held; returns the address to keep in the index (typically `old`,
/// after mutating the record it refers to).
pub type Merger = Arc<dyn Fn(Address, Address) -> Address + Send + Sync>;

/// Derives the sub-key an index should compare on, given a record's raw
/// payload bytes.
pub type Keygen = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// A query predicate over record payload bytes (spec §6 "Condition").
pub type Condition = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// An opaque handle pairing an [`crate::odb::Odb`] context's ident with
/// a record address, returned by [`crate::odb::Odb::add_data`] and
/// accepted by [`group::IndexGroup::add_data`] so a caller can insert
/// into a group directly, with the same integrity check
/// [`Index::add_data_v`] applies, without going through the full
/// `Odb::add_data` broadcast path. Grounded on the original's `DataObj`
/// handle (`examples/original_source/include/index.hpp`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle {
    pub ident: u64,
    pub addr: Address,
}

/// Pairs a [`Keygen`] with the byte length of the key it derives, so an
/// index can be built over a sub-key of the record rather than comparing
/// raw payload bytes directly (spec §4.2 supplement, grounded on the
/// original's `keygen`/`keylen` pair).
#[derive(Clone)]
pub struct KeyExtractor {
    pub keygen: Keygen,
    pub keylen: usize,
}

impl KeyExtractor {
    pub fn new(keygen: Keygen, keylen: usize) -> KeyExtractor {
        KeyExtractor { keygen, keylen }
    }

    pub fn extract(&self, record: &[u8]) -> Vec<u8> {
        let mut key = (self.keygen)(record);
        key.truncate(self.keylen);
        key
    }
}

/// An ordered collection of record addresses over one ODB context (spec
/// §3 "Index"). Object-safe so [`group::IndexGroup`] can hold a
/// heterogeneous mix of flavours.
pub trait Index: Send + Sync {
    /// The owning ODB context's ident; every mutating call checks this
    /// against the caller-supplied ident (spec §7 "integrity-mismatch").
    fn ident(&self) -> u64;

    /// Locally unique id used as this index's interference class when
    /// scheduled (spec §4.5).
    fn luid(&self) -> u64;

    /// Number of address slots currently held, embedded duplicates
    /// included (spec §3 invariants).
    fn count(&self) -> usize;

    fn drop_duplicates(&self) -> bool;

    /// Insert `addr` (already live in the backing datastore) if
    /// `caller_ident` matches [`Index::ident`]; otherwise declines
    /// silently (spec §7).
    fn add_data_v(&self, addr: Address, caller_ident: u64) -> Result<()>;

    /// Splice out every held address present in `marked_sorted` (spec
    /// §4.2/§4.3, §4.7 step 2).
    fn remove_sweep(&self, marked_sorted: &[Address]);

    /// In-place pointer rewrite: `old[i]` is replaced by `new[i]`
    /// wherever held, without restructuring (spec §4.2/§4.7 step 3).
    fn update(&self, old: &[Address], new: &[Address]);

    /// Every held address, in unspecified order (duplicates included).
    /// Used by [`group::IndexGroup::query`] and bulk consumers that
    /// don't need the ordered cursor protocol.
    fn snapshot(&self) -> Vec<Address>;

    /// Resolve a held `addr` to the `(address, length)` of its actual
    /// user payload, following this index's own backing datastore's
    /// indirection (spec §4.4 query assembly).
    fn resolve(&self, addr: Address) -> (Address, usize);

    /// Diagnostic-only structural check; `0` means invalid, a positive
    /// value is the tree's black height. Always `0` for flavours with no
    /// such notion (spec §4.2 "test hook, not a production path").
    fn rbt_verify(&self) -> i32 {
        0
    }
}
