//! Module `datastore` owns record memory and hands out the stable
//! [`Address`]es the index layer keys on (spec §4.1).
//!
//! Four flavours are provided, mirroring the teacher's
//! `bank`/`bankds`/`linkedlistds`/`linkedlisti` split from the original
//! C++ core:
//!
//! * [`bank::Bank`] — a pre-allocated, chunked arena ("fixed-bank").
//! * [`linked_list::LinkedList`] — one heap node per record, fixed width.
//! * [`linked_list::VariableList`] — one heap node per record, with a
//!   length prefix, for variable-width payloads.
//! * [`indirect::Indirect`] — stores addresses owned by a parent
//!   datastore; every operation derefs one level.

pub mod bank;
pub mod indirect;
pub mod linked_list;

use crate::address::Address;
use crate::error::Result;

/// Invoked once per record selected by `prune` during a sweep, before
/// the record is unlinked (spec §6 "Archive hook").
pub trait ArchiveHook: Send + Sync {
    fn write(&self, bytes: &[u8]) -> bool;
}

/// Result of a [`Datastore::sweep`]: the set of addresses selected for
/// eviction (sorted ascending, for O(log n) membership checks during
/// index removal) plus, if the datastore compacted storage, the
/// before/after address pairs indexes must rewrite (spec §4.1, §4.7).
#[derive(Default)]
pub struct SweepResult {
    pub marked: Vec<Address>,
    pub relocated: Option<(Vec<Address>, Vec<Address>)>,
}

/// A live record snapshot taken under the datastore's read latch:
/// address plus the bytes backing it at the moment of the scan. Used by
/// `sweep` and by unordered iteration (`it_first`/`it_last`).
pub struct Snapshot {
    pub addr: Address,
    pub len: usize,
}

/// Owns record memory for one backing flavour and hands out stable
/// addresses. See spec §4.1 for the full operation catalogue; methods
/// not meaningful for a given flavour keep their default
/// [`crate::error::Error::Unsupported`] implementation.
pub trait Datastore: Send + Sync {
    /// Copy `bytes` into owned storage, stamp metadata, return the
    /// stable address of the user payload.
    fn add(&self, bytes: &[u8]) -> Result<Address>;

    /// Store an address owned by a parent datastore (indirect flavour
    /// only).
    fn add_indirect(&self, _parent_addr: Address) -> Result<Address> {
        Err(crate::error::Error::Unsupported("add_indirect".into()))
    }

    /// Reserve a writable, fixed-width slot without copying.
    fn reserve(&self) -> Result<Address> {
        Err(crate::error::Error::Unsupported("reserve".into()))
    }

    /// Reserve a writable, `n`-byte slot without copying (variable
    /// datastores only).
    fn reserve_n(&self, _n: usize) -> Result<Address> {
        Err(crate::error::Error::Unsupported("reserve_n".into()))
    }

    /// Positional lookup (fixed-bank only). Fails if `index >= count()`.
    fn get_at(&self, _index: usize) -> Result<Address> {
        Err(crate::error::Error::Unsupported("get_at".into()))
    }

    /// Remove by position (fixed-bank only).
    fn remove_at(&self, _index: usize) -> Result<()> {
        Err(crate::error::Error::Unsupported("remove_at".into()))
    }

    /// Remove by address; fails without mutation if `addr` is not
    /// owned by this datastore.
    fn remove_addr(&self, addr: Address) -> Result<()>;

    /// Walk every live record, apply `prune`; for selected records,
    /// archive (if configured) then fold into the returned
    /// [`SweepResult`].
    fn sweep(
        &self,
        prune: &dyn Fn(&[u8]) -> bool,
        archive: Option<&dyn ArchiveHook>,
    ) -> Result<SweepResult>;

    /// Finalize removal (reclaim memory) after indexes have purged the
    /// marked addresses.
    fn cleanup(&self, result: &SweepResult);

    /// Drop all records, cascading into live clones first; `free_hook`
    /// (if any) is invoked once per record before its slot is freed.
    fn purge(&self, free_hook: Option<&dyn Fn(Address)>);

    /// Unordered snapshot of every live record, taken under the read
    /// latch (chunk-major for banks, head-first for linked lists).
    fn it_first(&self) -> Vec<Snapshot>;

    /// Number of records ever allocated (fixed-bank: includes slots
    /// currently on the free-list; see `get_at`'s positional
    /// semantics). For linked-list flavours this equals the live count.
    fn count(&self) -> usize;

    /// Stored length of the bytes physically held at `addr` *in this
    /// datastore* (fixed: the configured length; variable: the length
    /// recorded alongside the payload; indirect: the width of the
    /// stored pointer, not the referenced record).
    fn payload_len(&self, addr: Address) -> usize;

    /// Resolve `addr` to the `(address, length)` of the actual user
    /// payload it ultimately denotes, following one level of
    /// indirection if this is an [`indirect::Indirect`] datastore
    /// (spec §3 "Indirect ... operations deref one level"). Direct
    /// datastores return `addr` unchanged.
    fn deref_addr(&self, addr: Address) -> (Address, usize) {
        (addr, self.payload_len(addr))
    }

    /// A fresh, empty datastore of the same flavour.
    fn clone_empty(&self) -> Box<dyn Datastore>;
}
