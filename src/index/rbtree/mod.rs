//! Top-down red-black tree index (spec §3 "Red-black tree node", §4.2).
//!
//! [`RbTreeIndex`] keys a [`tree::Tree`] of record [`Address`]es by
//! running the caller's byte [`Comparator`] (optionally narrowed by a
//! [`KeyExtractor`]) over the payload each address derefs to in the
//! backing datastore. Duplicates (addresses comparing equal) either
//! merge via a supplied [`Merger`], collapse per `drop_duplicates`, or
//! accumulate in an embedded duplicates subtree (spec §3 "embedded
//! tree").

mod node;
mod tree;

pub mod iter;

use std::sync::Arc;

use crate::address::Address;
use crate::datastore::Datastore;
use crate::error::{Error, Result};
use crate::index::{Comparator, Index, KeyExtractor, Merger};
use crate::spinlock::RWSpinlock;

pub use iter::{Cursor, Direction};

use std::cell::UnsafeCell;

/// A red-black tree [`Index`] over one backing [`Datastore`].
pub struct RbTreeIndex {
    ident: u64,
    luid: u64,
    datastore: Arc<dyn Datastore>,
    drop_duplicates: bool,
    lock: RWSpinlock,
    tree: UnsafeCell<tree::Tree>,
}

// SAFETY: all access to `tree` is mediated by `lock`, the same
// RWSpinlock discipline every datastore flavour already relies on.
unsafe impl Sync for RbTreeIndex {}

impl RbTreeIndex {
    /// Build an index identified by `ident` (its owning ODB context) and
    /// `luid` (its scheduler interference class), comparing records
    /// through `datastore` via `cmp` (optionally over `key` rather than
    /// raw payload bytes), merging duplicates with `merger` if given, or
    /// else dropping them when `drop_duplicates` is set.
    pub fn new(
        ident: u64,
        luid: u64,
        datastore: Arc<dyn Datastore>,
        cmp: Comparator,
        key: Option<KeyExtractor>,
        merger: Option<Merger>,
        drop_duplicates: bool,
    ) -> Result<RbTreeIndex> {
        if merger.is_some() && drop_duplicates {
            return Err(Error::InvalidConstruction(
                "rbtree index: merger and drop_duplicates are mutually exclusive".into(),
            ));
        }
        let ds = datastore.clone();
        let byte_cmp: tree::Cmp = Arc::new(move |a: Address, b: Address| {
            let (ra, la) = ds.deref_addr(a);
            let (rb, lb) = ds.deref_addr(b);
            let pa = unsafe { ra.as_slice(la) };
            let pb = unsafe { rb.as_slice(lb) };
            let (ka, kb) = match &key {
                Some(ext) => (ext.extract(pa), ext.extract(pb)),
                None => (pa.to_vec(), pb.to_vec()),
            };
            cmp(&ka, &kb).cmp(&0)
        });
        Ok(RbTreeIndex {
            ident,
            luid,
            datastore,
            drop_duplicates,
            lock: RWSpinlock::new(),
            tree: UnsafeCell::new(tree::Tree::new(byte_cmp, drop_duplicates, merger)),
        })
    }

    #[allow(clippy::mut_from_ref)]
    fn tree_mut(&self) -> &mut tree::Tree {
        unsafe { &mut *self.tree.get() }
    }

    fn tree_ref(&self) -> &tree::Tree {
        unsafe { &*self.tree.get() }
    }

    /// Cursor positioned at `probe`, or the nearest neighbour in `dir`
    /// if no exact match exists (spec §4.2 `it_lookup`). The returned
    /// cursor holds this index's read latch for as long as it lives —
    /// callers must drop it before any write touches this index.
    pub fn it_lookup(&self, probe: Address, dir: Direction) -> Cursor<'_> {
        let guard = self.lock.acquire_read(false);
        Cursor::lookup(
            self.tree_ref().root.as_deref(),
            probe,
            dir,
            self.cmp_ref(),
            Some(guard),
        )
    }

    pub fn it_first(&self) -> Cursor<'_> {
        let guard = self.lock.acquire_read(false);
        Cursor::full(self.tree_ref().root.as_deref(), Direction::Forward, Some(guard))
    }

    pub fn it_last(&self) -> Cursor<'_> {
        let guard = self.lock.acquire_read(false);
        Cursor::full(self.tree_ref().root.as_deref(), Direction::Reverse, Some(guard))
    }

    fn cmp_ref(&self) -> &tree::Cmp {
        self.tree_ref().cmp_handle()
    }

    /// The backing datastore this index's addresses deref through; used
    /// by [`group::IndexGroup`][crate::index::group::IndexGroup] query
    /// assembly to pull payload bytes for a matched address.
    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.datastore
    }
}

impl Index for RbTreeIndex {
    fn ident(&self) -> u64 {
        self.ident
    }

    fn luid(&self) -> u64 {
        self.luid
    }

    fn count(&self) -> usize {
        let _r = self.lock.acquire_read(false);
        self.tree_ref().count()
    }

    fn drop_duplicates(&self) -> bool {
        self.drop_duplicates
    }

    fn add_data_v(&self, addr: Address, caller_ident: u64) -> Result<()> {
        if caller_ident != self.ident {
            return Ok(());
        }
        let _w = self.lock.acquire_write(false);
        self.tree_mut().upsert(addr);
        Ok(())
    }

    fn remove_sweep(&self, marked_sorted: &[Address]) {
        let _w = self.lock.acquire_write(false);
        self.tree_mut().remove_sweep(marked_sorted);
    }

    fn update(&self, old: &[Address], new: &[Address]) {
        let _w = self.lock.acquire_write(false);
        self.tree_mut().update(old, new);
    }

    fn snapshot(&self) -> Vec<Address> {
        let _r = self.lock.acquire_read(false);
        let mut out = Vec::with_capacity(self.tree_ref().count());
        let mut cursor = Cursor::full(self.tree_ref().root.as_deref(), Direction::Forward, None);
        while let Some(addr) = cursor.next() {
            out.push(addr);
        }
        out
    }

    fn rbt_verify(&self) -> i32 {
        let _r = self.lock.acquire_read(false);
        self.tree_ref().verify()
    }

    fn resolve(&self, addr: Address) -> (Address, usize) {
        self.datastore.deref_addr(addr)
    }
}
