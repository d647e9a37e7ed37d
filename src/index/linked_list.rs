//! Ordered singly-linked-list index (spec §3, §4.3): the lighter-weight
//! sibling of [`rbtree::RbTreeIndex`][crate::index::rbtree::RbTreeIndex]
//! — O(n) lookup/insert in exchange for no rebalancing machinery at
//! all. Duplicates are kept inline as consecutive nodes rather than in
//! an embedded subtree, since a flat list has nothing to embed into.
//!
//! Node shape and raw-pointer linking follow this crate's own
//! `datastore::linked_list::LinkedList` node (one heap allocation per
//! entry, unlinked by direct pointer splice).

use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::address::Address;
use crate::datastore::Datastore;
use crate::error::{Error, Result};
use crate::index::{Comparator, Index, KeyExtractor, Merger};
use crate::spinlock::RWSpinlock;

struct Node {
    next: *mut Node,
    addr: Address,
}

struct ListState {
    head: *mut Node,
    len: usize,
}

// SAFETY: mutated only under `lock`'s write latch, read only under its
// read latch.
unsafe impl Send for ListState {}

type Cmp = Arc<dyn Fn(Address, Address) -> Ordering + Send + Sync>;

/// An ordered [`Index`] backed by a plain singly-linked list.
pub struct LinkedListIndex {
    ident: u64,
    luid: u64,
    datastore: Arc<dyn Datastore>,
    drop_duplicates: bool,
    merger: Option<Merger>,
    cmp: Cmp,
    lock: RWSpinlock,
    state: UnsafeCell<ListState>,
}

unsafe impl Sync for LinkedListIndex {}

impl LinkedListIndex {
    pub fn new(
        ident: u64,
        luid: u64,
        datastore: Arc<dyn Datastore>,
        cmp: Comparator,
        key: Option<KeyExtractor>,
        merger: Option<Merger>,
        drop_duplicates: bool,
    ) -> Result<LinkedListIndex> {
        if merger.is_some() && drop_duplicates {
            return Err(Error::InvalidConstruction(
                "linked-list index: merger and drop_duplicates are mutually exclusive".into(),
            ));
        }
        let ds = datastore.clone();
        let byte_cmp: Cmp = Arc::new(move |a: Address, b: Address| {
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
        Ok(LinkedListIndex {
            ident,
            luid,
            datastore,
            drop_duplicates,
            merger,
            cmp: byte_cmp,
            lock: RWSpinlock::new(),
            state: UnsafeCell::new(ListState {
                head: std::ptr::null_mut(),
                len: 0,
            }),
        })
    }

    #[allow(clippy::mut_from_ref)]
    fn state_mut(&self) -> &mut ListState {
        unsafe { &mut *self.state.get() }
    }

    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.datastore
    }

    /// Ordered snapshot, head to tail.
    pub fn to_vec(&self) -> Vec<Address> {
        let _r = self.lock.acquire_read(false);
        let mut out = Vec::with_capacity(self.state_mut().len);
        let mut cur = self.state_mut().head;
        while !cur.is_null() {
            let node = unsafe { &*cur };
            out.push(node.addr);
            cur = node.next;
        }
        out
    }
}

impl Drop for LinkedListIndex {
    fn drop(&mut self) {
        let mut cur = self.state_mut().head;
        while !cur.is_null() {
            let node = unsafe { Box::from_raw(cur) };
            cur = node.next;
        }
    }
}

impl Index for LinkedListIndex {
    fn ident(&self) -> u64 {
        self.ident
    }

    fn luid(&self) -> u64 {
        self.luid
    }

    fn count(&self) -> usize {
        let _r = self.lock.acquire_read(false);
        self.state_mut().len
    }

    fn drop_duplicates(&self) -> bool {
        self.drop_duplicates
    }

    fn add_data_v(&self, addr: Address, caller_ident: u64) -> Result<()> {
        if caller_ident != self.ident {
            return Ok(());
        }
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();

        // Find the first node whose key is >= addr's, splicing the new
        // node in just before it to keep the list ordered.
        let mut prev: *mut Node = std::ptr::null_mut();
        let mut cur = state.head;
        while !cur.is_null() {
            let node = unsafe { &mut *cur };
            match (self.cmp)(addr, node.addr) {
                Ordering::Less => break,
                Ordering::Greater => {
                    prev = cur;
                    cur = node.next;
                }
                Ordering::Equal => {
                    if self.drop_duplicates {
                        return Ok(());
                    }
                    if let Some(merge) = &self.merger {
                        node.addr = merge(addr, node.addr);
                        return Ok(());
                    }
                    prev = cur;
                    cur = node.next;
                    break;
                }
            }
        }
        let new_node = Box::into_raw(Box::new(Node { next: cur, addr }));
        if prev.is_null() {
            state.head = new_node;
        } else {
            unsafe { (*prev).next = new_node };
        }
        state.len += 1;
        Ok(())
    }

    fn remove_sweep(&self, marked_sorted: &[Address]) {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        let mut prev: *mut Node = std::ptr::null_mut();
        let mut cur = state.head;
        while !cur.is_null() {
            let node = unsafe { &*cur };
            let next = node.next;
            if crate::address::is_marked(marked_sorted, node.addr) {
                if prev.is_null() {
                    state.head = next;
                } else {
                    unsafe { (*prev).next = next };
                }
                drop(unsafe { Box::from_raw(cur) });
                state.len -= 1;
            } else {
                prev = cur;
            }
            cur = next;
        }
    }

    fn update(&self, old: &[Address], new: &[Address]) {
        let _w = self.lock.acquire_write(false);
        let mut cur = self.state_mut().head;
        while !cur.is_null() {
            let node = unsafe { &mut *cur };
            if let Some(pos) = old.iter().position(|&a| a == node.addr) {
                node.addr = new[pos];
            }
            cur = node.next;
        }
    }

    fn snapshot(&self) -> Vec<Address> {
        self.to_vec()
    }

    fn resolve(&self, addr: Address) -> (Address, usize) {
        self.datastore.deref_addr(addr)
    }
}

#[cfg(test)]
#[path = "linked_list_test.rs"]
mod linked_list_test;
