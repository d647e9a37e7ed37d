//! Linked-list datastores (spec §3, §4.1): singly-linked nodes, each
//! carrying one record. [`LinkedList`] is fixed-width; [`VariableList`]
//! prefixes each node's payload with its length so records of differing
//! sizes can share one datastore.
//!
//! Each node is its own heap allocation (`Box<Node>`, leaked into a raw
//! pointer while it is linked in); unlinking a node never disturbs any
//! other node's address, giving the same address-stability guarantee as
//! the bank (spec §3).

use std::cell::UnsafeCell;

use log::debug;

use crate::address::Address;
use crate::datastore::{ArchiveHook, Datastore, Snapshot, SweepResult};
use crate::error::{Error, Result};
use crate::metadata::MetaFlags;
use crate::spinlock::RWSpinlock;

struct Node {
    next: *mut Node,
    /// `[ len_prefix? | payload | metadata_tail ]`; `len_prefix` is a
    /// 4-byte little-endian payload length, present only in
    /// [`VariableList`] nodes.
    data: Vec<u8>,
}

struct ListState {
    head: *mut Node,
    len: usize,
}

impl ListState {
    fn new() -> ListState {
        ListState {
            head: std::ptr::null_mut(),
            len: 0,
        }
    }
}

// SAFETY: ListState is only ever mutated while holding `lock`'s write
// latch, and only ever read while holding its read latch.
unsafe impl Send for ListState {}

struct ListCore {
    meta: MetaFlags,
    variable: bool,
    lock: RWSpinlock,
    state: UnsafeCell<ListState>,
}

unsafe impl Sync for ListCore {}

impl ListCore {
    fn new(meta: MetaFlags, variable: bool) -> ListCore {
        ListCore {
            meta,
            variable,
            lock: RWSpinlock::new(),
            state: UnsafeCell::new(ListState::new()),
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn state_mut(&self) -> &mut ListState {
        unsafe { &mut *self.state.get() }
    }

    /// Offset of the payload within a node's `data` buffer.
    fn payload_offset(&self) -> usize {
        if self.variable {
            4
        } else {
            0
        }
    }

    fn push_node(&self, data: Vec<u8>) -> Address {
        let state = self.state_mut();
        let payload_off = self.payload_offset();
        let node = Box::new(Node {
            next: state.head,
            data,
        });
        let ptr = Box::into_raw(node);
        state.head = ptr;
        state.len += 1;
        let addr = unsafe { (*ptr).data.as_ptr().add(payload_off) as *mut u8 };
        unsafe { Address::from_raw(addr) }
    }

    fn build_data(&self, payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.payload_offset() + payload.len() + self.meta.width());
        if self.variable {
            data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        }
        data.extend_from_slice(payload);
        let tail_start = data.len();
        data.resize(tail_start + self.meta.width(), 0);
        if self.meta.width() > 0 {
            self.meta.stamp(&mut data[tail_start..]);
        }
        data
    }

    fn find_node(&self, addr: Address) -> (*mut Node, *mut Node) {
        // returns (prev, node) where `node`'s payload pointer == addr, or
        // (_, null) if not found. `prev` is null when `node` is the head.
        let state = self.state_mut();
        let payload_off = self.payload_offset();
        let target = addr.as_ptr() as usize;
        let mut prev: *mut Node = std::ptr::null_mut();
        let mut cur = state.head;
        while !cur.is_null() {
            let candidate = unsafe { (*cur).data.as_ptr().add(payload_off) as usize };
            if candidate == target {
                return (prev, cur);
            }
            prev = cur;
            cur = unsafe { (*cur).next };
        }
        (prev, std::ptr::null_mut())
    }

    fn unlink(&self, prev: *mut Node, node: *mut Node) {
        let state = self.state_mut();
        if prev.is_null() {
            state.head = unsafe { (*node).next };
        } else {
            unsafe { (*prev).next = (*node).next };
        }
        state.len -= 1;
        // SAFETY: `node` came from `Box::into_raw` in `push_node` and is
        // being removed from the list exactly once.
        drop(unsafe { Box::from_raw(node) });
    }

    fn node_payload_len(&self, node: *mut Node) -> usize {
        if self.variable {
            let data = unsafe { &(*node).data };
            u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize
        } else {
            unsafe { (*node).data.len() - self.meta.width() }
        }
    }

    fn it_first(&self) -> Vec<Snapshot> {
        let _r = self.lock.acquire_read(false);
        let state = self.state_mut();
        let payload_off = self.payload_offset();
        let mut out = Vec::with_capacity(state.len);
        let mut cur = state.head;
        while !cur.is_null() {
            let len = self.node_payload_len(cur);
            let addr = unsafe { Address::from_raw((*cur).data.as_ptr().add(payload_off) as *mut u8) };
            out.push(Snapshot { addr, len });
            cur = unsafe { (*cur).next };
        }
        out
    }

    fn sweep(
        &self,
        prune: &dyn Fn(&[u8]) -> bool,
        archive: Option<&dyn ArchiveHook>,
    ) -> SweepResult {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        let mut marked = Vec::new();
        let mut cur = state.head;
        while !cur.is_null() {
            let len = self.node_payload_len(cur);
            let payload_off = self.payload_offset();
            let addr = unsafe { Address::from_raw((*cur).data.as_ptr().add(payload_off) as *mut u8) };
            let payload = unsafe { addr.as_slice(len) };
            if prune(payload) {
                if let Some(hook) = archive {
                    hook.write(payload);
                }
                marked.push(addr);
            }
            cur = unsafe { (*cur).next };
        }
        marked.sort_unstable();
        debug!("linked-list sweep: marked {} of {} live records", marked.len(), state.len);
        SweepResult {
            marked,
            relocated: None,
        }
    }

    fn cleanup(&self, result: &SweepResult) {
        let _w = self.lock.acquire_write(false);
        for &addr in &result.marked {
            let (prev, node) = self.find_node(addr);
            if !node.is_null() {
                self.unlink(prev, node);
            }
        }
    }

    fn purge(&self, free_hook: Option<&dyn Fn(Address)>) {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        let payload_off = self.payload_offset();
        let mut cur = state.head;
        while !cur.is_null() {
            let next = unsafe { (*cur).next };
            if let Some(hook) = free_hook {
                let addr = unsafe { Address::from_raw((*cur).data.as_ptr().add(payload_off) as *mut u8) };
                hook(addr);
            }
            drop(unsafe { Box::from_raw(cur) });
            cur = next;
        }
        *state = ListState::new();
    }

    fn count(&self) -> usize {
        let _r = self.lock.acquire_read(false);
        self.state_mut().len
    }
}

impl Drop for ListCore {
    fn drop(&mut self) {
        self.purge(None);
    }
}

/// Fixed-width singly-linked-list datastore.
pub struct LinkedList {
    payload_len: usize,
    core: ListCore,
}

impl LinkedList {
    pub fn new(payload_len: usize, meta: MetaFlags) -> LinkedList {
        LinkedList {
            payload_len,
            core: ListCore::new(meta, false),
        }
    }
}

impl Datastore for LinkedList {
    fn add(&self, bytes: &[u8]) -> Result<Address> {
        if bytes.len() != self.payload_len {
            return Err(Error::InvalidConstruction(format!(
                "expected {} byte payload, got {}",
                self.payload_len,
                bytes.len()
            )));
        }
        let _w = self.core.lock.acquire_write(false);
        let data = self.core.build_data(bytes);
        Ok(self.core.push_node(data))
    }

    fn reserve(&self) -> Result<Address> {
        let _w = self.core.lock.acquire_write(false);
        let data = self.core.build_data(&vec![0u8; self.payload_len]);
        Ok(self.core.push_node(data))
    }

    fn remove_addr(&self, addr: Address) -> Result<()> {
        let _w = self.core.lock.acquire_write(false);
        let (prev, node) = self.core.find_node(addr);
        if node.is_null() {
            return Err(Error::NotFound);
        }
        self.core.unlink(prev, node);
        Ok(())
    }

    fn sweep(
        &self,
        prune: &dyn Fn(&[u8]) -> bool,
        archive: Option<&dyn ArchiveHook>,
    ) -> Result<SweepResult> {
        Ok(self.core.sweep(prune, archive))
    }

    fn cleanup(&self, result: &SweepResult) {
        self.core.cleanup(result)
    }

    fn purge(&self, free_hook: Option<&dyn Fn(Address)>) {
        self.core.purge(free_hook)
    }

    fn it_first(&self) -> Vec<Snapshot> {
        self.core.it_first()
    }

    fn count(&self) -> usize {
        self.core.count()
    }

    fn payload_len(&self, _addr: Address) -> usize {
        self.payload_len
    }

    fn clone_empty(&self) -> Box<dyn Datastore> {
        Box::new(LinkedList::new(self.payload_len, self.core.meta))
    }
}

/// Variable-width singly-linked-list datastore: each node carries its
/// own payload length.
pub struct VariableList {
    core: ListCore,
}

impl VariableList {
    pub fn new(meta: MetaFlags) -> VariableList {
        VariableList {
            core: ListCore::new(meta, true),
        }
    }
}

impl Datastore for VariableList {
    fn add(&self, bytes: &[u8]) -> Result<Address> {
        let _w = self.core.lock.acquire_write(false);
        let data = self.core.build_data(bytes);
        Ok(self.core.push_node(data))
    }

    fn reserve_n(&self, n: usize) -> Result<Address> {
        let _w = self.core.lock.acquire_write(false);
        let data = self.core.build_data(&vec![0u8; n]);
        Ok(self.core.push_node(data))
    }

    fn remove_addr(&self, addr: Address) -> Result<()> {
        let _w = self.core.lock.acquire_write(false);
        let (prev, node) = self.core.find_node(addr);
        if node.is_null() {
            return Err(Error::NotFound);
        }
        self.core.unlink(prev, node);
        Ok(())
    }

    fn sweep(
        &self,
        prune: &dyn Fn(&[u8]) -> bool,
        archive: Option<&dyn ArchiveHook>,
    ) -> Result<SweepResult> {
        Ok(self.core.sweep(prune, archive))
    }

    fn cleanup(&self, result: &SweepResult) {
        self.core.cleanup(result)
    }

    fn purge(&self, free_hook: Option<&dyn Fn(Address)>) {
        self.core.purge(free_hook)
    }

    fn it_first(&self) -> Vec<Snapshot> {
        self.core.it_first()
    }

    fn count(&self) -> usize {
        self.core.count()
    }

    fn payload_len(&self, addr: Address) -> usize {
        let (_, node) = self.core.find_node(addr);
        if node.is_null() {
            0
        } else {
            self.core.node_payload_len(node)
        }
    }

    fn clone_empty(&self) -> Box<dyn Datastore> {
        Box::new(VariableList::new(self.core.meta))
    }
}

#[cfg(test)]
#[path = "linked_list_test.rs"]
mod linked_list_test;
