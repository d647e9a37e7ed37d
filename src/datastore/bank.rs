//! Fixed-bank datastore (spec §3, §4.1): an ordered sequence of
//! equal-sized chunks, each holding `cap` records. A free-list stack of
//! vacated slots is reused on the next `add`; otherwise records append
//! at the bump cursor. Supports positional lookup via chunk/offset
//! arithmetic.
//!
//! Each chunk is a single heap allocation (`Box<[u8]>`) that is never
//! moved or resized once created; growing the `Vec` of chunk pointers
//! never invalidates an [`Address`] already handed out, which is what
//! gives the bank its address-stability guarantee (spec §3).

use std::cell::UnsafeCell;
use std::slice;

use log::{debug, trace};

use crate::address::Address;
use crate::datastore::{ArchiveHook, Datastore, Snapshot, SweepResult};
use crate::error::{Error, Result};
use crate::metadata::MetaFlags;
use crate::spinlock::RWSpinlock;

struct BankState {
    chunks: Vec<Box<[u8]>>,
    /// Stack of freed slot indices, reused on the next allocation.
    free: Vec<usize>,
    /// One-past the highest slot index ever allocated.
    bump: usize,
    /// `live[idx]` is true while slot `idx` holds a live record.
    live: Vec<bool>,
}

impl BankState {
    fn new() -> BankState {
        BankState {
            chunks: Vec::new(),
            free: Vec::new(),
            bump: 0,
            live: Vec::new(),
        }
    }
}

/// A pre-allocated, chunked arena datastore.
pub struct Bank {
    payload_len: usize,
    meta: MetaFlags,
    stride: usize,
    chunk_cap: usize,
    lock: RWSpinlock,
    state: UnsafeCell<BankState>,
}

// SAFETY: all access to `state` is mediated by `lock`, an RWSpinlock
// providing the same multi-reader/single-writer discipline a
// `std::sync::RwLock` would.
unsafe impl Sync for Bank {}

impl Bank {
    /// Build a bank datastore holding fixed-width records of
    /// `payload_len` bytes, `chunk_cap` records per chunk, optionally
    /// stamping `meta` on every slot.
    pub fn new(payload_len: usize, chunk_cap: usize, meta: MetaFlags) -> Result<Bank> {
        if chunk_cap == 0 {
            return Err(Error::InvalidConstruction(
                "bank chunk capacity must be non-zero".into(),
            ));
        }
        Ok(Bank {
            payload_len,
            meta,
            stride: payload_len + meta.width(),
            chunk_cap,
            lock: RWSpinlock::new(),
            state: UnsafeCell::new(BankState::new()),
        })
    }

    #[allow(clippy::mut_from_ref)]
    fn state_mut(&self) -> &mut BankState {
        // SAFETY: caller holds either the read or write latch; bank
        // mutation only happens under the write latch, matching the
        // `&mut` borrow taken here.
        unsafe { &mut *self.state.get() }
    }

    fn slot_addr(&self, state: &BankState, idx: usize) -> Address {
        let chunk = idx / self.chunk_cap;
        let offset = idx % self.chunk_cap;
        let ptr = unsafe { state.chunks[chunk].as_ptr().add(offset * self.stride) as *mut u8 };
        unsafe { Address::from_raw(ptr) }
    }

    fn slot_index_of(&self, state: &BankState, addr: Address) -> Option<usize> {
        let target = addr.as_ptr() as usize;
        for (ci, chunk) in state.chunks.iter().enumerate() {
            let start = chunk.as_ptr() as usize;
            let end = start + chunk.len();
            if target >= start && target < end {
                let offset = (target - start) / self.stride;
                return Some(ci * self.chunk_cap + offset);
            }
        }
        None
    }

    fn alloc_slot(&self, state: &mut BankState) -> usize {
        if let Some(idx) = state.free.pop() {
            state.live[idx] = true;
            return idx;
        }
        let idx = state.bump;
        if idx == state.chunks.len() * self.chunk_cap {
            state
                .chunks
                .push(vec![0u8; self.chunk_cap * self.stride].into_boxed_slice());
            trace!("bank: grew to {} chunks", state.chunks.len());
        }
        state.bump += 1;
        state.live.push(true);
        idx
    }

    fn stamp_tail(&self, addr: Address) {
        if self.meta.width() == 0 {
            return;
        }
        let tail = unsafe {
            slice::from_raw_parts_mut(addr.as_ptr().add(self.payload_len), self.meta.width())
        };
        self.meta.stamp(tail);
    }
}

impl Datastore for Bank {
    fn add(&self, bytes: &[u8]) -> Result<Address> {
        if bytes.len() != self.payload_len {
            return Err(Error::InvalidConstruction(format!(
                "expected {} byte payload, got {}",
                self.payload_len,
                bytes.len()
            )));
        }
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        let idx = self.alloc_slot(state);
        let addr = self.slot_addr(state, idx);
        unsafe { addr.as_slice_mut(self.payload_len).copy_from_slice(bytes) };
        self.stamp_tail(addr);
        Ok(addr)
    }

    fn reserve(&self) -> Result<Address> {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        let idx = self.alloc_slot(state);
        let addr = self.slot_addr(state, idx);
        self.stamp_tail(addr);
        Ok(addr)
    }

    fn get_at(&self, index: usize) -> Result<Address> {
        let _r = self.lock.acquire_read(false);
        let state = self.state_mut();
        if index >= state.bump {
            return Err(Error::NotFound);
        }
        Ok(self.slot_addr(state, index))
    }

    fn remove_at(&self, index: usize) -> Result<()> {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        if index >= state.bump || !state.live[index] {
            return Err(Error::NotFound);
        }
        state.live[index] = false;
        state.free.push(index);
        Ok(())
    }

    fn remove_addr(&self, addr: Address) -> Result<()> {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        match self.slot_index_of(state, addr) {
            Some(idx) if state.live[idx] => {
                state.live[idx] = false;
                state.free.push(idx);
                Ok(())
            }
            _ => Err(Error::NotFound),
        }
    }

    fn sweep(
        &self,
        prune: &dyn Fn(&[u8]) -> bool,
        archive: Option<&dyn ArchiveHook>,
    ) -> Result<SweepResult> {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        let mut marked = Vec::new();
        for idx in 0..state.bump {
            if !state.live[idx] {
                continue;
            }
            let addr = self.slot_addr(state, idx);
            let payload = unsafe { addr.as_slice(self.payload_len) };
            if prune(payload) {
                if let Some(hook) = archive {
                    hook.write(payload);
                }
                marked.push(addr);
            }
        }
        marked.sort_unstable();
        debug!("bank sweep: marked {} of {} live records", marked.len(), {
            state.live.iter().filter(|l| **l).count()
        });
        Ok(SweepResult {
            marked,
            relocated: None,
        })
    }

    fn cleanup(&self, result: &SweepResult) {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        for &addr in &result.marked {
            if let Some(idx) = self.slot_index_of(state, addr) {
                if state.live[idx] {
                    state.live[idx] = false;
                    state.free.push(idx);
                }
            }
        }
    }

    fn purge(&self, free_hook: Option<&dyn Fn(Address)>) {
        let _w = self.lock.acquire_write(false);
        let state = self.state_mut();
        if let Some(hook) = free_hook {
            for idx in 0..state.bump {
                if state.live[idx] {
                    hook(self.slot_addr(state, idx));
                }
            }
        }
        *state = BankState::new();
    }

    fn it_first(&self) -> Vec<Snapshot> {
        let _r = self.lock.acquire_read(false);
        let state = self.state_mut();
        (0..state.bump)
            .filter(|&idx| state.live[idx])
            .map(|idx| Snapshot {
                addr: self.slot_addr(state, idx),
                len: self.payload_len,
            })
            .collect()
    }

    fn count(&self) -> usize {
        let _r = self.lock.acquire_read(false);
        self.state_mut().bump
    }

    fn payload_len(&self, _addr: Address) -> usize {
        self.payload_len
    }

    fn clone_empty(&self) -> Box<dyn Datastore> {
        Box::new(Bank::new(self.payload_len, self.chunk_cap, self.meta).expect("same config"))
    }
}

#[cfg(test)]
#[path = "bank_test.rs"]
mod bank_test;
