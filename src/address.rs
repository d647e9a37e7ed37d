//! `Address` — the stable byte pointer a datastore hands out (spec §3).
//!
//! Once a datastore places a record, its address is stable for the
//! entire lifetime of the record; indexes key on, and store, these
//! addresses rather than owning record memory themselves. The backing
//! storage behind an `Address` is always a heap allocation that outlives
//! the `Address` itself (a boxed chunk in a bank, or an individually
//! boxed linked-list node) — growing the *collection* of chunks/nodes
//! never moves the bytes already handed out, the same guarantee the
//! original C++ `bank`/`linkedlist` datastores relied on.

use std::{cmp::Ordering, fmt, ptr::NonNull, slice};

/// A stable pointer to the first byte of a record's user payload.
///
/// `Address` is `Copy` and ordered by raw pointer value, which is what
/// lets [`crate::datastore::SweepResult::marked`] be sorted once and
/// binary-searched by every attached index during a sweep (spec §4.7).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(NonNull<u8>);

// SAFETY: an `Address` is a plain pointer value; all access through it
// goes through the owning datastore's `RWSpinlock`, which is the
// synchronization boundary. The pointer itself carries no aliased
// mutable state.
unsafe impl Send for Address {}
unsafe impl Sync for Address {}

impl Address {
    /// Wrap a raw pointer into a stable record arena.
    ///
    /// # Safety
    /// `ptr` must point at memory that will not move or be freed for
    /// as long as any `Address` built from it is reachable.
    pub(crate) unsafe fn from_raw(ptr: *mut u8) -> Address {
        Address(NonNull::new(ptr).expect("datastore handed out a null address"))
    }

    pub(crate) fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Borrow `len` bytes starting at this address.
    ///
    /// # Safety
    /// The caller must hold at least a read latch on the owning
    /// datastore, and `len` must not exceed the record's stored length.
    pub unsafe fn as_slice<'a>(self, len: usize) -> &'a [u8] {
        slice::from_raw_parts(self.0.as_ptr(), len)
    }

    /// Borrow `len` bytes mutably starting at this address.
    ///
    /// # Safety
    /// The caller must hold a write latch on the owning datastore, and
    /// `len` must not exceed the record's stored length.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn as_slice_mut<'a>(self, len: usize) -> &'a mut [u8] {
        slice::from_raw_parts_mut(self.0.as_ptr(), len)
    }

    fn as_usize(self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Encode this address as raw bytes, for storage inside an
    /// [`crate::datastore::indirect::Indirect`] datastore slot.
    pub(crate) fn to_bytes(self) -> [u8; std::mem::size_of::<usize>()] {
        self.as_usize().to_ne_bytes()
    }

    /// Reconstruct an address previously encoded with [`Address::to_bytes`].
    ///
    /// # Safety
    /// `bytes` must have come from `Address::to_bytes` on an address
    /// whose pointee is still alive.
    pub(crate) unsafe fn from_bytes(bytes: &[u8]) -> Address {
        let mut buf = [0u8; std::mem::size_of::<usize>()];
        buf.copy_from_slice(bytes);
        Address::from_raw(usize::from_ne_bytes(buf) as *mut u8)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address({:#x})", self.as_usize())
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_usize().cmp(&other.as_usize())
    }
}

/// Binary-search `marked` (sorted ascending, per spec §4.1/§4.7) for
/// `addr`. Shared by every index's `remove_sweep`.
pub fn is_marked(marked: &[Address], addr: Address) -> bool {
    marked.binary_search(&addr).is_ok()
}

#[cfg(test)]
#[path = "address_test.rs"]
mod address_test;
