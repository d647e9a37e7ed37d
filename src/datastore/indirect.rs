//! Indirect datastore (spec §3, §4.1): stores addresses owned by a
//! *parent* datastore rather than payload bytes of its own. Used to back
//! a clone ODB context whose index stores references into the original
//! records, so a clone observes later mutations/eviction of the
//! original (spec §8 scenario 4, "query returns a new context").
//!
//! Internally this is just a [`bank::Bank`] of pointer-sized slots, so
//! it gets the same address-stability and free-list reuse as any other
//! bank-backed flavour; every `Datastore` method it implements derefs
//! through `parent` as needed before doing anything user-visible.

use std::mem::size_of;
use std::sync::Arc;

use crate::address::Address;
use crate::datastore::bank::Bank;
use crate::datastore::{ArchiveHook, Datastore, Snapshot, SweepResult};
use crate::error::{Error, Result};
use crate::metadata::MetaFlags;

/// Forwards a sweep's `prune`/archive callbacks through one level of
/// dereference so they see the parent's bytes, not this datastore's
/// stored pointer.
struct DerefArchive<'a> {
    parent: &'a dyn Datastore,
    inner: &'a dyn ArchiveHook,
}

impl<'a> ArchiveHook for DerefArchive<'a> {
    fn write(&self, stored: &[u8]) -> bool {
        let parent_addr = unsafe { Address::from_bytes(stored) };
        let (real_addr, len) = self.parent.deref_addr(parent_addr);
        let payload = unsafe { real_addr.as_slice(len) };
        self.inner.write(payload)
    }
}

/// Stores addresses into a parent datastore; every read-oriented
/// operation derefs one level before handing bytes back to the caller.
pub struct Indirect {
    parent: Arc<dyn Datastore>,
    storage: Bank,
}

impl Indirect {
    /// Build an indirect datastore referencing records owned by
    /// `parent`. `chunk_cap` sizes the bank backing this datastore's own
    /// pointer slots, independent of the parent's chunking.
    pub fn new(parent: Arc<dyn Datastore>, chunk_cap: usize) -> Result<Indirect> {
        let storage = Bank::new(size_of::<usize>(), chunk_cap, MetaFlags::none())?;
        Ok(Indirect { parent, storage })
    }

    fn deref_stored(&self, stored: &[u8]) -> (Address, usize) {
        let parent_addr = unsafe { Address::from_bytes(stored) };
        self.parent.deref_addr(parent_addr)
    }
}

impl Datastore for Indirect {
    fn add(&self, _bytes: &[u8]) -> Result<Address> {
        Err(Error::Unsupported(
            "Indirect::add: use add_indirect with a parent address".into(),
        ))
    }

    fn add_indirect(&self, parent_addr: Address) -> Result<Address> {
        self.storage.add(&parent_addr.to_bytes())
    }

    fn remove_addr(&self, addr: Address) -> Result<()> {
        self.storage.remove_addr(addr)
    }

    fn sweep(
        &self,
        prune: &dyn Fn(&[u8]) -> bool,
        archive: Option<&dyn ArchiveHook>,
    ) -> Result<SweepResult> {
        let wrapped_prune = |stored: &[u8]| -> bool {
            let (real_addr, len) = self.deref_stored(stored);
            let payload = unsafe { real_addr.as_slice(len) };
            prune(payload)
        };
        match archive {
            Some(hook) => {
                let adapter = DerefArchive {
                    parent: self.parent.as_ref(),
                    inner: hook,
                };
                self.storage.sweep(&wrapped_prune, Some(&adapter))
            }
            None => self.storage.sweep(&wrapped_prune, None),
        }
    }

    fn cleanup(&self, result: &SweepResult) {
        self.storage.cleanup(result)
    }

    fn purge(&self, free_hook: Option<&dyn Fn(Address)>) {
        match free_hook {
            Some(hook) => {
                let wrapped = |stored_addr: Address| {
                    let stored = unsafe { stored_addr.as_slice(size_of::<usize>()) };
                    let (real_addr, _len) = self.deref_stored(stored);
                    hook(real_addr);
                };
                self.storage.purge(Some(&wrapped));
            }
            None => self.storage.purge(None),
        }
    }

    fn it_first(&self) -> Vec<Snapshot> {
        self.storage
            .it_first()
            .into_iter()
            .map(|snap| {
                let stored = unsafe { snap.addr.as_slice(snap.len) };
                let (real_addr, len) = self.deref_stored(stored);
                Snapshot { addr: real_addr, len }
            })
            .collect()
    }

    fn count(&self) -> usize {
        self.storage.count()
    }

    fn payload_len(&self, _addr: Address) -> usize {
        size_of::<usize>()
    }

    fn deref_addr(&self, addr: Address) -> (Address, usize) {
        let stored = unsafe { addr.as_slice(size_of::<usize>()) };
        self.deref_stored(stored)
    }

    fn clone_empty(&self) -> Box<dyn Datastore> {
        Box::new(
            Indirect::new(self.parent.clone(), self.storage.count().max(1))
                .expect("same config"),
        )
    }
}

#[cfg(test)]
#[path = "indirect_test.rs"]
mod indirect_test;
