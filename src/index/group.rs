//! Composite of indexes and nested groups, addressed as one (spec §4.4):
//! insertions and queries fan out to every member. Used by
//! [`crate::odb::Odb`] for the implicit "all" group every context keeps
//! (spec §3 "The 'all' IndexGroup ... receives every address that was
//! successfully added via the context").

use std::sync::{Arc, Mutex};

use crate::address::Address;
use crate::error::{Error, Result};
use crate::index::{Condition, Handle, Index};

/// A child of an [`IndexGroup`]: either a leaf index or another, nested
/// group.
pub enum Member {
    Index(Arc<dyn Index>),
    Group(Arc<IndexGroup>),
}

impl Member {
    fn ident(&self) -> u64 {
        match self {
            Member::Index(idx) => idx.ident(),
            Member::Group(g) => g.ident,
        }
    }
}

/// One address/length pair surfaced by [`IndexGroup::query`] (spec §4.4
/// "results may repeat across children").
pub struct QueryHit {
    pub addr: Address,
    pub len: usize,
}

/// A composite of indexes/groups sharing one `ident`, fanned out to as
/// a unit (spec §4.4).
pub struct IndexGroup {
    ident: u64,
    members: Mutex<Vec<Member>>,
}

impl IndexGroup {
    pub fn new(ident: u64) -> IndexGroup {
        IndexGroup {
            ident,
            members: Mutex::new(Vec::new()),
        }
    }

    pub fn ident(&self) -> u64 {
        self.ident
    }

    /// Add a child. Declines (spec §4.4 "Integrity") if `child`'s ident
    /// doesn't match this group's.
    pub fn add_member(&self, child: Member) -> Result<()> {
        if child.ident() != self.ident {
            return Err(Error::IntegrityMismatch);
        }
        self.members.lock().unwrap().push(child);
        Ok(())
    }

    /// Convenience over [`IndexGroup::add_data_v`] for a caller holding a
    /// [`Handle`] rather than a bare address/ident pair.
    pub fn add_data(&self, handle: Handle) -> Result<()> {
        self.add_data_v(handle.addr, handle.ident)
    }

    /// Dispatch `addr` to every member, declining (silently, per spec
    /// §7) any whose ident doesn't match `caller_ident`.
    pub fn add_data_v(&self, addr: Address, caller_ident: u64) -> Result<()> {
        if caller_ident != self.ident {
            return Ok(());
        }
        for member in self.members.lock().unwrap().iter() {
            match member {
                Member::Index(idx) => idx.add_data_v(addr, caller_ident)?,
                Member::Group(g) => g.add_data_v(addr, caller_ident)?,
            }
        }
        Ok(())
    }

    /// Union of every member's matches for `condition` (spec §4.4:
    /// "results may repeat across children ... by design, relying on
    /// the caller to supply disjoint indexes when duplicates are
    /// undesirable").
    pub fn query(&self, condition: &Condition) -> Vec<QueryHit> {
        let mut out = Vec::new();
        for member in self.members.lock().unwrap().iter() {
            match member {
                Member::Index(idx) => {
                    for addr in idx.snapshot() {
                        let (real_addr, len) = idx.resolve(addr);
                        let payload = unsafe { real_addr.as_slice(len) };
                        if condition(payload) {
                            out.push(QueryHit {
                                addr: real_addr,
                                len,
                            });
                        }
                    }
                }
                Member::Group(g) => out.extend(g.query(condition)),
            }
        }
        out
    }

    /// Every leaf `Index` reachable from this group, transitively (spec
    /// §4.4 `flatten`).
    pub fn flatten(&self) -> Vec<Arc<dyn Index>> {
        let mut out = Vec::new();
        for member in self.members.lock().unwrap().iter() {
            match member {
                Member::Index(idx) => out.push(idx.clone()),
                Member::Group(g) => out.extend(g.flatten()),
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "group_test.rs"]
mod group_test;
