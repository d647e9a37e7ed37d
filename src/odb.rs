//! `Odb` — the façade tying one datastore to a collection of indexes and
//! groups, plus the optional scheduler, archiver, pruning predicate, and
//! memory-watchdog thread (spec §4.5).
//!
//! A query against an index returns a new `Odb` whose datastore is an
//! *indirect clone* of the originating datastore (spec §3 "Parent/clone
//! relation"). The clone's index list lives behind a small shared
//! handle ([`CloneHandle`]) the parent keeps a weak reference to, so
//! sweep-triggered relocation can reach it (spec §4.7 step 3) without
//! requiring clones to be wrapped in `Arc` by the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::{debug, warn};

use crate::address::Address;
use crate::datastore::indirect::Indirect;
use crate::datastore::{ArchiveHook, Datastore};
use crate::error::{Error, Result};
use crate::index::group::{IndexGroup, Member};
use crate::index::linked_list::LinkedListIndex;
use crate::index::rbtree::RbTreeIndex;
use crate::index::{Comparator, Condition, Handle, Index, KeyExtractor, Keygen, Merger};
use crate::scheduler::{Scheduler, WorkFlags};
use crate::spinlock::RWSpinlock;
use crate::watchdog::{Watchdog, WatchdogSweep};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Hand out a fresh process-wide unique id, used both for `Odb::ident`
/// and for each index's `luid` (Design Notes §9: "any atomic counter or
/// UUID suffices").
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

/// Which red-black-tree/linked-list flavour [`Odb::create_index`] builds.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IndexKind {
    RbTree,
    LinkedList,
}

/// Parameters for [`Odb::create_index`] (spec §4.5).
pub struct IndexSpec {
    pub kind: IndexKind,
    pub drop_duplicates: bool,
    /// If true, this index joins the context's `all` group and so
    /// receives every future `add_data` insertion that doesn't opt out.
    pub add_to_all: bool,
    /// If true, the index is immediately populated from every record
    /// already live in the datastore.
    pub populate_existing: bool,
    pub comparator: Comparator,
    pub merger: Option<Merger>,
    pub keygen: Option<Keygen>,
    pub keylen: Option<usize>,
}

impl IndexSpec {
    pub fn new(kind: IndexKind, comparator: Comparator) -> IndexSpec {
        IndexSpec {
            kind,
            drop_duplicates: false,
            add_to_all: true,
            populate_existing: true,
            comparator,
            merger: None,
            keygen: None,
            keylen: None,
        }
    }
}

/// Shared index registry a clone `Odb` exposes to its parent, so the
/// parent's sweep can cascade `update()` calls into the clone without
/// requiring the clone to live behind an `Arc<Odb>` (spec §4.7 step 3).
struct CloneHandle {
    indexes: Mutex<Vec<Arc<dyn Index>>>,
}

/// Construction parameters for [`Odb::new`] (spec §4.5), an ambient
/// builder-struct layer grounded in the teacher's `robt::Config`
/// convention.
pub struct OdbConfig {
    pub prune: Option<Arc<dyn Fn(&[u8]) -> bool + Send + Sync>>,
    pub archive: Option<Arc<dyn ArchiveHook>>,
    pub free_hook: Option<Arc<dyn Fn(Address) + Send + Sync>>,
}

impl Default for OdbConfig {
    fn default() -> OdbConfig {
        OdbConfig {
            prune: None,
            archive: None,
            free_hook: None,
        }
    }
}

/// The façade tying a datastore to its indexes, groups, scheduler, and
/// optional archiver/watchdog (spec §4.5).
pub struct Odb {
    ident: u64,
    lock: RWSpinlock,
    datastore: Arc<dyn Datastore>,
    indexes: Mutex<Vec<Arc<dyn Index>>>,
    groups: Mutex<Vec<Arc<IndexGroup>>>,
    all: Arc<IndexGroup>,
    prune: Option<Arc<dyn Fn(&[u8]) -> bool + Send + Sync>>,
    archive: Option<Arc<dyn ArchiveHook>>,
    free_hook: Option<Arc<dyn Fn(Address) + Send + Sync>>,
    scheduler: Mutex<Option<Scheduler>>,
    watchdog: Mutex<Option<Watchdog>>,
    clone_handle: Arc<CloneHandle>,
    /// Present only on a clone: its parent's clone registry, so `Drop`
    /// can't leave a dangling entry (lazily pruned regardless, since
    /// it's a `Weak`).
    parent_registry: Option<Weak<Mutex<Vec<Weak<CloneHandle>>>>>,
    clones: Arc<Mutex<Vec<Weak<CloneHandle>>>>,
}

impl Odb {
    /// Build a context directly over `datastore` (no parent). Use
    /// [`Odb::with_watchdog`] afterwards (on an `Arc<Odb>`) to enable
    /// memory-sampling eviction.
    pub fn new(datastore: Arc<dyn Datastore>, config: OdbConfig) -> Odb {
        let ident = next_id();
        Odb {
            ident,
            lock: RWSpinlock::new(),
            datastore,
            indexes: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            all: Arc::new(IndexGroup::new(ident)),
            prune: config.prune,
            archive: config.archive,
            free_hook: config.free_hook,
            scheduler: Mutex::new(None),
            watchdog: Mutex::new(None),
            clone_handle: Arc::new(CloneHandle {
                indexes: Mutex::new(Vec::new()),
            }),
            parent_registry: None,
            clones: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ident(&self) -> u64 {
        self.ident
    }

    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.datastore
    }

    /// Start sampling memory every `interval` and invoking
    /// [`Odb::remove_sweep`] (spec §2 "Watchdog"). Requires `self`
    /// wrapped in `Arc` so the background thread can call back safely.
    pub fn with_watchdog(self: &Arc<Odb>, interval: Duration, limit_kb: Option<u64>) {
        struct Sweeper(Arc<Odb>);
        impl WatchdogSweep for Sweeper {
            fn sweep(&self) {
                if let Err(err) = self.0.remove_sweep() {
                    warn!("watchdog-triggered sweep failed: {}", err);
                }
            }
        }
        let watchdog = Watchdog::start(interval, limit_kb, Sweeper(self.clone()));
        *self.watchdog.lock().unwrap() = Some(watchdog);
    }

    pub fn stop_watchdog(&self) {
        if let Some(watchdog) = self.watchdog.lock().unwrap().take() {
            watchdog.stop();
        }
    }

    // ---- index / group construction (spec §4.5) ----------------------

    pub fn create_index(&self, spec: IndexSpec) -> Result<Arc<dyn Index>> {
        if spec.keygen.is_some() != spec.keylen.is_some() {
            return Err(Error::InvalidConstruction(
                "keygen and keylen must be supplied together".into(),
            ));
        }
        let key = match (spec.keygen, spec.keylen) {
            (Some(keygen), Some(keylen)) => Some(KeyExtractor::new(keygen, keylen)),
            _ => None,
        };
        let luid = next_id();
        let index: Arc<dyn Index> = match spec.kind {
            IndexKind::RbTree => Arc::new(RbTreeIndex::new(
                self.ident,
                luid,
                self.datastore.clone(),
                spec.comparator,
                key,
                spec.merger,
                spec.drop_duplicates,
            )?),
            IndexKind::LinkedList => Arc::new(LinkedListIndex::new(
                self.ident,
                luid,
                self.datastore.clone(),
                spec.comparator,
                key,
                spec.merger,
                spec.drop_duplicates,
            )?),
        };
        if spec.populate_existing {
            for snap in self.datastore.it_first() {
                index.add_data_v(snap.addr, self.ident)?;
            }
        }
        if spec.add_to_all {
            self.all.add_member(Member::Index(index.clone()))?;
        }
        self.indexes.lock().unwrap().push(index.clone());
        self.clone_handle.indexes.lock().unwrap().push(index.clone());
        debug!("odb[{}]: created index luid={}", self.ident, luid);
        Ok(index)
    }

    /// Remove and destroy a previously created index.
    pub fn delete_index(&self, index: &Arc<dyn Index>) {
        let _w = self.lock.acquire_write(false);
        self.indexes.lock().unwrap().retain(|i| !Arc::ptr_eq(i, index));
        self.clone_handle
            .indexes
            .lock()
            .unwrap()
            .retain(|i| !Arc::ptr_eq(i, index));
    }

    pub fn create_group(&self) -> Arc<IndexGroup> {
        let group = Arc::new(IndexGroup::new(self.ident));
        self.groups.lock().unwrap().push(group.clone());
        group
    }

    pub fn all(&self) -> &Arc<IndexGroup> {
        &self.all
    }

    // ---- data plane ---------------------------------------------------

    /// Add `bytes` to the datastore; if `add_to_all`, broadcast the new
    /// address into every member of `all` (spec §4.5). The returned
    /// [`Handle`] pairs this context's ident with the new address, so a
    /// caller can hand it straight to [`IndexGroup::add_data`] for a
    /// manual, integrity-checked insertion into a group of their own.
    pub fn add_data(&self, bytes: &[u8], add_to_all: bool) -> Result<Handle> {
        let _r = self.lock.acquire_read(false);
        let addr = self.datastore.add(bytes)?;
        if add_to_all {
            self.dispatch_to_all(addr)?;
        }
        Ok(Handle {
            ident: self.ident,
            addr,
        })
    }

    /// Indirect-flavour counterpart of [`Odb::add_data`]: stores a
    /// pointer to a record owned by this context's parent.
    pub fn add_data_indirect(&self, parent_addr: Address, add_to_all: bool) -> Result<Handle> {
        let _r = self.lock.acquire_read(false);
        let addr = self.datastore.add_indirect(parent_addr)?;
        if add_to_all {
            self.dispatch_to_all(addr)?;
        }
        Ok(Handle {
            ident: self.ident,
            addr,
        })
    }

    fn dispatch_to_all(&self, addr: Address) -> Result<()> {
        let sched = self.scheduler.lock().unwrap();
        match sched.as_ref() {
            None => self.all.add_data_v(addr, self.ident),
            Some(sched) => {
                // Each leaf index gets its own scheduled workload keyed
                // by its `luid`, so insertions into distinct indexes run
                // in parallel while repeated insertions into the same
                // index serialize (spec §4.5 "Interference classes").
                for leaf in self.all.flatten() {
                    let ident = self.ident;
                    sched.add_work(
                        Some(leaf.luid()),
                        WorkFlags::NONE,
                        Box::new(move || {
                            let _ = leaf.add_data_v(addr, ident);
                        }),
                    )?;
                }
                Ok(())
            }
        }
    }

    /// Switch `add_data(.., true)` to asynchronous fan-out across `n`
    /// worker threads (spec §4.5 `start_scheduler`).
    pub fn start_scheduler(&self, n: usize) {
        *self.scheduler.lock().unwrap() = Some(Scheduler::new(n));
    }

    /// Convenience over [`Odb::start_scheduler`] sized to the host's
    /// logical core count, the way the teacher's own thread pool
    /// defaults itself.
    pub fn start_scheduler_default(&self) {
        self.start_scheduler(num_cpus::get());
    }

    /// Wait for the scheduler to drain (spec §4.5 `block_until_done`).
    pub fn block_until_done(&self) -> Result<()> {
        match self.scheduler.lock().unwrap().as_ref() {
            Some(sched) => {
                sched.block_until_done();
                Ok(())
            }
            None => Err(Error::SchedulerNotRunning),
        }
    }

    /// Run `index.query(condition)` and return a new `Odb` whose
    /// datastore is an indirect clone holding pointers to every match
    /// (spec §3 "Parent/clone relation", §8 scenario 4).
    pub fn query(&self, index: &Arc<dyn Index>, condition: Condition) -> Result<Odb> {
        let _r = self.lock.acquire_read(false);
        let mut matches = Vec::new();
        for addr in index.snapshot() {
            let (real_addr, len) = index.resolve(addr);
            let payload = unsafe { real_addr.as_slice(len) };
            if condition(payload) {
                matches.push(real_addr);
            }
        }
        self.build_clone(matches)
    }

    fn build_clone(&self, matches: Vec<Address>) -> Result<Odb> {
        let indirect = Arc::new(Indirect::new(self.datastore.clone(), matches.len().max(1))?);
        for addr in &matches {
            indirect.add_indirect(*addr)?;
        }
        let clone_ident = next_id();
        let clone_handle = Arc::new(CloneHandle {
            indexes: Mutex::new(Vec::new()),
        });
        self.clones.lock().unwrap().push(Arc::downgrade(&clone_handle));
        Ok(Odb {
            ident: clone_ident,
            lock: RWSpinlock::new(),
            datastore: indirect,
            indexes: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            all: Arc::new(IndexGroup::new(clone_ident)),
            prune: self.prune.clone(),
            archive: None,
            free_hook: None,
            scheduler: Mutex::new(None),
            watchdog: Mutex::new(None),
            clone_handle,
            parent_registry: Some(Arc::downgrade(&self.clones)),
            clones: Arc::new(Mutex::new(Vec::new())),
        })
    }

    // ---- eviction sweep (spec §4.7) ------------------------------------

    /// Orchestrate eviction: sweep the datastore, remove marked
    /// addresses from every attached index, cascade any relocation into
    /// clones' indexes, then finalize datastore cleanup (spec §4.7).
    pub fn remove_sweep(&self) -> Result<()> {
        let _w = self.lock.acquire_write(false);
        let prune = match &self.prune {
            Some(p) => p.clone(),
            None => return Ok(()),
        };
        let prune_fn = move |bytes: &[u8]| prune(bytes);
        let archive = self.archive.as_deref();
        let result = self.datastore.sweep(&prune_fn, archive)?;

        for index in self.indexes.lock().unwrap().iter() {
            index.remove_sweep(&result.marked);
        }
        if let Some((old, new)) = &result.relocated {
            for index in self.indexes.lock().unwrap().iter() {
                index.update(old, new);
            }
            // Cascade relocation into every live clone's indexes (spec
            // §4.7 step 3); indirect sweeps don't cascade prune into the
            // parent (spec §9 Open Question), only relocation forward.
            self.clones.lock().unwrap().retain(|weak| {
                if let Some(handle) = weak.upgrade() {
                    for index in handle.indexes.lock().unwrap().iter() {
                        index.update(old, new);
                    }
                    true
                } else {
                    false
                }
            });
        }
        self.datastore.cleanup(&result);
        debug!(
            "odb[{}]: swept {} record(s)",
            self.ident,
            result.marked.len()
        );
        Ok(())
    }

    /// Drop all records from this context's own datastore and clear
    /// every attached index (spec §4.1 `purge`). A clone's datastore
    /// holds its own pointer slots and is purged independently; only
    /// relocation (not pruning) cascades from a parent into its clones
    /// (spec §9 Open Question).
    pub fn purge(&self) {
        let _w = self.lock.acquire_write(false);
        self.clones.lock().unwrap().retain(|weak| weak.upgrade().is_some());
        for index in self.indexes.lock().unwrap().iter() {
            let mut addrs = index.snapshot();
            addrs.sort();
            index.remove_sweep(&addrs);
        }
        let hook = self.free_hook.clone();
        match &hook {
            Some(h) => self.datastore.purge(Some(h.as_ref())),
            None => self.datastore.purge(None),
        }
    }

    // ---- iteration (spec §4.5 it_first/it_last) ------------------------

    pub fn it_first(&self) -> Vec<(Address, usize)> {
        let _r = self.lock.acquire_read(false);
        self.datastore.it_first().into_iter().map(|s| (s.addr, s.len)).collect()
    }

    pub fn it_last(&self) -> Vec<(Address, usize)> {
        let mut v = self.it_first();
        v.reverse();
        v
    }
}

impl Drop for Odb {
    fn drop(&mut self) {
        if let Some(parent) = &self.parent_registry {
            if let Some(parent_clones) = parent.upgrade() {
                parent_clones
                    .lock()
                    .unwrap()
                    .retain(|weak| weak.upgrade().map_or(false, |h| !Arc::ptr_eq(&h, &self.clone_handle)));
            }
        }
    }
}

#[cfg(test)]
#[path = "odb_test.rs"]
mod odb_test;
