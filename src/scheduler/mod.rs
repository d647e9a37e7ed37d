//! Fixed-size worker pool with fair, interference-class-aware
//! scheduling (spec §4.6), used by [`crate::odb::Odb`] to fan insertions
//! out across indexes while serializing same-class work.
//!
//! Ported in spirit from this crate's own `thread.rs` gen-server
//! pattern and `spinlock.rs`'s latch-and-spin discipline, but built on
//! [`std::sync::Mutex`]/[`std::sync::Condvar`] throughout: the standard
//! mutex is already fast-uncontended on the platforms this crate
//! targets, so the short structural critical sections (enqueue/pop) and
//! the sleeping path share one lock rather than a hand-rolled spinlock
//! plus a second mutex (Design Notes §9 explicitly allows this).

mod queue;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};

use crate::error::{Error, Result};

pub use queue::ClassKey;
use queue::{State, Workload};

/// Flags a workload may be submitted with (spec §4.6 "Workload flags").
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct WorkFlags(u8);

impl WorkFlags {
    pub const NONE: WorkFlags = WorkFlags(0);
    /// Allows concurrent workers on the same class.
    pub const READ_ONLY: WorkFlags = WorkFlags(1);
    /// Holds back work enqueued after it, in the same class, until it
    /// completes (spec §9 Open Question, resolved: implemented).
    pub const BARRIER: WorkFlags = WorkFlags(2);
    /// Processed only when no other queue is eligible.
    pub const BACKGROUND: WorkFlags = WorkFlags(4);
    /// Promotes its queue above non-high-priority queues until its last
    /// high-priority workload completes.
    pub const HIGH_PRIORITY: WorkFlags = WorkFlags(8);
    /// Reserved; not supported by this scheduler (spec §9 Open
    /// Question, resolved: rejected).
    pub const URGENT: WorkFlags = WorkFlags(16);

    pub fn contains(self, other: WorkFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for WorkFlags {
    type Output = WorkFlags;
    fn bitor(self, rhs: WorkFlags) -> WorkFlags {
        WorkFlags(self.0 | rhs.0)
    }
}

struct Inner {
    state: Mutex<State>,
    work_cond: Condvar,
    block_cond: Condvar,
    work_avail: AtomicUsize,
    parked: AtomicUsize,
    live_count: AtomicUsize,
    target_threads: AtomicUsize,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// A fixed-size (resizable) worker pool draining a class-aware work
/// queue (spec §4.6). Cloning an `odb::Odb` context's handle to its
/// scheduler is cheap; the pool itself is shut down when the last
/// handle drops.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Start a pool of `n` worker threads.
    pub fn new(n: usize) -> Scheduler {
        let inner = Arc::new(Inner {
            state: Mutex::new(State::new()),
            work_cond: Condvar::new(),
            block_cond: Condvar::new(),
            work_avail: AtomicUsize::new(0),
            parked: AtomicUsize::new(0),
            live_count: AtomicUsize::new(0),
            target_threads: AtomicUsize::new(n),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            workers: Mutex::new(Vec::new()),
        });
        let sched = Scheduler { inner };
        sched.spawn_up_to(n);
        sched
    }

    fn spawn_up_to(&self, target: usize) {
        let mut workers = self.inner.workers.lock().unwrap();
        while self.inner.live_count.load(Ordering::SeqCst) < target {
            let inner = self.inner.clone();
            workers.push(thread::spawn(move || worker_loop(inner)));
            self.inner.live_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Submit `task` under interference class `class` (`None` for the
    /// independent, class-free queue) with the given `flags`.
    pub fn add_work(
        &self,
        class: Option<u64>,
        flags: WorkFlags,
        task: Box<dyn FnOnce() + Send>,
    ) -> Result<()> {
        if flags.contains(WorkFlags::URGENT) {
            return Err(Error::SchedulerInvalid("URGENT is not supported".into()));
        }
        if flags.contains(WorkFlags::BACKGROUND) && flags.contains(WorkFlags::HIGH_PRIORITY) {
            return Err(Error::SchedulerInvalid(
                "a workload cannot be both BACKGROUND and HIGH_PRIORITY".into(),
            ));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let class_key = match class {
            Some(c) => ClassKey::Class(c),
            None => ClassKey::Independent,
        };
        let workload = Workload {
            id,
            class: class_key,
            flags,
            task,
        };
        {
            let mut state = self.inner.state.lock().unwrap();
            state.enqueue(workload);
        }
        self.inner.work_avail.fetch_add(1, Ordering::SeqCst);
        self.inner.work_cond.notify_all();
        Ok(())
    }

    /// Grow or shrink the worker pool. Growing spawns threads
    /// immediately; shrinking lowers the target and lets the excess
    /// workers retire themselves the next time they go idle, so
    /// in-flight workloads on them run to completion first.
    pub fn update_num_threads(&self, new_n: usize) {
        let old = self.inner.target_threads.swap(new_n, Ordering::SeqCst);
        if new_n > old {
            self.spawn_up_to(new_n);
        } else {
            debug!("scheduler: shrinking pool target {} -> {}", old, new_n);
            self.inner.work_cond.notify_all();
        }
        self.reap_finished();
    }

    fn reap_finished(&self) {
        let mut workers = self.inner.workers.lock().unwrap();
        workers.retain(|h| !h.is_finished());
    }

    /// Block until every submitted workload has run and every worker is
    /// parked (spec §4.6 "`block_until_done`").
    pub fn block_until_done(&self) {
        let live = self.inner.live_count.load(Ordering::SeqCst);
        if live == 0 {
            return;
        }
        let mut guard = self.inner.state.lock().unwrap();
        loop {
            let idle = self.inner.work_avail.load(Ordering::SeqCst) == 0
                && guard.tree_is_empty()
                && self.inner.parked.load(Ordering::SeqCst) >= self.inner.live_count.load(Ordering::SeqCst);
            if idle {
                return;
            }
            guard = self.inner.block_cond.wait(guard).unwrap();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Only the last handle (strong_count == 1, about to become 0)
        // should tear the pool down.
        if Arc::strong_count(&self.inner) == 1 {
            self.inner.shutdown.store(true, Ordering::SeqCst);
            self.inner.work_cond.notify_all();
            let mut workers = self.inner.workers.lock().unwrap();
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

fn worker_loop(inner: Arc<Inner>) {
    trace!("scheduler: worker starting");
    loop {
        let popped = {
            let mut guard = inner.state.lock().unwrap();
            loop {
                if inner.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if inner.live_count.load(Ordering::SeqCst) > inner.target_threads.load(Ordering::SeqCst) {
                    inner.live_count.fetch_sub(1, Ordering::SeqCst);
                    trace!("scheduler: worker retiring (pool shrinking)");
                    return;
                }
                if inner.work_avail.load(Ordering::SeqCst) > 0 || !guard.tree_is_empty() {
                    break;
                }
                inner.parked.fetch_add(1, Ordering::SeqCst);
                inner.block_cond.notify_all();
                guard = inner.work_cond.wait(guard).unwrap();
                inner.parked.fetch_sub(1, Ordering::SeqCst);
            }
            guard.pop_ready()
        };
        match popped {
            Some((workload, token)) => {
                inner.work_avail.fetch_sub(1, Ordering::SeqCst);
                (workload.task)();
                {
                    let mut guard = inner.state.lock().unwrap();
                    guard.finish(token);
                }
                inner.block_cond.notify_all();
            }
            None => {
                // Lost the race for the only ready queue to a peer
                // worker; nothing to do but recheck.
                warn!("scheduler: spurious wakeup with no ready work");
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;
