//! Per-class FIFO queues and the tree-ordering the scheduler pops from
//! (spec §4.6). Plain data structures; all synchronization lives in
//! [`super::Scheduler`], which holds the single `state` mutex this
//! module's functions are always called under.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::scheduler::WorkFlags;

/// A workload's interference class: either one of an index's `luid`s
/// (or an `Odb`'s reserved "add to all" class), or the class-free
/// independent queue (spec §4.6 "one distinguished queue for class-free
/// work").
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ClassKey {
    Independent,
    Class(u64),
}

pub(crate) struct Workload {
    pub(crate) id: u64,
    pub(crate) class: ClassKey,
    pub(crate) flags: WorkFlags,
    pub(crate) task: Box<dyn FnOnce() + Send>,
}

/// A workload is "exclusive" for its class if running it must keep the
/// class's queue out of the scheduling tree until it completes: every
/// non-`READ_ONLY` workload, plus `READ_ONLY` workloads also flagged
/// `BARRIER` (a barrier always serializes, overriding the concurrency
/// `READ_ONLY` would otherwise grant — the mechanism that holds back
/// work enqueued after it in the same class, per spec §4.6).
fn is_exclusive(flags: WorkFlags) -> bool {
    flags.contains(WorkFlags::BARRIER) || !flags.contains(WorkFlags::READ_ONLY)
}

struct Queue {
    fifo: VecDeque<Workload>,
    hp_count: usize,
    /// Number of exclusive workloads from this class currently being
    /// run by some worker. While non-zero the queue is kept out of the
    /// tree (spec: "leaves the queue out of the tree so that no peer
    /// worker can pull a conflicting workload of the same class").
    exclusive_in_flight: usize,
}

impl Queue {
    fn new() -> Queue {
        Queue {
            fifo: VecDeque::new(),
            hp_count: 0,
            exclusive_in_flight: 0,
        }
    }

    /// Ordering key for this queue's current head, per spec §4.6's
    /// three-step comparator: high-priority queues first, background
    /// queues last, FIFO by head id otherwise.
    fn order_key(&self, class: ClassKey) -> Option<OrderKey> {
        let head = self.fifo.front()?;
        Some(OrderKey {
            not_high_priority: u8::from(self.hp_count == 0),
            background: u8::from(head.flags.contains(WorkFlags::BACKGROUND)),
            head_id: head.id,
            class,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    not_high_priority: u8,
    background: u8,
    head_id: u64,
    class: ClassKey,
}

/// Everything the fast path touches: the per-class queues and the set
/// of queues currently eligible to be scheduled from (spec's
/// "red-black-tree-ordered set of per-class FIFO queues").
pub(crate) struct State {
    classes: HashMap<ClassKey, Queue>,
    tree: BTreeSet<OrderKey>,
}

/// Opaque token returned by [`pop_ready`], passed back to [`finish`]
/// once the popped workload's task has run.
pub(crate) struct PopToken {
    class: ClassKey,
    exclusive: bool,
}

impl State {
    pub(crate) fn new() -> State {
        State {
            classes: HashMap::new(),
            tree: BTreeSet::new(),
        }
    }

    pub(crate) fn tree_is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Append `workload` to its class's queue, and make the queue
    /// schedulable if it wasn't already mid-flight for an exclusive
    /// workload (spec: "inserts the queue into the tree if it wasn't
    /// already"). If the queue was already in the tree, its key is
    /// recomputed and reinserted: a newly appended `HIGH_PRIORITY`
    /// workload changes the queue's `hp_count` even when it lands behind
    /// an unrelated head, and the tree position must reflect that
    /// immediately rather than waiting for the stale entry to pop.
    pub(crate) fn enqueue(&mut self, workload: Workload) {
        let class = workload.class;
        let queue = self.classes.entry(class).or_insert_with(Queue::new);
        let stale_key = if queue.exclusive_in_flight == 0 {
            queue.order_key(class)
        } else {
            None
        };
        if workload.flags.contains(WorkFlags::HIGH_PRIORITY) {
            queue.hp_count += 1;
        }
        queue.fifo.push_back(workload);
        if queue.exclusive_in_flight != 0 {
            return;
        }
        if let Some(key) = stale_key {
            self.tree.remove(&key);
        }
        if let Some(key) = queue.order_key(class) {
            self.tree.insert(key);
        }
    }

    /// Pop the highest-priority queue's head workload. Independent and
    /// `READ_ONLY`/non-barrier workloads are eligible for immediate
    /// concurrent re-scheduling; exclusive ones pull their queue out of
    /// the tree until [`finish`] is called.
    pub(crate) fn pop_ready(&mut self) -> Option<(Workload, PopToken)> {
        let key = *self.tree.iter().next()?;
        self.tree.remove(&key);
        let queue = self.classes.get_mut(&key.class).expect("tree key orphaned");
        let workload = queue.fifo.pop_front().expect("order_key implies non-empty");
        if workload.flags.contains(WorkFlags::HIGH_PRIORITY) {
            queue.hp_count -= 1;
        }
        let exclusive = key.class != ClassKey::Independent && is_exclusive(workload.flags);
        if exclusive {
            queue.exclusive_in_flight += 1;
        } else if let Some(next_key) = queue.order_key(key.class) {
            // Independent / read-only work re-enters the tree
            // immediately so other workers may pick up the rest of the
            // queue concurrently (spec §4.6).
            self.tree.insert(next_key);
        }
        Some((
            workload,
            PopToken {
                class: key.class,
                exclusive,
            },
        ))
    }

    /// Called once the workload's task has run. Reinserts the queue
    /// into the tree if it still has pending work (spec: "re-inserts
    /// the queue into the tree if it still has work, or marks it
    /// empty").
    pub(crate) fn finish(&mut self, token: PopToken) {
        if !token.exclusive {
            return;
        }
        if let Some(queue) = self.classes.get_mut(&token.class) {
            queue.exclusive_in_flight -= 1;
            if queue.exclusive_in_flight == 0 {
                if let Some(key) = queue.order_key(token.class) {
                    self.tree.insert(key);
                }
            }
        }
    }
}
