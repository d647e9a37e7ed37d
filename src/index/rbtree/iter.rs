//! Ordered cursor over an [`RbTreeIndex`][super::RbTreeIndex] (spec §4.2
//! "iterator/cursor protocol"). Adapted from this crate's own
//! `llrb_common::build_iter`/`find_start`/`find_end` family: instead of
//! borrowed node references tied to a lifetime on the tree, the stack
//! holds raw `*const Node` pointers, the same trick `address.rs` and
//! `datastore::linked_list` already use to sidestep lifetime-generic
//! cursors behind an object-safe trait. Safety rests entirely on the
//! caller not holding a `Cursor` past the read-latch that produced it.

use std::cmp::Ordering;

use crate::address::Address;
use crate::index::rbtree::node::{Node, Payload};
use crate::index::rbtree::tree::Cmp;
use crate::spinlock::Reader;

/// Which way an `it_lookup` probe should resolve when no exact key
/// match exists, and which way `next`/`prev` walk from there (spec §4.2
/// "Direction"). `Exact` is `it_lookup`-only (spec §4.2 `dir == 0`):
/// valid only as a probe mode, never as a full-scan or post-probe
/// walking direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Forward,
    Reverse,
    Exact,
}

/// A paused walk over the tree's in-order sequence. Yields one
/// [`Address`] per call to [`Cursor::next`]/[`Cursor::prev`], descending
/// into an embedded duplicates subtree before resuming the outer walk
/// (spec §4.2 "a duplicates subtree is walked before the next distinct
/// key").
///
/// The read latch is held for the cursor's entire lifetime: `'a` ties
/// it to the index it was built from, so the borrow checker (not just a
/// doc comment) rules out a `Cursor` outliving its source tree.
pub struct Cursor<'a> {
    /// Ancestor stack for the outer tree: top of stack is the next node
    /// to yield going forward.
    stack: Vec<*const Node>,
    dir: Direction,
    /// Set while descended into an embedded duplicates subtree; walked
    /// to exhaustion before popping back to `stack`.
    embedded: Option<Box<Cursor<'a>>>,
    _guard: Option<Reader<'a>>,
}

impl<'a> Cursor<'a> {
    /// Build a cursor over every node of `root` in the given direction,
    /// with no probe (spec's `it_first`/`it_last`).
    pub(crate) fn full(root: Option<&Node>, dir: Direction, guard: Option<Reader<'a>>) -> Cursor<'a> {
        let mut stack = Vec::new();
        push_spine(root, dir, &mut stack);
        Cursor {
            stack,
            dir,
            embedded: None,
            _guard: guard,
        }
    }

    /// Build a cursor positioned at `probe`: on an exact key match, the
    /// cursor continues the in-order walk from that node in the
    /// requested `dir`, exactly as if `it_first`/`it_last` had been
    /// filtered down to that starting point (spec §4.2 "on exact hit it
    /// returns an iterator at that node ... next/prev perform the
    /// standard in-order successor/predecessor walk"). With no exact
    /// hit, `Direction::Forward` (`dir > 0`) seeks the smallest key
    /// strictly greater than `probe`, `Direction::Reverse` (`dir < 0`)
    /// the largest strictly less, and `Direction::Exact` (`dir == 0`)
    /// yields a null (empty) cursor.
    pub(crate) fn lookup(
        root: Option<&Node>,
        probe: Address,
        dir: Direction,
        cmp: &Cmp,
        guard: Option<Reader<'a>>,
    ) -> Cursor<'a> {
        let mut node = root;
        let mut exact: Option<*const Node> = None;
        // Ancestors strictly greater than `probe` seen while descending
        // (nearest ancestor last, so `Vec::pop` drains nearest-first) —
        // the chain a forward walk needs to resume successors from once
        // `probe`'s own right subtree is exhausted, whether the walk
        // starts at an exact hit or (lacking one) at the nearest
        // greater key.
        let mut greater_chain: Vec<*const Node> = Vec::new();
        while let Some(n) = node {
            match cmp(probe, n.representative()) {
                Ordering::Less => {
                    greater_chain.push(n as *const Node);
                    node = n.as_left_deref();
                }
                Ordering::Greater => {
                    node = n.as_right_deref();
                }
                Ordering::Equal => {
                    exact = Some(n as *const Node);
                    break;
                }
            }
        }
        let (stack, walk_dir) = match (exact, dir) {
            (None, Direction::Exact) => (Vec::new(), Direction::Forward),
            (_, Direction::Reverse) => {
                // Re-walk tracking the ancestors strictly less than
                // `probe` instead (the chain a predecessor walk needs);
                // the first walk only kept the greater chain. On an
                // exact hit this re-walk reaches the same node and
                // pushes it on top of its own lesser-ancestor chain, so
                // the predecessor walk resumes from there.
                let mut node = root;
                let mut lesser_chain = Vec::new();
                while let Some(n) = node {
                    match cmp(probe, n.representative()) {
                        Ordering::Less => node = n.as_left_deref(),
                        Ordering::Greater => {
                            lesser_chain.push(n as *const Node);
                            node = n.as_right_deref();
                        }
                        Ordering::Equal => {
                            lesser_chain.push(n as *const Node);
                            break;
                        }
                    }
                }
                (lesser_chain, Direction::Reverse)
            }
            (Some(n), _) => {
                // Forward (or a hit under Exact): seed with the exact
                // node atop its own greater-ancestor chain so the walk
                // continues into successors once its subtree empties.
                greater_chain.push(n);
                (greater_chain, Direction::Forward)
            }
            (None, Direction::Forward) => (greater_chain, Direction::Forward),
        };
        Cursor {
            stack,
            dir: walk_dir,
            embedded: None,
            _guard: guard,
        }
    }

    pub fn next(&mut self) -> Option<Address> {
        if let Some(sub) = &mut self.embedded {
            if let Some(addr) = sub.next() {
                return Some(addr);
            }
            self.embedded = None;
        }
        let ptr = self.stack.pop()?;
        // SAFETY: see struct-level invariant.
        let node = unsafe { &*ptr };
        match self.dir {
            Direction::Forward => push_spine(node.as_right_deref(), self.dir, &mut self.stack),
            Direction::Reverse => push_spine(node.as_left_deref(), self.dir, &mut self.stack),
            Direction::Exact => unreachable!("a built Cursor never walks in Exact mode"),
        }
        match &node.payload {
            Payload::Single(addr) => Some(*addr),
            Payload::Duplicates(sub) => {
                // The embedded subtree is owned data behind the same
                // outer latch already held by `self`; no second guard
                // needed.
                let mut cur = Cursor::full(sub.root.as_deref(), self.dir, None);
                let first = cur.next();
                self.embedded = Some(Box::new(cur));
                first
            }
        }
    }

    /// The predecessor-walk name for [`Cursor::next`] on a cursor built
    /// with `Direction::Reverse` (spec §4.2 "next/prev perform the
    /// standard in-order successor/predecessor walk"). A single cursor
    /// walks one direction only, fixed at construction by `it_last`/
    /// `it_lookup`'s `dir`; calling `prev` on a `Direction::Forward`
    /// cursor would silently walk successors under a predecessor's
    /// name, so it panics instead — build a `Direction::Reverse` cursor
    /// (`it_last`, or `it_lookup(.., Direction::Reverse)`) to walk
    /// backward.
    pub fn prev(&mut self) -> Option<Address> {
        assert_eq!(
            self.dir,
            Direction::Reverse,
            "Cursor::prev called on a Direction::Forward cursor; use next() or build the cursor with Direction::Reverse"
        );
        self.next()
    }
}

fn push_spine(mut node: Option<&Node>, dir: Direction, stack: &mut Vec<*const Node>) {
    while let Some(n) = node {
        stack.push(n as *const Node);
        node = match dir {
            Direction::Forward => n.as_left_deref(),
            Direction::Reverse => n.as_right_deref(),
            Direction::Exact => unreachable!("full() is never called with Exact"),
        };
    }
}
