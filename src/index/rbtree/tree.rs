//! Top-down insertion and deletion (spec §4.2), realised as a
//! left-leaning red-black tree: the same invariants (root black, no
//! root-to-null path crosses a different number of black nodes,
//! non-decreasing in-order keys) expressed with the single restriction
//! that red links only lean left. This lets every rebalance reduce to
//! four primitives — `rotate_left`, `rotate_right`, `flip`,
//! `move_red_left`/`move_red_right` — applied on the way back up a plain
//! recursive descent, so no parent pointers are ever needed, exactly the
//! property spec §4.2 and Design Notes §9 ask for. Ported from this
//! crate's own `Llrb` (see `llrb.rs`'s `upsert`/`do_delete` family),
//! generalized from an ordered map over `K`/`V` to an ordered set of
//! record [`Address`]es compared through an injected [`Comparator`].

use std::cmp::Ordering;
use std::sync::Arc;

use crate::address::Address;
use crate::index::rbtree::node::{is_red, Node, Payload};
use crate::index::Merger;

pub(crate) type Cmp = Arc<dyn Fn(Address, Address) -> Ordering + Send + Sync>;

pub(crate) enum Upsert {
    Inserted,
    Merged,
    Duplicate,
}

/// A self-contained red-black tree: used both as the outer, per-index
/// tree (keyed by record payload via an injected comparator) and as the
/// embedded duplicates tree hanging off one of its nodes (keyed by raw
/// address identity; spec §3 "An embedded tree has no embedded trees of
/// its own").
pub(crate) struct Tree {
    pub(crate) root: Option<Box<Node>>,
    count: usize,
    cmp: Cmp,
    drop_duplicates: bool,
    merger: Option<Merger>,
}

impl Tree {
    pub(crate) fn new(cmp: Cmp, drop_duplicates: bool, merger: Option<Merger>) -> Tree {
        Tree {
            root: None,
            count: 0,
            cmp,
            drop_duplicates,
            merger,
        }
    }

    /// A tree for an embedded duplicates subtree: keyed on raw address
    /// identity, since every entry already compares equal under the
    /// outer comparator.
    pub(crate) fn new_embedded() -> Tree {
        Tree::new(Arc::new(|a: Address, b: Address| a.cmp(&b)), false, None)
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn any_address(&self) -> Address {
        self.root
            .as_ref()
            .expect("embedded tree is never empty while referenced")
            .representative()
    }

    fn cmp(&self, a: Address, b: Address) -> Ordering {
        (self.cmp)(a, b)
    }

    pub(crate) fn cmp_handle(&self) -> &Cmp {
        &self.cmp
    }

    pub(crate) fn upsert(&mut self, addr: Address) -> Upsert {
        let root = self.root.take();
        let (mut new_root, outcome) =
            Self::upsert_node(root, addr, &self.cmp, self.drop_duplicates, &self.merger);
        new_root.set_black();
        self.root = Some(new_root);
        if matches!(outcome, Upsert::Inserted) {
            self.count += 1;
        }
        outcome
    }

    fn upsert_node(
        node: Option<Box<Node>>,
        addr: Address,
        cmp: &Cmp,
        drop_duplicates: bool,
        merger: &Option<Merger>,
    ) -> (Box<Node>, Upsert) {
        match node {
            None => (Node::new_red(Payload::Single(addr)), Upsert::Inserted),
            Some(mut node) => match cmp(addr, node.representative()) {
                Ordering::Less => {
                    let (left, outcome) =
                        Self::upsert_node(node.left.take(), addr, cmp, drop_duplicates, merger);
                    node.left = Some(left);
                    (Self::walkuprot_23(node), outcome)
                }
                Ordering::Greater => {
                    let (right, outcome) =
                        Self::upsert_node(node.right.take(), addr, cmp, drop_duplicates, merger);
                    node.right = Some(right);
                    (Self::walkuprot_23(node), outcome)
                }
                Ordering::Equal => {
                    let outcome = Self::resolve_duplicate(&mut node, addr, drop_duplicates, merger);
                    (Self::walkuprot_23(node), outcome)
                }
            },
        }
    }

    fn resolve_duplicate(
        node: &mut Node,
        addr: Address,
        drop_duplicates: bool,
        merger: &Option<Merger>,
    ) -> Upsert {
        if drop_duplicates {
            return Upsert::Duplicate;
        }
        if let Some(merge) = merger {
            match &mut node.payload {
                Payload::Single(existing) => {
                    *existing = merge(addr, *existing);
                    return Upsert::Merged;
                }
                Payload::Duplicates(_) => {
                    unreachable!("embedded duplicates tree only forms when no merger is set")
                }
            }
        }
        match &mut node.payload {
            Payload::Single(existing) => {
                let mut sub = Tree::new_embedded();
                sub.upsert(*existing);
                sub.upsert(addr);
                node.payload = Payload::Duplicates(Box::new(sub));
            }
            Payload::Duplicates(sub) => {
                sub.upsert(addr);
            }
        }
        Upsert::Inserted
    }

    /// Remove the node carrying exactly `addr` (not merely a key match —
    /// see module docs on embedded duplicates). Returns whether anything
    /// was removed.
    pub(crate) fn remove(&mut self, addr: Address) -> bool {
        if self.root.is_none() {
            return false;
        }
        let root = self.root.take().unwrap();
        let cmp = self.cmp.clone();
        let (new_root, removed) = Self::do_delete(Some(root), addr, &cmp);
        self.root = new_root.map(|mut n| {
            n.set_black();
            n
        });
        if removed {
            self.count -= 1;
        }
        removed
    }

    pub(crate) fn remove_sweep(&mut self, marked_sorted: &[Address]) {
        for &addr in marked_sorted {
            self.remove(addr);
        }
    }

    /// Rewrite `old[i]` to `new[i]` wherever held, in place: since the
    /// comparator must still compare equal before and after, no
    /// restructuring is needed at the outer level (spec §4.2 `update`).
    pub(crate) fn update(&mut self, old: &[Address], new: &[Address]) {
        for (&old_addr, &new_addr) in old.iter().zip(new.iter()) {
            Self::rewrite(self.root.as_deref_mut(), old_addr, new_addr, &self.cmp);
        }
    }

    fn rewrite(node: Option<&mut Node>, old_addr: Address, new_addr: Address, cmp: &Cmp) {
        if let Some(node) = node {
            match cmp(old_addr, node.representative()) {
                Ordering::Less => Self::rewrite(node.left.as_deref_mut(), old_addr, new_addr, cmp),
                Ordering::Greater => {
                    Self::rewrite(node.right.as_deref_mut(), old_addr, new_addr, cmp)
                }
                Ordering::Equal => match &mut node.payload {
                    Payload::Single(existing) if *existing == old_addr => {
                        *existing = new_addr;
                    }
                    Payload::Single(_) => {}
                    Payload::Duplicates(sub) => {
                        if sub.remove(old_addr) {
                            sub.upsert(new_addr);
                        }
                    }
                },
            }
        }
    }

    fn do_delete(
        node: Option<Box<Node>>,
        addr: Address,
        cmp: &Cmp,
    ) -> (Option<Box<Node>>, bool) {
        let mut node = match node {
            None => return (None, false),
            Some(node) => node,
        };

        if cmp(addr, node.representative()) == Ordering::Less {
            if node.left.is_none() {
                return (Some(node), false);
            }
            if !is_red(node.as_left_deref()) && !is_red(node.left.as_ref().unwrap().as_left_deref())
            {
                node = Self::move_red_left(node);
            }
            let (left, removed) = Self::do_delete(node.left.take(), addr, cmp);
            node.left = left;
            (Some(Self::fixup(node)), removed)
        } else {
            if is_red(node.as_left_deref()) {
                node = Self::rotate_right(node);
            }
            if cmp(addr, node.representative()) != Ordering::Greater && node.right.is_none() {
                return Self::remove_here(node, addr);
            }
            let ok = node.right.is_some() && !is_red(node.as_right_deref());
            if ok && !is_red(node.right.as_ref().unwrap().as_left_deref()) {
                node = Self::move_red_right(node);
            }
            if cmp(addr, node.representative()) != Ordering::Greater {
                Self::remove_equal_with_right(node, addr)
            } else {
                let (right, removed) = Self::do_delete(node.right.take(), addr, cmp);
                node.right = right;
                (Some(Self::fixup(node)), removed)
            }
        }
    }

    /// `node` is a comparator-equal leaf (no right child, and by the
    /// left-leaning invariant no left child either): either splice it
    /// out entirely or, for a shrinking embedded-duplicates payload,
    /// mutate it in place.
    fn remove_here(mut node: Box<Node>, addr: Address) -> (Option<Box<Node>>, bool) {
        match Self::try_collapse(&mut node.payload, addr) {
            Collapse::NotFound => (Some(node), false),
            Collapse::MutatedInPlace => (Some(node), true),
            Collapse::RemoveNode => (None, true),
        }
    }

    fn remove_equal_with_right(mut node: Box<Node>, addr: Address) -> (Option<Box<Node>>, bool) {
        match Self::try_collapse(&mut node.payload, addr) {
            Collapse::NotFound => (Some(Self::fixup(node)), false),
            Collapse::MutatedInPlace => (Some(Self::fixup(node)), true),
            Collapse::RemoveNode => {
                let (right_after, successor) = Self::delete_min(node.right.take());
                let successor = successor.expect("right subtree is non-empty");
                let newnode = Box::new(Node {
                    left: node.left.take(),
                    right: right_after,
                    black: node.black,
                    payload: successor.payload,
                });
                (Some(Self::fixup(newnode)), true)
            }
        }
    }

    fn try_collapse(payload: &mut Payload, addr: Address) -> Collapse {
        match payload {
            Payload::Single(existing) => {
                if *existing == addr {
                    Collapse::RemoveNode
                } else {
                    Collapse::NotFound
                }
            }
            Payload::Duplicates(sub) => {
                if !sub.remove(addr) {
                    return Collapse::NotFound;
                }
                match sub.count() {
                    0 => Collapse::RemoveNode,
                    1 => {
                        let remaining = sub
                            .root
                            .take()
                            .expect("count()==1 implies a root")
                            .representative();
                        *payload = Payload::Single(remaining);
                        Collapse::MutatedInPlace
                    }
                    _ => Collapse::MutatedInPlace,
                }
            }
        }
    }

    fn delete_min(node: Option<Box<Node>>) -> (Option<Box<Node>>, Option<Node>) {
        match node {
            None => (None, None),
            Some(node) if node.left.is_none() => (None, Some(*node)),
            Some(mut node) => {
                let left = node.as_left_deref();
                if !is_red(left) && !is_red(left.unwrap().as_left_deref()) {
                    node = Self::move_red_left(node);
                }
                let (left, old) = Self::delete_min(node.left.take());
                node.left = left;
                (Some(Self::fixup(node)), old)
            }
        }
    }

    fn walkuprot_23(mut node: Box<Node>) -> Box<Node> {
        if is_red(node.as_right_deref()) && !is_red(node.as_left_deref()) {
            node = Self::rotate_left(node);
        }
        let left_is_red = is_red(node.as_left_deref());
        if left_is_red && is_red(node.as_left_deref().unwrap().as_left_deref()) {
            node = Self::rotate_right(node);
        }
        if is_red(node.as_left_deref()) && is_red(node.as_right_deref()) {
            Self::flip(&mut node);
        }
        node
    }

    fn fixup(mut node: Box<Node>) -> Box<Node> {
        if is_red(node.as_right_deref()) {
            node = Self::rotate_left(node);
        }
        let left_is_red = is_red(node.as_left_deref());
        if left_is_red && is_red(node.as_left_deref().unwrap().as_left_deref()) {
            node = Self::rotate_right(node);
        }
        if is_red(node.as_left_deref()) && is_red(node.as_right_deref()) {
            Self::flip(&mut node);
        }
        node
    }

    fn rotate_left(mut node: Box<Node>) -> Box<Node> {
        let mut x = node.right.take().expect("rotating a black link");
        node.right = x.left.take();
        x.black = node.black;
        node.set_red();
        x.left = Some(node);
        x
    }

    fn rotate_right(mut node: Box<Node>) -> Box<Node> {
        let mut x = node.left.take().expect("rotating a black link");
        node.left = x.right.take();
        x.black = node.black;
        node.set_red();
        x.right = Some(node);
        x
    }

    fn flip(node: &mut Node) {
        node.left.as_mut().unwrap().toggle_link();
        node.right.as_mut().unwrap().toggle_link();
        node.toggle_link();
    }

    fn move_red_left(mut node: Box<Node>) -> Box<Node> {
        Self::flip(&mut node);
        if is_red(node.right.as_ref().unwrap().as_left_deref()) {
            node.right = Some(Self::rotate_right(node.right.take().unwrap()));
            node = Self::rotate_left(node);
            Self::flip(&mut node);
        }
        node
    }

    fn move_red_right(mut node: Box<Node>) -> Box<Node> {
        Self::flip(&mut node);
        if is_red(node.left.as_ref().unwrap().as_left_deref()) {
            node = Self::rotate_right(node);
            Self::flip(&mut node);
        }
        node
    }

    /// Validates RB invariants (spec §8): returns `0` if invalid, else
    /// the black height. Recurses into every embedded duplicates tree.
    pub(crate) fn verify(&self) -> i32 {
        if is_red(self.root.as_deref()) {
            return 0;
        }
        match Self::verify_node(self.root.as_deref(), false) {
            Some(bh) => bh as i32,
            None => 0,
        }
    }

    fn verify_node(node: Option<&Node>, from_red: bool) -> Option<usize> {
        match node {
            None => Some(0),
            Some(n) => {
                let red = is_red(Some(n));
                if from_red && red {
                    return None;
                }
                if let Payload::Duplicates(sub) = &n.payload {
                    if sub.verify() == 0 {
                        return None;
                    }
                }
                let l = Self::verify_node(n.as_left_deref(), red)?;
                let r = Self::verify_node(n.as_right_deref(), red)?;
                if l != r {
                    return None;
                }
                Some(l + if red { 0 } else { 1 })
            }
        }
    }
}

enum Collapse {
    NotFound,
    MutatedInPlace,
    RemoveNode,
}
