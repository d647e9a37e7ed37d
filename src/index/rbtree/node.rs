//! Node shape for the top-down red-black tree (spec §3 "Red-black tree
//! node"). Colour and the embedded-duplicates discriminator are plain
//! fields here rather than bits stolen from a child pointer (Design
//! Notes §9): `black` is the colour, and `payload` is the clean
//! `Single`/`Duplicates` enum the design notes ask for.

use crate::address::Address;
use crate::index::rbtree::tree::Tree;

/// What a node's slot actually holds: either one record address, or —
/// once a second entry compares equal under a `drop_duplicates=false`,
/// merger-less policy — the root of an embedded duplicates tree (spec
/// §3 "embedded tree").
pub(crate) enum Payload {
    Single(Address),
    Duplicates(Box<Tree>),
}

pub(crate) struct Node {
    pub(crate) left: Option<Box<Node>>,
    pub(crate) right: Option<Box<Node>>,
    pub(crate) black: bool,
    pub(crate) payload: Payload,
}

impl Node {
    pub(crate) fn new_red(payload: Payload) -> Box<Node> {
        Box::new(Node {
            left: None,
            right: None,
            black: false,
            payload,
        })
    }

    #[inline]
    pub(crate) fn set_red(&mut self) {
        self.black = false;
    }

    #[inline]
    pub(crate) fn set_black(&mut self) {
        self.black = true;
    }

    #[inline]
    pub(crate) fn toggle_link(&mut self) {
        self.black = !self.black;
    }

    #[inline]
    pub(crate) fn is_black(&self) -> bool {
        self.black
    }

    #[inline]
    pub(crate) fn as_left_deref(&self) -> Option<&Node> {
        self.left.as_deref()
    }

    #[inline]
    pub(crate) fn as_right_deref(&self) -> Option<&Node> {
        self.right.as_deref()
    }

    /// The address this node compares by: its own, or — if it holds an
    /// embedded duplicates tree — any address from that subtree (every
    /// entry there compares equal to this node's key by construction).
    pub(crate) fn representative(&self) -> Address {
        match &self.payload {
            Payload::Single(addr) => *addr,
            Payload::Duplicates(sub) => sub.any_address(),
        }
    }
}

#[inline]
pub(crate) fn is_red(node: Option<&Node>) -> bool {
    node.map_or(false, |n| !n.black)
}

#[inline]
pub(crate) fn is_black(node: Option<&Node>) -> bool {
    node.map_or(true, Node::is_black)
}
