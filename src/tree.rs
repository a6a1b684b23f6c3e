//! What the observer needs from a tree.
//!
//! The observer never owns nodes. It sees a tree through [`TreeNodes`]
//! and, for the entry points that perform mutations themselves, through
//! [`TreeMut`]. [`ArenaTree`] is an arena-backed implementation.

mod arena;

pub use arena::{ArenaTree, NodeId};

use crate::address::Address;
use std::fmt;
use ulid::Ulid;

/// Identity of one tree instance; observers are bound to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(Ulid);

impl TreeId {
    pub fn new() -> Self {
        TreeId(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for TreeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tree-{}", self.0)
    }
}

/// Read access to an ordered tree.
pub trait TreeNodes {
    type NodeId: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    fn tree_id(&self) -> TreeId;

    fn root(&self) -> Self::NodeId;

    /// Parent of `node`, `None` for the root or a node not in the tree.
    fn parent(&self, node: Self::NodeId) -> Option<Self::NodeId>;

    fn child_count(&self, node: Self::NodeId) -> usize;

    fn child_at(&self, node: Self::NodeId, index: usize) -> Option<Self::NodeId>;

    fn index_in_parent(&self, node: Self::NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        (0..self.child_count(parent)).find(|&i| self.child_at(parent, i) == Some(node))
    }

    /// Address of `node`, `None` when it is not part of this tree.
    fn address(&self, node: Self::NodeId) -> Option<Address> {
        let mut indices = Vec::new();
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            indices.push(self.index_in_parent(current)?);
            current = parent;
        }
        if current != self.root() {
            return None;
        }
        indices.reverse();
        Some(Address::from(indices))
    }

    fn node_at(&self, address: &Address) -> Option<Self::NodeId> {
        address
            .indices()
            .iter()
            .try_fold(self.root(), |node, &index| self.child_at(node, index))
    }
}

/// Structural mutation of an ordered tree, in whole runs of children.
pub trait TreeMut: TreeNodes {
    type Value;

    /// Insert `values` as children of `parent` starting at `index`, returning
    /// the new nodes.
    fn insert_children(
        &mut self,
        parent: Self::NodeId,
        index: usize,
        values: Vec<Self::Value>,
    ) -> Vec<Self::NodeId>;

    /// Remove `count` children of `parent` starting at `start` along with
    /// their subtrees, returning the removed children's values.
    fn remove_children(
        &mut self,
        parent: Self::NodeId,
        start: usize,
        count: usize,
    ) -> Vec<Self::Value>;
}
