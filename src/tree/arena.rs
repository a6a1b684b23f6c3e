//! Arena-backed ordered tree with generational node ids.

use super::{TreeId, TreeMut, TreeNodes};

/// Handle to a node of an [`ArenaTree`]. Stale once the node is removed,
/// even if its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    slot: usize,
    generation: u32,
}

#[derive(Debug)]
struct NodeData<T> {
    value: T,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    node: Option<NodeData<T>>,
}

#[derive(Debug)]
pub struct ArenaTree<T> {
    id: TreeId,
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    root: NodeId,
    len: usize,
}

impl<T> ArenaTree<T> {
    pub fn new(root_value: T) -> Self {
        let root = NodeId {
            slot: 0,
            generation: 0,
        };
        ArenaTree {
            id: TreeId::new(),
            slots: vec![Slot {
                generation: 0,
                node: Some(NodeData {
                    value: root_value,
                    parent: None,
                    children: Vec::new(),
                }),
            }],
            free: Vec::new(),
            root,
            len: 1,
        }
    }

    /// Number of live nodes, the root included.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: the root cannot be removed.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.data(node).is_some()
    }

    pub fn value(&self, node: NodeId) -> Option<&T> {
        self.data(node).map(|data| &data.value)
    }

    pub fn value_mut(&mut self, node: NodeId) -> Option<&mut T> {
        self.data_mut(node).map(|data| &mut data.value)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.data(node).map_or(&[], |data| data.children.as_slice())
    }

    fn data(&self, node: NodeId) -> Option<&NodeData<T>> {
        let slot = self.slots.get(node.slot)?;
        if slot.generation != node.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn data_mut(&mut self, node: NodeId) -> Option<&mut NodeData<T>> {
        let slot = self.slots.get_mut(node.slot)?;
        if slot.generation != node.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn allocate(&mut self, value: T, parent: NodeId) -> NodeId {
        let data = NodeData {
            value,
            parent: Some(parent),
            children: Vec::new(),
        };
        self.len += 1;
        match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot];
                entry.node = Some(data);
                NodeId {
                    slot,
                    generation: entry.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(data),
                });
                NodeId {
                    slot: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Free `node` and its whole subtree, returning the node's own value.
    fn release(&mut self, node: NodeId) -> Option<T> {
        let mut pending = vec![node];
        let mut value = None;
        while let Some(current) = pending.pop() {
            let slot = &mut self.slots[current.slot];
            let Some(data) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.slot);
            self.len -= 1;
            pending.extend(data.children);
            if current == node {
                value = Some(data.value);
            }
        }
        value
    }
}

impl<T> TreeNodes for ArenaTree<T> {
    type NodeId = NodeId;

    fn tree_id(&self) -> TreeId {
        self.id
    }

    fn root(&self) -> NodeId {
        self.root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node)?.parent
    }

    fn child_count(&self, node: NodeId) -> usize {
        self.children(node).len()
    }

    fn child_at(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.children(node).get(index).copied()
    }

    fn index_in_parent(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|&child| child == node)
    }
}

impl<T> TreeMut for ArenaTree<T> {
    type Value = T;

    /// # Panics
    ///
    /// Panics when `parent` is not a live node or `index` is past its last
    /// child.
    fn insert_children(&mut self, parent: NodeId, index: usize, values: Vec<T>) -> Vec<NodeId> {
        let count = self.child_count(parent);
        assert!(self.contains(parent), "parent {parent:?} is not in the tree");
        assert!(index <= count, "insert index {index} past {count} children");

        let ids: Vec<NodeId> = values
            .into_iter()
            .map(|value| self.allocate(value, parent))
            .collect();
        if let Some(data) = self.data_mut(parent) {
            data.children.splice(index..index, ids.iter().copied());
        }
        ids
    }

    /// # Panics
    ///
    /// Panics when `parent` is not a live node or the run extends past its
    /// last child.
    fn remove_children(&mut self, parent: NodeId, start: usize, count: usize) -> Vec<T> {
        assert!(self.contains(parent), "parent {parent:?} is not in the tree");
        let total = self.child_count(parent);
        assert!(
            start + count <= total,
            "removing {start}..{} of {total} children",
            start + count
        );

        let removed: Vec<NodeId> = match self.data_mut(parent) {
            Some(data) => data.children.drain(start..start + count).collect(),
            None => Vec::new(),
        };
        removed
            .into_iter()
            .filter_map(|node| self.release(node))
            .collect()
    }
}
