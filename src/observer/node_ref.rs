//! Node references that follow their node through recorded events.
//!
//! Refs are registered once per `(address, handle type)`; clones share the
//! registration. Every committed event remaps the whole index while holding
//! its mutex, the same mutex a dropped ref takes to unregister.

use super::{Observer, Shared, StructureAccess};
use crate::address::Address;
use crate::event::Event;
use crate::tree::TreeNodes;
use arc_swap::ArcSwap;
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type RefKey = (Address, TypeId);

pub(crate) struct RefEntry {
    kind: TypeId,
    handle: Box<dyn Any + Send + Sync>,
    address: ArcSwap<Address>,
    deleted: AtomicBool,
    // Only changed while the index mutex is held.
    holders: AtomicUsize,
}

impl RefEntry {
    fn key(&self) -> RefKey {
        (Address::clone(&self.address.load()), self.kind)
    }
}

#[derive(Default)]
pub(crate) struct RefIndex {
    entries: BTreeMap<RefKey, Arc<RefEntry>>,
}

impl RefIndex {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn acquire<H: Send + Sync + 'static>(&mut self, address: Address, handle: H) -> Arc<RefEntry> {
        let key = (address, TypeId::of::<H>());
        if let Some(entry) = self.entries.get(&key) {
            entry.holders.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(entry);
        }
        let entry = Arc::new(RefEntry {
            kind: key.1,
            handle: Box::new(handle),
            address: ArcSwap::from_pointee(key.0.clone()),
            deleted: AtomicBool::new(false),
            holders: AtomicUsize::new(1),
        });
        self.entries.insert(key, Arc::clone(&entry));
        entry
    }

    fn retain(&self, entry: &RefEntry) {
        entry.holders.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&mut self, entry: &Arc<RefEntry>) {
        if entry.holders.fetch_sub(1, Ordering::Relaxed) > 1 {
            return;
        }
        if entry.deleted.load(Ordering::Acquire) {
            return;
        }
        let key = entry.key();
        if self
            .entries
            .get(&key)
            .is_some_and(|registered| Arc::ptr_eq(registered, entry))
        {
            self.entries.remove(&key);
        }
    }

    /// Move every entry through `event`. Entries whose node did not survive
    /// are flagged and unregistered. Returns how many were.
    pub(crate) fn remap(&mut self, event: &Event) -> usize {
        let mut invalidated = 0;
        let entries = std::mem::take(&mut self.entries);
        for ((address, kind), entry) in entries {
            match event.map_forward(&address) {
                Some(mapped) => {
                    if mapped != address {
                        entry.address.store(Arc::new(mapped.clone()));
                    }
                    self.entries.insert((mapped, kind), entry);
                }
                None => {
                    entry.deleted.store(true, Ordering::Release);
                    invalidated += 1;
                }
            }
        }
        if invalidated > 0 {
            log::debug!(
                target: "treeshift::node_ref",
                "Invalidated {} node refs; {} still tracked",
                invalidated,
                self.entries.len()
            );
        }
        invalidated
    }
}

/// A reference to one tree node that survives structural edits.
///
/// Once the node is removed the ref is invalid for good, even if another
/// node later lands at the same address.
pub struct NodeRef<H: Copy + Send + Sync + fmt::Debug + 'static> {
    shared: Arc<Shared>,
    entry: Arc<RefEntry>,
    _handle: PhantomData<H>,
}

impl<H: Copy + Send + Sync + fmt::Debug + 'static> NodeRef<H> {
    pub(super) fn new<T: TreeNodes<NodeId = H>>(
        observer: &Observer,
        guard: &impl StructureAccess,
        tree: &T,
        node: H,
    ) -> Self {
        let shared = &observer.shared;
        shared.check_access(guard);
        shared.check_tree(tree.tree_id());
        assert!(
            !guard.is_recording(),
            "cannot take a node ref while a recording is open on {}",
            shared.id
        );
        let Some(address) = tree.address(node) else {
            panic!("{node:?} is not a node of {}", tree.tree_id());
        };
        let entry = shared.node_refs.lock().acquire(address, node);
        NodeRef {
            shared: Arc::clone(shared),
            entry,
            _handle: PhantomData,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.entry.deleted.load(Ordering::Acquire)
    }

    /// The node handle, while the node still exists.
    pub fn get(&self) -> Option<H> {
        if !self.is_valid() {
            return None;
        }
        self.entry.handle.downcast_ref::<H>().copied()
    }

    /// Where the node sits after the latest committed event.
    pub fn address(&self) -> Option<Address> {
        if !self.is_valid() {
            return None;
        }
        Some(Address::clone(&self.entry.address.load()))
    }
}

impl<H: Copy + Send + Sync + fmt::Debug + 'static> Clone for NodeRef<H> {
    fn clone(&self) -> Self {
        self.shared.node_refs.lock().retain(&self.entry);
        NodeRef {
            shared: Arc::clone(&self.shared),
            entry: Arc::clone(&self.entry),
            _handle: PhantomData,
        }
    }
}

impl<H: Copy + Send + Sync + fmt::Debug + 'static> Drop for NodeRef<H> {
    fn drop(&mut self) {
        self.shared.node_refs.lock().release(&self.entry);
    }
}

impl<H: Copy + Send + Sync + fmt::Debug + 'static> fmt::Debug for NodeRef<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("node", &self.entry.handle.downcast_ref::<H>())
            .field("address", &self.address())
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::address::{Address, Chunk};
    use crate::observer::Observer;
    use crate::tree::{ArenaTree, TreeMut, TreeNodes};

    fn tree_with_children(count: usize) -> ArenaTree<usize> {
        let mut tree = ArenaTree::new(usize::MAX);
        let root = tree.root();
        tree.insert_children(root, 0, (0..count).collect());
        tree
    }

    #[test]
    fn test_ref_follows_node_across_insert() {
        let tree = tree_with_children(3);
        let observer = Observer::for_tree(&tree);
        let third = tree.child_at(tree.root(), 2).expect("child exists");
        let node_ref = observer.node_ref(&observer.read().expect("uncontended"), &tree, third);

        let mut guard = observer.write().expect("uncontended");
        guard.start_recording();
        guard.record_inserted(&Chunk::new(Address::from([0]), 2));
        guard.finish_recording();
        drop(guard);

        assert!(node_ref.is_valid());
        assert_eq!(node_ref.address(), Some(Address::from([4])));
        assert_eq!(node_ref.get(), Some(third));
    }

    #[test]
    fn test_clones_share_one_registration() {
        let tree = tree_with_children(2);
        let observer = Observer::for_tree(&tree);
        let node = tree.child_at(tree.root(), 1).expect("child exists");
        let guard = observer.read().expect("uncontended");
        let first = observer.node_ref(&guard, &tree, node);
        let second = observer.node_ref(&guard, &tree, node);
        let third = first.clone();
        drop(guard);
        assert_eq!(observer.tracked_ref_count(), 1);

        drop(first);
        drop(second);
        assert_eq!(observer.tracked_ref_count(), 1);
        drop(third);
        assert_eq!(observer.tracked_ref_count(), 0);
    }

    #[test]
    fn test_removed_node_stays_invalid() {
        let mut tree = tree_with_children(3);
        let observer = Observer::for_tree(&tree);
        let root = tree.root();
        let middle = tree.child_at(root, 1).expect("child exists");
        let node_ref = observer.node_ref(&observer.read().expect("uncontended"), &tree, middle);

        let mut guard = observer.write().expect("uncontended");
        guard.start_recording();
        guard.remove_nodes(&mut tree, root, 1, 1);
        guard.finish_recording();
        guard.start_recording();
        guard.insert_nodes(&mut tree, root, 1, vec![7]);
        guard.finish_recording();
        drop(guard);

        assert!(!node_ref.is_valid());
        assert_eq!(node_ref.get(), None);
        assert_eq!(node_ref.address(), None);
        assert_eq!(observer.tracked_ref_count(), 0);
    }

    #[test]
    #[should_panic(expected = "recording is open")]
    fn test_ref_during_recording_panics() {
        let tree = tree_with_children(1);
        let observer = Observer::for_tree(&tree);
        let mut guard = observer.write().expect("uncontended");
        guard.start_recording();
        let node = tree.child_at(tree.root(), 0).expect("child exists");
        observer.node_ref(&guard, &tree, node);
    }
}
