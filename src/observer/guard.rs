use super::{ObserverId, Shared, Structure};
use crate::address::{Address, Chunk};
use crate::event::{Event, EventBuilder};
use crate::tree::{TreeMut, TreeNodes};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

mod private {
    pub trait Sealed {}
}

/// Proof of holding an observer's structural lock, in either mode.
///
/// Operations that need a consistent view of the tree take one of these
/// instead of locking on their own.
pub trait StructureAccess: private::Sealed {
    fn observer_id(&self) -> ObserverId;

    /// Whether a recording span is open on the observer.
    fn is_recording(&self) -> bool;
}

/// Shared access to an observer.
pub struct ReadGuard<'a> {
    shared: &'a Shared,
    lock: RwLockReadGuard<'a, Structure>,
}

impl<'a> ReadGuard<'a> {
    pub(super) fn new(shared: &'a Shared, lock: RwLockReadGuard<'a, Structure>) -> Self {
        ReadGuard { shared, lock }
    }
}

impl private::Sealed for ReadGuard<'_> {}

impl StructureAccess for ReadGuard<'_> {
    fn observer_id(&self) -> ObserverId {
        self.shared.id
    }

    fn is_recording(&self) -> bool {
        self.lock.recording.is_some()
    }
}

/// Exclusive access to an observer: the only way to record.
///
/// Dropping the guard with a recording still open commits that recording
/// and logs a warning.
pub struct WriteGuard<'a> {
    shared: &'a Shared,
    lock: RwLockWriteGuard<'a, Structure>,
}

impl private::Sealed for WriteGuard<'_> {}

impl StructureAccess for WriteGuard<'_> {
    fn observer_id(&self) -> ObserverId {
        self.shared.id
    }

    fn is_recording(&self) -> bool {
        self.lock.recording.is_some()
    }
}

impl<'a> WriteGuard<'a> {
    pub(super) fn new(shared: &'a Shared, lock: RwLockWriteGuard<'a, Structure>) -> Self {
        WriteGuard { shared, lock }
    }

    /// Open a recording span.
    ///
    /// # Panics
    ///
    /// Panics if a recording is already open.
    pub fn start_recording(&mut self) {
        assert!(
            self.lock.recording.is_none(),
            "a recording is already open on {}",
            self.shared.id
        );
        self.lock.recording = Some(EventBuilder::new());
    }

    /// Close the recording span and return its event.
    ///
    /// An empty event is returned but not kept in the history.
    ///
    /// # Panics
    ///
    /// Panics if no recording is open.
    pub fn finish_recording(&mut self) -> Event {
        let Some(builder) = self.lock.recording.take() else {
            panic!("no recording is open on {}", self.shared.id);
        };
        self.shared.commit(builder.build())
    }

    fn assert_recording(&self) {
        assert!(
            self.lock.recording.is_some(),
            "no recording is open on {}",
            self.shared.id
        );
    }

    fn recording(&mut self) -> &mut EventBuilder {
        self.assert_recording();
        self.lock.recording.get_or_insert_default()
    }

    /// Record inserted nodes, addressed after the insertion.
    pub fn record_inserted(&mut self, chunk: &Chunk) {
        self.recording().insert_chunk(chunk);
    }

    /// Record removed nodes, addressed before the removal.
    pub fn record_removed(&mut self, chunk: &Chunk) {
        self.recording().remove_chunk(chunk);
    }

    /// Record insertions all addressed in the state after the batch.
    pub fn record_inserted_batch(&mut self, chunks: impl IntoIterator<Item = Chunk>) {
        self.recording().insert_chunks(chunks);
    }

    /// Record removals all addressed in the state before the batch.
    pub fn record_removed_batch(&mut self, chunks: impl IntoIterator<Item = Chunk>) {
        self.recording().remove_chunks(chunks);
    }

    /// Record that `tree` inserted `count` children of `parent` at `start`.
    pub fn passive_add_nodes<T: TreeNodes>(
        &mut self,
        tree: &T,
        parent: T::NodeId,
        start: usize,
        count: usize,
    ) {
        let parent_address = self.address_of(tree, parent);
        if count > 0 {
            self.record_inserted(&Chunk::new(parent_address.child(start), count));
        }
    }

    /// Record that `tree` is removing `count` children of `parent` at `start`.
    pub fn passive_remove_nodes<T: TreeNodes>(
        &mut self,
        tree: &T,
        parent: T::NodeId,
        start: usize,
        count: usize,
    ) {
        let parent_address = self.address_of(tree, parent);
        if count > 0 {
            self.record_removed(&Chunk::new(parent_address.child(start), count));
        }
    }

    /// Insert `values` under `parent` at `index` and record it.
    pub fn insert_nodes<T: TreeMut>(
        &mut self,
        tree: &mut T,
        parent: T::NodeId,
        index: usize,
        values: Vec<T::Value>,
    ) -> Vec<T::NodeId> {
        let parent_address = self.address_of(tree, parent);
        self.assert_recording();
        let count = values.len();
        let inserted = tree.insert_children(parent, index, values);
        if count > 0 {
            self.record_inserted(&Chunk::new(parent_address.child(index), count));
        }
        inserted
    }

    pub fn append_nodes<T: TreeMut>(
        &mut self,
        tree: &mut T,
        parent: T::NodeId,
        values: Vec<T::Value>,
    ) -> Vec<T::NodeId> {
        let index = tree.child_count(parent);
        self.insert_nodes(tree, parent, index, values)
    }

    pub fn prepend_nodes<T: TreeMut>(
        &mut self,
        tree: &mut T,
        parent: T::NodeId,
        values: Vec<T::Value>,
    ) -> Vec<T::NodeId> {
        self.insert_nodes(tree, parent, 0, values)
    }

    /// Remove `count` children of `parent` from `start` and record it.
    pub fn remove_nodes<T: TreeMut>(
        &mut self,
        tree: &mut T,
        parent: T::NodeId,
        start: usize,
        count: usize,
    ) -> Vec<T::Value> {
        let parent_address = self.address_of(tree, parent);
        self.assert_recording();
        let removed = tree.remove_children(parent, start, count);
        if count > 0 {
            self.record_removed(&Chunk::new(parent_address.child(start), count));
        }
        removed
    }

    fn address_of<T: TreeNodes>(&self, tree: &T, node: T::NodeId) -> Address {
        self.shared.check_tree(tree.tree_id());
        match tree.address(node) {
            Some(address) => address,
            None => panic!("{node:?} is not a node of {}", tree.tree_id()),
        }
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let Some(builder) = self.lock.recording.take() else {
            return;
        };
        if std::thread::panicking() {
            log::warn!(
                target: "treeshift::observer",
                "{} discarded an open recording while unwinding",
                self.shared.id
            );
            return;
        }
        log::warn!(
            target: "treeshift::observer",
            "{} released write access with a recording open; committing it",
            self.shared.id
        );
        self.shared.commit(builder.build());
    }
}
