//! Observers bound to a tree: recording spans, retained history and live
//! node references.
//!
//! All structural work goes through a guard obtained from [`Observer::read`]
//! or [`Observer::write`]. Recording and mutation need the write guard;
//! mapping queries accept either. Acquisition waits at most the configured
//! lock timeout and then fails with a retryable error.
//!
//! The history list and the node-ref index sit behind their own mutexes,
//! so dropping an [`ObservedState`] or a [`NodeRef`] never touches the
//! structural lock.

mod guard;
mod history;
mod node_ref;
mod state;

pub use guard::{ReadGuard, StructureAccess, WriteGuard};
pub use node_ref::NodeRef;
pub use state::ObservedState;

use crate::config::ObserverSettings;
use crate::error::{LockAccess, ObserverError, ObserverResult};
use crate::event::{Event, EventBuilder, StagingHandle};
use crate::tree::{TreeId, TreeNodes};
use arc_swap::ArcSwap;
use history::History;
use node_ref::RefIndex;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(Ulid);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// State guarded by the structural lock.
#[derive(Debug, Default)]
pub(crate) struct Structure {
    recording: Option<EventBuilder>,
}

pub(crate) struct Shared {
    id: ObserverId,
    tree_id: TreeId,
    settings: ArcSwap<ObserverSettings>,
    structure: RwLock<Structure>,
    history: Mutex<History>,
    node_refs: Mutex<RefIndex>,
    last_event: ArcSwap<Event>,
    detached: AtomicBool,
}

impl Shared {
    fn check_access(&self, guard: &impl StructureAccess) {
        assert_eq!(
            guard.observer_id(),
            self.id,
            "guard belongs to a different observer"
        );
    }

    fn check_tree(&self, tree_id: TreeId) {
        assert_eq!(
            tree_id, self.tree_id,
            "{} is not observed by {}",
            tree_id, self.id
        );
    }

    /// Close out a recording: remap live refs, retain the event for pinned
    /// states and publish it as the latest event.
    fn commit(&self, event: Event) -> Event {
        if event.is_empty() {
            log::trace!(target: "treeshift::observer", "{} closed an empty recording", self.id);
            return event;
        }

        let invalidated = self.node_refs.lock().remap(&event);
        let retained = {
            let mut history = self.history.lock();
            history.push(event.clone());
            history.len()
        };
        self.last_event.store(Arc::new(event.clone()));

        log::debug!(
            target: "treeshift::observer",
            "{} recorded {} chunks in {} steps ({} refs invalidated, {} events retained)",
            self.id,
            event.chunk_count(),
            event.steps().len(),
            invalidated,
            retained
        );
        let threshold = self.settings.load().history_warn_threshold;
        if retained > threshold {
            log::warn!(
                target: "treeshift::history",
                "{} retains {} events, more than {}; an observed state is not catching up",
                self.id,
                retained,
                threshold
            );
        }
        event
    }
}

/// Change recorder for one tree.
///
/// Dropping the observer detaches it. States and refs taken from it stay
/// usable, they just never see another event.
pub struct Observer {
    shared: Arc<Shared>,
}

impl Observer {
    pub fn new(tree_id: TreeId) -> Self {
        Self::with_settings(tree_id, ObserverSettings::default())
    }

    pub fn with_settings(tree_id: TreeId, settings: ObserverSettings) -> Self {
        let id = ObserverId(Ulid::new());
        log::debug!(target: "treeshift::observer", "{} attached to {}", id, tree_id);
        Observer {
            shared: Arc::new(Shared {
                id,
                tree_id,
                settings: ArcSwap::from_pointee(settings),
                structure: RwLock::new(Structure::default()),
                history: Mutex::new(History::new()),
                node_refs: Mutex::new(RefIndex::default()),
                last_event: ArcSwap::from_pointee(Event::default()),
                detached: AtomicBool::new(false),
            }),
        }
    }

    /// Observer attached to `tree`.
    pub fn for_tree<T: TreeNodes>(tree: &T) -> Self {
        Self::new(tree.tree_id())
    }

    pub fn id(&self) -> ObserverId {
        self.shared.id
    }

    pub fn tree_id(&self) -> TreeId {
        self.shared.tree_id
    }

    pub fn settings(&self) -> Arc<ObserverSettings> {
        self.shared.settings.load_full()
    }

    /// Swap in new settings. Takes effect from the next lock acquisition.
    pub fn apply_settings(&self, settings: ObserverSettings) -> ObserverResult<()> {
        if settings.lock_timeout.is_zero() {
            return Err(ObserverError::config("lock timeout must be greater than zero"));
        }
        self.shared.settings.store(Arc::new(settings));
        Ok(())
    }

    /// Shared access for mapping queries.
    pub fn read(&self) -> ObserverResult<ReadGuard<'_>> {
        let timeout = self.shared.settings.load().lock_timeout;
        match self.shared.structure.try_read_for(timeout) {
            Some(lock) => Ok(ReadGuard::new(&self.shared, lock)),
            None => {
                log::warn!(
                    target: "treeshift::observer",
                    "{} read access timed out after {:?}",
                    self.shared.id,
                    timeout
                );
                Err(ObserverError::lock_timeout(LockAccess::Read, timeout))
            }
        }
    }

    /// Exclusive access for recording and mutation.
    pub fn write(&self) -> ObserverResult<WriteGuard<'_>> {
        let timeout = self.shared.settings.load().lock_timeout;
        match self.shared.structure.try_write_for(timeout) {
            Some(lock) => Ok(WriteGuard::new(&self.shared, lock)),
            None => {
                log::warn!(
                    target: "treeshift::observer",
                    "{} write access timed out after {:?}",
                    self.shared.id,
                    timeout
                );
                Err(ObserverError::lock_timeout(LockAccess::Write, timeout))
            }
        }
    }

    /// Pin the current position of the history.
    pub fn observe(&self, guard: &impl StructureAccess) -> ObservedState {
        self.shared.check_access(guard);
        ObservedState::pin_current(Arc::clone(&self.shared))
    }

    /// Take a reference to `node` that follows it through later events.
    ///
    /// # Panics
    ///
    /// Panics when `tree` is not the observed tree, `node` is not in it, the
    /// guard is foreign, or a recording is open.
    pub fn node_ref<T: TreeNodes>(
        &self,
        guard: &impl StructureAccess,
        tree: &T,
        node: T::NodeId,
    ) -> NodeRef<T::NodeId> {
        NodeRef::new(self, guard, tree, node)
    }

    /// The most recent non-empty event, or an empty one before any.
    pub fn last_event(&self) -> Event {
        Event::clone(&self.shared.last_event.load())
    }

    /// Replay cursor over `event` using this observer's cache size.
    pub fn staging<'e>(&self, event: &'e Event) -> StagingHandle<'e> {
        event.staging_with_cache(self.shared.settings.load().replay_cache_size)
    }

    /// Number of closed events kept for pinned states.
    pub fn history_len(&self) -> usize {
        self.shared.history.lock().len()
    }

    /// Number of distinct node refs currently tracked.
    pub fn tracked_ref_count(&self) -> usize {
        self.shared.node_refs.lock().len()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.shared.id)
            .field("tree_id", &self.shared.tree_id)
            .finish_non_exhaustive()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.shared.detached.store(true, Ordering::Release);
        log::debug!(
            target: "treeshift::observer",
            "{} detached from {}",
            self.shared.id,
            self.shared.tree_id
        );
    }
}
