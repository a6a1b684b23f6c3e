use super::{Shared, StructureAccess};
use crate::address::Address;
use crate::event::Event;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// A pinned position in an observer's history.
///
/// Every event recorded after the position stays retained until the state
/// moves past it or is dropped. Cloning pins the same position again.
pub struct ObservedState {
    shared: Arc<Shared>,
    seq: u64,
}

impl ObservedState {
    pub(super) fn pin_current(shared: Arc<Shared>) -> Self {
        let seq = shared.history.lock().pin_current();
        ObservedState { shared, seq }
    }

    /// True when no event has been recorded since this position.
    pub fn is_current(&self) -> bool {
        self.seq == self.shared.history.lock().current_seq()
    }

    /// True once the observer itself has been dropped.
    pub fn is_detached(&self) -> bool {
        self.shared.detached.load(Ordering::Acquire)
    }

    /// The event leading away from this position, if one was recorded.
    pub fn event(&self) -> Option<Event> {
        self.shared.history.lock().event_at(self.seq)
    }

    /// Every event recorded since this position, oldest first.
    pub fn pending_events(&self) -> Vec<Event> {
        self.shared.history.lock().events_from(self.seq)
    }

    /// Step past one event. Returns false when already current.
    pub fn next(&mut self, guard: &impl StructureAccess) -> bool {
        self.shared.check_access(guard);
        match self.shared.history.lock().advance(self.seq) {
            Some(seq) => {
                self.seq = seq;
                true
            }
            None => false,
        }
    }

    /// Step past every pending event, returning how many were skipped.
    pub fn catch_up(&mut self, guard: &impl StructureAccess) -> usize {
        let mut skipped = 0;
        while self.next(guard) {
            skipped += 1;
        }
        skipped
    }

    /// Where a node at `address` in this state sits in the current one.
    pub fn map_to_current(
        &self,
        guard: &impl StructureAccess,
        address: &Address,
    ) -> Option<Address> {
        self.shared.check_access(guard);
        self.pending_events()
            .iter()
            .try_fold(address.clone(), |address, event| event.map_forward(&address))
    }

    /// Where a node at `address` in the current state sat in this one.
    pub fn map_from_current(
        &self,
        guard: &impl StructureAccess,
        address: &Address,
    ) -> Option<Address> {
        self.shared.check_access(guard);
        self.pending_events()
            .iter()
            .rev()
            .try_fold(address.clone(), |address, event| event.map_backward(&address))
    }
}

impl Clone for ObservedState {
    fn clone(&self) -> Self {
        self.shared.history.lock().pin(self.seq);
        ObservedState {
            shared: Arc::clone(&self.shared),
            seq: self.seq,
        }
    }
}

impl Drop for ObservedState {
    fn drop(&mut self) {
        self.shared.history.lock().unpin(self.seq);
    }
}

impl fmt::Debug for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedState")
            .field("observer", &self.shared.id)
            .field("position", &self.seq)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::address::{Address, Chunk};
    use crate::observer::Observer;
    use crate::tree::TreeId;

    fn record_insert(observer: &Observer, indices: &[usize]) {
        let mut guard = observer.write().expect("uncontended");
        guard.start_recording();
        guard.record_inserted(&Chunk::new(Address::from(indices), 1));
        guard.finish_recording();
    }

    #[test]
    fn test_map_through_pending_events() {
        let observer = Observer::new(TreeId::new());
        let state = observer.observe(&observer.read().expect("uncontended"));
        record_insert(&observer, &[0]);
        record_insert(&observer, &[0]);

        let guard = observer.read().expect("uncontended");
        assert_eq!(state.pending_events().len(), 2);
        assert_eq!(
            state.map_to_current(&guard, &Address::from([0, 3])),
            Some(Address::from([2, 3]))
        );
        assert_eq!(
            state.map_from_current(&guard, &Address::from([2])),
            Some(Address::from([0]))
        );
        assert_eq!(state.map_from_current(&guard, &Address::from([1])), None);
    }

    #[test]
    fn test_catch_up_releases_history() {
        let observer = Observer::new(TreeId::new());
        let mut state = observer.observe(&observer.read().expect("uncontended"));
        record_insert(&observer, &[0]);
        record_insert(&observer, &[4]);
        assert_eq!(observer.history_len(), 2);

        let guard = observer.read().expect("uncontended");
        assert_eq!(state.catch_up(&guard), 2);
        assert!(state.is_current());
        assert_eq!(state.event(), None);
        drop(guard);
        assert_eq!(observer.history_len(), 0);
    }

    #[test]
    fn test_state_outlives_observer() {
        let observer = Observer::new(TreeId::new());
        let state = observer.observe(&observer.read().expect("uncontended"));
        record_insert(&observer, &[1]);
        drop(observer);
        assert!(state.is_detached());
        assert_eq!(state.pending_events().len(), 1);
    }
}
