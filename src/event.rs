//! Closed structural events and the mappings they provide.
//!
//! An [`Event`] is an ordered list of steps describing one logical edit. It is
//! immutable and cheap to clone; every clone shares the same steps.
//!
//! Positions along an event's replay are counted in chunks: position 0 is the
//! state before the event, [`Event::chunk_count`] the state after it, and
//! each position in between the state after that many chunks of the
//! canonical replay have been applied.

mod builder;
mod staging;
mod step;

pub use builder::EventBuilder;
pub use staging::{Replay, StagingHandle};
pub use step::{Direction, Step, StepKind};

use crate::address::{Address, Chunk, cleanup_chunk_set};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Default, PartialEq, Eq)]
struct EventData {
    steps: Vec<Step>,
    offsets: Vec<usize>,
    chunk_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    data: Arc<EventData>,
}

impl Event {
    pub(crate) fn from_steps(steps: Vec<Step>) -> Self {
        let mut offsets = Vec::with_capacity(steps.len());
        let mut chunk_count = 0;
        for step in &steps {
            offsets.push(chunk_count);
            chunk_count += step.chunk_count();
        }
        Event {
            data: Arc::new(EventData {
                steps,
                offsets,
                chunk_count,
            }),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.data.steps
    }

    pub fn is_empty(&self) -> bool {
        self.data.chunk_count == 0
    }

    /// Number of chunks across every step, i.e. the length of the replay.
    pub fn chunk_count(&self) -> usize {
        self.data.chunk_count
    }

    /// Where a node at `address` before the event sits after it.
    pub fn map_forward(&self, address: &Address) -> Option<Address> {
        self.map_between(address, 0, self.chunk_count())
    }

    /// Where a node at `address` after the event sat before it.
    pub fn map_backward(&self, address: &Address) -> Option<Address> {
        self.map_between(address, self.chunk_count(), 0)
    }

    /// Map `address` from replay position `from` to replay position `to`.
    ///
    /// Positions past the end are clamped. Returns `None` when the node does
    /// not exist at one of the two positions.
    pub fn map_between(&self, address: &Address, from: usize, to: usize) -> Option<Address> {
        let (from, to) = self.clamp(from, to);
        let mut current = address.clone();
        for (step, base) in self.positioned(from, to) {
            let (local_from, local_to) = local_positions(step, base, from, to);
            if local_from != local_to {
                current = step.map_between(&current, local_from, local_to)?;
            }
        }
        Some(current)
    }

    pub fn map_chunk_forward(&self, chunk: &Chunk) -> Vec<Chunk> {
        self.map_chunk_between(chunk, 0, self.chunk_count())
    }

    pub fn map_chunk_backward(&self, chunk: &Chunk) -> Vec<Chunk> {
        self.map_chunk_between(chunk, self.chunk_count(), 0)
    }

    /// Map a whole chunk between two replay positions. The surviving nodes
    /// may come out as several runs.
    pub fn map_chunk_between(&self, chunk: &Chunk, from: usize, to: usize) -> Vec<Chunk> {
        let (from, to) = self.clamp(from, to);
        let mut current = vec![chunk.clone()];
        for (step, base) in self.positioned(from, to) {
            let (local_from, local_to) = local_positions(step, base, from, to);
            if local_from == local_to {
                continue;
            }
            current = current
                .iter()
                .flat_map(|chunk| step.map_chunk_between(chunk, local_from, local_to))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        current
    }

    /// True when the node at `address` after the event did not exist before it.
    pub fn was_added(&self, address: &Address) -> bool {
        self.map_backward(address).is_none()
    }

    /// True when the node at `address` before the event no longer exists.
    pub fn is_deleted(&self, address: &Address) -> bool {
        self.map_forward(address).is_none()
    }

    /// Nodes the event inserted and kept, as runs in end-state coordinates.
    ///
    /// Runs beneath another reported run are left out since they arrive with
    /// their ancestor.
    pub fn chunks_added(&self) -> Vec<Chunk> {
        let end = self.chunk_count();
        let mut added = Vec::new();
        for (step, base) in self.positioned(0, end) {
            if step.kind() != StepKind::Insert {
                continue;
            }
            let after = base + step.chunk_count();
            for chunk in step.chunks() {
                added.extend(self.map_chunk_between(&chunk, after, end));
            }
        }
        cleanup_chunk_set(added, true)
    }

    /// Nodes the event removed that existed before it, as runs in start-state
    /// coordinates.
    pub fn chunks_removed(&self) -> Vec<Chunk> {
        let mut removed = Vec::new();
        for (step, base) in self.positioned(0, self.chunk_count()) {
            if step.kind() != StepKind::Delete {
                continue;
            }
            for chunk in step.chunks() {
                removed.extend(self.map_chunk_between(&chunk, base, 0));
            }
        }
        cleanup_chunk_set(removed, true)
    }

    /// Parents that gained or lost children, in end-state coordinates.
    pub fn affected_parents(&self) -> BTreeSet<Address> {
        let end = self.chunk_count();
        let mut parents = BTreeSet::new();
        for (step, base) in self.positioned(0, end) {
            let position = step_key_position(step, base);
            parents.extend(
                step.parents()
                    .filter_map(|parent| self.map_between(parent, position, end)),
            );
        }
        parents
    }

    /// Net change in the child count of `parent`, an end-state address.
    pub fn child_count_delta(&self, parent: &Address) -> isize {
        let end = self.chunk_count();
        self.positioned(0, end)
            .filter_map(|(step, base)| {
                let key = self.map_between(parent, end, step_key_position(step, base))?;
                Some(step.child_count_delta(&key))
            })
            .sum()
    }

    /// The event's chunks in canonical replay order.
    pub fn replay(&self) -> Replay<'_> {
        Replay::new(self)
    }

    /// A replay cursor answering mapping queries at each position.
    pub fn staging(&self) -> StagingHandle<'_> {
        StagingHandle::new(self, crate::config::defaults::DEFAULT_REPLAY_CACHE_SIZE)
    }

    /// Like [`Event::staging`] with an explicit memo size; 0 disables the memo.
    pub fn staging_with_cache(&self, cache_size: usize) -> StagingHandle<'_> {
        StagingHandle::new(self, cache_size)
    }

    fn clamp(&self, from: usize, to: usize) -> (usize, usize) {
        let end = self.chunk_count();
        (from.min(end), to.min(end))
    }

    /// Steps paired with the replay position they start at, ordered for a
    /// walk from `from` to `to`.
    fn positioned(&self, from: usize, to: usize) -> Box<dyn Iterator<Item = (&Step, usize)> + '_> {
        let steps = self
            .data
            .steps
            .iter()
            .zip(self.data.offsets.iter().copied());
        if from <= to {
            Box::new(steps)
        } else {
            Box::new(steps.rev())
        }
    }
}

/// Positions local to `step` for a global walk from `from` to `to`.
fn local_positions(step: &Step, base: usize, from: usize, to: usize) -> (usize, usize) {
    let n = step.chunk_count();
    (
        from.saturating_sub(base).min(n),
        to.saturating_sub(base).min(n),
    )
}

/// Replay position whose coordinates a step's parent keys are expressed in.
fn step_key_position(step: &Step, base: usize) -> usize {
    match step.kind() {
        StepKind::Insert => base + step.chunk_count(),
        StepKind::Delete => base,
    }
}
