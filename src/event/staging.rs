//! Chunk-at-a-time replay of an event.
//!
//! A consumer mirroring the tree applies the operating chunk of each
//! position to its own structure, then advances. Between steps it can
//! translate addresses between the event's start, the current position, the
//! state just after the operating chunk, and the event's end.

use super::{Event, StepKind};
use crate::address::{Address, Chunk};
use std::cell::RefCell;
use std::collections::HashMap;

/// Iterator over an event's chunks in canonical replay order: each insert
/// step ascending, each delete step descending.
pub struct Replay<'a> {
    steps: std::slice::Iter<'a, super::Step>,
    current: Option<(StepKind, Box<dyn Iterator<Item = Chunk> + 'a>)>,
}

impl<'a> Replay<'a> {
    pub(super) fn new(event: &'a Event) -> Self {
        Replay {
            steps: event.steps().iter(),
            current: None,
        }
    }
}

impl Iterator for Replay<'_> {
    type Item = (StepKind, Chunk);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((kind, chunks)) = &mut self.current {
                if let Some(chunk) = chunks.next() {
                    return Some((*kind, chunk));
                }
            }
            let step = self.steps.next()?;
            self.current = Some((step.kind(), step.replay_order()));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Query {
    StartToCurrent,
    CurrentToStart,
    CurrentToEnd,
    EndToAfter,
}

/// Replay cursor over an [`Event`].
///
/// Position `p` is the state after `p` chunks have been applied; the
/// operating chunk is the one that moves the state from `p` to `p + 1`.
pub struct StagingHandle<'a> {
    event: &'a Event,
    replay: Replay<'a>,
    operating: Option<(StepKind, Chunk)>,
    progress: usize,
    cache: RefCell<HashMap<(Query, Address), Option<Address>>>,
    cache_size: usize,
}

impl<'a> StagingHandle<'a> {
    pub(super) fn new(event: &'a Event, cache_size: usize) -> Self {
        let mut replay = event.replay();
        let operating = replay.next();
        StagingHandle {
            event,
            replay,
            operating,
            progress: 0,
            cache: RefCell::new(HashMap::new()),
            cache_size,
        }
    }

    pub fn event(&self) -> &'a Event {
        self.event
    }

    /// Number of chunks applied so far.
    pub fn progress(&self) -> usize {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.operating.is_none()
    }

    /// Kind of the operating chunk, `None` once finished.
    pub fn operation(&self) -> Option<StepKind> {
        self.operating.as_ref().map(|(kind, _)| *kind)
    }

    /// The chunk to apply next, addressed in the current state for a delete
    /// and in the state after it for an insert.
    pub fn operating_chunk(&self) -> Option<&Chunk> {
        self.operating.as_ref().map(|(_, chunk)| chunk)
    }

    /// Move past the operating chunk. Returns false when already finished.
    pub fn advance(&mut self) -> bool {
        if self.operating.is_none() {
            return false;
        }
        self.progress += 1;
        self.operating = self.replay.next();
        self.cache.get_mut().clear();
        true
    }

    /// Go back to the start of the event.
    pub fn restart(&mut self) {
        self.replay = self.event.replay();
        self.operating = self.replay.next();
        self.progress = 0;
        self.cache.get_mut().clear();
    }

    /// From the event's start state to the current position.
    pub fn map_start_to_current(&self, address: &Address) -> Option<Address> {
        self.cached(Query::StartToCurrent, address, 0, self.progress)
    }

    /// From the current position back to the event's start state.
    pub fn map_current_to_start(&self, address: &Address) -> Option<Address> {
        self.cached(Query::CurrentToStart, address, self.progress, 0)
    }

    /// From the current position to the event's end state, as if every
    /// remaining chunk, the operating one included, were applied.
    pub fn map_current_to_end(&self, address: &Address) -> Option<Address> {
        self.cached(
            Query::CurrentToEnd,
            address,
            self.progress,
            self.event.chunk_count(),
        )
    }

    /// From the event's end state back to the state just after the operating
    /// chunk.
    pub fn map_end_to_after(&self, address: &Address) -> Option<Address> {
        self.cached(
            Query::EndToAfter,
            address,
            self.event.chunk_count(),
            self.progress + 1,
        )
    }

    fn cached(&self, query: Query, address: &Address, from: usize, to: usize) -> Option<Address> {
        if self.cache_size == 0 {
            return self.event.map_between(address, from, to);
        }
        let key = (query, address.clone());
        if let Some(hit) = self.cache.borrow().get(&key) {
            return hit.clone();
        }
        let mapped = self.event.map_between(address, from, to);
        let mut cache = self.cache.borrow_mut();
        if cache.len() >= self.cache_size {
            cache.clear();
        }
        cache.insert(key, mapped.clone());
        mapped
    }
}
