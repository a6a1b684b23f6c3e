//! Retained events, pinned by observed states.
//!
//! Entry `seq` holds the event leading from state `seq` to `seq + 1`. The
//! last entry is the open "current" position and never holds an event.
//! Entries leave only from the front, once nothing pins them.

use crate::event::Event;
use std::collections::VecDeque;

#[derive(Debug, Default)]
struct Entry {
    event: Option<Event>,
    pins: usize,
}

#[derive(Debug)]
pub(crate) struct History {
    first_seq: u64,
    entries: VecDeque<Entry>,
}

impl History {
    pub(crate) fn new() -> Self {
        History {
            first_seq: 0,
            entries: VecDeque::from([Entry::default()]),
        }
    }

    pub(crate) fn current_seq(&self) -> u64 {
        self.first_seq + self.entries.len() as u64 - 1
    }

    /// Number of closed events retained.
    pub(crate) fn len(&self) -> usize {
        self.entries.len() - 1
    }

    fn index(&self, seq: u64) -> usize {
        assert!(
            seq >= self.first_seq && seq <= self.current_seq(),
            "history position {seq} is not retained ({}..={})",
            self.first_seq,
            self.current_seq()
        );
        (seq - self.first_seq) as usize
    }

    pub(crate) fn pin_current(&mut self) -> u64 {
        let seq = self.current_seq();
        self.pin(seq);
        seq
    }

    pub(crate) fn pin(&mut self, seq: u64) {
        let index = self.index(seq);
        self.entries[index].pins += 1;
    }

    pub(crate) fn unpin(&mut self, seq: u64) {
        let index = self.index(seq);
        let entry = &mut self.entries[index];
        entry.pins -= 1;
        if index == 0 && entry.pins == 0 {
            self.trim();
        }
    }

    /// Move a pin from `seq` to the next position. Returns the new position,
    /// or `None` when `seq` is already current.
    pub(crate) fn advance(&mut self, seq: u64) -> Option<u64> {
        if seq == self.current_seq() {
            return None;
        }
        self.pin(seq + 1);
        self.unpin(seq);
        Some(seq + 1)
    }

    /// Close the current position with `event` and open a new one.
    pub(crate) fn push(&mut self, event: Event) {
        if let Some(current) = self.entries.back_mut() {
            current.event = Some(event);
        }
        self.entries.push_back(Entry::default());
        self.trim();
    }

    pub(crate) fn event_at(&self, seq: u64) -> Option<Event> {
        self.entries.get(self.index(seq))?.event.clone()
    }

    /// Events leading from position `seq` to the current one.
    pub(crate) fn events_from(&self, seq: u64) -> Vec<Event> {
        let start = self.index(seq);
        self.entries
            .range(start..)
            .filter_map(|entry| entry.event.clone())
            .collect()
    }

    fn trim(&mut self) {
        let mut trimmed = 0;
        while self.entries.len() > 1 && self.entries.front().is_some_and(|e| e.pins == 0) {
            self.entries.pop_front();
            self.first_seq += 1;
            trimmed += 1;
        }
        if trimmed > 0 {
            log::trace!(
                target: "treeshift::history",
                "Trimmed {} events; oldest retained position is now {}",
                trimmed,
                self.first_seq
            );
        }
    }
}
