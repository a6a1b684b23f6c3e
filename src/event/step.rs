//! Homogeneous batches of chunk operations and the address algebra over them.
//!
//! A [`Step`] keeps its chunks grouped by parent address, each group a sorted
//! list of disjoint, non-abutting runs. Insert steps store their runs in the
//! coordinates of the state after the step, delete steps in the coordinates
//! of the state before it. In both cases a run's key and start are stable
//! under the canonical replay order, so the stored chunks double as the
//! operating chunks of a replay.
//!
//! Chunks are numbered by ordinal in ascending `(parent, start)` order. Inserts
//! replay by ascending ordinal and deletes by descending ordinal; every
//! mapping accepts an ordinal window so a partial replay can be addressed.

use crate::address::{Address, Chunk, cleanup_chunk_set};
use std::collections::BTreeMap;
use std::ops::{Bound, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Insert,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    len: usize,
}

impl Span {
    fn end(&self) -> usize {
        self.start + self.len
    }

    fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    kind: StepKind,
    chunks: BTreeMap<Address, Vec<Span>>,
    chunk_count: usize,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Step {
            kind,
            chunks: BTreeMap::new(),
            chunk_count: 0,
        }
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }

    /// Chunks in ordinal order.
    pub fn chunks(&self) -> impl DoubleEndedIterator<Item = Chunk> + '_ {
        self.chunks.iter().flat_map(|(parent, spans)| {
            spans
                .iter()
                .map(move |span| Chunk::new(parent.child(span.start), span.len))
        })
    }

    /// Chunks in the order a sequential apply must follow.
    pub fn replay_order(&self) -> Box<dyn Iterator<Item = Chunk> + '_> {
        match self.kind {
            StepKind::Insert => Box::new(self.chunks()),
            StepKind::Delete => Box::new(self.chunks().rev()),
        }
    }

    /// Parent addresses with recorded chunks, in the step's own coordinates.
    pub fn parents(&self) -> impl Iterator<Item = &Address> + '_ {
        self.chunks.keys()
    }

    /// Signed change in the child count of `parent`, keyed in the step's own
    /// coordinates.
    pub fn child_count_delta(&self, parent: &Address) -> isize {
        let total: usize = self
            .chunks
            .get(parent)
            .map(|spans| spans.iter().map(|span| span.len).sum())
            .unwrap_or(0);
        let total = isize::try_from(total).unwrap_or(isize::MAX);
        match self.kind {
            StepKind::Insert => total,
            StepKind::Delete => -total,
        }
    }

    /// Record `chunk`, given in the coordinates of the state after every chunk
    /// already recorded in this step.
    pub fn add_chunk(&mut self, chunk: &Chunk) {
        match self.kind {
            StepKind::Insert => self.add_insert(chunk),
            StepKind::Delete => self.add_delete(chunk),
        }
    }

    /// Record several chunks that all share one coordinate system: the state
    /// after the batch for inserts, the state before it for deletes.
    ///
    /// Inserted runs nested beneath other inserted runs are kept; removed
    /// runs beneath another removed run are dropped.
    pub fn add_batch(&mut self, chunks: impl IntoIterator<Item = Chunk>) {
        match self.kind {
            StepKind::Insert => cleanup_chunk_set(chunks, false)
                .iter()
                .for_each(|chunk| self.add_chunk(chunk)),
            StepKind::Delete => cleanup_chunk_set(chunks, true)
                .iter()
                .rev()
                .for_each(|chunk| self.add_chunk(chunk)),
        }
    }

    fn add_insert(&mut self, chunk: &Chunk) {
        let parent = chunk.parent();
        self.rebase(&parent, chunk.start(), chunk.len());
        self.merge(
            parent,
            Span {
                start: chunk.start(),
                len: chunk.len(),
            },
        );
    }

    fn add_delete(&mut self, chunk: &Chunk) {
        let parent = self.map_additive(chunk.parent().indices(), &(0..self.chunk_count));
        let (first, last) = {
            let spans = self.chunks.get(&parent).map(Vec::as_slice).unwrap_or(&[]);
            (
                shift_up(spans, chunk.start()),
                shift_up(spans, chunk.end() - 1),
            )
        };
        let span = Span {
            start: first,
            len: last - first + 1,
        };

        if self.inside_recorded(parent.indices()) {
            return;
        }
        let covered: Vec<Address> = self
            .chunks
            .range(parent.child(span.start)..)
            .map(|(key, _)| key)
            .take_while(|key| {
                key.is_descendant_of(&parent)
                    && key.index_at(parent.depth()).is_some_and(|i| i < span.end())
            })
            .cloned()
            .collect();
        for key in covered {
            if let Some(spans) = self.chunks.remove(&key) {
                self.chunk_count -= spans.len();
            }
        }
        self.merge(parent, span);
    }

    /// True when `address` is, or lies beneath, a node covered by this step.
    fn inside_recorded(&self, address: &[usize]) -> bool {
        (0..address.len()).any(|depth| {
            self.chunks
                .get(&address[..depth])
                .is_some_and(|spans| spans.iter().any(|span| span.contains(address[depth])))
        })
    }

    /// Shift every recorded position at or after `parent.child(at)` up by `by`.
    fn rebase(&mut self, parent: &Address, at: usize, by: usize) {
        let depth = parent.depth();
        let moved: Vec<Address> = self
            .chunks
            .range(parent.child(at)..)
            .map(|(key, _)| key)
            .take_while(|key| key.is_descendant_of(parent))
            .cloned()
            .collect();
        let moved: Vec<(Address, Vec<Span>)> = moved
            .into_iter()
            .filter_map(|key| self.chunks.remove_entry(&key))
            .collect();
        for (key, spans) in moved {
            let mut indices = key.into_indices();
            indices[depth] += by;
            self.chunks.insert(Address::from(indices), spans);
        }

        if let Some(spans) = self.chunks.get_mut(parent) {
            for span in spans.iter_mut() {
                if span.start >= at {
                    span.start += by;
                } else if span.end() > at {
                    span.len += by;
                }
            }
        }
    }

    /// Merge `span` into the runs under `parent`.
    ///
    /// A span bridging a lower and an upper neighbour extends the lower one,
    /// which absorbs the upper entry. A span touching only an upper neighbour
    /// takes that entry over at the new start.
    fn merge(&mut self, parent: Address, span: Span) {
        let spans = self.chunks.entry(parent).or_default();
        let lo = spans.partition_point(|s| s.end() < span.start);
        let hi = spans.partition_point(|s| s.start <= span.end());
        if lo == hi {
            spans.insert(lo, span);
            self.chunk_count += 1;
            return;
        }
        let start = spans[lo].start.min(span.start);
        let end = spans[hi - 1].end().max(span.end());
        spans[lo] = Span {
            start,
            len: end - start,
        };
        spans.drain(lo + 1..hi);
        self.chunk_count -= hi - lo - 1;
    }

    fn is_additive(&self, direction: Direction) -> bool {
        matches!(
            (self.kind, direction),
            (StepKind::Insert, Direction::Forward) | (StepKind::Delete, Direction::Backward)
        )
    }

    /// Map `address` through the chunks whose ordinal lies in `range`.
    pub fn map_address(
        &self,
        address: &Address,
        direction: Direction,
        range: Range<usize>,
    ) -> Option<Address> {
        if self.is_additive(direction) {
            Some(self.map_additive(address.indices(), &range))
        } else {
            self.map_subtractive(address.indices(), &range)
        }
    }

    /// Map a whole chunk through the chunks whose ordinal lies in `range`.
    ///
    /// An interior insertion splits the run; interior deletions shrink it.
    pub fn map_chunk(&self, chunk: &Chunk, direction: Direction, range: Range<usize>) -> Vec<Chunk> {
        self.map_chunk_in(chunk, self.is_additive(direction), &range)
    }

    pub fn map_forward(&self, address: &Address) -> Option<Address> {
        self.map_address(address, Direction::Forward, 0..self.chunk_count)
    }

    pub fn map_backward(&self, address: &Address) -> Option<Address> {
        self.map_address(address, Direction::Backward, 0..self.chunk_count)
    }

    /// Ordinal window and direction moving from replay position `from` to
    /// `to`, where position `k` means the first `k` chunks of the replay
    /// have been applied.
    fn window_between(&self, from: usize, to: usize) -> (Range<usize>, bool) {
        let n = self.chunk_count;
        match self.kind {
            StepKind::Insert if from <= to => (from..to, true),
            StepKind::Insert => (to..from, false),
            StepKind::Delete if from <= to => (n - to..n - from, false),
            StepKind::Delete => (n - from..n - to, true),
        }
    }

    /// Map an address between two replay positions of this step.
    pub(crate) fn map_between(&self, address: &Address, from: usize, to: usize) -> Option<Address> {
        if from == to {
            return Some(address.clone());
        }
        let (range, additive) = self.window_between(from, to);
        if additive {
            Some(self.map_additive(address.indices(), &range))
        } else {
            self.map_subtractive(address.indices(), &range)
        }
    }

    pub(crate) fn map_chunk_between(&self, chunk: &Chunk, from: usize, to: usize) -> Vec<Chunk> {
        if from == to {
            return vec![chunk.clone()];
        }
        let (range, additive) = self.window_between(from, to);
        self.map_chunk_in(chunk, additive, &range)
    }

    /// Runs under `key` whose ordinals fall inside `range`.
    fn window(&self, key: &[usize], range: &Range<usize>) -> &[Span] {
        let Some(spans) = self.chunks.get(key) else {
            return &[];
        };
        if range.start == 0 && range.end >= self.chunk_count {
            return spans;
        }
        let offset: usize = self
            .chunks
            .range::<[usize], _>((Bound::Unbounded, Bound::Excluded(key)))
            .map(|(_, spans)| spans.len())
            .sum();
        let lo = range.start.saturating_sub(offset).min(spans.len());
        let hi = range.end.saturating_sub(offset).min(spans.len()).max(lo);
        &spans[lo..hi]
    }

    fn map_additive(&self, address: &[usize], range: &Range<usize>) -> Address {
        let mut mapped = Vec::with_capacity(address.len());
        for &index in address {
            let spans = self.window(&mapped, range);
            mapped.push(shift_up(spans, index));
        }
        Address::from(mapped)
    }

    fn map_subtractive(&self, address: &[usize], range: &Range<usize>) -> Option<Address> {
        let mut mapped = Vec::with_capacity(address.len());
        for (depth, &index) in address.iter().enumerate() {
            let spans = self.window(&address[..depth], range);
            mapped.push(shift_down(spans, index)?);
        }
        Some(Address::from(mapped))
    }

    fn map_chunk_in(&self, chunk: &Chunk, additive: bool, range: &Range<usize>) -> Vec<Chunk> {
        let source = chunk.parent();
        if additive {
            let parent = self.map_additive(source.indices(), range);
            split_run(self.window(parent.indices(), range), chunk.start(), chunk.len())
                .into_iter()
                .map(|span| Chunk::new(parent.child(span.start), span.len))
                .collect()
        } else {
            let Some(parent) = self.map_subtractive(source.indices(), range) else {
                return Vec::new();
            };
            squeeze_run(self.window(source.indices(), range), chunk.start(), chunk.len())
                .map(|span| Chunk::new(parent.child(span.start), span.len))
                .into_iter()
                .collect()
        }
    }
}

/// Position of `index` once every run starting at or before it is inserted.
fn shift_up(spans: &[Span], mut index: usize) -> usize {
    for span in spans {
        if span.start <= index {
            index += span.len;
        } else {
            break;
        }
    }
    index
}

/// Position of `index` once the runs are removed, or `None` if a run covers it.
fn shift_down(spans: &[Span], index: usize) -> Option<usize> {
    let mut removed = 0;
    for span in spans {
        if span.end() <= index {
            removed += span.len;
        } else if span.start <= index {
            return None;
        } else {
            break;
        }
    }
    Some(index - removed)
}

/// Split `start..start + len` into the pieces left between inserted runs.
fn split_run(spans: &[Span], start: usize, len: usize) -> Vec<Span> {
    let end = start + len;
    let mut pieces = Vec::new();
    let mut shift = 0;
    let mut rest = spans.iter().peekable();
    let mut index = start;
    while index < end {
        while let Some(span) = rest.next_if(|span| span.start <= index + shift) {
            shift += span.len;
        }
        let stop = match rest.peek() {
            Some(span) => end.min(span.start - shift),
            None => end,
        };
        pieces.push(Span {
            start: index + shift,
            len: stop - index,
        });
        index = stop;
    }
    pieces
}

/// The part of `start..start + len` surviving the removal of `spans`, which
/// always closes up into one run.
fn squeeze_run(spans: &[Span], start: usize, len: usize) -> Option<Span> {
    let end = start + len;
    let removed_inside: usize = spans
        .iter()
        .map(|span| span.end().min(end).saturating_sub(span.start.max(start)))
        .sum();
    let survivors = len - removed_inside;
    if survivors == 0 {
        return None;
    }
    let first = spans
        .iter()
        .find(|span| span.contains(start))
        .map_or(start, Span::end);
    let removed_before: usize = spans
        .iter()
        .filter(|span| span.end() <= first)
        .map(|span| span.len)
        .sum();
    Some(Span {
        start: first - removed_before,
        len: survivors,
    })
}
