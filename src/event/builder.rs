use super::Event;
use super::step::{Step, StepKind};
use crate::address::Chunk;

/// Accumulates chunk operations into an [`Event`].
///
/// Consecutive operations of the same kind land in the same step. Each
/// sequential operation is positioned in the state left by every operation
/// recorded before it.
#[derive(Debug, Clone, Default)]
pub struct EventBuilder {
    steps: Vec<Step>,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(Step::is_empty)
    }

    pub fn chunk_count(&self) -> usize {
        self.steps.iter().map(Step::chunk_count).sum()
    }

    /// Record `chunk` as newly inserted nodes.
    pub fn insert_chunk(&mut self, chunk: &Chunk) {
        self.step_mut(StepKind::Insert).add_chunk(chunk);
    }

    /// Record `chunk` as removed nodes.
    pub fn remove_chunk(&mut self, chunk: &Chunk) {
        self.step_mut(StepKind::Delete).add_chunk(chunk);
    }

    /// Record several insertions at once, all addressed in the state after
    /// the whole batch.
    pub fn insert_chunks(&mut self, chunks: impl IntoIterator<Item = Chunk>) {
        self.step_mut(StepKind::Insert).add_batch(chunks);
    }

    /// Record several removals at once, all addressed in the state before the
    /// whole batch.
    pub fn remove_chunks(&mut self, chunks: impl IntoIterator<Item = Chunk>) {
        self.step_mut(StepKind::Delete).add_batch(chunks);
    }

    pub fn build(mut self) -> Event {
        self.steps.retain(|step| !step.is_empty());
        Event::from_steps(self.steps)
    }

    fn step_mut(&mut self, kind: StepKind) -> &mut Step {
        if self.steps.last().is_some_and(Step::is_empty) {
            self.steps.pop();
        }
        if self.steps.last().is_none_or(|step| step.kind() != kind) {
            self.steps.push(Step::new(kind));
        }
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }
}
