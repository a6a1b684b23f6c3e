//! Structural change log and address remapping for ordered trees.
//!
//! An [`Observer`] attached to a tree records insertions and removals of
//! child runs into [`Event`]s. Events map node [`Address`]es between the
//! states before and after them, can be replayed chunk by chunk, and keep
//! [`NodeRef`]s and [`ObservedState`]s in step with the tree.

pub mod address;
pub mod config;
pub mod error;
pub mod event;
pub mod observer;
pub mod tree;

pub use address::{Address, Chunk};
pub use config::ObserverSettings;
pub use error::{ObserverError, ObserverResult};
pub use event::{Event, EventBuilder, StagingHandle, StepKind};
pub use observer::{NodeRef, ObservedState, Observer, ReadGuard, StructureAccess, WriteGuard};
pub use tree::{ArenaTree, TreeId, TreeMut, TreeNodes};
