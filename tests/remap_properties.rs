//! Property tests: random edit sequences against an arena tree whose values
//! are unique ids, so every node's before and after address is known.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeMap, BTreeSet};
use treeshift::tree::NodeId;
use treeshift::{
    Address, ArenaTree, Chunk, EventBuilder, Observer, StagingHandle, StepKind, TreeMut, TreeNodes,
};

type Tree = ArenaTree<usize>;

#[derive(Debug, Clone)]
struct Edit {
    insert: bool,
    parent: usize,
    position: usize,
    count: usize,
    close_recording: bool,
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    (any::<bool>(), 0usize..1000, 0usize..1000, 1usize..=3, any::<bool>()).prop_map(
        |(insert, parent, position, count, close_recording)| Edit {
            insert,
            parent,
            position,
            count,
            close_recording,
        },
    )
}

/// Root with three children, each with two children of their own.
fn initial_tree(next_id: &mut usize) -> Tree {
    let mut tree = ArenaTree::new(usize::MAX);
    let root = tree.root();
    let top = tree.insert_children(root, 0, fresh_ids(next_id, 3));
    for node in top {
        tree.insert_children(node, 0, fresh_ids(next_id, 2));
    }
    tree
}

fn fresh_ids(next_id: &mut usize, count: usize) -> Vec<usize> {
    let ids = (*next_id..*next_id + count).collect();
    *next_id += count;
    ids
}

fn live_nodes(tree: &Tree) -> Vec<NodeId> {
    let mut nodes = vec![tree.root()];
    let mut index = 0;
    while index < nodes.len() {
        nodes.extend_from_slice(tree.children(nodes[index]));
        index += 1;
    }
    nodes
}

fn addresses_by_id(tree: &Tree) -> BTreeMap<usize, Address> {
    live_nodes(tree)
        .into_iter()
        .skip(1)
        .filter_map(|node| Some((*tree.value(node)?, tree.address(node)?)))
        .collect()
}

/// Apply one edit through the guard; the recording must be open.
fn apply(guard: &mut treeshift::WriteGuard<'_>, tree: &mut Tree, edit: &Edit, next_id: &mut usize) {
    let nodes = live_nodes(tree);
    let parent = nodes[edit.parent % nodes.len()];
    let child_count = tree.child_count(parent);
    if edit.insert || child_count == 0 {
        let index = edit.position % (child_count + 1);
        let values = fresh_ids(next_id, edit.count);
        guard.insert_nodes(tree, parent, index, values);
    } else {
        let start = edit.position % child_count;
        let count = edit.count.min(child_count - start);
        guard.remove_nodes(tree, parent, start, count);
    }
}

/// Ids given to mirror nodes that the event inserts and later removes again.
const TRANSIENT_IDS: usize = 1_000_000;

/// Compare the four staging mappings at the current replay position against
/// the id layout of the start state, the current state and the end state.
fn check_position(
    staging: &StagingHandle<'_>,
    start: &BTreeMap<usize, Address>,
    current: &BTreeMap<usize, Address>,
    end: &BTreeMap<usize, Address>,
) -> Result<(), TestCaseError> {
    let progress = staging.progress();
    for (id, address) in start {
        prop_assert_eq!(
            staging.map_start_to_current(address),
            current.get(id).cloned(),
            "start node {} from {} at position {}", id, address, progress
        );
    }
    for (id, address) in current {
        prop_assert_eq!(
            staging.map_current_to_start(address),
            start.get(id).cloned(),
            "node {} at {} back to start from position {}", id, address, progress
        );
        prop_assert_eq!(
            staging.map_current_to_end(address),
            end.get(id).cloned(),
            "node {} at {} to end from position {}", id, address, progress
        );
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn event_maps_every_node_to_where_it_went(edits in prop::collection::vec(arb_edit(), 1..24)) {
        let mut next_id = 0;
        let mut tree = initial_tree(&mut next_id);
        let before = addresses_by_id(&tree);
        let observer = Observer::for_tree(&tree);

        let mut guard = observer.write().expect("uncontended");
        guard.start_recording();
        for edit in &edits {
            apply(&mut guard, &mut tree, edit, &mut next_id);
        }
        let event = guard.finish_recording();
        drop(guard);
        let after = addresses_by_id(&tree);

        for (id, address) in &before {
            let expected = after.get(id).cloned();
            prop_assert_eq!(event.map_forward(address), expected.clone(), "node {} from {}", id, address);
            if let Some(now) = expected {
                prop_assert_eq!(event.map_backward(&now), Some(address.clone()));
            } else {
                prop_assert!(event.is_deleted(address));
            }
        }
        for (id, address) in &after {
            prop_assert_eq!(event.was_added(address), !before.contains_key(id), "node {} at {}", id, address);
        }

        let delta: isize = event.child_count_delta(&Address::root());
        let root_before = before.values().filter(|a| a.depth() == 1).count() as isize;
        let root_after = after.values().filter(|a| a.depth() == 1).count() as isize;
        prop_assert_eq!(delta, root_after - root_before);
    }

    #[test]
    fn states_and_refs_follow_nodes_across_events(edits in prop::collection::vec(arb_edit(), 1..24)) {
        let mut next_id = 0;
        let mut tree = initial_tree(&mut next_id);
        let before = addresses_by_id(&tree);
        let observer = Observer::for_tree(&tree);

        let (state, refs) = {
            let guard = observer.read().expect("uncontended");
            let refs: Vec<_> = live_nodes(&tree)
                .into_iter()
                .skip(1)
                .map(|node| observer.node_ref(&guard, &tree, node))
                .collect();
            (observer.observe(&guard), refs)
        };

        let mut guard = observer.write().expect("uncontended");
        guard.start_recording();
        for edit in &edits {
            apply(&mut guard, &mut tree, edit, &mut next_id);
            if edit.close_recording {
                guard.finish_recording();
                guard.start_recording();
            }
        }
        guard.finish_recording();
        drop(guard);
        let after = addresses_by_id(&tree);

        let guard = observer.read().expect("uncontended");
        for (id, address) in &before {
            let expected = after.get(id).cloned();
            prop_assert_eq!(state.map_to_current(&guard, address), expected.clone());
            if let Some(now) = expected {
                prop_assert_eq!(state.map_from_current(&guard, &now), Some(address.clone()));
            }
        }
        for node_ref in &refs {
            let id = node_ref.get().and_then(|node| tree.value(node).copied());
            match node_ref.address() {
                Some(address) => {
                    let id = id.expect("a valid ref resolves to a live node");
                    prop_assert_eq!(after.get(&id), Some(&address));
                }
                None => prop_assert!(!node_ref.is_valid()),
            }
        }
        let survivors = before.keys().filter(|id| after.contains_key(id)).count();
        prop_assert_eq!(refs.iter().filter(|r| r.is_valid()).count(), survivors);
    }

    #[test]
    fn sequential_inserts_converge_in_any_order(
        (positions, order) in prop::collection::btree_set(0usize..24, 1..12).prop_flat_map(|set| {
            let ordered: Vec<usize> = set.iter().copied().collect();
            (Just(set), Just(ordered).prop_shuffle())
        })
    ) {
        let mut sequential = EventBuilder::new();
        let mut pending: BTreeSet<usize> = positions.clone();
        for position in order {
            pending.remove(&position);
            let lower_pending = pending.range(..position).count();
            sequential.insert_chunk(&Chunk::single(Address::from([position - lower_pending])));
        }

        let mut batch = EventBuilder::new();
        batch.insert_chunks(positions.iter().map(|&p| Chunk::single(Address::from([p]))));

        let expected = treeshift::address::chunkify_addresses(
            positions.iter().map(|&p| Address::from([p])).collect::<Vec<_>>().iter(),
        );
        let sequential = sequential.build();
        prop_assert_eq!(sequential.chunks_added(), expected);
        prop_assert_eq!(sequential, batch.build());
    }

    #[test]
    fn sequential_removals_converge_in_any_order(
        (positions, order) in prop::collection::btree_set(0usize..24, 1..12).prop_flat_map(|set| {
            let ordered: Vec<usize> = set.iter().copied().collect();
            (Just(set), Just(ordered).prop_shuffle())
        })
    ) {
        let mut sequential = EventBuilder::new();
        let mut removed = BTreeSet::new();
        for position in order {
            let lower_removed = removed.range(..position).count();
            sequential.remove_chunk(&Chunk::single(Address::from([position - lower_removed])));
            removed.insert(position);
        }

        let mut batch = EventBuilder::new();
        batch.remove_chunks(positions.iter().map(|&p| Chunk::single(Address::from([p]))));

        let sequential = sequential.build();
        prop_assert_eq!(sequential.chunks_removed().iter().map(Chunk::len).sum::<usize>(), positions.len());
        prop_assert_eq!(sequential, batch.build());
    }

    #[test]
    fn replay_rebuilds_the_tree_one_chunk_at_a_time(edits in prop::collection::vec(arb_edit(), 1..24)) {
        let mut next_id = 0;
        let mut tree = initial_tree(&mut next_id);
        let mut mirror_ids = 0;
        let mut mirror = initial_tree(&mut mirror_ids);
        let start = addresses_by_id(&tree);
        let observer = Observer::for_tree(&tree);

        let mut guard = observer.write().expect("uncontended");
        guard.start_recording();
        for edit in &edits {
            apply(&mut guard, &mut tree, edit, &mut next_id);
        }
        let event = guard.finish_recording();
        drop(guard);
        let end = addresses_by_id(&tree);

        let total = event.chunk_count();
        prop_assert_eq!(event.replay().count(), total);
        let mut transient = TRANSIENT_IDS;
        let mut staging = observer.staging(&event);
        while let (Some(kind), Some(chunk)) = (staging.operation(), staging.operating_chunk().cloned()) {
            let current = addresses_by_id(&mirror);
            check_position(&staging, &start, &current, &end)?;

            let parent = mirror.node_at(&chunk.parent());
            prop_assert!(parent.is_some(), "{:?} has no parent at position {}", chunk, staging.progress());
            let parent = parent.expect("checked above");
            let child_count = mirror.child_count(parent);
            match kind {
                StepKind::Insert => {
                    prop_assert!(chunk.start() <= child_count, "{:?} past {} children", chunk, child_count);
                    let after = staging.progress() + 1;
                    let mut values = Vec::with_capacity(chunk.len());
                    for address in chunk.addresses() {
                        let id = event
                            .map_between(&address, after, total)
                            .and_then(|end_address| tree.node_at(&end_address))
                            .and_then(|node| tree.value(node).copied());
                        values.push(id.unwrap_or_else(|| {
                            transient += 1;
                            transient
                        }));
                    }
                    mirror.insert_children(parent, chunk.start(), values);
                }
                StepKind::Delete => {
                    prop_assert!(chunk.end() <= child_count, "{:?} past {} children", chunk, child_count);
                    mirror.remove_children(parent, chunk.start(), chunk.len());
                }
            }

            let after = addresses_by_id(&mirror);
            for (id, address) in &end {
                prop_assert_eq!(
                    staging.map_end_to_after(address),
                    after.get(id).cloned(),
                    "end node {} at {} after position {}", id, address, staging.progress()
                );
            }
            staging.advance();
        }

        prop_assert_eq!(staging.progress(), total);
        let current = addresses_by_id(&mirror);
        check_position(&staging, &start, &current, &end)?;
        prop_assert_eq!(current, end);
    }
}
