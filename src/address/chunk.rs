//! Runs of contiguous siblings.

use super::Address;
use std::collections::BTreeMap;
use std::fmt;

/// `length` contiguous siblings starting at `address`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    address: Address,
    length: usize,
}

impl Chunk {
    /// # Panics
    ///
    /// Panics when `address` is the root or `length` is zero. Neither
    /// describes a run of siblings.
    pub fn new(address: Address, length: usize) -> Self {
        assert!(!address.is_root(), "a chunk cannot start at the root address");
        assert!(length > 0, "a chunk must cover at least one node");
        Chunk { address, length }
    }

    /// Chunk of a single node.
    pub fn single(address: Address) -> Self {
        Chunk::new(address, 1)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn len(&self) -> usize {
        self.length
    }

    /// Always false: a chunk covers at least one node.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn parent(&self) -> Address {
        self.address.parent().unwrap_or_default()
    }

    /// Index of the first sibling.
    pub fn start(&self) -> usize {
        self.address.last_index().unwrap_or_default()
    }

    /// Index one past the last sibling.
    pub fn end(&self) -> usize {
        self.start() + self.length
    }

    /// True when `address` is one of the chunk's siblings or lies beneath one.
    pub fn covers_address(&self, address: &Address) -> bool {
        let depth = self.address.depth();
        if address.depth() < depth {
            return false;
        }
        let parent = &self.address.indices()[..depth - 1];
        if !address.indices().starts_with(parent) {
            return false;
        }
        let index = address.indices()[depth - 1];
        self.start() <= index && index < self.end()
    }

    /// Addresses of the chunk's siblings, in order.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        (self.start()..self.end()).map(move |index| self.address.with_last_index(index))
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk({} x{})", self.address, self.length)
    }
}

/// Normalize a set of chunks into sorted, disjoint, maximal runs.
///
/// Overlapping or abutting siblings merge. With `elide_descendants`, chunks
/// lying beneath a node covered by another chunk of the set are dropped.
pub fn cleanup_chunk_set(
    chunks: impl IntoIterator<Item = Chunk>,
    elide_descendants: bool,
) -> Vec<Chunk> {
    let mut by_parent: BTreeMap<Address, Vec<(usize, usize)>> = BTreeMap::new();
    for chunk in chunks {
        by_parent
            .entry(chunk.parent())
            .or_default()
            .push((chunk.start(), chunk.end()));
    }

    let mut merged = Vec::new();
    for (parent, mut runs) in by_parent {
        runs.sort_unstable();
        let mut current: Option<(usize, usize)> = None;
        for (start, end) in runs {
            current = match current {
                Some((s, e)) if start <= e => Some((s, e.max(end))),
                Some((s, e)) => {
                    merged.push(Chunk::new(parent.child(s), e - s));
                    Some((start, end))
                }
                None => Some((start, end)),
            };
        }
        if let Some((s, e)) = current {
            merged.push(Chunk::new(parent.child(s), e - s));
        }
    }
    merged.sort();

    if !elide_descendants {
        return merged;
    }
    // What a chunk covers is one contiguous range of the address order, and
    // kept chunks never overlap, so only the last kept one can cover the next.
    let mut kept: Vec<Chunk> = Vec::with_capacity(merged.len());
    for chunk in merged {
        if !kept.last().is_some_and(|k| k.covers_address(&chunk.address)) {
            kept.push(chunk);
        }
    }
    kept
}

/// Group addresses into maximal runs of contiguous siblings.
///
/// The root address is not a sibling of anything and is skipped.
pub fn chunkify_addresses<'a>(addresses: impl IntoIterator<Item = &'a Address>) -> Vec<Chunk> {
    cleanup_chunk_set(
        addresses
            .into_iter()
            .filter(|address| !address.is_root())
            .map(|address| Chunk::single(address.clone())),
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn chunk(indices: &[usize], length: usize) -> Chunk {
        Chunk::new(Address::from(indices), length)
    }

    #[test]
    #[should_panic(expected = "root address")]
    fn test_root_chunk_panics() {
        Chunk::new(Address::root(), 1);
    }

    #[test]
    #[should_panic(expected = "at least one node")]
    fn test_empty_chunk_panics() {
        Chunk::new(Address::from([0]), 0);
    }

    #[rstest]
    #[case::first(vec![1, 2], true)]
    #[case::last(vec![1, 4], true)]
    #[case::descendant(vec![1, 3, 0, 9], true)]
    #[case::before(vec![1, 1], false)]
    #[case::after(vec![1, 5], false)]
    #[case::parent(vec![1], false)]
    #[case::cousin(vec![2, 3], false)]
    fn test_covers_address(#[case] address: Vec<usize>, #[case] expected: bool) {
        let run = chunk(&[1, 2], 3);
        assert_eq!(run.covers_address(&Address::from(address)), expected);
    }

    #[test]
    fn test_addresses() {
        let addresses: Vec<_> = chunk(&[4, 1], 3).addresses().collect();
        assert_eq!(
            addresses,
            vec![
                Address::from([4, 1]),
                Address::from([4, 2]),
                Address::from([4, 3])
            ]
        );
    }

    #[test]
    fn test_cleanup_merges_abutting_and_overlapping() {
        let cleaned = cleanup_chunk_set(
            vec![chunk(&[5], 2), chunk(&[0], 2), chunk(&[2], 1), chunk(&[6], 3)],
            false,
        );
        assert_eq!(cleaned, vec![chunk(&[0], 3), chunk(&[5], 4)]);
    }

    #[test]
    fn test_cleanup_elides_descendants_only_when_asked() {
        let input = vec![chunk(&[1], 2), chunk(&[2, 0], 1), chunk(&[3, 0], 1)];
        assert_eq!(
            cleanup_chunk_set(input.clone(), true),
            vec![chunk(&[1], 2), chunk(&[3, 0], 1)]
        );
        assert_eq!(cleanup_chunk_set(input, false).len(), 3);
    }

    #[test]
    fn test_cleanup_elides_deep_and_merged_descendants() {
        let input = vec![
            chunk(&[3, 1], 1),
            chunk(&[0, 3, 1], 1),
            chunk(&[1, 2, 0], 1),
            chunk(&[0], 1),
            chunk(&[4], 1),
            chunk(&[0, 3], 1),
            chunk(&[2], 2),
            chunk(&[1, 2], 1),
        ];
        assert_eq!(
            cleanup_chunk_set(input, true),
            vec![chunk(&[0], 1), chunk(&[1, 2], 1), chunk(&[2], 3)]
        );
    }

    #[test]
    fn test_cleanup_elision_scales_with_many_chunks() {
        // Every top-level node is its own chunk with a child chunk beneath.
        let input = (0..10_000)
            .flat_map(|i| [chunk(&[i * 2], 1), chunk(&[i * 2, 0], 3)])
            .collect::<Vec<_>>();
        let cleaned = cleanup_chunk_set(input, true);
        assert_eq!(cleaned.len(), 10_000);
        assert!(cleaned.iter().all(|c| c.address().depth() == 1));
    }

    #[test]
    fn test_chunkify_addresses() {
        let addresses = [
            Address::from([0]),
            Address::from([2, 1]),
            Address::from([1]),
            Address::from([2, 2]),
            Address::root(),
            Address::from([4]),
        ];
        assert_eq!(
            chunkify_addresses(&addresses),
            vec![chunk(&[0], 2), chunk(&[2, 1], 2), chunk(&[4], 1)]
        );
    }
}
