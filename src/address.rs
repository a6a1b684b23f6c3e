//! Tree addresses and runs of sibling nodes.
//!
//! An [`Address`] is the path of child indices leading from the root to a
//! node. Addresses order lexicographically, and a prefix sorts before every
//! address extending it, so a parent always precedes its descendants.

mod chunk;

pub use chunk::{Chunk, chunkify_addresses, cleanup_chunk_set};

use std::borrow::Borrow;
use std::fmt;

/// Path of child indices from the root. The empty path is the root itself.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(Vec<usize>);

impl Address {
    /// The root address.
    pub fn root() -> Self {
        Address(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of indices in the path. The root has depth 0.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn into_indices(self) -> Vec<usize> {
        self.0
    }

    /// Index taken at `depth`, i.e. the position of this address's ancestor
    /// at depth `depth + 1` among its siblings.
    pub fn index_at(&self, depth: usize) -> Option<usize> {
        self.0.get(depth).copied()
    }

    /// Address of the parent node, or `None` for the root.
    pub fn parent(&self) -> Option<Address> {
        let (_, init) = self.0.split_last()?;
        Some(Address(init.to_vec()))
    }

    /// Position of this node among its siblings, or `None` for the root.
    pub fn last_index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Address of this node's `index`-th child.
    pub fn child(&self, index: usize) -> Address {
        let mut indices = Vec::with_capacity(self.0.len() + 1);
        indices.extend_from_slice(&self.0);
        indices.push(index);
        Address(indices)
    }

    /// This address followed by every index of `tail`.
    pub fn join(&self, tail: &Address) -> Address {
        let mut indices = self.0.clone();
        indices.extend_from_slice(&tail.0);
        Address(indices)
    }

    /// Same address with its last index replaced.
    ///
    /// # Panics
    ///
    /// Panics on the root, which has no last index.
    pub fn with_last_index(&self, index: usize) -> Address {
        assert!(!self.is_root(), "the root address has no last index");
        let mut indices = self.0.clone();
        let last = indices.len() - 1;
        indices[last] = index;
        Address(indices)
    }

    /// True when `other` lies strictly beneath this address.
    pub fn is_ancestor_of(&self, other: &Address) -> bool {
        other.is_descendant_of(self)
    }

    /// True when this address lies strictly beneath `other`.
    pub fn is_descendant_of(&self, other: &Address) -> bool {
        self.0.len() > other.0.len() && self.0.starts_with(&other.0)
    }

    /// Depth of the deepest address that is an ancestor of both.
    pub fn common_ancestor_depth(&self, other: &Address) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// The deepest address that is an ancestor of both.
    pub fn common_ancestor(&self, other: &Address) -> Address {
        Address(self.0[..self.common_ancestor_depth(other)].to_vec())
    }
}

impl Borrow<[usize]> for Address {
    fn borrow(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Address {
    fn from(indices: Vec<usize>) -> Self {
        Address(indices)
    }
}

impl From<&[usize]> for Address {
    fn from(indices: &[usize]) -> Self {
        Address(indices.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Address {
    fn from(indices: [usize; N]) -> Self {
        Address(indices.to_vec())
    }
}

impl FromIterator<usize> for Address {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Address(iter.into_iter().collect())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("{ }");
        }
        f.write_str("{ ")?;
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}")?;
        }
        f.write_str(" }")
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_root_has_no_parent_or_index() {
        let root = Address::root();
        assert!(root.is_root());
        assert_eq!(root.depth(), 0);
        assert_eq!(root.parent(), None);
        assert_eq!(root.last_index(), None);
    }

    #[test]
    fn test_child_and_parent_roundtrip() {
        let address = Address::from([2, 0, 5]);
        assert_eq!(address.parent(), Some(Address::from([2, 0])));
        assert_eq!(address.last_index(), Some(5));
        assert_eq!(Address::from([2, 0]).child(5), address);
        assert_eq!(address.index_at(1), Some(0));
        assert_eq!(address.index_at(3), None);
    }

    #[rstest]
    #[case::prefix_first(vec![1], vec![1, 0])]
    #[case::first_difference(vec![0, 9], vec![1])]
    #[case::sibling(vec![3, 1], vec![3, 2])]
    #[case::root_first(vec![], vec![0])]
    fn test_ordering(#[case] lower: Vec<usize>, #[case] upper: Vec<usize>) {
        assert!(Address::from(lower) < Address::from(upper));
    }

    #[rstest]
    #[case::itself(vec![1, 2], vec![1, 2], false)]
    #[case::root_itself(vec![], vec![], false)]
    #[case::child(vec![1], vec![1, 4], true)]
    #[case::root(vec![], vec![7, 7], true)]
    #[case::sibling(vec![1], vec![2], false)]
    #[case::descendant(vec![1, 4], vec![1], false)]
    fn test_is_ancestor_of(
        #[case] ancestor: Vec<usize>,
        #[case] other: Vec<usize>,
        #[case] expected: bool,
    ) {
        assert_eq!(
            Address::from(ancestor).is_ancestor_of(&Address::from(other)),
            expected
        );
    }

    #[test]
    fn test_is_descendant_of_is_strict() {
        let a = Address::from([1, 2]);
        assert!(a.is_descendant_of(&Address::from([1])));
        assert!(!a.is_descendant_of(&a));
    }

    #[test]
    fn test_ancestor_and_descendant_agree() {
        let addresses = [
            Address::root(),
            Address::from([0]),
            Address::from([1]),
            Address::from([1, 0]),
            Address::from([1, 0, 2]),
            Address::from([2, 0]),
        ];
        for a in &addresses {
            for b in &addresses {
                assert_eq!(a.is_ancestor_of(b), b.is_descendant_of(a), "{a} and {b}");
            }
        }
    }

    #[test]
    fn test_common_ancestor() {
        let a = Address::from([1, 2, 3]);
        let b = Address::from([1, 2, 7, 0]);
        assert_eq!(a.common_ancestor_depth(&b), 2);
        assert_eq!(a.common_ancestor(&b), Address::from([1, 2]));
        assert_eq!(a.common_ancestor_depth(&Address::from([4])), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Address::root().to_string(), "{ }");
        assert_eq!(Address::from([0, 12]).to_string(), "{ 0, 12 }");
    }

    #[test]
    #[should_panic(expected = "no last index")]
    fn test_with_last_index_panics_on_root() {
        Address::root().with_last_index(3);
    }
}
