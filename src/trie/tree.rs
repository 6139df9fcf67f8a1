//! Merbinner tree operations
//!
//! Every operation descends along a key's bit prefix, then rebuilds the
//! inner nodes on the path back up. Subtrees off the path are shared
//! untouched between the old and new trees.

use super::node::{MerbinnerTree, TreeParams, TrieNode};
use crate::bits::Bits;
use crate::proof::{singleton, Node, Proof};
use crate::ser::Codec;
use crate::{Error, Result};

/// Result of descending a tree along a prefix
///
/// Iterating yields the node the descent stopped at, then every sibling that
/// was passed on the way down, deepest first.
pub struct Descent<P: TreeParams> {
    /// Exact leaf, mismatching inner node, or empty tree
    pub terminal: MerbinnerTree<P>,
    /// Siblings not visited, shallowest first
    pub siblings: Vec<MerbinnerTree<P>>,
}

impl<P: TreeParams> Descent<P> {
    /// Rejoin `tip` with the bypassed siblings, deepest first
    fn rebuild(mut self, mut tip: MerbinnerTree<P>) -> Result<MerbinnerTree<P>> {
        while let Some(sibling) = self.siblings.pop() {
            tip = MerbinnerTree::join(tip, sibling)?;
        }
        Ok(tip)
    }
}

impl<P: TreeParams> IntoIterator for Descent<P> {
    type Item = MerbinnerTree<P>;
    type IntoIter = std::iter::Chain<
        std::iter::Once<MerbinnerTree<P>>,
        std::iter::Rev<std::vec::IntoIter<MerbinnerTree<P>>>,
    >;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(self.terminal).chain(self.siblings.into_iter().rev())
    }
}

impl<P: TreeParams> Proof<TrieNode<P>> {
    /// The empty tree
    ///
    /// There is one empty tree per parameter set; every call returns a handle
    /// to the same node.
    pub fn empty() -> Self {
        singleton(|| Proof::new(TrieNode::Empty))
    }

    /// A tree holding a single item
    pub fn leaf(key: P::Key, value: P::Value) -> Self {
        Proof::new(TrieNode::Leaf { key, value })
    }

    /// Build a tree from key/value pairs; later duplicates win
    pub fn from_items<I>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P::Key, P::Value)>,
    {
        items
            .into_iter()
            .try_fold(Self::empty(), |tree, (key, value)| tree.put(key, value))
    }

    /// Join two subtrees under a new inner node
    ///
    /// The children are ordered by the first bit after their common prefix.
    /// Subtrees with identical or nested prefixes cannot be joined.
    pub fn join(first: Self, second: Self) -> Result<Self> {
        let a = first.prefix()?;
        let b = second.prefix()?;
        let prefix = a.common_prefix(&b);
        if prefix.len() >= a.len() || prefix.len() >= b.len() {
            return Err(Error::ValueOutOfRange(format!(
                "cannot join subtrees with prefixes {} and {}",
                a, b
            )));
        }

        let (left, right) = if b.bit(prefix.len()) {
            (first, second)
        } else {
            (second, first)
        };
        Ok(Proof::new(TrieNode::Inner {
            prefix,
            left,
            right,
        }))
    }

    /// Bit prefix shared by every key in the tree
    ///
    /// Empty for the empty tree; the key's full prefix for a leaf.
    pub fn prefix(&self) -> Result<Bits> {
        Ok(match self.open("prefix")? {
            TrieNode::Empty => Bits::new(),
            TrieNode::Leaf { key, .. } => P::key_prefix(key),
            TrieNode::Inner { prefix, .. } => prefix.clone(),
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(matches!(self.open("prefix")?, TrieNode::Empty))
    }

    /// Key of a leaf
    pub fn key(&self) -> Result<&P::Key> {
        match self.open("key")? {
            TrieNode::Leaf { key, .. } => Ok(key),
            other => Err(mismatch("Leaf", other)),
        }
    }

    /// Value of a leaf
    pub fn value(&self) -> Result<&P::Value> {
        match self.open("value")? {
            TrieNode::Leaf { value, .. } => Ok(value),
            other => Err(mismatch("Leaf", other)),
        }
    }

    /// Left child of an inner node
    pub fn left(&self) -> Result<&Self> {
        match self.open("left")? {
            TrieNode::Inner { left, .. } => Ok(left),
            other => Err(mismatch("Inner", other)),
        }
    }

    /// Right child of an inner node
    pub fn right(&self) -> Result<&Self> {
        match self.open("right")? {
            TrieNode::Inner { right, .. } => Ok(right),
            other => Err(mismatch("Inner", other)),
        }
    }

    /// Descend as far as `prefix` leads
    ///
    /// An inner node is entered only if its prefix is strictly shorter than
    /// `prefix` and a prefix of it. Only the nodes on the path are opened.
    pub fn descend(&self, prefix: &Bits) -> Result<Descent<P>> {
        let mut siblings = Vec::new();
        let mut tip = self.clone();
        loop {
            let next = match tip.open("prefix")? {
                TrieNode::Inner {
                    prefix: node_prefix,
                    left,
                    right,
                } if node_prefix.len() < prefix.len() && prefix.starts_with(node_prefix) => {
                    if prefix.bit(node_prefix.len()) {
                        siblings.push(left.clone());
                        right.clone()
                    } else {
                        siblings.push(right.clone());
                        left.clone()
                    }
                }
                _ => break,
            };
            tip = next;
        }
        Ok(Descent {
            terminal: tip,
            siblings,
        })
    }

    /// Look up the value stored under `key`
    pub fn get(&self, key: &P::Key) -> Result<P::Value> {
        let path = self.descend(&P::key_prefix(key))?;
        match path.terminal.open("key")? {
            TrieNode::Leaf {
                key: found,
                value,
            } if found == key => Ok(value.clone()),
            _ => Err(key_not_found::<P>(key)),
        }
    }

    pub fn contains_key(&self, key: &P::Key) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(Error::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// New tree with `key` set to `value`
    ///
    /// An existing value for `key` is replaced.
    pub fn put(&self, key: P::Key, value: P::Value) -> Result<Self> {
        let path = self.descend(&P::key_prefix(&key))?;
        let replaces = match path.terminal.open("key")? {
            TrieNode::Empty => true,
            TrieNode::Leaf { key: existing, .. } => *existing == key,
            TrieNode::Inner { .. } => false,
        };

        let leaf = Self::leaf(key, value);
        let tip = if replaces {
            leaf
        } else {
            Self::join(leaf, path.terminal.clone())?
        };
        path.rebuild(tip)
    }

    /// New tree without `key`
    pub fn remove(&self, key: &P::Key) -> Result<Self> {
        let mut path = self.descend(&P::key_prefix(key))?;
        match path.terminal.open("key")? {
            TrieNode::Leaf { key: found, .. } if found == key => {}
            _ => return Err(key_not_found::<P>(key)),
        }

        match path.siblings.pop() {
            None => Ok(Self::empty()),
            Some(promoted) => path.rebuild(promoted),
        }
    }

    /// Number of items
    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            match node.open("len")? {
                TrieNode::Empty => {}
                TrieNode::Leaf { .. } => count += 1,
                TrieNode::Inner { left, right, .. } => {
                    stack.push(left.clone());
                    stack.push(right.clone());
                }
            }
        }
        Ok(count)
    }

    /// True if every item of `self` is also in `other` with an equal value
    pub fn issubset(&self, other: &Self) -> Result<bool> {
        if self == other {
            return Ok(true);
        }

        match self.open("prefix")? {
            TrieNode::Empty => Ok(true),
            TrieNode::Leaf { key, value } => match other.get(key) {
                Ok(theirs) => Ok(theirs == *value),
                Err(Error::KeyNotFound(_)) => Ok(false),
                Err(e) => Err(e),
            },
            TrieNode::Inner {
                prefix,
                left,
                right,
            } => {
                let (their_prefix, their_left, their_right) = match other.open("prefix")? {
                    TrieNode::Inner {
                        prefix: p,
                        left: l,
                        right: r,
                    } => (p, l, r),
                    // An inner node holds at least two items
                    _ => return Ok(false),
                };

                if prefix == their_prefix {
                    Ok(left.issubset(their_left)? && right.issubset(their_right)?)
                } else if prefix.starts_with(their_prefix) {
                    // We are more specific; only one side of theirs can hold us
                    if prefix.bit(their_prefix.len()) {
                        self.issubset(their_right)
                    } else {
                        self.issubset(their_left)
                    }
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// In-order traversal of `(key, value)` pairs
    pub fn iter(&self) -> Iter<P> {
        Iter {
            stack: vec![self.clone()],
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = Result<P::Key>> {
        self.iter().map(|item| item.map(|(key, _)| key))
    }

    pub fn values(&self) -> impl Iterator<Item = Result<P::Value>> {
        self.iter().map(|item| item.map(|(_, value)| value))
    }

    /// Pruned copy carrying just what is needed to look up `key`
    ///
    /// Looking `key` up in the result, even after a serialization round trip,
    /// gives the same answer as in `self`: the value, or `KeyNotFound`.
    pub fn prove(&self, key: &P::Key) -> Result<Self> {
        let proof = self.prune();
        match proof.get(key) {
            Ok(_) | Err(Error::KeyNotFound(_)) => Ok(proof),
            Err(e) => Err(e),
        }
    }
}

/// Iterator over the items of a merbinner tree
///
/// Yields an error, then stops, on reaching a pruned subtree.
pub struct Iter<P: TreeParams> {
    stack: Vec<MerbinnerTree<P>>,
}

impl<P: TreeParams> Iterator for Iter<P> {
    type Item = Result<(P::Key, P::Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node.open("left") {
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
                Ok(TrieNode::Empty) => {}
                Ok(TrieNode::Leaf { key, value }) => {
                    return Some(Ok((key.clone(), value.clone())));
                }
                Ok(TrieNode::Inner { left, right, .. }) => {
                    self.stack.push(right.clone());
                    self.stack.push(left.clone());
                }
            }
        }
        None
    }
}

fn mismatch<P: TreeParams>(expected: &'static str, found: &TrieNode<P>) -> Error {
    Error::TypeMismatch {
        expected,
        found: found.descriptor().name,
    }
}

fn key_not_found<P: TreeParams>(key: &P::Key) -> Error {
    Error::KeyNotFound(hex::encode(key.serialize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::DigestMap;
    use std::collections::BTreeSet;

    type Map = MerbinnerTree<DigestMap>;

    fn key(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    fn same(a: &Map, b: &Map) -> bool {
        Proof::ptr_eq(a, b)
    }

    #[test]
    fn test_empty_tree() {
        let m0 = Map::empty();
        assert!(same(&m0, &Map::empty()));
        assert!(m0.is_empty().unwrap());
        assert_eq!(m0.len().unwrap(), 0);
        assert!(m0.prefix().unwrap().is_empty());

        assert!(matches!(m0.get(&key(0x00)), Err(Error::KeyNotFound(_))));
        assert!(matches!(m0.get(&key(0xff)), Err(Error::KeyNotFound(_))));
        assert_eq!(m0.iter().count(), 0);
    }

    #[test]
    fn test_leaf_tree() {
        let m1 = Map::empty().put(key(0x00), 0).unwrap();
        assert_eq!(m1.variant_name(), Some("Leaf"));
        assert_eq!(m1.len().unwrap(), 1);
        assert_eq!(m1.prefix().unwrap().len(), 256);
        assert_eq!(m1.get(&key(0x00)).unwrap(), 0);
    }

    #[test]
    fn test_accessor_on_wrong_variant() {
        let m1 = Map::leaf(key(0x00), 0);
        assert_eq!(
            m1.left().unwrap_err(),
            Error::TypeMismatch {
                expected: "Inner",
                found: "Leaf"
            }
        );
        assert_eq!(
            Map::empty().key().unwrap_err(),
            Error::TypeMismatch {
                expected: "Leaf",
                found: "Empty"
            }
        );
    }

    #[test]
    fn test_put() {
        let m0 = Map::empty();

        // Empty is turned into a leaf
        let m1 = m0.put(key(0x00), 0x00).unwrap();
        assert_eq!(m1.variant_name(), Some("Leaf"));
        assert_eq!(*m1.key().unwrap(), key(0x00));
        assert_eq!(*m1.value().unwrap(), 0);

        // Leaf is turned into an inner node, reusing the leaf
        let m2 = m1.put(key(0x0f), 0x0f).unwrap();
        assert_eq!(m2.variant_name(), Some("Inner"));
        assert_eq!(m2.prefix().unwrap().len(), 4);
        assert_eq!(*m2.right().unwrap().key().unwrap(), key(0x0f));
        assert_eq!(*m2.right().unwrap().value().unwrap(), 0x0f);
        assert!(same(m2.left().unwrap(), &m1));

        // New tip is less specific than the old one, which becomes a child
        let m3 = m2.put(key(0x2f), 0x2f).unwrap();
        assert_eq!(m3.prefix().unwrap().len(), 2);
        assert_eq!(*m3.right().unwrap().key().unwrap(), key(0x2f));
        assert!(same(m3.left().unwrap(), &m2));

        // Changing the right side rewrites the tip but keeps the left side
        let m4 = m3.put(key(0x3f), 0x3f).unwrap();
        assert_eq!(m4.prefix().unwrap().len(), 2);
        assert!(same(m4.left().unwrap(), m3.left().unwrap()));
        assert!(same(
            m4.right().unwrap().left().unwrap(),
            m3.right().unwrap()
        ));
        assert_eq!(
            *m4.right().unwrap().right().unwrap().key().unwrap(),
            key(0x3f)
        );
    }

    #[test]
    fn test_put_replaces_existing_value() {
        let m = Map::from_items([(key(0x00), 0), (key(0x0f), 0x0f)]).unwrap();
        let updated = m.put(key(0x0f), 99).unwrap();
        assert_eq!(updated.get(&key(0x0f)).unwrap(), 99);
        assert_eq!(updated.get(&key(0x00)).unwrap(), 0);
        assert_eq!(updated.len().unwrap(), 2);
        assert!(same(updated.left().unwrap(), m.left().unwrap()));

        // Putting the same value back gives an equal tree
        assert_eq!(updated.put(key(0x0f), 0x0f).unwrap(), m);
    }

    #[test]
    fn test_get() {
        let mut expected = Vec::new();
        let mut missing = vec![key(0xff)];
        let mut m = Map::empty();
        for i in 0..32u8 {
            for (k, v) in &expected {
                assert_eq!(m.get(k).unwrap(), *v);
            }
            for k in &missing {
                assert!(matches!(m.get(k), Err(Error::KeyNotFound(_))));
            }

            let new_key = key(i);
            m = m.put(new_key, i as u64).unwrap();
            expected.push((new_key, i as u64));

            let mut near_miss = new_key;
            near_miss[30] = 0xff;
            near_miss[31] = 0xff;
            missing.push(near_miss);
        }
    }

    #[test]
    fn test_key_not_found_names_key() {
        let err = Map::empty().get(&key(0xab)).unwrap_err();
        assert_eq!(err, Error::KeyNotFound("ab".repeat(32)));
    }

    #[test]
    fn test_contains_key() {
        let m = Map::from_items([(key(1), 1), (key(2), 2)]).unwrap();
        assert!(m.contains_key(&key(1)).unwrap());
        assert!(!m.contains_key(&key(3)).unwrap());
    }

    #[test]
    fn test_remove() {
        let m0 = Map::empty();
        assert!(matches!(
            m0.remove(&key(0x00)),
            Err(Error::KeyNotFound(_))
        ));

        // Removing the only item gives back the empty singleton
        let m1 = m0.put(key(0x00), 0x00).unwrap();
        assert!(same(&m1.remove(&key(0x00)).unwrap(), &Map::empty()));
        assert!(matches!(
            m1.remove(&key(0xff)),
            Err(Error::KeyNotFound(_))
        ));

        // Removing either key promotes the other leaf
        let m2 = m1.put(key(0x0f), 0x0f).unwrap();
        assert!(same(&m2.remove(&key(0x00)).unwrap(), m2.right().unwrap()));
        assert!(same(&m2.remove(&key(0x0f)).unwrap(), m2.left().unwrap()));
        assert!(matches!(
            m2.remove(&key(0xff)),
            Err(Error::KeyNotFound(_))
        ));

        // Old inner tip promoted to new tip
        let m3 = m2.put(key(0x2f), 0x2f).unwrap();
        assert!(same(&m3.remove(&key(0x2f)).unwrap(), m3.left().unwrap()));

        // Removing deeper in the tree rebuilds around the remaining items
        let m3a = m3.remove(&key(0x00)).unwrap();
        assert!(same(
            m3a.left().unwrap(),
            m3.left().unwrap().right().unwrap()
        ));
        assert!(same(m3a.right().unwrap(), m3.right().unwrap()));

        let m3b = m3.remove(&key(0x0f)).unwrap();
        assert!(same(m3b.left().unwrap(), m3.left().unwrap().left().unwrap()));
        assert!(same(m3b.right().unwrap(), m3.right().unwrap()));
    }

    #[test]
    fn test_remove_all_returns_empty_singleton() {
        let keys: Vec<u8> = vec![7, 3, 250, 0, 128, 64, 65, 1];
        let mut m = Map::from_items(keys.iter().map(|&k| (key(k), k as u64))).unwrap();
        for (removed, k) in keys.iter().rev().enumerate() {
            assert_eq!(m.len().unwrap(), keys.len() - removed);
            m = m.remove(&key(*k)).unwrap();
        }
        assert!(same(&m, &Map::empty()));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let forward = Map::from_items((0..16u8).map(|i| (key(i * 13), i as u64))).unwrap();
        let backward = Map::from_items((0..16u8).rev().map(|i| (key(i * 13), i as u64))).unwrap();
        assert_eq!(forward.hash(), backward.hash());
    }

    #[test]
    fn test_len() {
        let mut m = Map::empty();
        for expected in 0..=255u8 {
            assert_eq!(m.len().unwrap(), expected as usize);
            m = m.put(key(expected), expected as u64).unwrap();
        }
        assert_eq!(m.len().unwrap(), 256);
    }

    #[test]
    fn test_iter_is_in_key_order() {
        let bytes = [0x80u8, 0x01, 0xfe, 0x40, 0x00];
        let m = Map::from_items(bytes.iter().map(|&b| (key(b), b as u64))).unwrap();

        let keys: Vec<[u8; 32]> = m.keys().collect::<Result<_>>().unwrap();
        let mut sorted: Vec<[u8; 32]> = bytes.iter().map(|&b| key(b)).collect();
        sorted.sort();
        assert_eq!(keys, sorted);

        let values: Vec<u64> = m.values().collect::<Result<_>>().unwrap();
        assert_eq!(values, vec![0x00, 0x01, 0x40, 0x80, 0xfe]);
    }

    #[test]
    fn test_join_rejects_same_prefix() {
        let a = Map::leaf(key(1), 1);
        let b = Map::leaf(key(1), 2);
        assert!(matches!(
            Map::join(a, b),
            Err(Error::ValueOutOfRange(_))
        ));
        assert!(matches!(
            Map::join(Map::empty(), Map::leaf(key(1), 1)),
            Err(Error::ValueOutOfRange(_))
        ));
    }

    #[test]
    fn test_descent_order() {
        let m = Map::from_items([(key(0x00), 0), (key(0x0f), 0x0f), (key(0x2f), 0x2f)]).unwrap();
        let path: Vec<Map> = m.descend(&DigestMap::key_prefix(&key(0x00))).unwrap().into_iter().collect();
        assert_eq!(path.len(), 3);
        assert_eq!(*path[0].key().unwrap(), key(0x00));
        assert_eq!(*path[1].key().unwrap(), key(0x0f));
        assert_eq!(*path[2].key().unwrap(), key(0x2f));
    }

    fn all_subsets(n: u8) -> Vec<Map> {
        if n == 0 {
            return vec![Map::empty()];
        }
        let mut trees = Vec::new();
        for base in all_subsets(n - 1) {
            let extended = base.put(key(n), n as u64).unwrap();
            trees.push(base);
            trees.push(extended);
        }
        trees
    }

    #[test]
    fn test_issubset() {
        let trees = all_subsets(5);
        assert_eq!(trees.len(), 32);
        for a in &trees {
            let a_values: BTreeSet<u64> = a.values().collect::<Result<_>>().unwrap();
            for b in &trees {
                let b_values: BTreeSet<u64> = b.values().collect::<Result<_>>().unwrap();
                assert_eq!(
                    a.issubset(b).unwrap(),
                    a_values.is_subset(&b_values),
                    "{:?} <= {:?}",
                    a_values,
                    b_values
                );
            }
        }
    }

    #[test]
    fn test_issubset_compares_values() {
        let a = Map::from_items([(key(1), 1), (key(2), 2)]).unwrap();
        let b = Map::from_items([(key(1), 1), (key(2), 3), (key(3), 3)]).unwrap();
        assert!(!a.issubset(&b).unwrap());
        assert!(Map::leaf(key(1), 1).issubset(&b).unwrap());
    }

    #[test]
    fn test_prove_membership() {
        let m = Map::from_items((0..64u8).map(|i| (key(i), i as u64 * 10))).unwrap();
        let proof = m.prove(&key(42)).unwrap();
        assert_eq!(proof.hash(), m.hash());

        let bytes = proof.serialize();
        assert!(bytes.len() < m.serialize().len());

        let decoded = Map::deserialize(&bytes).unwrap();
        assert_eq!(decoded.hash(), m.hash());
        assert_eq!(decoded.get(&key(42)).unwrap(), 420);
        assert!(decoded.get(&key(41)).unwrap_err().is_pruned());
    }

    #[test]
    fn test_prove_non_membership() {
        let m = Map::from_items((0..16u8).map(|i| (key(i * 2), i as u64))).unwrap();
        let absent = key(7);
        let decoded = Map::deserialize(&m.prove(&absent).unwrap().serialize()).unwrap();
        assert_eq!(decoded.hash(), m.hash());
        assert!(matches!(decoded.get(&absent), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_deepest_tree_round_trips() {
        // One key per bit position plus the all-zero key: 256 inner levels
        let mut keys = vec![[0u8; 32]];
        for i in 0..256 {
            let mut k = [0u8; 32];
            k[i / 8] = 0x80 >> (i % 8);
            keys.push(k);
        }
        let m = Map::from_items(keys.iter().map(|&k| (k, 1))).unwrap();

        let mut depth = 1;
        let mut node = m.clone();
        while let Ok(left) = node.left() {
            node = left.clone();
            depth += 1;
        }
        assert_eq!(depth, 257);

        let decoded = Map::deserialize(&m.serialize()).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.get(&[0u8; 32]).unwrap(), 1);
    }

    #[test]
    fn test_serialization_round_trip() {
        let m = Map::from_items((0..8u8).map(|i| (key(i * 31), i as u64))).unwrap();
        let decoded = Map::deserialize(&m.serialize()).unwrap();
        assert_eq!(decoded, m);
        assert_eq!(decoded.len().unwrap(), 8);
        assert!(!decoded.is_pruned());
    }
}
