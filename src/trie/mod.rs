//! Merkleized binary radix tree ("merbinner tree")
//!
//! A key/value map committed to by a single hash:
//! - The empty map is a dedicated empty node
//! - A single item is a leaf whose prefix is the key's full bit path
//! - Larger maps are inner nodes carrying the longest prefix common to all
//!   keys below them, with the 0-continuation on the left
//!
//! The shape depends only on the set of keys, never on insertion order, so
//! equal maps have equal hashes. Membership and non-membership both have
//! compact proofs: the nodes along one descent path.

mod node;
mod tree;

pub use node::{DigestMap, MerbinnerTree, TreeParams, TrieNode};
pub use tree::{Descent, Iter};
