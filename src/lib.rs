//! # proofmarshal
//!
//! Prunable, hash-committed data structures for compact proofs.
//!
//! Every structure here is an immutable tree of commitment nodes. A node's
//! hash commits to its whole subtree, and any subtree can be pruned down to
//! just its hash without changing that commitment. Pruning a structure and
//! then reading from it keeps exactly the nodes that the read touched, which
//! is a proof of what was read.
//!
//! ## Core Concepts
//!
//! - **Bits**: immutable bit strings, the paths of the radix tree
//! - **Proof**: shared handles to commitment nodes with lazy unpruning
//! - **MerbinnerTree**: a key/value map as a merkleized binary radix tree
//! - **MerkleMountainRange**: an append-only list with position proofs
//!
//! ## Example
//!
//! ```ignore
//! use proofmarshal::{Codec, MerkleMountainRange, U64Range};
//!
//! let range = MerkleMountainRange::<U64Range>::from_values(0..100)?;
//! let proof = range.prove(37)?.serialize();
//!
//! let received = MerkleMountainRange::<U64Range>::deserialize(&proof)?;
//! assert_eq!(received.hash(), range.hash());
//! assert_eq!(received.get(37)?, 37);
//! ```

pub mod bits;
pub mod mmr;
pub mod model;
pub mod proof;
pub mod ser;
pub mod trie;

mod error;

pub use bits::Bits;
pub use error::{Error, Result};
pub use mmr::{MerkleMountainRange, RangeNode, RangeParams, U64Range};
pub use model::{Hash, HashTag};
pub use proof::{FieldDescriptor, FieldVisitor, Node, Proof, VariantDescriptor};
pub use ser::{Codec, Decoder, Encoder};
pub use trie::{DigestMap, MerbinnerTree, TreeParams, TrieNode};
