//! Prunable commitment nodes
//!
//! A proof is a tree of immutable nodes, each committing to its fields with
//! a hash:
//!
//! ```text
//! hash      = H(variant_tag || data_hash)
//! data_hash = H(field_0 || field_1 || ...)
//! ```
//!
//! where a nested node contributes its 32-byte hash and a plain value its
//! wire encoding. Hashing a node therefore only touches its direct fields,
//! and a node's hash is the same whether or not anything below it has been
//! pruned.
//!
//! Pruning replaces a node by its hash alone. A pruned copy made with
//! [`Proof::prune`] remembers its original for the life of the process;
//! opening it restores that one node with its children pruned in turn. What
//! ends up opened is exactly what a proof needs to carry. On the wire every
//! node occurrence is either fully present (`0x00` + fields) or fully pruned
//! (`0xff` + hash).

mod handle;
mod node;
mod registry;

pub use handle::Proof;
pub use node::{FieldDescriptor, FieldVisitor, Node, VariantDescriptor};
pub(crate) use registry::singleton;
