//! Merkle mountain ranges
//!
//! An append-only list committed to by a single hash. Values are gathered
//! into perfect binary trees ("mountains") of decreasing size; appending only
//! rewrites the few nodes joining the mountain peaks. Every inner node
//! commits to the number of values below it, so a proof of one value also
//! proves its position and the length of the whole list.

mod node;
mod range;

pub use node::{MerkleMountainRange, RangeNode, RangeParams, U64Range};
pub use range::Iter;
