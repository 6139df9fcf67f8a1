//! Core hash types for proofmarshal

mod hash;

pub use hash::{Hash, HashTag};
