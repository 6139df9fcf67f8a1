//! Merkle mountain range operations

use super::node::{MerkleMountainRange, RangeNode, RangeParams};
use crate::proof::{singleton, Node, Proof};
use crate::{Error, Result};
use std::ops::{Bound, RangeBounds};

impl<P: RangeParams> Proof<RangeNode<P>> {
    /// The empty range
    ///
    /// There is one empty range per parameter set; every call returns a
    /// handle to the same node.
    pub fn empty() -> Self {
        singleton(|| Proof::new(RangeNode::Empty))
    }

    /// A range holding a single value
    pub fn leaf(value: P::Value) -> Self {
        Proof::new(RangeNode::Leaf { value })
    }

    pub fn from_values<I>(values: I) -> Result<Self>
    where
        I: IntoIterator<Item = P::Value>,
    {
        Self::empty().extend(values)
    }

    /// Inner node over two ranges, committing to their total length
    pub fn join(left: Self, right: Self) -> Result<Self> {
        let length = left
            .len()?
            .checked_add(right.len()?)
            .ok_or_else(|| Error::ValueOutOfRange("mountain range length overflows u64".into()))?;
        Ok(Proof::new(RangeNode::Inner {
            left,
            right,
            length,
        }))
    }

    /// Number of values
    pub fn len(&self) -> Result<u64> {
        Ok(match self.open("length")? {
            RangeNode::Empty => 0,
            RangeNode::Leaf { .. } => 1,
            RangeNode::Inner { length, .. } => *length,
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// True if the length is a power of two
    pub fn is_perfect_tree(&self) -> Result<bool> {
        Ok(self.len()?.is_power_of_two())
    }

    /// Value of a leaf
    pub fn value(&self) -> Result<&P::Value> {
        match self.open("value")? {
            RangeNode::Leaf { value } => Ok(value),
            other => Err(mismatch("Leaf", other)),
        }
    }

    /// Left child of an inner node
    pub fn left(&self) -> Result<&Self> {
        match self.open("left")? {
            RangeNode::Inner { left, .. } => Ok(left),
            other => Err(mismatch("Inner", other)),
        }
    }

    /// Right child of an inner node
    pub fn right(&self) -> Result<&Self> {
        match self.open("right")? {
            RangeNode::Inner { right, .. } => Ok(right),
            other => Err(mismatch("Inner", other)),
        }
    }

    /// New range with `value` appended
    ///
    /// Perfect subtrees are never rewritten; only the nodes joining the
    /// mountain peaks change.
    pub fn append(&self, value: P::Value) -> Result<Self> {
        match self.open("length")? {
            RangeNode::Empty => Ok(Self::leaf(value)),
            RangeNode::Leaf { .. } => Self::join(self.clone(), Self::leaf(value)),
            RangeNode::Inner { length, .. } if length % 2 == 0 => {
                // No new perfect tree can form; this covers perfect trees too
                Self::join(self.clone(), Self::leaf(value))
            }
            RangeNode::Inner { left, right, .. } => {
                let new_right = right.append(value)?;
                left.merge_trees(new_right)
            }
        }
    }

    /// Append every value in order
    pub fn extend<I>(&self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = P::Value>,
    {
        values
            .into_iter()
            .try_fold(self.clone(), |range, value| range.append(value))
    }

    /// Join `self` with a range to its right, merging equal-height mountains
    fn merge_trees(&self, new_right: Self) -> Result<Self> {
        let ours = self.len()?;
        let theirs = new_right.len()?;
        if ours & theirs == 0 || ours == theirs {
            return Self::join(self.clone(), new_right);
        }

        // Some mountain on our right side has the height of new_right
        match self.open("right")? {
            RangeNode::Inner { left, right, .. } => {
                let merged = right.merge_trees(new_right)?;
                left.merge_trees(merged)
            }
            other => Err(Error::Malformed(format!(
                "cannot merge range of length {} into {} of length {}",
                theirs,
                other.descriptor().name,
                ours
            ))),
        }
    }

    /// Value at `index`; negative indices count from the end
    pub fn get(&self, index: i64) -> Result<P::Value> {
        let length = self.len()?;
        let out_of_range = || Error::IndexOutOfRange { index, length };

        let mut offset = if index < 0 {
            length
                .checked_sub(index.unsigned_abs())
                .ok_or_else(out_of_range)?
        } else {
            index as u64
        };
        if offset >= length {
            return Err(out_of_range());
        }

        let mut node = self.clone();
        loop {
            let next = match node.open("value")? {
                RangeNode::Leaf { value } if offset == 0 => return Ok(value.clone()),
                RangeNode::Inner { left, right, .. } => {
                    let left_len = left.len()?;
                    if offset < left_len {
                        left.clone()
                    } else {
                        offset -= left_len;
                        right.clone()
                    }
                }
                // Only reachable through inconsistent lengths
                _ => return Err(out_of_range()),
            };
            node = next;
        }
    }

    /// Contiguous sub-range; bounds past the end are clamped
    ///
    /// A node entirely covered by the range is returned as-is.
    pub fn slice(&self, range: impl RangeBounds<u64>) -> Result<Self> {
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let stop = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => u64::MAX,
        };
        self.slice_between(start, stop)
    }

    /// Sub-range with an explicit step; only unit steps are supported
    pub fn slice_step(&self, range: impl RangeBounds<u64>, step: i64) -> Result<Self> {
        match step {
            0 => Err(Error::ValueOutOfRange("slice step cannot be zero".into())),
            1 => self.slice(range),
            _ => Err(Error::NotImplemented("mountain range slices with step other than 1")),
        }
    }

    fn slice_between(&self, start: u64, stop: u64) -> Result<Self> {
        let length = self.len()?;
        let stop = stop.min(length);
        if start >= stop {
            return Ok(Self::empty());
        }
        if start == 0 && stop == length {
            return Ok(self.clone());
        }

        match self.open("left")? {
            RangeNode::Inner { left, right, .. } => {
                let left_len = left.len()?;
                if start >= left_len {
                    return right.slice_between(start - left_len, stop - left_len);
                }

                let head = left.slice_between(start, stop)?;
                if stop <= left_len {
                    return Ok(head);
                }
                let tail = right.slice_between(0, stop - left_len)?;
                tail.iter()
                    .try_fold(head, |range, value| range.append(value?))
            }
            // Empty and leaf ranges are always fully covered or missed
            _ => Ok(Self::empty()),
        }
    }

    /// Values in order
    pub fn iter(&self) -> Iter<P> {
        Iter {
            stack: vec![self.clone()],
            reverse: false,
        }
    }

    /// Values in reverse order
    pub fn iter_rev(&self) -> Iter<P> {
        Iter {
            stack: vec![self.clone()],
            reverse: true,
        }
    }

    /// Pruned copy carrying just what is needed to read `index`
    ///
    /// The proof also commits to the length, so an out-of-range index gives
    /// a proof of that instead.
    pub fn prove(&self, index: i64) -> Result<Self> {
        let proof = self.prune();
        match proof.get(index) {
            Ok(_) | Err(Error::IndexOutOfRange { .. }) => Ok(proof),
            Err(e) => Err(e),
        }
    }
}

/// Iterator over the values of a mountain range
///
/// Yields an error, then stops, on reaching a pruned subtree.
pub struct Iter<P: RangeParams> {
    stack: Vec<MerkleMountainRange<P>>,
    reverse: bool,
}

impl<P: RangeParams> Iterator for Iter<P> {
    type Item = Result<P::Value>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node.open("value") {
                Err(e) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
                Ok(RangeNode::Empty) => {}
                Ok(RangeNode::Leaf { value }) => return Some(Ok(value.clone())),
                Ok(RangeNode::Inner { left, right, .. }) => {
                    let (first, second) = if self.reverse {
                        (right, left)
                    } else {
                        (left, right)
                    };
                    self.stack.push(second.clone());
                    self.stack.push(first.clone());
                }
            }
        }
        None
    }
}

fn mismatch<P: RangeParams>(expected: &'static str, found: &RangeNode<P>) -> Error {
    Error::TypeMismatch {
        expected,
        found: found.descriptor().name,
    }
}
