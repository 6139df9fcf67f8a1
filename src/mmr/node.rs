//! Mountain range node types

use crate::model::HashTag;
use crate::proof::{FieldDescriptor, FieldVisitor, Node, Proof, VariantDescriptor};
use crate::ser::{Codec, Decoder};
use crate::{Error, Result};
use std::fmt::Debug;
use tracing::debug;

/// Type-level configuration of a merkle mountain range
pub trait RangeParams: Send + Sync + 'static {
    type Value: Codec + Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Label the family tag is derived from
    const TAG: &'static str;
}

/// A node of a merkle mountain range
///
/// Inner nodes commit to the number of items below them, which is what makes
/// position and length statements provable.
pub enum RangeNode<P: RangeParams> {
    Empty,
    Leaf {
        value: P::Value,
    },
    Inner {
        left: Proof<RangeNode<P>>,
        right: Proof<RangeNode<P>>,
        length: u64,
    },
}

/// A merkle mountain range: a handle to its root node
pub type MerkleMountainRange<P> = Proof<RangeNode<P>>;

const EMPTY: usize = 0;
const LEAF: usize = 1;
const INNER: usize = 2;

impl<P: RangeParams> Node for RangeNode<P> {
    const KIND: &'static str = "MerkleMountainRange";
    const UNION: bool = true;
    const VARIANTS: &'static [VariantDescriptor] = &[
        VariantDescriptor {
            name: "Empty",
            sub_tag: Some("empty"),
            fields: &[],
        },
        VariantDescriptor {
            name: "Leaf",
            sub_tag: Some("leaf"),
            fields: &[FieldDescriptor {
                name: "value",
                nested: false,
            }],
        },
        VariantDescriptor {
            name: "Inner",
            sub_tag: Some("inner"),
            fields: &[
                FieldDescriptor {
                    name: "left",
                    nested: true,
                },
                FieldDescriptor {
                    name: "right",
                    nested: true,
                },
                FieldDescriptor {
                    name: "length",
                    nested: false,
                },
            ],
        },
    ];

    fn family_tag() -> HashTag {
        HashTag::new(P::TAG)
    }

    fn variant_index(&self) -> usize {
        match self {
            RangeNode::Empty => EMPTY,
            RangeNode::Leaf { .. } => LEAF,
            RangeNode::Inner { .. } => INNER,
        }
    }

    fn visit_fields<V: FieldVisitor>(&self, visitor: &mut V) {
        match self {
            RangeNode::Empty => {}
            RangeNode::Leaf { value } => visitor.value("value", value),
            RangeNode::Inner {
                left,
                right,
                length,
            } => {
                visitor.nested("left", left);
                visitor.nested("right", right);
                visitor.value("length", length);
            }
        }
    }

    fn decode_variant(index: usize, dec: &mut Decoder<'_>) -> Result<Self> {
        match index {
            EMPTY => Ok(RangeNode::Empty),
            LEAF => Ok(RangeNode::Leaf { value: dec.read()? }),
            INNER => {
                let left: MerkleMountainRange<P> = dec.read()?;
                let right: MerkleMountainRange<P> = dec.read()?;
                let length: u64 = dec.read()?;
                check_length(&left, &right, length)?;
                Ok(RangeNode::Inner {
                    left,
                    right,
                    length,
                })
            }
            _ => Err(Error::UnknownVariant {
                family: Self::KIND,
                index: index as u64,
                count: Self::VARIANTS.len(),
            }),
        }
    }

    fn prune_fields(&self) -> Self {
        match self {
            RangeNode::Empty => RangeNode::Empty,
            RangeNode::Leaf { value } => RangeNode::Leaf {
                value: value.clone(),
            },
            RangeNode::Inner {
                left,
                right,
                length,
            } => RangeNode::Inner {
                left: left.prune(),
                right: right.prune(),
                length: *length,
            },
        }
    }
}

/// Length of a child whose fields are available
fn visible_length<P: RangeParams>(child: &MerkleMountainRange<P>) -> Result<Option<u64>> {
    match child.peek() {
        None => Ok(None),
        Some(RangeNode::Empty) => Err(Error::Malformed(
            "empty child under inner mountain range node".into(),
        )),
        Some(RangeNode::Leaf { .. }) => Ok(Some(1)),
        Some(RangeNode::Inner { length, .. }) => Ok(Some(*length)),
    }
}

/// Check a decoded inner node's length against whatever children are visible
fn check_length<P: RangeParams>(
    left: &MerkleMountainRange<P>,
    right: &MerkleMountainRange<P>,
    length: u64,
) -> Result<()> {
    let consistent = match (visible_length(left)?, visible_length(right)?) {
        (Some(l), Some(r)) => l.checked_add(r) == Some(length),
        (Some(side), None) | (None, Some(side)) => side < length,
        (None, None) => length >= 2,
    };
    if !consistent {
        debug!(length, "inner node length disagrees with its children");
        return Err(Error::Malformed(format!(
            "inner mountain range node claims inconsistent length {}",
            length
        )));
    }
    Ok(())
}

/// Mountain range of `u64` values
pub struct U64Range;

impl RangeParams for U64Range {
    type Value = u64;

    const TAG: &'static str = "proofmarshal.U64Range";
}

#[cfg(test)]
mod tests {
    use super::*;

    type Range = MerkleMountainRange<U64Range>;

    fn leaf(value: u64) -> Range {
        Proof::new(RangeNode::Leaf { value })
    }

    fn inner(left: Range, right: Range, length: u64) -> Range {
        Proof::new(RangeNode::Inner {
            left,
            right,
            length,
        })
    }

    #[test]
    fn test_inner_decode_checks_length() {
        let bad = inner(leaf(1), leaf(2), 3);
        assert!(matches!(
            Range::deserialize(&bad.serialize()),
            Err(Error::Malformed(_))
        ));

        let good = inner(leaf(1), leaf(2), 2);
        assert_eq!(Range::deserialize(&good.serialize()).unwrap(), good);
    }

    #[test]
    fn test_inner_decode_with_one_side_pruned() {
        let node = inner(leaf(1), leaf(2).prune(), 2);
        assert!(Range::deserialize(&node.serialize()).is_ok());

        let short = inner(leaf(1), leaf(2).prune(), 1);
        assert!(matches!(
            Range::deserialize(&short.serialize()),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_inner_decode_rejects_empty_child() {
        let node = inner(Proof::new(RangeNode::Empty), leaf(2), 1);
        assert!(matches!(
            Range::deserialize(&node.serialize()),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn test_deep_nesting_is_rejected_not_overflowed() {
        use crate::ser::MAX_NESTING;

        let within = [0x00u8, 0x02].repeat(MAX_NESTING - 1);
        assert!(matches!(
            Range::deserialize(&within),
            Err(Error::Truncated { .. })
        ));

        for levels in [MAX_NESTING, 1000, 2000] {
            assert!(matches!(
                Range::deserialize(&[0x00u8, 0x02].repeat(levels)),
                Err(Error::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_length_is_committed() {
        assert_ne!(
            inner(leaf(1), leaf(2), 2).hash(),
            inner(leaf(1), leaf(2), 3).hash()
        );
    }
}
