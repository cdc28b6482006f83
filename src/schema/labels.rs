//! Decoding rules of built-in labels
//!
//! These functions answer, for one label with already-computed type arguments,
//! how many bits it occupies, whether it is empty, which read kinds it accepts
//! and how a wider bit-array read is split across it. All answers are guards
//! over the symbolic type arguments.

use crate::expr::{BoolExpr, SizeExpr};
use crate::read::ReadKind;

use super::{
    AtomicLabel, BuiltinComposite, Label, LabelId, Schema, INTERNAL_SHORT_STD_MSG_ADDR_SIZE,
    INTERNAL_STD_MSG_ADDR_SIZE, STD_MSG_ADDR_SIZE,
};

/// Split of a bit-array read that is wider than the label it starts at
#[derive(Debug, Clone, PartialEq)]
pub struct BitArrayPass {
    /// Holds when the read is strictly wider than the non-empty label
    pub guard: BoolExpr,
    /// Bits left for the following structure
    pub left_bits: SizeExpr,
}

/// Width of a fixed-size atomic label
pub fn fixed_size(label: &AtomicLabel) -> Option<u32> {
    match label {
        AtomicLabel::Integer { size, .. } | AtomicLabel::BitArray { size } => Some(*size),
        AtomicLabel::InternalStdMsgAddr => Some(INTERNAL_STD_MSG_ADDR_SIZE),
        AtomicLabel::InternalShortStdMsgAddr => Some(INTERNAL_SHORT_STD_MSG_ADDR_SIZE),
        _ => None,
    }
}

/// Number of data bits the label occupies, if the engine knows it
pub fn data_length(schema: &Schema, label: LabelId, args: &[SizeExpr]) -> Option<SizeExpr> {
    match schema.label(label) {
        Label::Atomic(atomic) => match atomic {
            AtomicLabel::VarInteger { bit_size, .. } => Some(bit_size.apply(args)),
            AtomicLabel::BitArrayByRef { size_bits } | AtomicLabel::AddressByRef { size_bits } => {
                Some(size_bits.clone())
            }
            AtomicLabel::Opaque { .. } => None,
            fixed => fixed_size(fixed).map(SizeExpr::from),
        },
        Label::Composite(_) => None,
    }
}

/// Holds when the label occupies no bits
pub fn is_empty_label(schema: &Schema, label: LabelId, args: &[SizeExpr]) -> BoolExpr {
    match data_length(schema, label, args) {
        Some(length) => BoolExpr::eq(&length, &SizeExpr::zero()),
        None => BoolExpr::FALSE,
    }
}

/// Holds when `read` decodes exactly one instance of the label
pub fn accepts(schema: &Schema, label: LabelId, args: &[SizeExpr], read: &ReadKind) -> BoolExpr {
    match schema.label(label) {
        Label::Atomic(atomic) => atomic_accepts(atomic, args, read),
        Label::Composite(composite) => match (composite.builtin, read) {
            (Some(BuiltinComposite::Coins), ReadKind::Coins) => BoolExpr::TRUE,
            (
                Some(BuiltinComposite::FullMsgAddr | BuiltinComposite::BasicMsgAddr),
                ReadKind::MsgAddr,
            ) => BoolExpr::TRUE,
            (
                Some(BuiltinComposite::FullMsgAddr | BuiltinComposite::BasicMsgAddr),
                ReadKind::BitArray { size_bits },
            ) => BoolExpr::eq(size_bits, &SizeExpr::from(STD_MSG_ADDR_SIZE)),
            (Some(BuiltinComposite::MaybeRef), ReadKind::MaybeConstructorBit) => BoolExpr::TRUE,
            _ => BoolExpr::FALSE,
        },
    }
}

fn atomic_accepts(label: &AtomicLabel, args: &[SizeExpr], read: &ReadKind) -> BoolExpr {
    match (label, read) {
        (
            AtomicLabel::Integer {
                size,
                signed,
                endian,
            },
            ReadKind::Integer {
                size_bits,
                signed: read_signed,
                endian: read_endian,
            },
        ) => {
            if signed != read_signed || endian != read_endian {
                return BoolExpr::FALSE;
            }
            BoolExpr::eq(size_bits, &SizeExpr::from(*size))
        }
        (AtomicLabel::Integer { size, .. }, ReadKind::BitArray { size_bits }) => {
            BoolExpr::eq(size_bits, &SizeExpr::from(*size))
        }
        (
            AtomicLabel::Integer {
                size: 1,
                signed: false,
                ..
            },
            ReadKind::MaybeConstructorBit,
        ) => BoolExpr::TRUE,
        (
            AtomicLabel::VarInteger {
                signed,
                endian,
                bit_size,
                ..
            },
            ReadKind::Integer {
                size_bits,
                signed: read_signed,
                endian: read_endian,
            },
        ) => {
            if signed != read_signed || endian != read_endian {
                return BoolExpr::FALSE;
            }
            BoolExpr::eq(size_bits, &bit_size.apply(args))
        }
        (
            AtomicLabel::BitArray { .. }
            | AtomicLabel::InternalStdMsgAddr
            | AtomicLabel::InternalShortStdMsgAddr,
            ReadKind::BitArray { size_bits },
        ) => match fixed_size(label) {
            Some(size) => BoolExpr::eq(size_bits, &SizeExpr::from(size)),
            None => BoolExpr::FALSE,
        },
        (
            AtomicLabel::BitArrayByRef { size_bits: own } | AtomicLabel::AddressByRef { size_bits: own },
            ReadKind::BitArray { size_bits },
        ) => BoolExpr::eq(size_bits, own),
        (AtomicLabel::AddressByRef { .. }, ReadKind::MsgAddr) => BoolExpr::TRUE,
        _ => BoolExpr::FALSE,
    }
}

/// Split of a bit-array read of `read_size` bits starting at the label.
///
/// `None` for labels whose length is unknown to the engine.
pub fn pass_bit_array_read(
    schema: &Schema,
    label: LabelId,
    args: &[SizeExpr],
    read_size: &SizeExpr,
) -> Option<BitArrayPass> {
    let length = data_length(schema, label, args)?;
    let non_empty = BoolExpr::eq(&length, &SizeExpr::zero()).not();
    Some(BitArrayPass {
        guard: BoolExpr::gt(read_size, &length).and(&non_empty),
        left_bits: read_size.sub(&length),
    })
}
