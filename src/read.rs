//! Read requests issued by the interpreter and the symbolic values they decode to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::{bits_to_unsigned, field_bits, BoolExpr, Model, SizeExpr};
use crate::fields::{CellAddress, FieldRef};
use crate::{Error, Result};

/// Byte order of an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endian {
    /// Least significant byte first
    LittleEndian,
    /// Most significant byte first
    #[default]
    BigEndian,
}

/// Decoding kind of one read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReadKind {
    /// Integer of a possibly symbolic width
    Integer {
        /// Width in bits
        size_bits: SizeExpr,
        /// Two's complement when true
        signed: bool,
        /// Byte order
        endian: Endian,
    },
    /// The single "is the optional part present" bit of `Maybe`
    MaybeConstructorBit,
    /// Message address, decoded as its length and a slice
    MsgAddr,
    /// Raw bits of a possibly symbolic width
    BitArray {
        /// Width in bits
        size_bits: SizeExpr,
    },
    /// Currency amount: 4-bit byte length, then that many bytes
    Coins,
}

impl ReadKind {
    /// Big-endian integer read
    pub fn integer(size_bits: impl Into<SizeExpr>, signed: bool) -> Self {
        ReadKind::Integer {
            size_bits: size_bits.into(),
            signed,
            endian: Endian::BigEndian,
        }
    }

    /// Unsigned big-endian integer read
    pub fn unsigned(size_bits: impl Into<SizeExpr>) -> Self {
        Self::integer(size_bits, false)
    }

    /// Raw bits read
    pub fn bit_array(size_bits: impl Into<SizeExpr>) -> Self {
        ReadKind::BitArray {
            size_bits: size_bits.into(),
        }
    }

    /// Width of a sized read; `None` for coins and addresses
    pub fn size_bits(&self) -> Option<SizeExpr> {
        match self {
            ReadKind::Integer { size_bits, .. } | ReadKind::BitArray { size_bits } => {
                Some(size_bits.clone())
            }
            ReadKind::MaybeConstructorBit => Some(SizeExpr::constant(1)),
            ReadKind::MsgAddr | ReadKind::Coins => None,
        }
    }

    /// Whether the read consumes no bits at all
    pub fn is_empty_read(&self) -> BoolExpr {
        match self.size_bits() {
            Some(size) => BoolExpr::eq(&size, &SizeExpr::zero()),
            None => BoolExpr::FALSE,
        }
    }
}

impl fmt::Display for ReadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadKind::Integer {
                size_bits,
                signed,
                endian,
            } => {
                let sign = if *signed { "int" } else { "uint" };
                match endian {
                    Endian::BigEndian => write!(f, "{}({})", sign, size_bits),
                    Endian::LittleEndian => write!(f, "{}_le({})", sign, size_bits),
                }
            }
            ReadKind::MaybeConstructorBit => write!(f, "maybe-bit"),
            ReadKind::MsgAddr => write!(f, "msg-addr"),
            ReadKind::BitArray { size_bits } => write!(f, "bits({})", size_bits),
            ReadKind::Coins => write!(f, "coins"),
        }
    }
}

/// A pending read against one cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadRequest {
    /// Cell being read
    pub address: CellAddress,
    /// What is being read
    pub kind: ReadKind,
}

impl LoadRequest {
    /// Request `kind` from `address`
    pub fn new(address: CellAddress, kind: ReadKind) -> Self {
        Self { address, kind }
    }

    /// Same cell, different kind
    pub fn with_kind(&self, kind: ReadKind) -> Self {
        Self {
            address: self.address,
            kind,
        }
    }
}

/// Symbolic integer produced by a read
#[derive(Debug, Clone, PartialEq)]
pub enum IntValue {
    /// Content of a schema field
    Field {
        /// The field
        field: FieldRef,
        /// Interpret as two's complement
        signed: bool,
    },
    /// Bits of a known constant
    Literal {
        /// The bits
        bits: String,
        /// Interpret as two's complement
        signed: bool,
    },
    /// Bits of a known constant at a symbolic offset
    ConstantSlice {
        /// The constant
        data: String,
        /// Start offset
        offset: SizeExpr,
        /// Number of bits
        length: SizeExpr,
        /// Interpret as two's complement
        signed: bool,
    },
}

/// Symbolic slice produced by a read
#[derive(Debug, Clone, PartialEq)]
pub enum SliceValue {
    /// Inline block stored in a field
    Data(FieldRef),
    /// Slice referenced out of line
    Ref(FieldRef),
    /// Constant prefix followed by a field block
    Prefixed {
        /// Literal prefix
        prefix: String,
        /// Block after it
        rest: FieldRef,
    },
    /// Known constant bits
    Literal(String),
    /// Slices read back to back by one split read
    Concat(Vec<SliceValue>),
}

impl SliceValue {
    /// Nothing at all
    pub fn empty() -> Self {
        SliceValue::Literal(String::new())
    }

    /// True for the empty literal
    pub fn is_empty_literal(&self) -> bool {
        matches!(self, SliceValue::Literal(bits) if bits.is_empty())
    }

    /// `self` followed by `other`, flattened
    pub fn concat(self, other: SliceValue) -> SliceValue {
        let mut parts = Vec::new();
        for part in [self, other] {
            match part {
                SliceValue::Concat(inner) => parts.extend(inner),
                literal if literal.is_empty_literal() => {}
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => SliceValue::empty(),
            1 => parts.remove(0),
            _ => SliceValue::Concat(parts),
        }
    }
}

/// Symbolic currency amount
#[derive(Debug, Clone, PartialEq)]
pub enum CoinsValue {
    /// Byte length and amount fields
    Fields {
        /// 4-bit byte length
        length: FieldRef,
        /// The amount
        grams: FieldRef,
    },
    /// Amount known to be zero
    Zero,
}

/// Value decoded by a successful read
#[derive(Debug, Clone, PartialEq)]
pub enum ReadValue {
    /// Integer
    Int(IntValue),
    /// Boolean
    Bool(BoolExpr),
    /// Slice
    Slice(SliceValue),
    /// Address length (when known) and content
    Address {
        /// Number of address bits, `None` if it is the remaining length of the slice
        length: Option<SizeExpr>,
        /// Address content
        slice: SliceValue,
    },
    /// Currency amount
    Coins(CoinsValue),
}

/// A [`ReadValue`] evaluated under a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcreteValue {
    /// Integer bits and signedness
    Int {
        /// Bits, most significant first
        bits: String,
        /// Two's complement
        signed: bool,
    },
    /// Boolean
    Bool(bool),
    /// Raw bits of a slice, address or serialized amount
    Bits(String),
}

impl ConcreteValue {
    /// Numeric value of an integer that fits into `i128`
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            ConcreteValue::Int { bits, signed } => {
                if bits.is_empty() || bits.len() > 127 {
                    return None;
                }
                let unsigned = i128::from_str_radix(bits, 2).ok()?;
                if *signed && bits.starts_with('1') {
                    Some(unsigned - (1i128 << bits.len()))
                } else {
                    Some(unsigned)
                }
            }
            _ => None,
        }
    }
}

impl SliceValue {
    fn concretize<M: Model + ?Sized>(&self, model: &M) -> Result<String> {
        match self {
            SliceValue::Data(field) => field_bits(model, field),
            SliceValue::Ref(field) => model
                .slice_data(field)
                .ok_or_else(|| Error::Evaluation(format!("no slice content for {}", field))),
            SliceValue::Prefixed { prefix, rest } => {
                Ok(format!("{}{}", prefix, field_bits(model, rest)?))
            }
            SliceValue::Literal(bits) => Ok(bits.clone()),
            SliceValue::Concat(parts) => parts
                .iter()
                .map(|part| part.concretize(model))
                .collect::<Result<Vec<_>>>()
                .map(|parts| parts.concat()),
        }
    }
}

impl ReadValue {
    /// Evaluate under `model`
    pub fn concretize<M: Model + ?Sized>(&self, model: &M) -> Result<ConcreteValue> {
        match self {
            ReadValue::Int(IntValue::Field { field, signed }) => Ok(ConcreteValue::Int {
                bits: field_bits(model, field)?,
                signed: *signed,
            }),
            ReadValue::Int(IntValue::Literal { bits, signed }) => Ok(ConcreteValue::Int {
                bits: bits.clone(),
                signed: *signed,
            }),
            ReadValue::Int(IntValue::ConstantSlice {
                data,
                offset,
                length,
                signed,
            }) => {
                let start = usize::try_from(offset.eval(model)?)
                    .map_err(|e| Error::Evaluation(e.to_string()))?;
                let len = usize::try_from(length.eval(model)?)
                    .map_err(|e| Error::Evaluation(e.to_string()))?;
                let bits = data.get(start..start + len).ok_or_else(|| {
                    Error::Evaluation(format!(
                        "range {}..{} is outside constant {}",
                        start,
                        start + len,
                        data
                    ))
                })?;
                Ok(ConcreteValue::Int {
                    bits: bits.to_string(),
                    signed: *signed,
                })
            }
            ReadValue::Bool(guard) => Ok(ConcreteValue::Bool(guard.eval(model)?)),
            ReadValue::Slice(slice) | ReadValue::Address { slice, .. } => {
                Ok(ConcreteValue::Bits(slice.concretize(model)?))
            }
            ReadValue::Coins(CoinsValue::Zero) => Ok(ConcreteValue::Bits("0000".to_string())),
            ReadValue::Coins(CoinsValue::Fields { length, grams }) => {
                let length_bits = field_bits(model, length)?;
                let bytes = bits_to_unsigned(&length_bits)? as usize;
                let grams_bits = field_bits(model, grams)?;
                let take = (bytes * 8).min(grams_bits.len());
                Ok(ConcreteValue::Bits(format!(
                    "{}{}",
                    length_bits,
                    &grams_bits[grams_bits.len() - take..]
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sized_reads() {
        assert_eq!(
            ReadKind::MaybeConstructorBit.size_bits(),
            Some(SizeExpr::constant(1))
        );
        assert_eq!(ReadKind::Coins.size_bits(), None);
        assert!(ReadKind::unsigned(0).is_empty_read().is_true());
        assert!(ReadKind::MsgAddr.is_empty_read().is_false());
    }

    #[test]
    fn test_signed_concrete_value() {
        let value = ConcreteValue::Int {
            bits: "1110".to_string(),
            signed: true,
        };
        assert_eq!(value.as_i128(), Some(-2));
        let value = ConcreteValue::Int {
            bits: "1110".to_string(),
            signed: false,
        };
        assert_eq!(value.as_i128(), Some(14));
    }

    #[test]
    fn test_slice_concat_flattens() {
        let a = SliceValue::Literal("10".into());
        let b = SliceValue::Literal("01".into());
        let joined = a.clone().concat(SliceValue::empty()).concat(b.clone());
        assert_eq!(joined, SliceValue::Concat(vec![a, b]));

        let model = crate::expr::Assignment::new();
        assert_eq!(
            ReadValue::Slice(joined).concretize(&model).unwrap(),
            ConcreteValue::Bits("1001".into())
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ReadKind::unsigned(8).to_string(), "uint(8)");
        assert_eq!(ReadKind::bit_array(3).to_string(), "bits(3)");
    }
}
