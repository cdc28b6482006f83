//! Frame inside a literal bit string

use crate::error::{StructuralError, StructuralExit};
use crate::expr::{BoolExpr, Model, SizeExpr};
use crate::fields::Path;
use crate::read::{CoinsValue, IntValue, LoadRequest, ReadKind, ReadValue, SliceValue};
use crate::replay::{ConcreteReadInfo, FrameReplay};
use crate::schema::{Schema, StructureId};
use crate::{Error, Result};

use super::{build_frame_for_structure, continuation, Frame, FrameOutcome, FrameResult};

/// Literal `data` read up to `offset`, followed by structure `next`.
///
/// Built for a single-variant switch at offset zero, or for a switch whose
/// discriminator was read only partially.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstFrame {
    data: String,
    next: StructureId,
    offset: SizeExpr,
    path: Path,
    left_tlb_depth: u32,
}

impl ConstFrame {
    /// Frame reading `data` from `offset`, then continuing at `next`
    pub fn new(
        data: String,
        next: StructureId,
        offset: SizeExpr,
        path: Path,
        left_tlb_depth: u32,
    ) -> Self {
        Self {
            data,
            next,
            offset,
            path,
            left_tlb_depth,
        }
    }

    /// The literal
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Bits of the literal already read
    pub fn offset(&self) -> &SizeExpr {
        &self.offset
    }

    /// Position of the enclosing label
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remaining recursion budget
    pub fn left_tlb_depth(&self) -> u32 {
        self.left_tlb_depth
    }

    fn concrete_offset(&self) -> Option<usize> {
        self.offset.as_const().and_then(|o| usize::try_from(o).ok())
    }

    /// The four literal bits at a concrete offset are all zero
    fn zero_coins_ahead(&self) -> bool {
        self.concrete_offset()
            .and_then(|start| self.data.get(start..(start + 4).min(self.data.len())))
            == Some("0000")
    }

    pub(crate) fn step(&self, schema: &Schema, request: &LoadRequest) -> Result<Vec<FrameResult>> {
        let left_bits = SizeExpr::constant(self.data.len() as i64).sub(&self.offset);

        let read_size = match request.kind.size_bits() {
            Some(size) => size,
            None if request.kind == ReadKind::Coins && self.zero_coins_ahead() => {
                SizeExpr::constant(4)
            }
            None => {
                return Ok(vec![FrameResult::new(
                    BoolExpr::TRUE,
                    FrameOutcome::StepError(Some(StructuralError::new(
                        StructuralExit::ReadingSwitchWithUnexpectedType {
                            read: request.kind.clone(),
                        },
                    ))),
                    None,
                )])
            }
        };

        let next = continuation(schema, self.next, &self.path, self.left_tlb_depth)?;
        let value = read_from_constant(&request.kind, &self.offset, &self.data);

        let advanced = ConstFrame {
            offset: self.offset.add(&read_size),
            ..self.clone()
        };

        let mut result = vec![
            FrameResult::new(
                BoolExpr::lt(&read_size, &left_bits),
                FrameOutcome::NextFrame(Frame::Const(advanced)),
                value.clone(),
            ),
            FrameResult::new(BoolExpr::eq(&read_size, &left_bits), next, value),
        ];

        let oversized = BoolExpr::gt(&read_size, &left_bits);
        if let ReadKind::BitArray { .. } = request.kind {
            let rest = self
                .concrete_offset()
                .and_then(|start| self.data.get(start..))
                .map(|bits| ReadValue::Slice(SliceValue::Literal(bits.to_string())));
            result.push(FrameResult::new(
                oversized,
                FrameOutcome::PassToNextFrame(
                    request.with_kind(ReadKind::bit_array(read_size.sub(&left_bits))),
                ),
                rest,
            ));
        } else {
            result.push(FrameResult::new(
                oversized,
                FrameOutcome::StepError(Some(StructuralError::new(
                    StructuralExit::ReadingOutOfSwitchBounds {
                        read: request.kind.clone(),
                    },
                ))),
                None,
            ));
        }

        Ok(result)
    }

    pub(crate) fn skip_label(&self, schema: &Schema) -> Result<Option<Frame>> {
        build_frame_for_structure(schema, self.next, &self.path, self.left_tlb_depth)
    }

    pub(crate) fn read_in_model(
        &self,
        schema: &Schema,
        model: &dyn Model,
        info: &ConcreteReadInfo,
    ) -> Result<FrameReplay> {
        let start = usize::try_from(self.offset.eval(model)?)
            .map_err(|e| Error::Evaluation(e.to_string()))?;
        let bits = self.data.get(start..).ok_or_else(|| {
            Error::replay(format!("offset {} is past the literal {}", start, self.data))
        })?;
        let info = info.consume(bits.len(), "literal")?;
        let frames = self.skip_label(schema)?.into_iter().collect();
        Ok(FrameReplay::new(bits.to_string(), info, frames))
    }
}

/// Value of a `kind` read from the literal `data` at `offset`, `None` when it
/// cannot be determined.
pub fn read_from_constant(kind: &ReadKind, offset: &SizeExpr, data: &str) -> Option<ReadValue> {
    let start = offset.as_const().and_then(|o| usize::try_from(o).ok());
    match kind {
        ReadKind::Integer {
            size_bits, signed, ..
        } => {
            let literal = start.zip(size_bits.as_const()).and_then(|(start, size)| {
                let size = usize::try_from(size).ok()?;
                data.get(start..start + size)
            });
            Some(ReadValue::Int(match literal {
                Some(bits) => IntValue::Literal {
                    bits: bits.to_string(),
                    signed: *signed,
                },
                None => IntValue::ConstantSlice {
                    data: data.to_string(),
                    offset: offset.clone(),
                    length: size_bits.clone(),
                    signed: *signed,
                },
            }))
        }
        ReadKind::MaybeConstructorBit => Some(ReadValue::Bool(match start {
            Some(start) => {
                BoolExpr::constant(data.get(start..).map_or(false, |rest| rest.starts_with('1')))
            }
            None => BoolExpr::any(
                data.char_indices()
                    .filter(|(_, bit)| *bit == '1')
                    .map(|(pos, _)| BoolExpr::eq(offset, &SizeExpr::constant(pos as i64))),
            ),
        })),
        ReadKind::BitArray { size_bits } => {
            let size = usize::try_from(size_bits.as_const()?).ok()?;
            let start = start?;
            data.get(start..start + size)
                .map(|bits| ReadValue::Slice(SliceValue::Literal(bits.to_string())))
        }
        ReadKind::Coins => {
            let start = start?;
            (data.get(start..(start + 4).min(data.len())) == Some("0000"))
                .then_some(ReadValue::Coins(CoinsValue::Zero))
        }
        ReadKind::MsgAddr => None,
    }
}
