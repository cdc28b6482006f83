//! Root frame of a cell without schema

use crate::expr::{field_bits, BoolExpr, Model};
use crate::fields::{Path, TlbField};
use crate::replay::{ConcreteReadInfo, FrameReplay};
use crate::schema::UNKNOWN_STRUCTURE;
use crate::Result;

use super::{Frame, FrameOutcome, FrameResult};

/// Accepts every read; the cell content is one opaque block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownFrame;

impl UnknownFrame {
    pub(crate) fn step(&self) -> Vec<FrameResult> {
        vec![FrameResult::new(
            BoolExpr::TRUE,
            FrameOutcome::NextFrame(Frame::Unknown(*self)),
            None,
        )]
    }

    pub(crate) fn read_in_model(&self, model: &dyn Model, info: &ConcreteReadInfo) -> Result<FrameReplay> {
        let field = TlbField::unknown(UNKNOWN_STRUCTURE, Path::root()).at(info.address);
        let data = field_bits(model, &field)?;
        let bits: String = data.chars().take(info.left_bits as usize).collect();
        Ok(FrameReplay::new(
            bits,
            ConcreteReadInfo::new(info.address, 0),
            Vec::new(),
        ))
    }
}
