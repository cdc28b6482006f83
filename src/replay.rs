//! # Model Replay
//!
//! Once the solver has produced a model for a finished branch, the same frame
//! graph is walked again, this time deterministically: every guard is
//! evaluated under the model and the single branch that holds is followed.
//! The result is the literal bit string of the cell together with the
//! out-of-line slices that were traversed, which is what counterexample
//! rendering needs.
//!
//! Replay never forks. A model under which no guard holds means the path
//! condition and the model disagree, and replay stops with
//! [`Error::ModelInconsistency`].

use crate::analysis::VariantOracle;
use crate::config::TlbOptions;
use crate::expr::Model;
use crate::fields::{CellAddress, FieldRef};
use crate::schema::{LabelId, Schema};
use crate::stack::{pop_frames, Frame, StepContext, TlbStack};
use crate::{Error, Result};

/// Cell being replayed and the number of its data bits not yet produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcreteReadInfo {
    /// Replayed cell
    pub address: CellAddress,
    /// Data bits left
    pub left_bits: u32,
}

impl ConcreteReadInfo {
    /// Budget of `left_bits` data bits in `address`
    pub fn new(address: CellAddress, left_bits: u32) -> Self {
        Self { address, left_bits }
    }

    /// Budget after producing `bits` more bits of `what`
    pub(crate) fn consume(&self, bits: usize, what: &str) -> Result<Self> {
        let bits = u32::try_from(bits).map_err(|e| Error::replay(e.to_string()))?;
        let left_bits = self.left_bits.checked_sub(bits).ok_or_else(|| {
            Error::replay(format!(
                "{} needs {} bits but only {} are left in {}",
                what, bits, self.left_bits, self.address
            ))
        })?;
        Ok(Self {
            address: self.address,
            left_bits,
        })
    }
}

/// Result of replaying one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReplay {
    /// Literal bits produced
    pub bits: String,
    /// Budget after them
    pub info: ConcreteReadInfo,
    /// Frames replacing the replayed one, innermost last; empty when it is done
    pub frames: Vec<Frame>,
    /// Out-of-line slices read
    pub slices: Vec<FieldRef>,
}

impl FrameReplay {
    /// Replay that read no slices
    pub fn new(bits: String, info: ConcreteReadInfo, frames: Vec<Frame>) -> Self {
        Self {
            bits,
            info,
            frames,
            slices: Vec::new(),
        }
    }
}

/// Result of replaying the top frame of a stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackReplay {
    /// Literal bits produced
    pub bits: String,
    /// Budget after them
    pub info: ConcreteReadInfo,
    /// The stack after the replayed frame
    pub stack: TlbStack,
    /// Out-of-line slices read
    pub slices: Vec<FieldRef>,
}

/// Full literal content of a cell under a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Data bits, in cell order
    pub bits: String,
    /// Out-of-line slices traversed, in cell order
    pub slices: Vec<FieldRef>,
}

impl TlbStack {
    /// Replay the top frame under `model`
    pub fn read_in_model(
        &self,
        ctx: &StepContext<'_>,
        model: &dyn Model,
        info: &ConcreteReadInfo,
    ) -> Result<StackReplay> {
        let top = self
            .top()
            .ok_or_else(|| Error::replay("replay of an already consumed stack"))?;
        let replay = top.read_in_model(ctx, model, info)?;

        let below = self.frame_list().pop();
        let frames = if replay.frames.is_empty() {
            pop_frames(ctx.schema, &below)?
        } else {
            replay
                .frames
                .into_iter()
                .fold(below, |frames, frame| frames.push(frame))
        };

        Ok(StackReplay {
            bits: replay.bits,
            info: replay.info,
            stack: TlbStack::with_frames(frames),
            slices: replay.slices,
        })
    }
}

/// Literal content of the cell at `address` parsed as composite `label`.
///
/// The cell's data length is taken from the model.
pub fn read_in_model_from_tlb_fields(
    schema: &Schema,
    oracle: &dyn VariantOracle,
    model: &dyn Model,
    address: CellAddress,
    label: LabelId,
    options: &TlbOptions,
) -> Result<ReplayOutcome> {
    let ctx = StepContext::new(schema, oracle);
    let length = model.data_length(address).ok_or_else(|| {
        Error::inconsistency(format!("model assigns no data length to {}", address))
    })?;

    let mut stack = TlbStack::new(schema, label, options)?;
    let mut info = ConcreteReadInfo::new(address, length);
    let mut outcome = ReplayOutcome {
        bits: String::new(),
        slices: Vec::new(),
    };

    while !stack.is_empty() {
        let replay = stack.read_in_model(&ctx, model, &info)?;
        outcome.bits.push_str(&replay.bits);
        outcome.slices.extend(replay.slices);
        info = replay.info;
        stack = replay.stack;
    }

    if info.left_bits > 0 {
        tracing::debug!(
            "replay of {} left {} data bits after the schema",
            address,
            info.left_bits
        );
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CalculatedTlbInfo;
    use crate::expr::Assignment;
    use crate::fields::{Path, TlbField};
    use crate::schema::SchemaBuilder;

    #[test]
    fn test_consume_checks_budget() {
        let info = ConcreteReadInfo::new(CellAddress(1), 5);
        assert_eq!(info.consume(3, "x").unwrap().left_bits, 2);
        assert!(matches!(
            info.consume(6, "x"),
            Err(Error::ReplayMismatch(_))
        ));
    }

    #[test]
    fn test_replay_pair_of_integers() {
        let mut builder = SchemaBuilder::new();
        let pair = builder.declare("Pair").unwrap();
        let u8_label = builder.uint(8);
        let u4_label = builder.uint(4);
        let second = builder.known_type(pair, u4_label, vec![], builder.empty());
        let first = builder.known_type(pair, u8_label, vec![], second);
        builder.define(pair, first).unwrap();
        let schema = builder.finish().unwrap();
        let options = TlbOptions::default();
        let info = CalculatedTlbInfo::new(&schema, &options).unwrap();

        let address = CellAddress(3);
        let mut model = Assignment::new();
        model
            .set_unsigned(TlbField::concrete(8, first, Path::root()).at(address), 0xA5)
            .unwrap()
            .set_unsigned(TlbField::concrete(4, second, Path::root()).at(address), 0x3)
            .unwrap()
            .set_data_length(address, 12);

        let outcome =
            read_in_model_from_tlb_fields(&schema, &info, &model, address, pair, &options).unwrap();
        assert_eq!(outcome.bits, "101001010011");
        assert!(outcome.slices.is_empty());
    }

    #[test]
    fn test_missing_data_length() {
        let mut builder = SchemaBuilder::new();
        let unit = builder.declare("Unit").unwrap();
        builder.define(unit, builder.empty()).unwrap();
        let schema = builder.finish().unwrap();
        let options = TlbOptions::default();
        let info = CalculatedTlbInfo::new(&schema, &options).unwrap();

        let result = read_in_model_from_tlb_fields(
            &schema,
            &info,
            &Assignment::new(),
            CellAddress(1),
            unit,
            &options,
        );
        assert!(matches!(result, Err(Error::ModelInconsistency(_))));
    }
}
