//! Frame standing on a switch prefix with several variants

use crate::error::{StructuralError, StructuralExit};
use crate::expr::{BoolExpr, Model, SizeExpr};
use crate::fields::{CellAddress, Path, TlbField};
use crate::read::LoadRequest;
use crate::replay::{ConcreteReadInfo, FrameReplay};
use crate::schema::{StructureId, SwitchVariant};
use crate::{Error, Result};

use super::{
    build_frame_for_structure, continuation, read_from_constant, ConstFrame, Frame, FrameOutcome,
    FrameResult, StepContext,
};

/// Position at a discriminator selecting one of several continuations.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchFrame {
    id: StructureId,
    switch_size: u32,
    path: Path,
    left_tlb_depth: u32,
}

impl SwitchFrame {
    /// Frame for switch prefix `id` of width `switch_size`
    pub fn new(id: StructureId, switch_size: u32, path: Path, left_tlb_depth: u32) -> Self {
        Self {
            id,
            switch_size,
            path,
            left_tlb_depth,
        }
    }

    /// The backing switch node
    pub fn structure_id(&self) -> StructureId {
        self.id
    }

    /// Position of the enclosing label
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remaining recursion budget
    pub fn left_tlb_depth(&self) -> u32 {
        self.left_tlb_depth
    }

    pub(crate) fn step(&self, ctx: &StepContext<'_>, request: &LoadRequest) -> Result<Vec<FrameResult>> {
        let Some(read_size) = request.kind.size_bits() else {
            return Ok(vec![FrameResult::new(
                BoolExpr::TRUE,
                FrameOutcome::StepError(Some(StructuralError::new(
                    StructuralExit::ReadingSwitchWithUnexpectedType {
                        read: request.kind.clone(),
                    },
                ))),
                None,
            )]);
        };

        let variants = ctx.oracle.possible_variants(self.id, self.left_tlb_depth)?;
        let switch_size = SizeExpr::from(self.switch_size);

        let mut result = vec![FrameResult::new(
            BoolExpr::gt(&read_size, &switch_size),
            FrameOutcome::StepError(Some(StructuralError::new(
                StructuralExit::ReadingOutOfSwitchBounds {
                    read: request.kind.clone(),
                },
            ))),
            None,
        )];

        let full_read = BoolExpr::eq(&read_size, &switch_size);
        let partial_read = BoolExpr::lt(&read_size, &switch_size);

        for (idx, variant) in variants.iter().enumerate() {
            let guard = switch_guard(self.id, idx, &variants, request.address, &self.path);
            let value = read_from_constant(&request.kind, &SizeExpr::zero(), &variant.key);

            result.push(FrameResult::new(
                full_read.and(&guard),
                continuation(ctx.schema, variant.structure, &self.path, self.left_tlb_depth)?,
                value.clone(),
            ));

            result.push(FrameResult::new(
                partial_read.and(&guard),
                FrameOutcome::NextFrame(Frame::Const(ConstFrame::new(
                    variant.key.clone(),
                    variant.structure,
                    read_size.clone(),
                    self.path.clone(),
                    self.left_tlb_depth,
                ))),
                value,
            ));
        }

        Ok(result)
    }

    pub(crate) fn read_in_model(
        &self,
        ctx: &StepContext<'_>,
        model: &dyn Model,
        info: &ConcreteReadInfo,
    ) -> Result<FrameReplay> {
        let variants = ctx.oracle.possible_variants(self.id, self.left_tlb_depth)?;
        for (idx, variant) in variants.iter().enumerate() {
            let guard = switch_guard(self.id, idx, &variants, info.address, &self.path);
            if guard.eval(model)? {
                let info = info.consume(self.switch_size as usize, "switch discriminator")?;
                let frames = build_frame_for_structure(
                    ctx.schema,
                    variant.structure,
                    &self.path,
                    self.left_tlb_depth,
                )?;
                return Ok(FrameReplay::new(
                    variant.key.clone(),
                    info,
                    frames.into_iter().collect(),
                ));
            }
        }
        Err(Error::inconsistency(format!(
            "no variant of switch {} holds in the model",
            self.id
        )))
    }
}

/// Guard selecting variant `idx` of `variants` at switch `switch`.
///
/// The discriminator is the switch field's index into `variants`; every index
/// past the last variant selects the last one so that the guards are
/// exhaustive over the field.
pub fn switch_guard(
    switch: StructureId,
    idx: usize,
    variants: &[SwitchVariant],
    address: CellAddress,
    path: &Path,
) -> BoolExpr {
    let field = TlbField::switch(
        switch,
        path.clone(),
        variants.iter().map(|variant| variant.structure).collect(),
    )
    .at(address);
    let value = SizeExpr::field(field);
    let index = SizeExpr::constant(idx as i64);
    if idx + 1 == variants.len() {
        BoolExpr::ge(&value, &index)
    } else {
        BoolExpr::eq(&value, &index)
    }
}
