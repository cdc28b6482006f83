//! # Frame Automaton and Stack Orchestrator
//!
//! A [`Frame`] marks how far into one structure node a parse has advanced.
//! Frames are stacked: the top frame is the innermost composite level that has
//! been materialized, frames below it are the enclosing levels waiting for the
//! top to finish.
//!
//! [`TlbStack::step`] serves one read request and returns every structurally
//! possible outcome with the guard under which it holds. The caller forks once
//! per returned [`GuardedResult`]. Stacks are persistent: a step never mutates
//! the receiver, so branches that forked from one stack keep sharing it.
//!
//! Nothing below the top frame is expanded until a read actually needs it. A
//! composite label is entered only when the frame standing on it rejects a
//! read; the rejection is remembered so that, if every deeper attempt fails as
//! well, the shallowest diagnosis is the one reported.

pub mod constant;
pub mod known_type;
pub mod switch;
pub mod unknown;

use std::fmt;

use crate::analysis::VariantOracle;
use crate::config::TlbOptions;
use crate::error::{StructuralError, StructuralExit};
use crate::expr::{BoolExpr, Model, SizeExpr};
use crate::fields::Path;
use crate::plist::PersistentList;
use crate::read::{LoadRequest, ReadValue, SliceValue};
use crate::replay::{ConcreteReadInfo, FrameReplay};
use crate::schema::{Label, LabelId, Schema, Structure, StructureId};
use crate::{Error, Result};

pub use constant::{read_from_constant, ConstFrame};
pub use known_type::KnownTypeFrame;
pub use switch::{switch_guard, SwitchFrame};
pub use unknown::UnknownFrame;

/// Schema and variant analysis shared by every step of one analysis run.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// The schema being parsed against
    pub schema: &'a Schema,
    /// Switch variants reachable per recursion budget
    pub oracle: &'a dyn VariantOracle,
}

impl<'a> StepContext<'a> {
    /// Bundle a schema with its variant oracle
    pub fn new(schema: &'a Schema, oracle: &'a dyn VariantOracle) -> Self {
        Self { schema, oracle }
    }
}

impl fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("structures", &self.schema.structure_count())
            .finish()
    }
}

/// Position inside one structure node.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// At a known-type prefix
    KnownType(KnownTypeFrame),
    /// At a switch with several variants
    Switch(SwitchFrame),
    /// Inside a literal bit string
    Const(ConstFrame),
    /// Root of a parse without schema
    Unknown(UnknownFrame),
}

/// What a frame does with one read request.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Frame fully consumed
    EndOfFrame,
    /// Frame replaced by another
    NextFrame(Frame),
    /// Frame cannot serve the request; `None` when the label has no decoding rule
    StepError(Option<StructuralError>),
    /// Remainder of the request goes to the next frame down
    PassToNextFrame(LoadRequest),
}

/// One guarded outcome of [`Frame::step`].
///
/// For [`FrameOutcome::PassToNextFrame`], `value` is the slice consumed by
/// this frame before passing, or `None` if it cannot be expressed.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    /// Condition under which the outcome happens
    pub guard: BoolExpr,
    /// The outcome
    pub outcome: FrameOutcome,
    /// Decoded value, if any
    pub value: Option<ReadValue>,
}

impl FrameResult {
    /// Guarded outcome
    pub fn new(guard: BoolExpr, outcome: FrameOutcome, value: Option<ReadValue>) -> Self {
        Self {
            guard,
            outcome,
            value,
        }
    }
}

/// Outcome of [`TlbStack::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum StackStepResult {
    /// Read succeeded; the stack after it
    NewStack(TlbStack),
    /// Read violates the schema
    Error(StructuralError),
}

/// One guarded outcome of [`TlbStack::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedResult {
    /// Condition under which the outcome happens
    pub guard: BoolExpr,
    /// The outcome
    pub result: StackStepResult,
    /// Decoded value, if any
    pub value: Option<ReadValue>,
}

impl GuardedResult {
    fn new(guard: BoolExpr, result: StackStepResult, value: Option<ReadValue>) -> Self {
        Self {
            guard,
            result,
            value,
        }
    }

    /// The new stack, if the read succeeded
    pub fn stack(&self) -> Option<&TlbStack> {
        match &self.result {
            StackStepResult::NewStack(stack) => Some(stack),
            StackStepResult::Error(_) => None,
        }
    }

    /// The structural error, if the read failed
    pub fn error(&self) -> Option<&StructuralError> {
        match &self.result {
            StackStepResult::NewStack(_) => None,
            StackStepResult::Error(error) => Some(error),
        }
    }
}

/// Frame for the structure node `id`, or `None` when nothing is left to track.
pub fn build_frame_for_structure(
    schema: &Schema,
    id: StructureId,
    path: &Path,
    left_tlb_depth: u32,
) -> Result<Option<Frame>> {
    match schema.structure(id) {
        Structure::Unknown => {
            if path.level() != 0 {
                return Err(Error::MisplacedUnknown {
                    level: path.level(),
                });
            }
            Ok(Some(Frame::Unknown(UnknownFrame)))
        }
        Structure::Empty => Ok(None),
        Structure::LoadRef { rest, .. } => {
            build_frame_for_structure(schema, *rest, path, left_tlb_depth)
        }
        Structure::KnownTypePrefix { .. } => Ok(Some(Frame::KnownType(KnownTypeFrame::new(
            id,
            path.clone(),
            left_tlb_depth,
        )))),
        Structure::SwitchPrefix {
            switch_size,
            variants,
            ..
        } => match variants.as_slice() {
            [single] => Ok(Some(Frame::Const(ConstFrame::new(
                single.key.clone(),
                single.structure,
                SizeExpr::zero(),
                path.clone(),
                left_tlb_depth,
            )))),
            _ => Ok(Some(Frame::Switch(SwitchFrame::new(
                id,
                *switch_size,
                path.clone(),
                left_tlb_depth,
            )))),
        },
    }
}

/// `EndOfFrame` or `NextFrame` for the structure following a consumed one.
pub(crate) fn continuation(
    schema: &Schema,
    id: StructureId,
    path: &Path,
    left_tlb_depth: u32,
) -> Result<FrameOutcome> {
    Ok(match build_frame_for_structure(schema, id, path, left_tlb_depth)? {
        Some(frame) => FrameOutcome::NextFrame(frame),
        None => FrameOutcome::EndOfFrame,
    })
}

/// True if the structure holds no data and no frame is built for it.
pub(crate) fn is_trivially_empty(schema: &Schema, id: StructureId) -> bool {
    match schema.structure(id) {
        Structure::Empty => true,
        Structure::LoadRef { rest, .. } => is_trivially_empty(schema, *rest),
        _ => false,
    }
}

impl Frame {
    /// Every structurally possible way to serve `request` from this frame
    pub fn step(&self, ctx: &StepContext<'_>, request: &LoadRequest) -> Result<Vec<FrameResult>> {
        match self {
            Frame::KnownType(frame) => frame.step(ctx, request),
            Frame::Switch(frame) => frame.step(ctx, request),
            Frame::Const(frame) => frame.step(ctx.schema, request),
            Frame::Unknown(frame) => Ok(frame.step()),
        }
    }

    /// One more nesting level, entering the composite label at this position
    pub fn expand_new_stack_frame(&self, schema: &Schema) -> Result<Option<Frame>> {
        match self {
            Frame::KnownType(frame) => frame.expand_new_stack_frame(schema),
            Frame::Switch(_) | Frame::Const(_) | Frame::Unknown(_) => Ok(None),
        }
    }

    /// Whether the frame can be advanced past without a read
    pub fn is_skippable(&self) -> bool {
        matches!(self, Frame::KnownType(_) | Frame::Const(_))
    }

    /// Frame after this one when it is skipped, `None` if nothing follows
    pub fn skip_label(&self, schema: &Schema) -> Result<Option<Frame>> {
        match self {
            Frame::KnownType(frame) => frame.skip_label(schema),
            Frame::Const(frame) => frame.skip_label(schema),
            Frame::Switch(_) | Frame::Unknown(_) => Err(Error::internal(format!(
                "{} frame cannot be skipped",
                self.kind()
            ))),
        }
    }

    /// Deterministic counterpart of [`Frame::step`]: the literal bits the
    /// model assigns to this frame and the frames replacing it
    pub fn read_in_model(
        &self,
        ctx: &StepContext<'_>,
        model: &dyn Model,
        info: &ConcreteReadInfo,
    ) -> Result<FrameReplay> {
        match self {
            Frame::KnownType(frame) => frame.read_in_model(ctx, model, info),
            Frame::Switch(frame) => frame.read_in_model(ctx, model, info),
            Frame::Const(frame) => frame.read_in_model(ctx.schema, model, info),
            Frame::Unknown(frame) => frame.read_in_model(model, info),
        }
    }

    /// Composite occurrences entered to reach this frame
    pub fn path(&self) -> Path {
        match self {
            Frame::KnownType(frame) => frame.path().clone(),
            Frame::Switch(frame) => frame.path().clone(),
            Frame::Const(frame) => frame.path().clone(),
            Frame::Unknown(_) => Path::root(),
        }
    }

    /// Remaining recursion budget
    pub fn left_tlb_depth(&self) -> u32 {
        match self {
            Frame::KnownType(frame) => frame.left_tlb_depth(),
            Frame::Switch(frame) => frame.left_tlb_depth(),
            Frame::Const(frame) => frame.left_tlb_depth(),
            Frame::Unknown(_) => 0,
        }
    }

    /// Short name of the frame kind
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::KnownType(_) => "known-type",
            Frame::Switch(_) => "switch",
            Frame::Const(_) => "const",
            Frame::Unknown(_) => "unknown",
        }
    }

    fn label(&self, schema: &Schema) -> Option<LabelId> {
        match self {
            Frame::KnownType(frame) => frame.label(schema).ok(),
            _ => None,
        }
    }
}

/// Parsing stack of one cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlbStack {
    frames: PersistentList<Frame>,
    deepest_error: Option<StructuralError>,
}

impl TlbStack {
    /// Fresh stack for a cell of composite label `label`
    pub fn new(schema: &Schema, label: LabelId, options: &TlbOptions) -> Result<Self> {
        let body = schema
            .internal_structure(label)
            .ok_or_else(|| Error::MissingStructure {
                name: schema.label_name(label),
            })?;
        let frame = build_frame_for_structure(schema, body, &Path::root(), options.max_tlb_depth)?;
        Ok(Self::from_frames(frame))
    }

    /// Stack holding `frames`, the last one on top
    pub fn from_frames<I: IntoIterator<Item = Frame>>(frames: I) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            deepest_error: None,
        }
    }

    /// True once the schema is fully consumed
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost frame
    pub fn top(&self) -> Option<&Frame> {
        self.frames.peek()
    }

    /// Frames, outermost first
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.to_vec()
    }

    /// Remembered diagnosis of a failed shallower attempt
    pub fn deepest_error(&self) -> Option<&StructuralError> {
        self.deepest_error.as_ref()
    }

    /// Every structurally possible outcome of `request` against this stack
    pub fn step(&self, ctx: &StepContext<'_>, request: &LoadRequest) -> Result<Vec<GuardedResult>> {
        let empty_read = request.kind.is_empty_read();
        let non_empty_read = empty_read.not();

        let mut result = vec![GuardedResult::new(
            empty_read,
            StackStepResult::NewStack(self.clone()),
            None,
        )];

        let Some(top) = self.frames.peek() else {
            tracing::debug!("read of {} after the end of the schema", request.kind);
            result.push(GuardedResult::new(
                non_empty_read,
                StackStepResult::Error(StructuralError::new(
                    StructuralExit::UnexpectedDataReading {
                        read: request.kind.clone(),
                    },
                )),
                None,
            ));
            result.retain(|r| !r.guard.is_false());
            return Ok(result);
        };
        let below = self.frames.pop();

        for FrameResult {
            guard,
            outcome,
            value,
        } in top.step(ctx, request)?
        {
            if guard.is_false() {
                continue;
            }

            match outcome {
                FrameOutcome::EndOfFrame => {
                    let frames = pop_frames(ctx.schema, &below)?;
                    result.push(GuardedResult::new(
                        guard.and(&non_empty_read),
                        StackStepResult::NewStack(TlbStack {
                            frames,
                            deepest_error: self.deepest_error.clone(),
                        }),
                        value,
                    ));
                }

                FrameOutcome::NextFrame(frame) => {
                    result.push(GuardedResult::new(
                        guard.and(&non_empty_read),
                        StackStepResult::NewStack(TlbStack {
                            frames: below.push(frame),
                            deepest_error: self.deepest_error.clone(),
                        }),
                        value,
                    ));
                }

                FrameOutcome::StepError(error) => match top.expand_new_stack_frame(ctx.schema)? {
                    Some(deeper) => {
                        tracing::debug!(
                            "expanding {} frame at tlb level {} for {}",
                            top.kind(),
                            top.path().level(),
                            request.kind
                        );
                        let stack = TlbStack {
                            frames: self.frames.push(deeper),
                            deepest_error: self.deepest_error.clone().or(error),
                        };
                        for inner in stack.step(ctx, request)? {
                            result.push(GuardedResult::new(
                                BoolExpr::all([guard.clone(), inner.guard, non_empty_read.clone()]),
                                inner.result,
                                inner.value,
                            ));
                        }
                    }
                    None => {
                        let error = match self.deepest_error.clone().or(error) {
                            Some(error) => error,
                            None => return Err(uninterpretable(ctx.schema, top)),
                        };
                        tracing::debug!("structural error: {}", error);
                        result.push(GuardedResult::new(
                            guard.and(&non_empty_read),
                            StackStepResult::Error(error),
                            None,
                        ));
                    }
                },

                FrameOutcome::PassToNextFrame(next_request) => {
                    let frames = pop_frames(ctx.schema, &self.frames)?;
                    let stack = TlbStack {
                        frames,
                        deepest_error: self.deepest_error.clone(),
                    };
                    for inner in stack.step(ctx, &next_request)? {
                        result.push(GuardedResult::new(
                            BoolExpr::all([guard.clone(), inner.guard, non_empty_read.clone()]),
                            inner.result,
                            join_values(value.clone(), inner.value),
                        ));
                    }
                }
            }
        }

        result.retain(|r| !r.guard.is_false());

        tracing::trace!(
            "tlb stack step: {} read at {} frame, {} outcomes",
            request.kind,
            top.kind(),
            result.len()
        );

        Ok(result)
    }

    /// Stack with its top frame skipped, `None` if the stack is empty or the
    /// top frame cannot be skipped
    pub fn skip_top(&self, schema: &Schema) -> Result<Option<TlbStack>> {
        match self.frames.peek() {
            Some(top) if top.is_skippable() => {
                let next = top.skip_label(schema)?;
                let below = self.frames.pop();
                let frames = match next {
                    Some(frame) => below.push(frame),
                    None => pop_frames(schema, &below)?,
                };
                Ok(Some(TlbStack {
                    frames,
                    deepest_error: self.deepest_error.clone(),
                }))
            }
            _ => Ok(None),
        }
    }

    pub(crate) fn with_frames(frames: PersistentList<Frame>) -> Self {
        Self {
            frames,
            deepest_error: None,
        }
    }

    pub(crate) fn frame_list(&self) -> &PersistentList<Frame> {
        &self.frames
    }
}

/// Skip backward through `frames`, dropping every frame that is finished.
pub(crate) fn pop_frames(
    schema: &Schema,
    frames: &PersistentList<Frame>,
) -> Result<PersistentList<Frame>> {
    let mut frames = frames.clone();
    loop {
        let Some(top) = frames.peek() else {
            return Ok(frames);
        };
        if !top.is_skippable() {
            return Err(Error::internal(format!(
                "{} frame below the top of the stack cannot be skipped",
                top.kind()
            )));
        }
        let next = top.skip_label(schema)?;
        let below = frames.pop();
        match next {
            Some(frame) => return Ok(below.push(frame)),
            None => frames = below,
        }
    }
}

fn join_values(consumed: Option<ReadValue>, rest: Option<ReadValue>) -> Option<ReadValue> {
    match (consumed, rest) {
        (Some(ReadValue::Slice(prefix)), rest) if prefix.is_empty_literal() => rest,
        (Some(ReadValue::Slice(prefix)), Some(ReadValue::Slice(tail))) => {
            Some(ReadValue::Slice(prefix.concat(tail)))
        }
        _ => None,
    }
}

/// Pass-through value of a frame that consumed nothing
pub(crate) fn nothing_consumed() -> Option<ReadValue> {
    Some(ReadValue::Slice(SliceValue::empty()))
}

fn uninterpretable(schema: &Schema, frame: &Frame) -> Error {
    match frame.label(schema) {
        Some(label) => {
            let reason = match schema.label(label) {
                Label::Composite(_) => "recursion budget exhausted",
                Label::Atomic(_) => "label has no built-in decoding rule",
            };
            Error::UninterpretableLabel {
                label: schema.label_name(label),
                reason: reason.to_string(),
            }
        }
        None => Error::UninterpretableLabel {
            label: frame.kind().to_string(),
            reason: "frame rejected the read without a diagnosis".to_string(),
        },
    }
}
