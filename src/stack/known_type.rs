//! Frame standing on a known-type prefix

use crate::error::{StructuralError, StructuralExit};
use crate::expr::{field_bits, BoolExpr, Model, SizeExpr};
use crate::fields::{CellAddress, FieldRef, Path, TlbField};
use crate::read::{CoinsValue, IntValue, LoadRequest, ReadKind, ReadValue, SliceValue};
use crate::replay::{ConcreteReadInfo, FrameReplay};
use crate::schema::labels::{self, fixed_size};
use crate::schema::{AtomicLabel, BuiltinComposite, Label, LabelId, Schema, Structure, StructureId};
use crate::{Error, Result};

use super::{
    build_frame_for_structure, continuation, is_trivially_empty, nothing_consumed, switch_guard,
    Frame, FrameOutcome, FrameResult, StepContext,
};

/// Position at one instance of a label, followed by the prefix's `rest`.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownTypeFrame {
    id: StructureId,
    path: Path,
    left_tlb_depth: u32,
}

struct Prefix<'s> {
    label: LabelId,
    type_arg_ids: &'s [StructureId],
    rest: StructureId,
}

impl KnownTypeFrame {
    /// Frame for known-type prefix `id`
    pub fn new(id: StructureId, path: Path, left_tlb_depth: u32) -> Self {
        Self {
            id,
            path,
            left_tlb_depth,
        }
    }

    /// The backing structure node
    pub fn structure_id(&self) -> StructureId {
        self.id
    }

    /// Position of the enclosing label
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Nesting levels still allowed below this frame
    pub fn left_tlb_depth(&self) -> u32 {
        self.left_tlb_depth
    }

    /// Label read at this position
    pub fn label(&self, schema: &Schema) -> Result<LabelId> {
        Ok(self.prefix(schema)?.label)
    }

    fn prefix<'s>(&self, schema: &'s Schema) -> Result<Prefix<'s>> {
        match schema.structure(self.id) {
            Structure::KnownTypePrefix {
                label,
                type_arg_ids,
                rest,
                ..
            } => Ok(Prefix {
                label: *label,
                type_arg_ids,
                rest: *rest,
            }),
            other => Err(Error::internal(format!(
                "known-type frame over {} which is {:?}",
                self.id, other
            ))),
        }
    }

    pub(crate) fn step(&self, ctx: &StepContext<'_>, request: &LoadRequest) -> Result<Vec<FrameResult>> {
        let schema = ctx.schema;
        let prefix = self.prefix(schema)?;
        let definition = schema.label(prefix.label);

        if !definition.is_builtin() {
            if let Label::Composite(composite) = definition {
                if composite
                    .structure
                    .map_or(false, |body| is_trivially_empty(schema, body))
                {
                    return Ok(vec![FrameResult::new(
                        BoolExpr::TRUE,
                        FrameOutcome::PassToNextFrame(request.clone()),
                        nothing_consumed(),
                    )]);
                }
            }
            return Ok(vec![FrameResult::new(
                BoolExpr::TRUE,
                FrameOutcome::StepError(None),
                None,
            )]);
        }

        let args = type_args(schema, prefix.type_arg_ids, request.address, &self.path)?;
        let frame_is_empty = labels::is_empty_label(schema, prefix.label, &args);

        let pass = match &request.kind {
            ReadKind::BitArray { size_bits } => {
                labels::pass_bit_array_read(schema, prefix.label, &args, size_bits)
            }
            _ => None,
        };
        let continue_on_next_frame = match &pass {
            Some(pass) => pass.guard.or(&frame_is_empty),
            None => frame_is_empty.clone(),
        };

        let accept = labels::accepts(schema, prefix.label, &args, &request.kind);
        let next = continuation(schema, prefix.rest, &self.path, self.left_tlb_depth)?;

        let error = StructuralError::new(StructuralExit::ReadingOfUnexpectedType {
            expected: prefix.label,
            expected_name: schema.label_name(prefix.label),
            args: args.iter().map(ToString::to_string).collect(),
            actual: request.kind.clone(),
        });

        let value = self.extract_value(ctx, prefix.label, &request.kind, request.address)?;

        let stays = continue_on_next_frame.not();
        let mut result = vec![
            FrameResult::new(
                frame_is_empty,
                FrameOutcome::PassToNextFrame(request.clone()),
                nothing_consumed(),
            ),
            FrameResult::new(stays.and(&accept), next, value),
            FrameResult::new(
                stays.and(&accept.not()),
                FrameOutcome::StepError(Some(error)),
                None,
            ),
        ];

        if let Some(pass) = pass {
            result.push(FrameResult::new(
                pass.guard,
                FrameOutcome::PassToNextFrame(request.with_kind(ReadKind::bit_array(pass.left_bits))),
                self.consumed_slice(schema, prefix.label, request.address)
                    .map(ReadValue::Slice),
            ));
        }

        Ok(result)
    }

    /// Decoded value of an accepted read, `None` when the read kind carries
    /// no value for this label
    fn extract_value(
        &self,
        ctx: &StepContext<'_>,
        label: LabelId,
        read: &ReadKind,
        address: CellAddress,
    ) -> Result<Option<ReadValue>> {
        let schema = ctx.schema;
        let value = match schema.label(label) {
            Label::Atomic(atomic) => match (atomic, read) {
                (AtomicLabel::Integer { size, .. }, ReadKind::Integer { signed, .. }) => {
                    Some(ReadValue::Int(IntValue::Field {
                        field: self.concrete_field(*size, address),
                        signed: *signed,
                    }))
                }
                (AtomicLabel::Integer { size, .. }, ReadKind::MaybeConstructorBit) => {
                    let bit = SizeExpr::field(self.concrete_field(*size, address));
                    Some(ReadValue::Bool(BoolExpr::eq(&bit, &SizeExpr::constant(1))))
                }
                (AtomicLabel::VarInteger { upper_bound, .. }, ReadKind::Integer { signed, .. }) => {
                    Some(ReadValue::Int(IntValue::Field {
                        field: TlbField::symbolic(*upper_bound, self.id, self.path.clone())
                            .at(address),
                        signed: *signed,
                    }))
                }
                (AtomicLabel::AddressByRef { .. }, ReadKind::MsgAddr) => Some(ReadValue::Address {
                    length: None,
                    slice: self.ref_slice(address),
                }),
                (_, ReadKind::BitArray { .. }) => {
                    self.consumed_slice(schema, label, address).map(ReadValue::Slice)
                }
                _ => None,
            },
            Label::Composite(composite) => match (composite.builtin, read) {
                (Some(BuiltinComposite::Coins), ReadKind::Coins) => {
                    self.coins_value(schema, label, address)?
                }
                (
                    Some(BuiltinComposite::FullMsgAddr | BuiltinComposite::BasicMsgAddr),
                    ReadKind::MsgAddr | ReadKind::BitArray { .. },
                ) => {
                    let (slice, length) = self.address_slice(schema, label, address)?;
                    match read {
                        ReadKind::MsgAddr => Some(ReadValue::Address {
                            length: Some(SizeExpr::from(length)),
                            slice,
                        }),
                        _ => Some(ReadValue::Slice(slice)),
                    }
                }
                (Some(BuiltinComposite::MaybeRef), ReadKind::MaybeConstructorBit) => {
                    Some(self.maybe_value(ctx, label, address)?)
                }
                _ => None,
            },
        };
        Ok(value)
    }

    /// Slice holding the whole label, for labels stored as one block
    fn consumed_slice(&self, schema: &Schema, label: LabelId, address: CellAddress) -> Option<SliceValue> {
        match schema.label(label) {
            Label::Atomic(AtomicLabel::BitArrayByRef { .. } | AtomicLabel::AddressByRef { .. }) => {
                Some(self.ref_slice(address))
            }
            Label::Atomic(atomic) => {
                fixed_size(atomic).map(|size| SliceValue::Data(self.concrete_field(size, address)))
            }
            Label::Composite(_) => None,
        }
    }

    fn concrete_field(&self, size: u32, address: CellAddress) -> FieldRef {
        TlbField::concrete(size, self.id, self.path.clone()).at(address)
    }

    fn ref_slice(&self, address: CellAddress) -> SliceValue {
        SliceValue::Ref(TlbField::slice_ref(self.id, self.path.clone()).at(address))
    }

    fn body(&self, schema: &Schema, label: LabelId) -> Result<StructureId> {
        schema
            .internal_structure(label)
            .ok_or_else(|| Error::MissingStructure {
                name: schema.label_name(label),
            })
    }

    fn coins_value(
        &self,
        schema: &Schema,
        label: LabelId,
        address: CellAddress,
    ) -> Result<Option<ReadValue>> {
        let inner = self.path.enter(self.id);
        let length_id = self.body(schema, label)?;
        let (length_label, grams_id) = match schema.structure(length_id) {
            Structure::KnownTypePrefix { label, rest, .. } => (*label, *rest),
            _ => return Err(Error::internal("currency amount body is not a length prefix")),
        };
        let grams_label = match schema.structure(grams_id) {
            Structure::KnownTypePrefix { label, .. } => *label,
            _ => return Err(Error::internal("currency amount has no amount field")),
        };
        let length_size = match schema.label(length_label) {
            Label::Atomic(atomic) => fixed_size(atomic),
            Label::Composite(_) => None,
        };
        let grams_bound = match schema.label(grams_label) {
            Label::Atomic(AtomicLabel::VarInteger { upper_bound, .. }) => Some(*upper_bound),
            _ => None,
        };
        match (length_size, grams_bound) {
            (Some(length_size), Some(grams_bound)) => {
                Ok(Some(ReadValue::Coins(CoinsValue::Fields {
                    length: TlbField::concrete(length_size, length_id, inner.clone()).at(address),
                    grams: TlbField::symbolic(grams_bound, grams_id, inner).at(address),
                })))
            }
            _ => Err(Error::internal("currency amount fields have unexpected labels")),
        }
    }

    fn address_slice(
        &self,
        schema: &Schema,
        label: LabelId,
        address: CellAddress,
    ) -> Result<(SliceValue, u32)> {
        let body = self.body(schema, label)?;
        let variant = match schema.structure(body) {
            Structure::SwitchPrefix { variants, .. } => match variants.as_slice() {
                [single] => single,
                _ => {
                    return Err(Error::internal(format!(
                        "{} must have a single address tag",
                        schema.label_name(label)
                    )))
                }
            },
            _ => return Err(Error::internal("address body is not a tag switch")),
        };
        let size = match schema.structure(variant.structure) {
            Structure::KnownTypePrefix { label, .. } => match schema.label(*label) {
                Label::Atomic(atomic) => fixed_size(atomic),
                Label::Composite(_) => None,
            },
            _ => None,
        }
        .ok_or_else(|| Error::internal("address tag is not followed by a fixed-size body"))?;

        let rest = TlbField::concrete(size, variant.structure, self.path.enter(self.id)).at(address);
        let length = variant.key.len() as u32 + size;
        Ok((
            SliceValue::Prefixed {
                prefix: variant.key.clone(),
                rest,
            },
            length,
        ))
    }

    fn maybe_value(&self, ctx: &StepContext<'_>, label: LabelId, address: CellAddress) -> Result<ReadValue> {
        let switch = self.body(ctx.schema, label)?;
        let variants = ctx
            .oracle
            .possible_variants(switch, self.left_tlb_depth.saturating_sub(1))?;
        let present = match variants.iter().position(|variant| variant.key == "1") {
            Some(idx) => switch_guard(switch, idx, &variants, address, &self.path.enter(self.id)),
            None => BoolExpr::FALSE,
        };
        Ok(ReadValue::Bool(present))
    }

    pub(crate) fn expand_new_stack_frame(&self, schema: &Schema) -> Result<Option<Frame>> {
        let prefix = self.prefix(schema)?;
        match schema.label(prefix.label) {
            Label::Atomic(_) => Ok(None),
            Label::Composite(_) => {
                if self.left_tlb_depth == 0 {
                    tracing::debug!(
                        "recursion budget exhausted at {}",
                        schema.label_name(prefix.label)
                    );
                    return Ok(None);
                }
                self.enter_body(schema, prefix.label, self.left_tlb_depth - 1)
            }
        }
    }

    fn enter_body(&self, schema: &Schema, label: LabelId, depth: u32) -> Result<Option<Frame>> {
        let body = self.body(schema, label)?;
        build_frame_for_structure(schema, body, &self.path.enter(self.id), depth)
    }

    pub(crate) fn skip_label(&self, schema: &Schema) -> Result<Option<Frame>> {
        let prefix = self.prefix(schema)?;
        build_frame_for_structure(schema, prefix.rest, &self.path, self.left_tlb_depth)
    }

    pub(crate) fn read_in_model(
        &self,
        ctx: &StepContext<'_>,
        model: &dyn Model,
        info: &ConcreteReadInfo,
    ) -> Result<FrameReplay> {
        let schema = ctx.schema;
        let prefix = self.prefix(schema)?;
        let name = schema.label_name(prefix.label);

        let atomic = match schema.label(prefix.label) {
            Label::Composite(composite) => {
                if composite.builtin.is_none() {
                    if composite
                        .structure
                        .map_or(false, |body| is_trivially_empty(schema, body))
                    {
                        return Ok(FrameReplay::new(String::new(), *info, self.successors(schema)?));
                    }
                    if self.left_tlb_depth == 0 {
                        return Err(Error::replay(format!(
                            "recursion budget exhausted at {} during replay",
                            name
                        )));
                    }
                }
                let depth = self.left_tlb_depth.saturating_sub(1);
                let inner = self
                    .enter_body(schema, prefix.label, depth)?
                    .ok_or_else(|| Error::replay(format!("{} has nothing to expand", name)))?;
                return Ok(FrameReplay::new(
                    String::new(),
                    *info,
                    vec![Frame::KnownType(self.clone()), inner],
                ));
            }
            Label::Atomic(atomic) => atomic,
        };

        let mut slices = Vec::new();
        let bits = match atomic {
            AtomicLabel::Integer { .. }
            | AtomicLabel::BitArray { .. }
            | AtomicLabel::InternalStdMsgAddr
            | AtomicLabel::InternalShortStdMsgAddr => {
                let size = fixed_size(atomic)
                    .ok_or_else(|| Error::internal(format!("{} has no fixed size", name)))?;
                field_bits(model, &self.concrete_field(size, info.address))?
            }
            AtomicLabel::VarInteger {
                upper_bound,
                bit_size,
                ..
            } => {
                let args = type_args(schema, prefix.type_arg_ids, info.address, &self.path)?;
                let size = usize::try_from(bit_size.apply(&args).eval(model)?)
                    .map_err(|e| Error::Evaluation(e.to_string()))?;
                let field = TlbField::symbolic(*upper_bound, self.id, self.path.clone()).at(info.address);
                let value = field_bits(model, &field)?;
                if size > value.len() {
                    return Err(Error::replay(format!(
                        "{} is {} bits wide, above its bound {}",
                        name, size, upper_bound
                    )));
                }
                value[value.len() - size..].to_string()
            }
            AtomicLabel::BitArrayByRef { .. } | AtomicLabel::AddressByRef { .. } => {
                let field = TlbField::slice_ref(self.id, self.path.clone()).at(info.address);
                let data = model
                    .slice_data(&field)
                    .ok_or_else(|| Error::replay(format!("no slice content for {}", field)))?;
                slices.push(field);
                data
            }
            AtomicLabel::Opaque { .. } => {
                return Err(Error::UninterpretableLabel {
                    label: name,
                    reason: "label has no built-in decoding rule".to_string(),
                })
            }
        };

        let info = info.consume(bits.len(), &name)?;
        let mut replay = FrameReplay::new(bits, info, self.successors(schema)?);
        replay.slices = slices;
        Ok(replay)
    }

    fn successors(&self, schema: &Schema) -> Result<Vec<Frame>> {
        Ok(self.skip_label(schema)?.into_iter().collect())
    }
}

/// Type arguments of a known-type prefix, read from the fields of the
/// prefixes named by `type_arg_ids`.
pub fn type_args(
    schema: &Schema,
    type_arg_ids: &[StructureId],
    address: CellAddress,
    path: &Path,
) -> Result<Vec<SizeExpr>> {
    type_arg_ids
        .iter()
        .map(|id| match schema.structure(*id) {
            Structure::KnownTypePrefix { label, .. } => match schema.label(*label) {
                Label::Atomic(AtomicLabel::Integer {
                    size,
                    signed: false,
                    ..
                }) if *size <= 31 => Ok(SizeExpr::field(
                    TlbField::concrete(*size, *id, path.clone()).at(address),
                )),
                other => Err(Error::InvalidTypeArgument {
                    message: format!("{} reads {}", id, other.display_name()),
                }),
            },
            other => Err(Error::InvalidTypeArgument {
                message: format!("{} is {:?}", id, other),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AllVariants;
    use crate::schema::SchemaBuilder;

    fn single_prefix(label: impl FnOnce(&mut SchemaBuilder) -> LabelId) -> (Schema, StructureId) {
        let mut builder = SchemaBuilder::new();
        let owner = builder.declare("Owner").unwrap();
        let label = label(&mut builder);
        let body = builder.known_type(owner, label, vec![], builder.empty());
        builder.define(owner, body).unwrap();
        (builder.finish().unwrap(), body)
    }

    #[test]
    fn test_integer_read_yields_field_value() {
        let (schema, id) = single_prefix(|b| b.int(16));
        let oracle = AllVariants(&schema);
        let ctx = StepContext::new(&schema, &oracle);
        let frame = KnownTypeFrame::new(id, Path::root(), 3);
        let request = LoadRequest::new(CellAddress(1), ReadKind::integer(16, true));

        let results = frame.step(&ctx, &request).unwrap();
        let accepted: Vec<_> = results.iter().filter(|r| r.guard.is_true()).collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].outcome, FrameOutcome::EndOfFrame);
        assert_eq!(
            accepted[0].value,
            Some(ReadValue::Int(IntValue::Field {
                field: TlbField::concrete(16, id, Path::root()).at(CellAddress(1)),
                signed: true,
            }))
        );
    }

    #[test]
    fn test_atomic_label_does_not_expand() {
        let (schema, id) = single_prefix(|b| b.uint(8));
        let frame = KnownTypeFrame::new(id, Path::root(), 3);
        assert_eq!(frame.expand_new_stack_frame(&schema).unwrap(), None);
    }

    #[test]
    fn test_opaque_label_asks_for_expansion() {
        let (schema, id) = single_prefix(|b| b.opaque("HashmapE", 0));
        let oracle = AllVariants(&schema);
        let ctx = StepContext::new(&schema, &oracle);
        let frame = KnownTypeFrame::new(id, Path::root(), 3);
        let request = LoadRequest::new(CellAddress(1), ReadKind::unsigned(8));

        let results = frame.step(&ctx, &request).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, FrameOutcome::StepError(None));
    }
}
