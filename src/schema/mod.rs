//! # TL-B Schema Model
//!
//! A schema is an arena of [`Label`]s and [`Structure`] nodes addressed by
//! integer ids. Composite labels may refer to themselves through their own
//! structure, so construction is two-phase: [`SchemaBuilder::declare`] allocates
//! the label, structures are built bottom-up (reserving ids where a node must be
//! referenced before it exists), and [`SchemaBuilder::define`] attaches the body.
//! [`SchemaBuilder::finish`] validates every authoring invariant and freezes the
//! result into an immutable [`Schema`].
//!
//! ```
//! use tlb_stack::schema::SchemaBuilder;
//!
//! let mut builder = SchemaBuilder::new();
//! let pair = builder.declare("Pair").unwrap();
//! let u8_label = builder.uint(8);
//! let second = builder.known_type(pair, u8_label, vec![], builder.empty());
//! let first = builder.known_type(pair, u8_label, vec![], second);
//! builder.define(pair, first).unwrap();
//! let schema = builder.finish().unwrap();
//! assert_eq!(schema.label_by_name("Pair"), Some(pair));
//! ```

pub mod description;
pub mod labels;

use std::collections::HashMap;
use std::fmt;

use crate::config::MAX_DATA_LENGTH;
use crate::expr::SizeExpr;
use crate::read::Endian;
use crate::{Error, Result};

pub use description::SchemaDescription;

/// Identity of a structure node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureId(pub u32);

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Identity of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// Id of the shared [`Structure::Unknown`] node.
pub const UNKNOWN_STRUCTURE: StructureId = StructureId(0);
/// Id of the shared [`Structure::Empty`] node.
pub const EMPTY_STRUCTURE: StructureId = StructureId(1);

/// Bits of a standard internal address after its 3-bit tag: workchain and hash.
pub const INTERNAL_STD_MSG_ADDR_SIZE: u32 = 8 + 256;
/// Bits of a short standard address after its 11-bit tag.
pub const INTERNAL_SHORT_STD_MSG_ADDR_SIZE: u32 = 256;
/// Full length of a standard address including its tag.
pub const STD_MSG_ADDR_SIZE: u32 = 3 + INTERNAL_STD_MSG_ADDR_SIZE;
/// Largest byte-length field value of a currency amount, in bits.
pub const COINS_MAX_BITS: u32 = 120;

/// Bit width of a variable-size integer as a function of its type arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SizeFormula {
    /// `args[arg] * factor`
    ArgTimes {
        /// Argument index
        arg: usize,
        /// Multiplier
        factor: i64,
    },
}

impl SizeFormula {
    /// Number of arguments the formula reads
    pub fn arity(&self) -> usize {
        match self {
            SizeFormula::ArgTimes { arg, .. } => arg + 1,
        }
    }

    /// Apply to computed arguments
    pub fn apply(&self, args: &[SizeExpr]) -> SizeExpr {
        match self {
            SizeFormula::ArgTimes { arg, factor } => args
                .get(*arg)
                .map(|a| a.mul(&SizeExpr::constant(*factor)))
                .unwrap_or_else(SizeExpr::zero),
        }
    }
}

/// Label without internal structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AtomicLabel {
    /// Integer of a fixed width
    Integer {
        /// Width in bits
        size: u32,
        /// Two's complement
        signed: bool,
        /// Byte order
        endian: Endian,
    },
    /// Integer whose width is computed from earlier fields
    VarInteger {
        /// Two's complement
        signed: bool,
        /// Byte order
        endian: Endian,
        /// Largest possible width
        upper_bound: u32,
        /// Width formula
        bit_size: SizeFormula,
    },
    /// Bits of a fixed width
    BitArray {
        /// Width in bits
        size: u32,
    },
    /// Bits stored out of line, as produced by builder stores
    BitArrayByRef {
        /// Width in bits
        size_bits: SizeExpr,
    },
    /// Address stored out of line, as produced by builder stores
    AddressByRef {
        /// Width in bits
        size_bits: SizeExpr,
    },
    /// Workchain and hash of a standard address
    InternalStdMsgAddr,
    /// Hash of a short standard address
    InternalShortStdMsgAddr,
    /// Atomic label the engine has no decoding rule for
    Opaque {
        /// Name
        name: String,
        /// Number of type arguments
        arity: usize,
    },
}

/// Composite labels with a built-in decoding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinComposite {
    /// Currency amount
    Coins,
    /// `MsgAddress` restricted to standard addresses
    FullMsgAddr,
    /// Short standard address
    BasicMsgAddr,
    /// `Maybe ^Cell`
    MaybeRef,
}

/// How a child cell reference is typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefInfo {
    /// No schema known for the child
    Unknown,
    /// Child parses as this composite label
    Label(LabelId),
}

/// Named label with an internal structure.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeLabel {
    /// Name
    pub name: String,
    /// Decoding rule, for built-ins
    pub builtin: Option<BuiltinComposite>,
    /// Body, attached after declaration
    pub structure: Option<StructureId>,
}

/// Schema building block.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    /// No internal structure
    Atomic(AtomicLabel),
    /// Named, with internal structure
    Composite(CompositeLabel),
}

impl Label {
    /// Number of type arguments the label consumes
    pub fn arity(&self) -> usize {
        match self {
            Label::Atomic(AtomicLabel::VarInteger { bit_size, .. }) => bit_size.arity(),
            Label::Atomic(AtomicLabel::Opaque { arity, .. }) => *arity,
            _ => 0,
        }
    }

    /// Whether the engine can decode this label directly
    pub fn is_builtin(&self) -> bool {
        match self {
            Label::Atomic(AtomicLabel::Opaque { .. }) => false,
            Label::Atomic(_) => true,
            Label::Composite(composite) => composite.builtin.is_some(),
        }
    }

    /// Printable name
    pub fn display_name(&self) -> String {
        match self {
            Label::Atomic(AtomicLabel::Integer {
                size,
                signed,
                endian,
            }) => {
                let base = if *signed { "int" } else { "uint" };
                match endian {
                    Endian::BigEndian => format!("{}{}", base, size),
                    Endian::LittleEndian => format!("{}{}_le", base, size),
                }
            }
            Label::Atomic(AtomicLabel::VarInteger {
                signed,
                upper_bound,
                ..
            }) => {
                let base = if *signed { "int" } else { "uint" };
                format!("{}(<={})", base, upper_bound)
            }
            Label::Atomic(AtomicLabel::BitArray { size }) => format!("bits{}", size),
            Label::Atomic(AtomicLabel::BitArrayByRef { size_bits }) => {
                format!("bits({})", size_bits)
            }
            Label::Atomic(AtomicLabel::AddressByRef { .. }) => "MsgAddress".to_string(),
            Label::Atomic(AtomicLabel::InternalStdMsgAddr) => "addr_std_body".to_string(),
            Label::Atomic(AtomicLabel::InternalShortStdMsgAddr) => "addr_short_body".to_string(),
            Label::Atomic(AtomicLabel::Opaque { name, .. }) => name.clone(),
            Label::Composite(composite) => composite.name.clone(),
        }
    }
}

/// Alternative of a switch prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SwitchVariant {
    /// Discriminator bits
    pub key: String,
    /// Continuation when the discriminator equals `key`
    pub structure: StructureId,
}

/// Body node of a composite label.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    /// No schema known; only legal as the root of a parse
    Unknown,
    /// Nothing left
    Empty,
    /// One instance of `label`, then `rest`
    KnownTypePrefix {
        /// Label read here
        label: LabelId,
        /// Structures whose values are the label's type arguments
        type_arg_ids: Vec<StructureId>,
        /// Continuation
        rest: StructureId,
        /// Composite label whose body contains this node
        owner: LabelId,
    },
    /// One child reference, then `rest`
    LoadRef {
        /// Typing of the child
        reference: RefInfo,
        /// Continuation
        rest: StructureId,
        /// Composite label whose body contains this node
        owner: LabelId,
    },
    /// Fixed-width discriminator selecting a continuation
    SwitchPrefix {
        /// Discriminator width
        switch_size: u32,
        /// Alternatives, keys of length `switch_size`
        variants: Vec<SwitchVariant>,
        /// Composite label whose body contains this node
        owner: LabelId,
    },
}

impl Structure {
    /// Label owning this node, `None` for the shared leaves
    pub fn owner(&self) -> Option<LabelId> {
        match self {
            Structure::Unknown | Structure::Empty => None,
            Structure::KnownTypePrefix { owner, .. }
            | Structure::LoadRef { owner, .. }
            | Structure::SwitchPrefix { owner, .. } => Some(*owner),
        }
    }
}

/// Immutable label/structure graph.
#[derive(Debug, Clone)]
pub struct Schema {
    labels: Vec<Label>,
    structures: Vec<Structure>,
    names: HashMap<String, LabelId>,
}

impl Schema {
    /// Label by id
    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id.0 as usize]
    }

    /// Structure node by id
    pub fn structure(&self, id: StructureId) -> &Structure {
        &self.structures[id.0 as usize]
    }

    /// Declared composite label by name
    pub fn label_by_name(&self, name: &str) -> Option<LabelId> {
        self.names.get(name).copied()
    }

    /// Printable name of a label
    pub fn label_name(&self, id: LabelId) -> String {
        self.label(id).display_name()
    }

    /// Body of a composite label, `None` for atomic labels
    pub fn internal_structure(&self, id: LabelId) -> Option<StructureId> {
        match self.label(id) {
            Label::Composite(composite) => composite.structure,
            Label::Atomic(_) => None,
        }
    }

    /// Ids of all composite labels, built-ins included
    pub fn composite_labels(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| matches!(label, Label::Composite(_)))
            .map(|(idx, _)| LabelId(idx as u32))
    }

    /// Ids of all switch prefixes
    pub fn switches(&self) -> impl Iterator<Item = StructureId> + '_ {
        self.structures
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Structure::SwitchPrefix { .. }))
            .map(|(idx, _)| StructureId(idx as u32))
    }

    /// Number of structure nodes
    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BuiltinKey {
    Atomic(AtomicLabel),
    Coins,
    FullMsgAddr,
    BasicMsgAddr,
    MaybeRef(RefInfo),
}

/// Allocator for one schema-build session.
///
/// Structure ids come from a single counter owned by the builder, so ids are
/// unique within the schema and reproducible for a given sequence of calls.
#[derive(Debug)]
pub struct SchemaBuilder {
    labels: Vec<Label>,
    structures: Vec<Option<Structure>>,
    names: HashMap<String, LabelId>,
    builtins: HashMap<BuiltinKey, LabelId>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Builder holding only the shared `Unknown` and `Empty` leaves
    pub fn new() -> Self {
        Self {
            labels: Vec::new(),
            structures: vec![Some(Structure::Unknown), Some(Structure::Empty)],
            names: HashMap::new(),
            builtins: HashMap::new(),
        }
    }

    /// The shared `Empty` leaf
    pub fn empty(&self) -> StructureId {
        EMPTY_STRUCTURE
    }

    /// The shared `Unknown` leaf
    pub fn unknown(&self) -> StructureId {
        UNKNOWN_STRUCTURE
    }

    fn push_label(&mut self, label: Label) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(label);
        id
    }

    fn push_structure(&mut self, structure: Structure) -> StructureId {
        let id = StructureId(self.structures.len() as u32);
        self.structures.push(Some(structure));
        id
    }

    /// Declare a named composite label; its body is attached with [`define`](Self::define)
    pub fn declare(&mut self, name: impl Into<String>) -> Result<LabelId> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateLabel { name });
        }
        let id = self.push_label(Label::Composite(CompositeLabel {
            name: name.clone(),
            builtin: None,
            structure: None,
        }));
        self.names.insert(name, id);
        Ok(id)
    }

    /// Look up a declared composite label
    pub fn lookup(&self, name: &str) -> Option<LabelId> {
        self.names.get(name).copied()
    }

    /// Attach the body of a declared composite label
    pub fn define(&mut self, label: LabelId, structure: StructureId) -> Result<()> {
        match self.labels.get_mut(label.0 as usize) {
            Some(Label::Composite(composite)) => {
                composite.structure = Some(structure);
                Ok(())
            }
            Some(other) => Err(Error::InvalidTypeArgument {
                message: format!("{} is atomic and cannot have a body", other.display_name()),
            }),
            None => Err(Error::UndefinedLabel {
                name: label.to_string(),
            }),
        }
    }

    /// Atomic label, deduplicated
    pub fn atomic(&mut self, label: AtomicLabel) -> LabelId {
        let key = BuiltinKey::Atomic(label.clone());
        if let Some(id) = self.builtins.get(&key) {
            return *id;
        }
        let id = self.push_label(Label::Atomic(label));
        self.builtins.insert(key, id);
        id
    }

    /// Unsigned big-endian integer of `size` bits
    pub fn uint(&mut self, size: u32) -> LabelId {
        self.atomic(AtomicLabel::Integer {
            size,
            signed: false,
            endian: Endian::BigEndian,
        })
    }

    /// Signed big-endian integer of `size` bits
    pub fn int(&mut self, size: u32) -> LabelId {
        self.atomic(AtomicLabel::Integer {
            size,
            signed: true,
            endian: Endian::BigEndian,
        })
    }

    /// Bit array of `size` bits
    pub fn bits(&mut self, size: u32) -> LabelId {
        self.atomic(AtomicLabel::BitArray { size })
    }

    /// Bits stored out of line with `size_bits` bits
    pub fn bits_by_ref(&mut self, size_bits: impl Into<SizeExpr>) -> LabelId {
        self.atomic(AtomicLabel::BitArrayByRef {
            size_bits: size_bits.into(),
        })
    }

    /// Address stored out of line with `size_bits` bits
    pub fn address_by_ref(&mut self, size_bits: impl Into<SizeExpr>) -> LabelId {
        self.atomic(AtomicLabel::AddressByRef {
            size_bits: size_bits.into(),
        })
    }

    /// Atomic label without decoding rule
    pub fn opaque(&mut self, name: impl Into<String>, arity: usize) -> LabelId {
        self.atomic(AtomicLabel::Opaque {
            name: name.into(),
            arity,
        })
    }

    /// Reserve a structure id to be filled by [`place`](Self::place)
    pub fn reserve(&mut self) -> StructureId {
        let id = StructureId(self.structures.len() as u32);
        self.structures.push(None);
        id
    }

    /// Fill a reserved structure id
    pub fn place(&mut self, id: StructureId, structure: Structure) -> Result<StructureId> {
        match self.structures.get_mut(id.0 as usize) {
            Some(slot @ None) => {
                *slot = Some(structure);
                Ok(id)
            }
            _ => Err(Error::InvalidTypeArgument {
                message: format!("structure {} was not reserved or is already placed", id),
            }),
        }
    }

    /// `label` with type arguments read from `type_arg_ids`, then `rest`
    pub fn known_type(
        &mut self,
        owner: LabelId,
        label: LabelId,
        type_arg_ids: Vec<StructureId>,
        rest: StructureId,
    ) -> StructureId {
        self.push_structure(Structure::KnownTypePrefix {
            label,
            type_arg_ids,
            rest,
            owner,
        })
    }

    /// One child reference, then `rest`
    pub fn load_ref(&mut self, owner: LabelId, reference: RefInfo, rest: StructureId) -> StructureId {
        self.push_structure(Structure::LoadRef {
            reference,
            rest,
            owner,
        })
    }

    /// Discriminator of `switch_size` bits selecting among `variants`
    pub fn switch(
        &mut self,
        owner: LabelId,
        switch_size: u32,
        variants: Vec<(String, StructureId)>,
    ) -> Result<StructureId> {
        let variants = validate_switch(switch_size, variants)?;
        Ok(self.push_structure(Structure::SwitchPrefix {
            switch_size,
            variants,
            owner,
        }))
    }

    fn builtin_composite(&mut self, key: BuiltinKey, name: &str, kind: BuiltinComposite) -> (LabelId, bool) {
        if let Some(id) = self.builtins.get(&key) {
            return (*id, false);
        }
        let id = self.push_label(Label::Composite(CompositeLabel {
            name: name.to_string(),
            builtin: Some(kind),
            structure: None,
        }));
        self.builtins.insert(key, id);
        (id, true)
    }

    /// Currency amount: `uint4` byte length, then that many bytes
    pub fn coins(&mut self) -> LabelId {
        let (id, fresh) = self.builtin_composite(BuiltinKey::Coins, "Coins", BuiltinComposite::Coins);
        if fresh {
            let length_label = self.uint(4);
            let grams_label = self.atomic(AtomicLabel::VarInteger {
                signed: false,
                endian: Endian::BigEndian,
                upper_bound: COINS_MAX_BITS,
                bit_size: SizeFormula::ArgTimes { arg: 0, factor: 8 },
            });
            let length_id = self.reserve();
            let grams = self.known_type(id, grams_label, vec![length_id], EMPTY_STRUCTURE);
            let body = Structure::KnownTypePrefix {
                label: length_label,
                type_arg_ids: vec![],
                rest: grams,
                owner: id,
            };
            self.fill_reserved(length_id, body);
            self.set_body(id, length_id);
        }
        id
    }

    /// Standard internal address with its `100` tag
    pub fn full_msg_addr(&mut self) -> LabelId {
        let (id, fresh) = self.builtin_composite(
            BuiltinKey::FullMsgAddr,
            "MsgAddress",
            BuiltinComposite::FullMsgAddr,
        );
        if fresh {
            let body_label = self.atomic(AtomicLabel::InternalStdMsgAddr);
            let body = self.known_type(id, body_label, vec![], EMPTY_STRUCTURE);
            let switch = self.push_structure(Structure::SwitchPrefix {
                switch_size: 3,
                variants: vec![SwitchVariant {
                    key: "100".to_string(),
                    structure: body,
                }],
                owner: id,
            });
            self.set_body(id, switch);
        }
        id
    }

    /// Short standard address with its 11-bit tag
    pub fn basic_msg_addr(&mut self) -> LabelId {
        let (id, fresh) = self.builtin_composite(
            BuiltinKey::BasicMsgAddr,
            "MsgAddressShort",
            BuiltinComposite::BasicMsgAddr,
        );
        if fresh {
            let body_label = self.atomic(AtomicLabel::InternalShortStdMsgAddr);
            let body = self.known_type(id, body_label, vec![], EMPTY_STRUCTURE);
            let switch = self.push_structure(Structure::SwitchPrefix {
                switch_size: 11,
                variants: vec![SwitchVariant {
                    key: "10000000000".to_string(),
                    structure: body,
                }],
                owner: id,
            });
            self.set_body(id, switch);
        }
        id
    }

    /// `Maybe ^X` where the child is typed by `reference`
    pub fn maybe_ref(&mut self, reference: RefInfo) -> LabelId {
        let (id, fresh) = self.builtin_composite(
            BuiltinKey::MaybeRef(reference),
            "Maybe",
            BuiltinComposite::MaybeRef,
        );
        if fresh {
            let present = self.load_ref(id, reference, EMPTY_STRUCTURE);
            let switch = self.push_structure(Structure::SwitchPrefix {
                switch_size: 1,
                variants: vec![
                    SwitchVariant {
                        key: "0".to_string(),
                        structure: EMPTY_STRUCTURE,
                    },
                    SwitchVariant {
                        key: "1".to_string(),
                        structure: present,
                    },
                ],
                owner: id,
            });
            self.set_body(id, switch);
        }
        id
    }

    fn fill_reserved(&mut self, id: StructureId, structure: Structure) {
        if let Some(slot) = self.structures.get_mut(id.0 as usize) {
            *slot = Some(structure);
        }
    }

    fn set_body(&mut self, label: LabelId, structure: StructureId) {
        if let Some(Label::Composite(composite)) = self.labels.get_mut(label.0 as usize) {
            composite.structure = Some(structure);
        }
    }

    /// Validate and freeze the schema
    pub fn finish(self) -> Result<Schema> {
        let mut structures = Vec::with_capacity(self.structures.len());
        for (idx, slot) in self.structures.into_iter().enumerate() {
            match slot {
                Some(structure) => structures.push(structure),
                None => {
                    return Err(Error::InvalidTypeArgument {
                        message: format!("structure s{} was reserved but never placed", idx),
                    })
                }
            }
        }

        let schema = Schema {
            labels: self.labels,
            structures,
            names: self.names,
        };

        for label in &schema.labels {
            if let Label::Composite(composite) = label {
                match composite.structure {
                    Some(id) if (id.0 as usize) < schema.structures.len() => {}
                    _ => {
                        return Err(Error::MissingStructure {
                            name: composite.name.clone(),
                        })
                    }
                }
            }
        }

        for (idx, structure) in schema.structures.iter().enumerate() {
            validate_structure(&schema, StructureId(idx as u32), structure)?;
        }

        Ok(schema)
    }
}

fn validate_switch(
    switch_size: u32,
    variants: Vec<(String, StructureId)>,
) -> Result<Vec<SwitchVariant>> {
    if switch_size == 0 {
        return Err(Error::InvalidSwitch {
            message: "switch size must be positive".to_string(),
        });
    }
    if switch_size > MAX_DATA_LENGTH {
        return Err(Error::InvalidSwitch {
            message: format!("switch size {} exceeds cell capacity", switch_size),
        });
    }
    if variants.is_empty() {
        return Err(Error::InvalidSwitch {
            message: "switch must have at least one variant".to_string(),
        });
    }
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(variants.len());
    for (key, structure) in variants {
        if key.len() != switch_size as usize {
            return Err(Error::InvalidSwitch {
                message: format!(
                    "key {:?} has length {}, expected {}",
                    key,
                    key.len(),
                    switch_size
                ),
            });
        }
        if !crate::expr::is_bit_string(&key) {
            return Err(Error::InvalidSwitch {
                message: format!("key {:?} is not a bit string", key),
            });
        }
        if !seen.insert(key.clone()) {
            return Err(Error::InvalidSwitch {
                message: format!("duplicate key {:?}", key),
            });
        }
        result.push(SwitchVariant { key, structure });
    }
    Ok(result)
}

fn validate_structure(schema: &Schema, id: StructureId, structure: &Structure) -> Result<()> {
    let in_range = |s: StructureId| (s.0 as usize) < schema.structures.len();
    let label_in_range = |l: LabelId| (l.0 as usize) < schema.labels.len();

    match structure {
        Structure::Unknown | Structure::Empty => Ok(()),
        Structure::LoadRef {
            reference, rest, ..
        } => {
            if !in_range(*rest) {
                return Err(Error::InvalidTypeArgument {
                    message: format!("{} continues with missing structure {}", id, rest),
                });
            }
            if let RefInfo::Label(label) = reference {
                if !label_in_range(*label) || !matches!(schema.label(*label), Label::Composite(_)) {
                    return Err(Error::InvalidTypeArgument {
                        message: format!("{} references {} which is not a composite label", id, label),
                    });
                }
            }
            Ok(())
        }
        Structure::SwitchPrefix {
            switch_size,
            variants,
            ..
        } => {
            let pairs = variants
                .iter()
                .map(|v| (v.key.clone(), v.structure))
                .collect();
            validate_switch(*switch_size, pairs)?;
            for variant in variants {
                if !in_range(variant.structure) {
                    return Err(Error::InvalidSwitch {
                        message: format!("variant {:?} of {} is missing", variant.key, id),
                    });
                }
            }
            Ok(())
        }
        Structure::KnownTypePrefix {
            label,
            type_arg_ids,
            rest,
            owner,
        } => {
            if !label_in_range(*label) {
                return Err(Error::UndefinedLabel {
                    name: label.to_string(),
                });
            }
            if !in_range(*rest) {
                return Err(Error::InvalidTypeArgument {
                    message: format!("{} continues with missing structure {}", id, rest),
                });
            }
            let declared = schema.label(*label);
            if declared.arity() != type_arg_ids.len() {
                return Err(Error::ArityMismatch {
                    label: declared.display_name(),
                    expected: declared.arity(),
                    got: type_arg_ids.len(),
                });
            }
            for arg in type_arg_ids {
                if !in_range(*arg) {
                    return Err(Error::InvalidTypeArgument {
                        message: format!("argument {} of {} does not exist", arg, id),
                    });
                }
                validate_type_arg(schema, *arg, *owner)?;
            }
            Ok(())
        }
    }
}

fn validate_type_arg(schema: &Schema, arg: StructureId, owner: LabelId) -> Result<()> {
    match schema.structure(arg) {
        Structure::KnownTypePrefix {
            label,
            owner: arg_owner,
            ..
        } => {
            if *arg_owner != owner {
                return Err(Error::InvalidTypeArgument {
                    message: format!(
                        "argument {} belongs to {}, not to {}",
                        arg,
                        schema.label_name(*arg_owner),
                        schema.label_name(owner)
                    ),
                });
            }
            match schema.label(*label) {
                Label::Atomic(AtomicLabel::Integer {
                    size,
                    signed: false,
                    ..
                }) if *size <= 31 => Ok(()),
                other => Err(Error::InvalidTypeArgument {
                    message: format!(
                        "only unsigned integers of at most 31 bits can be type arguments, found {}",
                        other.display_name()
                    ),
                }),
            }
        }
        other => Err(Error::InvalidTypeArgument {
            message: format!("argument {} is {:?}, not a known-type prefix", arg, other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_key_length_is_checked() {
        let mut builder = SchemaBuilder::new();
        let owner = builder.declare("Bad").unwrap();
        let empty = builder.empty();
        let err = builder
            .switch(owner, 2, vec![("0".to_string(), empty), ("11".to_string(), empty)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSwitch { .. }));
    }

    #[test]
    fn test_undefined_body_is_reported() {
        let mut builder = SchemaBuilder::new();
        builder.declare("Lonely").unwrap();
        let err = builder.finish().unwrap_err();
        assert_eq!(
            err,
            Error::MissingStructure {
                name: "Lonely".to_string()
            }
        );
    }

    #[test]
    fn test_recursive_label() {
        let mut builder = SchemaBuilder::new();
        let list = builder.declare("List").unwrap();
        let u8_label = builder.uint(8);
        let tail = builder.known_type(list, list, vec![], builder.empty());
        let cons = builder.known_type(list, u8_label, vec![], tail);
        let empty = builder.empty();
        let body = builder
            .switch(list, 1, vec![("0".into(), empty), ("1".into(), cons)])
            .unwrap();
        builder.define(list, body).unwrap();
        let schema = builder.finish().unwrap();

        assert_eq!(schema.internal_structure(list), Some(body));
        assert_eq!(schema.switches().count(), 1);
    }

    #[test]
    fn test_coins_shape() {
        let mut builder = SchemaBuilder::new();
        let coins = builder.coins();
        assert_eq!(builder.coins(), coins);
        let schema = builder.finish().unwrap();

        let body = schema.internal_structure(coins).unwrap();
        match schema.structure(body) {
            Structure::KnownTypePrefix { rest, .. } => match schema.structure(*rest) {
                Structure::KnownTypePrefix { type_arg_ids, .. } => {
                    assert_eq!(type_arg_ids, &vec![body]);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_type_arg_must_be_small_uint() {
        let mut builder = SchemaBuilder::new();
        let owner = builder.declare("Sized").unwrap();
        let wide = builder.uint(64);
        let var = builder.atomic(AtomicLabel::VarInteger {
            signed: false,
            endian: Endian::BigEndian,
            upper_bound: 256,
            bit_size: SizeFormula::ArgTimes { arg: 0, factor: 1 },
        });
        let arg = builder.reserve();
        let value = builder.known_type(owner, var, vec![arg], builder.empty());
        builder
            .place(
                arg,
                Structure::KnownTypePrefix {
                    label: wide,
                    type_arg_ids: vec![],
                    rest: value,
                    owner,
                },
            )
            .unwrap();
        builder.define(owner, arg).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(Error::InvalidTypeArgument { .. })
        ));
    }
}
