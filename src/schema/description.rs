//! Declarative schema documents
//!
//! A [`SchemaDescription`] is the JSON form of a set of composite labels. It is
//! compiled into a [`Schema`] in two phases: every label name is declared
//! first, then bodies are compiled, so recursive and mutually recursive labels
//! resolve by name.
//!
//! ## Format
//! ```json
//! {
//!   "labels": [
//!     {
//!       "name": "List",
//!       "structure": {
//!         "kind": "switch",
//!         "size": 1,
//!         "variants": {
//!           "0": { "kind": "empty" },
//!           "1": {
//!             "kind": "prefix",
//!             "label": { "builtin": "uint", "size": 8 },
//!             "rest": { "kind": "prefix", "label": "List", "rest": { "kind": "empty" } }
//!           }
//!         }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Type arguments are given by name: a `prefix` node with `"name": "len"`
//! can be used as `"args": ["len"]` by any prefix after it in the same label.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::read::Endian;
use crate::{Error, Result};

use super::{
    AtomicLabel, LabelId, RefInfo, Schema, SchemaBuilder, SizeFormula, Structure, StructureId,
    SwitchVariant,
};

/// Whole schema document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    /// Composite label definitions
    pub labels: Vec<LabelDescription>,
}

/// One composite label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDescription {
    /// Label name, unique in the document
    pub name: String,
    /// Body
    pub structure: StructureDescription,
}

/// Structure node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureDescription {
    /// Nothing left
    Empty,
    /// No schema known
    Unknown,
    /// One instance of a label, then `rest`
    Prefix {
        /// Label read here
        label: LabelRef,
        /// Names of earlier prefixes supplying the type arguments
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Name under which later prefixes can use this one as an argument
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Continuation
        rest: Box<StructureDescription>,
    },
    /// One child reference, then `rest`
    Ref {
        /// Composite label of the child, if known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        /// Continuation
        rest: Box<StructureDescription>,
    },
    /// Fixed-width discriminator
    Switch {
        /// Discriminator width
        size: u32,
        /// Continuation per key
        variants: BTreeMap<String, StructureDescription>,
    },
}

/// Reference to a label: a composite name or a built-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelRef {
    /// Composite label declared in the document
    Named(String),
    /// Built-in label
    Builtin(BuiltinRef),
}

/// Built-in labels available to documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "builtin", rename_all = "snake_case")]
pub enum BuiltinRef {
    /// Unsigned integer
    Uint {
        /// Width in bits
        size: u32,
        /// Byte order
        #[serde(default)]
        endian: Endian,
    },
    /// Signed integer
    Int {
        /// Width in bits
        size: u32,
        /// Byte order
        #[serde(default)]
        endian: Endian,
    },
    /// Bit array
    Bits {
        /// Width in bits
        size: u32,
    },
    /// Currency amount
    Coins,
    /// Standard address
    MsgAddr,
    /// Short standard address
    ShortMsgAddr,
    /// `Maybe ^X`
    MaybeRef {
        /// Composite label of the child, if known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        of: Option<String>,
    },
    /// Unsigned integer of `args[0] * factor` bits
    VarUint {
        /// Largest width
        upper_bound: u32,
        /// Multiplier of the argument
        #[serde(default = "default_factor")]
        factor: i64,
    },
    /// Signed integer of `args[0] * factor` bits
    VarInt {
        /// Largest width
        upper_bound: u32,
        /// Multiplier of the argument
        #[serde(default = "default_factor")]
        factor: i64,
    },
    /// Atomic label without decoding rule
    Opaque {
        /// Name
        name: String,
        /// Number of type arguments
        #[serde(default)]
        arity: usize,
    },
}

fn default_factor() -> i64 {
    1
}

impl SchemaDescription {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the schema described by this document
    pub fn compile(&self) -> Result<Schema> {
        let mut builder = SchemaBuilder::new();
        self.compile_into(&mut builder)?;
        builder.finish()
    }

    /// Add the described labels to an existing builder and return their ids
    pub fn compile_into(&self, builder: &mut SchemaBuilder) -> Result<Vec<LabelId>> {
        let mut ids = Vec::with_capacity(self.labels.len());
        for label in &self.labels {
            ids.push(builder.declare(label.name.clone())?);
        }
        for (label, id) in self.labels.iter().zip(&ids) {
            let mut compiler = Compiler {
                builder: &mut *builder,
                owner: *id,
            };
            let body = compiler.structure(&label.structure, &HashMap::new())?;
            builder.define(*id, body)?;
        }
        tracing::debug!(labels = ids.len(), "compiled schema description");
        Ok(ids)
    }
}

struct Compiler<'b> {
    builder: &'b mut SchemaBuilder,
    owner: LabelId,
}

impl Compiler<'_> {
    fn structure(
        &mut self,
        desc: &StructureDescription,
        scope: &HashMap<String, StructureId>,
    ) -> Result<StructureId> {
        match desc {
            StructureDescription::Empty => Ok(self.builder.empty()),
            StructureDescription::Unknown => Ok(self.builder.unknown()),
            StructureDescription::Prefix {
                label,
                args,
                name,
                rest,
            } => {
                let label = self.label(label)?;
                let type_arg_ids = args
                    .iter()
                    .map(|arg| {
                        scope.get(arg).copied().ok_or_else(|| {
                            Error::description(format!("argument {:?} is not bound", arg))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let id = self.builder.reserve();
                let rest = match name {
                    Some(name) => {
                        let mut inner = scope.clone();
                        inner.insert(name.clone(), id);
                        self.structure(rest, &inner)?
                    }
                    None => self.structure(rest, scope)?,
                };
                self.builder.place(
                    id,
                    Structure::KnownTypePrefix {
                        label,
                        type_arg_ids,
                        rest,
                        owner: self.owner,
                    },
                )
            }
            StructureDescription::Ref { label, rest } => {
                let reference = self.ref_info(label.as_deref())?;
                let id = self.builder.reserve();
                let rest = self.structure(rest, scope)?;
                self.builder.place(
                    id,
                    Structure::LoadRef {
                        reference,
                        rest,
                        owner: self.owner,
                    },
                )
            }
            StructureDescription::Switch { size, variants } => {
                let id = self.builder.reserve();
                let mut compiled = Vec::with_capacity(variants.len());
                for (key, variant) in variants {
                    compiled.push(SwitchVariant {
                        key: key.clone(),
                        structure: self.structure(variant, scope)?,
                    });
                }
                self.builder.place(
                    id,
                    Structure::SwitchPrefix {
                        switch_size: *size,
                        variants: compiled,
                        owner: self.owner,
                    },
                )
            }
        }
    }

    fn ref_info(&self, label: Option<&str>) -> Result<RefInfo> {
        match label {
            None => Ok(RefInfo::Unknown),
            Some(name) => self
                .builder
                .lookup(name)
                .map(RefInfo::Label)
                .ok_or_else(|| Error::UndefinedLabel {
                    name: name.to_string(),
                }),
        }
    }

    fn label(&mut self, label: &LabelRef) -> Result<LabelId> {
        let builtin = match label {
            LabelRef::Named(name) => {
                return self.builder.lookup(name).ok_or_else(|| Error::UndefinedLabel {
                    name: name.clone(),
                })
            }
            LabelRef::Builtin(builtin) => builtin,
        };

        let id = match builtin {
            BuiltinRef::Uint { size, endian } => self.builder.atomic(AtomicLabel::Integer {
                size: *size,
                signed: false,
                endian: *endian,
            }),
            BuiltinRef::Int { size, endian } => self.builder.atomic(AtomicLabel::Integer {
                size: *size,
                signed: true,
                endian: *endian,
            }),
            BuiltinRef::Bits { size } => self.builder.bits(*size),
            BuiltinRef::Coins => self.builder.coins(),
            BuiltinRef::MsgAddr => self.builder.full_msg_addr(),
            BuiltinRef::ShortMsgAddr => self.builder.basic_msg_addr(),
            BuiltinRef::MaybeRef { of } => {
                let reference = self.ref_info(of.as_deref())?;
                self.builder.maybe_ref(reference)
            }
            BuiltinRef::VarUint {
                upper_bound,
                factor,
            } => self.var_integer(false, *upper_bound, *factor),
            BuiltinRef::VarInt {
                upper_bound,
                factor,
            } => self.var_integer(true, *upper_bound, *factor),
            BuiltinRef::Opaque { name, arity } => self.builder.opaque(name.clone(), *arity),
        };
        Ok(id)
    }

    fn var_integer(&mut self, signed: bool, upper_bound: u32, factor: i64) -> LabelId {
        self.builder.atomic(AtomicLabel::VarInteger {
            signed,
            endian: Endian::BigEndian,
            upper_bound,
            bit_size: SizeFormula::ArgTimes { arg: 0, factor },
        })
    }
}
