//! # TL-B Stack - Schema-Driven Symbolic Parsing of Cell Data
//!
//! A symbolic executor for smart-contract bytecode sees cell data as opaque
//! bits until a TL-B schema says how they are laid out. This crate is the part
//! of such an executor that keeps track, for every schema-typed cell, of how
//! much of the declared schema has already been consumed and what a pending
//! read may decode to, even when the read width and the cell content are
//! still symbolic.
//!
//! ## Features
//!
//! - **Arena schema model** - recursive and mutually recursive labels built in
//!   two phases, addressed by integer ids
//! - **Lazy frame automaton** - composite labels are entered only when a read
//!   needs it, bounded by a recursion budget
//! - **Guarded outcomes** - every read returns all structurally possible
//!   results, each with the condition under which it holds
//! - **Persistent stacks** - forked branches share frames without copying
//! - **Deterministic replay** - a solved model turns the same automaton into
//!   literal bit strings for counterexamples
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! tlb-stack = "0.1.0"
//! ```
//!
//! ### Basic Usage
//!
//! ```rust
//! use tlb_stack::{
//!     AllVariants, CellAddress, LoadRequest, ReadKind, SchemaBuilder, StepContext, TlbOptions,
//!     TlbStack,
//! };
//!
//! # fn main() -> tlb_stack::Result<()> {
//! // Header = uint4
//! let mut builder = SchemaBuilder::new();
//! let header = builder.declare("Header")?;
//! let uint4 = builder.uint(4);
//! let body = builder.known_type(header, uint4, vec![], builder.empty());
//! builder.define(header, body)?;
//! let schema = builder.finish()?;
//!
//! let oracle = AllVariants(&schema);
//! let ctx = StepContext::new(&schema, &oracle);
//! let stack = TlbStack::new(&schema, header, &TlbOptions::default())?;
//!
//! // Reading exactly the declared width consumes the schema
//! let read = LoadRequest::new(CellAddress(0), ReadKind::unsigned(4));
//! let outcomes = stack.step(&ctx, &read)?;
//! assert_eq!(outcomes.len(), 1);
//! assert!(outcomes[0].guard.is_true());
//! assert!(outcomes[0].stack().map_or(false, |s| s.is_empty()));
//!
//! // A wider integer read is a structural finding, not a Rust error
//! let read = LoadRequest::new(CellAddress(0), ReadKind::unsigned(5));
//! let outcomes = stack.step(&ctx, &read)?;
//! assert_eq!(
//!     outcomes[0].error().map(|e| e.rule_id()),
//!     Some("reading-of-unexpected-type")
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ### Loading a Schema Document
//!
//! ```rust
//! use tlb_stack::{CalculatedTlbInfo, SchemaDescription, TlbOptions};
//!
//! # fn main() -> tlb_stack::Result<()> {
//! let document = r#"{
//!     "labels": [{
//!         "name": "List",
//!         "structure": {
//!             "kind": "switch", "size": 1,
//!             "variants": {
//!                 "0": { "kind": "empty" },
//!                 "1": {
//!                     "kind": "prefix", "label": { "builtin": "uint", "size": 8 },
//!                     "rest": { "kind": "prefix", "label": "List", "rest": { "kind": "empty" } }
//!                 }
//!             }
//!         }
//!     }]
//! }"#;
//!
//! let schema = SchemaDescription::from_json(document)?.compile()?;
//! let list = schema.label_by_name("List").expect("declared above");
//! let info = CalculatedTlbInfo::new(&schema, &TlbOptions::default())?;
//! assert_eq!(info.minimal_label_depth(list), Some(0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SchemaDescription → Schema → CalculatedTlbInfo
//!                        ↓            ↓
//!   LoadRequest → TlbStack::step → Vec<GuardedResult>    (one fork per entry)
//!                        ↓
//!   Model → read_in_model_from_tlb_fields → ReplayOutcome
//! ```
//!
//! ### Main Components
//!
//! - [`Schema`] / [`SchemaBuilder`] - Label and structure arena
//! - [`SchemaDescription`] - JSON schema document and its compilation
//! - [`CalculatedTlbInfo`] - Switch variants reachable per recursion budget
//! - [`Frame`] - Position inside one structure node
//! - [`TlbStack`] - Per-cell parsing stack and its `step` operation
//! - [`read_in_model_from_tlb_fields`] - Model replay
//!
//! ## Error Handling
//!
//! Two kinds of failure are kept apart. A read the schema does not permit is a
//! [`StructuralError`] carried inside a [`GuardedResult`]: the executor reports
//! it on that branch and keeps exploring the others. An [`Error`] means the
//! schema, the options or the model are inconsistent and analysis cannot go
//! on.
//!
//! ## Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events and never
//! prints. Expansion of composite labels, exhausted recursion budgets and
//! structural findings are logged at `debug`, every orchestrator step at
//! `trace`.

pub mod analysis;
pub mod config;
pub mod error;
pub mod expr;
pub mod fields;
pub mod plist;
pub mod read;
pub mod replay;
pub mod schema;
pub mod stack;

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export main types
pub use analysis::{AllVariants, CalculatedTlbInfo, VariantOracle};
pub use config::TlbOptions;
pub use error::{Error, ErrorSeverity, Result, StructuralError, StructuralExit};
pub use expr::{Assignment, BoolExpr, Model, SizeExpr};
pub use fields::{CellAddress, FieldRef, Path, TlbField};
pub use read::{Endian, LoadRequest, ReadKind, ReadValue};
pub use replay::{read_in_model_from_tlb_fields, ConcreteReadInfo, ReplayOutcome};
pub use schema::{LabelId, Schema, SchemaBuilder, SchemaDescription, StructureId};
pub use stack::{
    build_frame_for_structure, Frame, FrameOutcome, FrameResult, GuardedResult, StackStepResult,
    StepContext, TlbStack,
};
