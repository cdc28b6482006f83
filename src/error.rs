//! Error types for the TL-B stack engine
//!
//! Two families live here. [`Error`] is the crate's ordinary `Result` error:
//! schema authoring mistakes, malformed schema documents, bad options and
//! genuine engine inconsistencies. [`StructuralError`] is *not* an error in the
//! Rust sense: it is a finding about the analysed contract, carried as data
//! inside guarded outcomes so that exploration of sibling branches continues.

use std::fmt;

use thiserror::Error;

use crate::read::ReadKind;
use crate::schema::LabelId;

/// TL-B engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Schema authoring errors
    /// Switch prefix violates its shape invariant
    ///
    /// **Triggered by:** a zero `switch_size`, a key whose length differs from
    /// `switch_size`, a key containing characters other than `0`/`1`, or a
    /// switch without variants.
    #[error("Invalid switch prefix: {message}")]
    InvalidSwitch {
        /// Description of the violated invariant
        message: String,
    },

    /// Reference to a label that was never declared
    #[error("Undefined label: {name}")]
    UndefinedLabel {
        /// Label name
        name: String,
    },

    /// Two composite labels declared with the same name
    #[error("Duplicate label: {name}")]
    DuplicateLabel {
        /// Label name
        name: String,
    },

    /// Composite label declared but its structure never attached
    #[error("Label {name} has no internal structure")]
    MissingStructure {
        /// Label name
        name: String,
    },

    /// Type argument does not point at a small unsigned integer prefix
    ///
    /// **Triggered by:** `args` naming a structure that is not a
    /// known-type prefix of an unsigned integer of at most 31 bits.
    #[error("Invalid type argument: {message}")]
    InvalidTypeArgument {
        /// Description of the problem
        message: String,
    },

    /// Number of type arguments differs from the label's arity
    #[error("Label {label} expects {expected} type arguments, got {got}")]
    ArityMismatch {
        /// Label name
        label: String,
        /// Declared arity
        expected: usize,
        /// Supplied arguments
        got: usize,
    },

    /// Unknown structure used below the root of a parse
    #[error("Unknown structure is only legal at the root, found at tlb level {level}")]
    MisplacedUnknown {
        /// Nesting level of the offending frame
        level: usize,
    },

    /// Schema description document could not be decoded
    #[error("Schema description error: {0}")]
    SchemaDescription(String),

    // Configuration
    /// Options failed validation
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Query for a recursion depth outside the precomputed range
    #[error("Depth {depth} is outside the computed range 0..={max}")]
    DepthOutOfRange {
        /// Requested depth
        depth: u32,
        /// Configured maximum
        max: u32,
    },

    // Engine failures
    /// Attempt to read through a label the engine cannot interpret
    ///
    /// Raised when the top frame rejects a read, no deeper frame can be
    /// expanded and no shallower structural error was recorded. This is a
    /// schema/engine consistency problem, never a property of the input.
    #[error("Cannot interpret label {label}: {reason}")]
    UninterpretableLabel {
        /// Label name
        label: String,
        /// Why no frame could serve the read
        reason: String,
    },

    /// Model disagrees with every guarded branch during replay
    #[error("Model inconsistency: {0}")]
    ModelInconsistency(String),

    /// Replay ran out of bits or met an unexpected shape
    #[error("Replay mismatch: {0}")]
    ReplayMismatch(String),

    /// Expression could not be evaluated
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Frame stack reached a shape the automaton never produces
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Engine or schema inconsistency, analysis must stop
    Fatal,
    /// Bad input document or options, caller may fix and retry
    Recoverable,
}

impl Error {
    /// Create a schema description error from any displayable cause
    pub fn description(msg: impl fmt::Display) -> Self {
        Error::SchemaDescription(msg.to_string())
    }

    /// Create a model inconsistency error
    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Error::ModelInconsistency(msg.into())
    }

    /// Create a replay mismatch error
    pub fn replay(msg: impl Into<String>) -> Self {
        Error::ReplayMismatch(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::SchemaDescription(_)
            | Error::InvalidOptions(_)
            | Error::DepthOutOfRange { .. } => ErrorSeverity::Recoverable,
            _ => ErrorSeverity::Fatal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::description(err)
    }
}

/// Result type for TL-B stack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Mismatch between a declared schema and an attempted access pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralExit {
    /// Read attempted after the schema was fully consumed
    UnexpectedDataReading {
        /// The offending request
        read: ReadKind,
    },
    /// Built-in label rejected the requested decoding kind
    ReadingOfUnexpectedType {
        /// Label that was expected at this position
        expected: LabelId,
        /// Printable name of that label
        expected_name: String,
        /// Its computed arguments, rendered
        args: Vec<String>,
        /// The request actually made
        actual: ReadKind,
    },
    /// Sized read wider than the switch discriminator
    ReadingOutOfSwitchBounds {
        /// The offending request
        read: ReadKind,
    },
    /// Non-sized read where a discriminator was expected
    ReadingSwitchWithUnexpectedType {
        /// The offending request
        read: ReadKind,
    },
    /// Reference consumed where the schema declares none
    UnexpectedRefReading,
    /// Cell ended while the schema still expected content
    UnexpectedEndOfReading,
}

impl StructuralExit {
    /// Stable identifier used to group findings in reports.
    pub fn rule_id(&self) -> &'static str {
        match self {
            StructuralExit::UnexpectedDataReading { .. } => "unexpected-data-reading",
            StructuralExit::ReadingOfUnexpectedType { .. } => "reading-of-unexpected-type",
            StructuralExit::ReadingOutOfSwitchBounds { .. } => "reading-out-of-switch-bounds",
            StructuralExit::ReadingSwitchWithUnexpectedType { .. } => {
                "reading-switch-with-unexpected-type"
            }
            StructuralExit::UnexpectedRefReading => "unexpected-ref-reading",
            StructuralExit::UnexpectedEndOfReading => "unexpected-end-of-reading",
        }
    }
}

impl fmt::Display for StructuralExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralExit::UnexpectedDataReading { read } => {
                write!(f, "Unexpected reading of {} after the end of the schema", read)
            }
            StructuralExit::ReadingOfUnexpectedType {
                expected_name,
                args,
                actual,
                ..
            } => {
                if args.is_empty() {
                    write!(f, "Expected {}, but read {}", expected_name, actual)
                } else {
                    write!(
                        f,
                        "Expected {}({}), but read {}",
                        expected_name,
                        args.join(", "),
                        actual
                    )
                }
            }
            StructuralExit::ReadingOutOfSwitchBounds { read } => {
                write!(f, "Reading {} crosses a switch discriminator", read)
            }
            StructuralExit::ReadingSwitchWithUnexpectedType { read } => {
                write!(f, "Switch discriminator read with {}", read)
            }
            StructuralExit::UnexpectedRefReading => write!(f, "Unexpected reference reading"),
            StructuralExit::UnexpectedEndOfReading => write!(f, "Unexpected end of reading"),
        }
    }
}

/// Structural finding carried inside a guarded outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralError {
    /// What went wrong
    pub exit: StructuralExit,
}

impl StructuralError {
    /// Wrap an exit
    pub fn new(exit: StructuralExit) -> Self {
        Self { exit }
    }

    /// Stable rule identifier of the wrapped exit
    pub fn rule_id(&self) -> &'static str {
        self.exit.rule_id()
    }
}

impl From<StructuralExit> for StructuralError {
    fn from(exit: StructuralExit) -> Self {
        Self::new(exit)
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TL-B structural error [{}]: {}", self.rule_id(), self.exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::SizeExpr;

    #[test]
    fn test_rule_ids_are_distinct() {
        let read = ReadKind::bit_array(SizeExpr::constant(3));
        let exits = vec![
            StructuralExit::UnexpectedDataReading { read: read.clone() },
            StructuralExit::ReadingOutOfSwitchBounds { read: read.clone() },
            StructuralExit::ReadingSwitchWithUnexpectedType { read },
            StructuralExit::UnexpectedRefReading,
            StructuralExit::UnexpectedEndOfReading,
        ];
        let mut ids: Vec<_> = exits.iter().map(|e| e.rule_id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), exits.len());
    }

    #[test]
    fn test_structural_error_display_mentions_rule() {
        let err = StructuralError::new(StructuralExit::UnexpectedEndOfReading);
        assert!(err.to_string().contains("unexpected-end-of-reading"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            Error::InvalidOptions("x".into()).classify(),
            ErrorSeverity::Recoverable
        );
        assert_eq!(
            Error::inconsistency("no branch").classify(),
            ErrorSeverity::Fatal
        );
    }
}
