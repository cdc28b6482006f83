//! Symbolic expressions over cell fields
//!
//! A deliberately small term language: size arithmetic ([`SizeExpr`]) and
//! guards ([`BoolExpr`]) whose leaves are [`FieldRef`]s. Smart constructors fold
//! constants eagerly, which is what lets the stack drop branches whose guard is
//! identically false without a solver round-trip. Deciding satisfiability of
//! anything non-constant is the job of the surrounding solver.
//!
//! ```
//! use tlb_stack::expr::{BoolExpr, SizeExpr};
//!
//! let guard = BoolExpr::lt(&SizeExpr::constant(5), &SizeExpr::constant(4));
//! assert!(guard.is_false());
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::fields::{CellAddress, FieldRef};
use crate::{Error, Result};

/// Non-negative size arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SizeExpr {
    /// Literal
    Const(i64),
    /// Unsigned value stored in a field
    Field(Box<FieldRef>),
    /// Sum
    Add(Box<SizeExpr>, Box<SizeExpr>),
    /// Difference
    Sub(Box<SizeExpr>, Box<SizeExpr>),
    /// Product
    Mul(Box<SizeExpr>, Box<SizeExpr>),
}

impl SizeExpr {
    /// Literal size
    pub fn constant(value: i64) -> Self {
        SizeExpr::Const(value)
    }

    /// Zero
    pub fn zero() -> Self {
        SizeExpr::Const(0)
    }

    /// Value of a field
    pub fn field(field: FieldRef) -> Self {
        SizeExpr::Field(Box::new(field))
    }

    /// Concrete value, if the expression folded to one
    pub fn as_const(&self) -> Option<i64> {
        match self {
            SizeExpr::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// `self + other`
    pub fn add(&self, other: &SizeExpr) -> SizeExpr {
        match (self.as_const(), other.as_const()) {
            (Some(a), Some(b)) => SizeExpr::Const(a + b),
            (Some(0), _) => other.clone(),
            (_, Some(0)) => self.clone(),
            _ => SizeExpr::Add(Box::new(self.clone()), Box::new(other.clone())),
        }
    }

    /// `self - other`
    pub fn sub(&self, other: &SizeExpr) -> SizeExpr {
        match (self.as_const(), other.as_const()) {
            (Some(a), Some(b)) => SizeExpr::Const(a - b),
            (_, Some(0)) => self.clone(),
            _ if self == other => SizeExpr::Const(0),
            _ => SizeExpr::Sub(Box::new(self.clone()), Box::new(other.clone())),
        }
    }

    /// `self * other`
    pub fn mul(&self, other: &SizeExpr) -> SizeExpr {
        match (self.as_const(), other.as_const()) {
            (Some(a), Some(b)) => SizeExpr::Const(a * b),
            (Some(0), _) | (_, Some(0)) => SizeExpr::Const(0),
            (Some(1), _) => other.clone(),
            (_, Some(1)) => self.clone(),
            _ => SizeExpr::Mul(Box::new(self.clone()), Box::new(other.clone())),
        }
    }

    /// Evaluate against a model
    pub fn eval<M: Model + ?Sized>(&self, model: &M) -> Result<i64> {
        match self {
            SizeExpr::Const(v) => Ok(*v),
            SizeExpr::Field(field) => {
                let bits = field_bits(model, field)?;
                bits_to_unsigned(&bits)
            }
            SizeExpr::Add(a, b) => Ok(a.eval(model)? + b.eval(model)?),
            SizeExpr::Sub(a, b) => Ok(a.eval(model)? - b.eval(model)?),
            SizeExpr::Mul(a, b) => Ok(a.eval(model)? * b.eval(model)?),
        }
    }
}

impl From<i64> for SizeExpr {
    fn from(value: i64) -> Self {
        SizeExpr::Const(value)
    }
}

impl From<i32> for SizeExpr {
    fn from(value: i32) -> Self {
        SizeExpr::Const(i64::from(value))
    }
}

impl From<u32> for SizeExpr {
    fn from(value: u32) -> Self {
        SizeExpr::Const(i64::from(value))
    }
}

impl fmt::Display for SizeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeExpr::Const(v) => write!(f, "{}", v),
            SizeExpr::Field(field) => write!(f, "{}", field),
            SizeExpr::Add(a, b) => write!(f, "({} + {})", a, b),
            SizeExpr::Sub(a, b) => write!(f, "({} - {})", a, b),
            SizeExpr::Mul(a, b) => write!(f, "({} * {})", a, b),
        }
    }
}

/// Guard over size expressions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoolExpr {
    /// Literal
    Const(bool),
    /// `a == b`
    Eq(SizeExpr, SizeExpr),
    /// `a < b`
    Lt(SizeExpr, SizeExpr),
    /// Negation
    Not(Box<BoolExpr>),
    /// Conjunction, never empty or containing literals
    And(Vec<BoolExpr>),
    /// Disjunction, never empty or containing literals
    Or(Vec<BoolExpr>),
}

impl BoolExpr {
    /// The true literal
    pub const TRUE: BoolExpr = BoolExpr::Const(true);
    /// The false literal
    pub const FALSE: BoolExpr = BoolExpr::Const(false);

    /// Literal from a Rust bool
    pub fn constant(value: bool) -> Self {
        BoolExpr::Const(value)
    }

    /// Identically true after folding
    pub fn is_true(&self) -> bool {
        matches!(self, BoolExpr::Const(true))
    }

    /// Identically false after folding
    pub fn is_false(&self) -> bool {
        matches!(self, BoolExpr::Const(false))
    }

    /// `a == b`
    pub fn eq(a: &SizeExpr, b: &SizeExpr) -> Self {
        match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => BoolExpr::Const(x == y),
            _ if a == b => BoolExpr::TRUE,
            _ => BoolExpr::Eq(a.clone(), b.clone()),
        }
    }

    /// `a < b`
    pub fn lt(a: &SizeExpr, b: &SizeExpr) -> Self {
        match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => BoolExpr::Const(x < y),
            _ if a == b => BoolExpr::FALSE,
            // Field values are unsigned.
            (None, Some(0)) if matches!(a, SizeExpr::Field(_)) => BoolExpr::FALSE,
            _ => BoolExpr::Lt(a.clone(), b.clone()),
        }
    }

    /// `a > b`
    pub fn gt(a: &SizeExpr, b: &SizeExpr) -> Self {
        Self::lt(b, a)
    }

    /// `a >= b`
    pub fn ge(a: &SizeExpr, b: &SizeExpr) -> Self {
        Self::lt(a, b).not()
    }

    /// `a <= b`
    pub fn le(a: &SizeExpr, b: &SizeExpr) -> Self {
        Self::lt(b, a).not()
    }

    /// Negation
    #[allow(clippy::should_implement_trait)]
    pub fn not(&self) -> Self {
        match self {
            BoolExpr::Const(v) => BoolExpr::Const(!v),
            BoolExpr::Not(inner) => (**inner).clone(),
            other => BoolExpr::Not(Box::new(other.clone())),
        }
    }

    /// `self && other`
    pub fn and(&self, other: &BoolExpr) -> Self {
        Self::all([self.clone(), other.clone()])
    }

    /// `self || other`
    pub fn or(&self, other: &BoolExpr) -> Self {
        Self::any([self.clone(), other.clone()])
    }

    /// Conjunction of many guards
    pub fn all<I: IntoIterator<Item = BoolExpr>>(items: I) -> Self {
        let mut parts = Vec::new();
        for item in items {
            match item {
                BoolExpr::Const(true) => {}
                BoolExpr::Const(false) => return BoolExpr::FALSE,
                BoolExpr::And(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        parts.dedup();
        let contradicts = parts.iter().any(|part| match part {
            BoolExpr::Not(inner) => parts.contains(&**inner),
            _ => false,
        });
        if contradicts {
            return BoolExpr::FALSE;
        }
        match parts.len() {
            0 => BoolExpr::TRUE,
            1 => parts.remove(0),
            _ => BoolExpr::And(parts),
        }
    }

    /// Disjunction of many guards
    pub fn any<I: IntoIterator<Item = BoolExpr>>(items: I) -> Self {
        let mut parts = Vec::new();
        for item in items {
            match item {
                BoolExpr::Const(false) => {}
                BoolExpr::Const(true) => return BoolExpr::TRUE,
                BoolExpr::Or(inner) => parts.extend(inner),
                other => parts.push(other),
            }
        }
        match parts.len() {
            0 => BoolExpr::FALSE,
            1 => parts.remove(0),
            _ => BoolExpr::Or(parts),
        }
    }

    /// Evaluate against a model
    pub fn eval<M: Model + ?Sized>(&self, model: &M) -> Result<bool> {
        match self {
            BoolExpr::Const(v) => Ok(*v),
            BoolExpr::Eq(a, b) => Ok(a.eval(model)? == b.eval(model)?),
            BoolExpr::Lt(a, b) => Ok(a.eval(model)? < b.eval(model)?),
            BoolExpr::Not(inner) => Ok(!inner.eval(model)?),
            BoolExpr::And(parts) => {
                for part in parts {
                    if !part.eval(model)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            BoolExpr::Or(parts) => {
                for part in parts {
                    if part.eval(model)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl fmt::Display for BoolExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolExpr::Const(v) => write!(f, "{}", v),
            BoolExpr::Eq(a, b) => write!(f, "({} = {})", a, b),
            BoolExpr::Lt(a, b) => write!(f, "({} < {})", a, b),
            BoolExpr::Not(inner) => write!(f, "!{}", inner),
            BoolExpr::And(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", rendered.join(" && "))
            }
            BoolExpr::Or(parts) => {
                let rendered: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", rendered.join(" || "))
            }
        }
    }
}

/// Satisfying assignment produced by the solver for one execution branch.
pub trait Model {
    /// Bits of a field, most significant first. `None` lets the field default
    /// to all zeros.
    fn field_bits(&self, field: &FieldRef) -> Option<String>;

    /// Remaining data bits of the slice a slice-reference field points to.
    fn slice_data(&self, slice: &FieldRef) -> Option<String>;

    /// Number of data bits in a cell.
    fn data_length(&self, address: CellAddress) -> Option<u32>;
}

/// Bits of `field` under `model`, padded to the field's width.
pub fn field_bits<M: Model + ?Sized>(model: &M, field: &FieldRef) -> Result<String> {
    let width = field.field.width().ok_or_else(|| {
        Error::Evaluation(format!("{} is a slice reference, not a bit-vector", field))
    })? as usize;
    let bits = model.field_bits(field).unwrap_or_default();
    if bits.len() > width {
        return Err(Error::Evaluation(format!(
            "model value for {} has {} bits, field width is {}",
            field,
            bits.len(),
            width
        )));
    }
    Ok(format!("{}{}", "0".repeat(width - bits.len()), bits))
}

/// True if `s` consists of `0` and `1` only
pub fn is_bit_string(s: &str) -> bool {
    s.chars().all(|c| c == '0' || c == '1')
}

/// Unsigned value of a bit string, which must fit into 63 bits after leading
/// zeros are dropped.
pub fn bits_to_unsigned(bits: &str) -> Result<i64> {
    let significant = bits.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(0);
    }
    if significant.len() > 63 || !is_bit_string(significant) {
        return Err(Error::Evaluation(format!(
            "bit string {} does not denote a size",
            bits
        )));
    }
    i64::from_str_radix(significant, 2).map_err(|e| Error::Evaluation(e.to_string()))
}

/// `value` as exactly `width` bits, most significant first
pub fn unsigned_to_bits(value: u64, width: usize) -> String {
    let raw = format!("{:b}", value);
    if raw.len() >= width {
        raw[raw.len() - width..].to_string()
    } else {
        format!("{}{}", "0".repeat(width - raw.len()), raw)
    }
}

/// Map-backed [`Model`].
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    fields: HashMap<FieldRef, String>,
    slices: HashMap<FieldRef, String>,
    lengths: HashMap<CellAddress, u32>,
}

impl Assignment {
    /// Empty model: every field reads as zeros
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign literal bits to a field
    pub fn set_bits(&mut self, field: FieldRef, bits: impl Into<String>) -> Result<&mut Self> {
        let bits = bits.into();
        if !is_bit_string(&bits) {
            return Err(Error::Evaluation(format!("{} is not a bit string", bits)));
        }
        if let Some(width) = field.field.width() {
            if bits.len() > width as usize {
                return Err(Error::Evaluation(format!(
                    "{} bits do not fit into {} of width {}",
                    bits.len(),
                    field,
                    width
                )));
            }
        }
        self.fields.insert(field, bits);
        Ok(self)
    }

    /// Assign an unsigned value to a bit-vector field
    pub fn set_unsigned(&mut self, field: FieldRef, value: u64) -> Result<&mut Self> {
        let width = field.field.width().ok_or_else(|| {
            Error::Evaluation(format!("{} is a slice reference, not a bit-vector", field))
        })?;
        let bits = unsigned_to_bits(value, width as usize);
        self.set_bits(field, bits)
    }

    /// Assign the content of an out-of-line slice
    pub fn set_slice(&mut self, slice: FieldRef, bits: impl Into<String>) -> Result<&mut Self> {
        let bits = bits.into();
        if !is_bit_string(&bits) {
            return Err(Error::Evaluation(format!("{} is not a bit string", bits)));
        }
        self.slices.insert(slice, bits);
        Ok(self)
    }

    /// Assign the data length of a cell
    pub fn set_data_length(&mut self, address: CellAddress, length: u32) -> &mut Self {
        self.lengths.insert(address, length);
        self
    }
}

impl Model for Assignment {
    fn field_bits(&self, field: &FieldRef) -> Option<String> {
        self.fields.get(field).cloned()
    }

    fn slice_data(&self, slice: &FieldRef) -> Option<String> {
        self.slices.get(slice).cloned()
    }

    fn data_length(&self, address: CellAddress) -> Option<u32> {
        self.lengths.get(&address).copied()
    }
}
