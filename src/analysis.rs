//! Possible switch variant analysis
//!
//! A switch variant is only worth branching on if it can actually be
//! constructed under the recursion budget left at that position. The analysis
//! computes, for every composite label, the smallest budget under which its
//! body can be fully built, then filters every switch's variants per budget.

use std::collections::HashMap;

use crate::config::TlbOptions;
use crate::schema::{Label, LabelId, Schema, Structure, StructureId, SwitchVariant};
use crate::{Error, Result};

/// Source of the switch variants reachable under a given recursion budget.
pub trait VariantOracle {
    /// Variants of `switch` that can still be constructed with budget `depth`
    fn possible_variants(&self, switch: StructureId, depth: u32) -> Result<Vec<SwitchVariant>>;
}

/// Oracle treating every declared variant as possible.
#[derive(Debug, Clone, Copy)]
pub struct AllVariants<'s>(pub &'s Schema);

impl VariantOracle for AllVariants<'_> {
    fn possible_variants(&self, switch: StructureId, _depth: u32) -> Result<Vec<SwitchVariant>> {
        match self.0.structure(switch) {
            Structure::SwitchPrefix { variants, .. } => Ok(variants.clone()),
            other => Err(Error::internal(format!(
                "{} is {:?}, not a switch",
                switch, other
            ))),
        }
    }
}

/// Precomputed per-schema facts used while stepping.
#[derive(Debug, Clone)]
pub struct CalculatedTlbInfo {
    max_tlb_depth: u32,
    min_depth: HashMap<LabelId, u32>,
    unknown_leaves: HashMap<LabelId, bool>,
    possible_variants: Vec<HashMap<StructureId, Vec<SwitchVariant>>>,
}

impl CalculatedTlbInfo {
    /// Analyse every composite label and switch of `schema`
    pub fn new(schema: &Schema, options: &TlbOptions) -> Result<Self> {
        options.validate()?;
        let max_tlb_depth = options.max_tlb_depth;

        let min_depth = calculate_min_tlb_depth(schema, max_tlb_depth);
        let unknown_leaves = schema
            .composite_labels()
            .filter_map(|label| {
                schema
                    .internal_structure(label)
                    .map(|body| (label, has_unknown_leaves(schema, body)))
            })
            .collect();

        let switches: Vec<StructureId> = schema.switches().collect();
        let mut possible_variants = Vec::with_capacity(max_tlb_depth as usize + 1);
        for depth in 0..=max_tlb_depth {
            let mut by_switch = HashMap::with_capacity(switches.len());
            for switch in &switches {
                if let Structure::SwitchPrefix { variants, .. } = schema.structure(*switch) {
                    let possible: Vec<SwitchVariant> = variants
                        .iter()
                        .filter(|variant| {
                            construction_is_possible(schema, variant.structure, &|label| {
                                min_depth
                                    .get(&label)
                                    .map_or(false, |min| depth > 0 && *min <= depth - 1)
                            })
                        })
                        .cloned()
                        .collect();
                    by_switch.insert(*switch, possible);
                }
            }
            possible_variants.push(by_switch);
        }

        tracing::debug!(
            labels = min_depth.len(),
            switches = switches.len(),
            max_tlb_depth,
            "calculated TL-B label info"
        );

        Ok(Self {
            max_tlb_depth,
            min_depth,
            unknown_leaves,
            possible_variants,
        })
    }

    /// Largest budget the analysis covers
    pub fn max_tlb_depth(&self) -> u32 {
        self.max_tlb_depth
    }

    /// Least budget under which the label's body can be fully built, `None`
    /// if no budget up to the configured maximum suffices
    pub fn minimal_label_depth(&self, label: LabelId) -> Option<u32> {
        self.min_depth.get(&label).copied()
    }

    /// Whether the label's own body contains an `Unknown` leaf
    pub fn has_unknown_leaves(&self, label: LabelId) -> Option<bool> {
        self.unknown_leaves.get(&label).copied()
    }
}

impl VariantOracle for CalculatedTlbInfo {
    fn possible_variants(&self, switch: StructureId, depth: u32) -> Result<Vec<SwitchVariant>> {
        let by_switch = self
            .possible_variants
            .get(depth as usize)
            .ok_or(Error::DepthOutOfRange {
                depth,
                max: self.max_tlb_depth,
            })?;
        by_switch
            .get(&switch)
            .cloned()
            .ok_or_else(|| Error::internal(format!("no variants recorded for switch {}", switch)))
    }
}

fn calculate_min_tlb_depth(schema: &Schema, max_tlb_depth: u32) -> HashMap<LabelId, u32> {
    let labels: Vec<(LabelId, StructureId)> = schema
        .composite_labels()
        .filter_map(|label| schema.internal_structure(label).map(|body| (label, body)))
        .collect();

    let mut result: HashMap<LabelId, u32> = HashMap::new();
    for depth in 0..=max_tlb_depth {
        let known = result.clone();
        for (label, body) in &labels {
            if result.contains_key(label) {
                continue;
            }
            let possible = construction_is_possible(schema, *body, &|nested| {
                known
                    .get(&nested)
                    .map_or(false, |min| depth > 0 && *min <= depth - 1)
            });
            if possible {
                result.insert(*label, depth);
            }
        }
    }
    result
}

/// Whether some path through `structure` only needs nested composite labels
/// accepted by `label_is_possible`.
fn construction_is_possible(
    schema: &Schema,
    structure: StructureId,
    label_is_possible: &dyn Fn(LabelId) -> bool,
) -> bool {
    match schema.structure(structure) {
        Structure::Empty | Structure::Unknown => true,
        Structure::LoadRef { rest, .. } => construction_is_possible(schema, *rest, label_is_possible),
        Structure::KnownTypePrefix { label, rest, .. } => {
            let head = match schema.label(*label) {
                Label::Atomic(_) => true,
                Label::Composite(_) => label_is_possible(*label),
            };
            head && construction_is_possible(schema, *rest, label_is_possible)
        }
        Structure::SwitchPrefix { variants, .. } => variants
            .iter()
            .any(|variant| construction_is_possible(schema, variant.structure, label_is_possible)),
    }
}

fn has_unknown_leaves(schema: &Schema, structure: StructureId) -> bool {
    match schema.structure(structure) {
        Structure::Empty => false,
        Structure::Unknown => true,
        Structure::KnownTypePrefix { rest, .. } | Structure::LoadRef { rest, .. } => {
            has_unknown_leaves(schema, *rest)
        }
        Structure::SwitchPrefix { variants, .. } => variants
            .iter()
            .any(|variant| has_unknown_leaves(schema, variant.structure)),
    }
}
