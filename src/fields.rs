//! Symbolic field addressing
//!
//! Every value a schema position decodes to is a symbolic field of the cell
//! being parsed. A field is keyed by the structure node that declares it and
//! by the [`Path`] of composite-label occurrences entered to reach that node,
//! so two occurrences of one recursive label in a cell never alias.

use std::fmt;

use crate::config::MAX_DATA_LENGTH;
use crate::plist::PersistentList;
use crate::schema::StructureId;

/// Concrete address of a cell in the symbolic heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress(pub u64);

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Ids of the known-type prefixes whose composite labels were entered,
/// outermost first.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(PersistentList<StructureId>);

impl Path {
    /// Path of the root frame
    pub fn root() -> Self {
        Self(PersistentList::new())
    }

    /// Path one composite level deeper
    pub fn enter(&self, id: StructureId) -> Self {
        Self(self.0.push(id))
    }

    /// Nesting level
    pub fn level(&self) -> usize {
        self.0.len()
    }

    /// Structure ids, outermost first
    pub fn ids(&self) -> Vec<StructureId> {
        self.0.to_vec()
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl FromIterator<StructureId> for Path {
    fn from_iter<I: IntoIterator<Item = StructureId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Kind of storage a field occupies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Bit-vector of a fixed width
    ConcreteSizeBlock {
        /// Width in bits
        bit_size: u32,
    },
    /// Bit-vector wide enough for the largest value of a variable-size integer
    SymbolicSizeBlock {
        /// Width in bits
        max_bit_size: u32,
    },
    /// Reference to a slice holding content stored out of line
    SliceRef,
    /// Index of the chosen switch variant among the possible continuations
    Switch {
        /// Structure ids of the variants reachable at this depth
        possible_continuations: Vec<StructureId>,
    },
    /// Whole opaque cell content
    UnknownBlock,
}

/// A symbolic field of one structure occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TlbField {
    /// Storage kind
    pub kind: FieldKind,
    /// Declaring structure node
    pub structure_id: StructureId,
    /// Occurrence path
    pub path: Path,
}

impl TlbField {
    /// Fixed-width block
    pub fn concrete(bit_size: u32, structure_id: StructureId, path: Path) -> Self {
        Self {
            kind: FieldKind::ConcreteSizeBlock { bit_size },
            structure_id,
            path,
        }
    }

    /// Block for a variable-size integer
    pub fn symbolic(max_bit_size: u32, structure_id: StructureId, path: Path) -> Self {
        Self {
            kind: FieldKind::SymbolicSizeBlock { max_bit_size },
            structure_id,
            path,
        }
    }

    /// Out-of-line slice reference
    pub fn slice_ref(structure_id: StructureId, path: Path) -> Self {
        Self {
            kind: FieldKind::SliceRef,
            structure_id,
            path,
        }
    }

    /// Switch discriminator index
    pub fn switch(
        structure_id: StructureId,
        path: Path,
        possible_continuations: Vec<StructureId>,
    ) -> Self {
        Self {
            kind: FieldKind::Switch {
                possible_continuations,
            },
            structure_id,
            path,
        }
    }

    /// Opaque content of a cell without schema
    pub fn unknown(structure_id: StructureId, path: Path) -> Self {
        Self {
            kind: FieldKind::UnknownBlock,
            structure_id,
            path,
        }
    }

    /// Bit-vector width, `None` for slice references
    pub fn width(&self) -> Option<u32> {
        match &self.kind {
            FieldKind::ConcreteSizeBlock { bit_size } => Some(*bit_size),
            FieldKind::SymbolicSizeBlock { max_bit_size } => Some(*max_bit_size),
            FieldKind::SliceRef => None,
            FieldKind::Switch {
                possible_continuations,
            } => Some(switch_index_width(possible_continuations.len())),
            FieldKind::UnknownBlock => Some(MAX_DATA_LENGTH),
        }
    }

    /// Bind this field to a cell
    pub fn at(self, address: CellAddress) -> FieldRef {
        FieldRef {
            address,
            field: self,
        }
    }
}

/// Minimum number of bits able to hold `count` distinct indices.
fn switch_index_width(count: usize) -> u32 {
    let mut bits = 1;
    while (1usize << bits) < count {
        bits += 1;
    }
    bits
}

/// A field of a concrete cell: the leaf variable of every symbolic expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Cell owning the field
    pub address: CellAddress,
    /// The field itself
    pub field: TlbField,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.field.kind {
            FieldKind::ConcreteSizeBlock { bit_size } => format!("bits{}", bit_size),
            FieldKind::SymbolicSizeBlock { max_bit_size } => format!("var{}", max_bit_size),
            FieldKind::SliceRef => "slice".to_string(),
            FieldKind::Switch { .. } => "switch".to_string(),
            FieldKind::UnknownBlock => "unknown".to_string(),
        };
        write!(f, "{}.{}@{}", self.address, kind, self.field.structure_id)?;
        for id in self.field.path.ids() {
            write!(f, "/{}", id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_width() {
        assert_eq!(switch_index_width(1), 1);
        assert_eq!(switch_index_width(2), 1);
        assert_eq!(switch_index_width(3), 2);
        assert_eq!(switch_index_width(4), 2);
        assert_eq!(switch_index_width(5), 3);
    }

    #[test]
    fn test_paths_distinguish_occurrences() {
        let root = Path::root();
        let a = root.enter(StructureId(7));
        let b = a.enter(StructureId(7));
        let field_a = TlbField::concrete(8, StructureId(9), a);
        let field_b = TlbField::concrete(8, StructureId(9), b.clone());
        assert_ne!(field_a, field_b);
        assert_eq!(b.level(), 2);
        assert_eq!(b.ids(), vec![StructureId(7), StructureId(7)]);
    }
}
