//! MeshError: Unified error type for background-mesh public APIs
//!
//! Contract violations (bad indices, unsupported dimensionality, 3D-only operations on a
//! lower-dimensional forest) and consistency violations (broken neighbor symmetry, facet
//! ownership, colliding vertex ids) are reported through this type instead of aborting.
//! The driver decides whether to abort the run. Expected absence, such as a missing
//! neighbor at the domain boundary, is never an error and is expressed with `Option`.

use std::fmt;
use thiserror::Error;

/// Category of a detected invariant violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvariantKind {
    /// A cell has a number of children other than zero or `2^N`.
    ChildCount,
    /// A same-level neighbor does not point back through the opposite slot.
    NeighborSymmetry,
    /// A neighbor slot holds a finer cell or a cell at an unexpected position.
    NeighborPosition,
    /// A facet slot disagrees with the facet it references.
    FacetSlotMismatch,
    /// A facet has zero or several owning cells.
    FacetOwnership,
    /// An edge would be shared by more than four cells.
    EdgeOverflow,
    /// An edge slot disagrees with the edge it references, or ownership is not unique.
    EdgeOwnership,
    /// Activation state is inconsistent across a parent and its children.
    ActivationState,
    /// An operation was invoked on a dimensionality that does not support it.
    DimensionMismatch,
    /// Children that are still used by an activation pattern were asked to be discarded.
    ChildrenInUse,
    /// Two distinct vertex positions were assigned the same global id.
    VertexIdCollision,
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvariantKind::ChildCount => "child count",
            InvariantKind::NeighborSymmetry => "neighbor symmetry",
            InvariantKind::NeighborPosition => "neighbor position",
            InvariantKind::FacetSlotMismatch => "facet slot mismatch",
            InvariantKind::FacetOwnership => "facet ownership",
            InvariantKind::EdgeOverflow => "edge overflow",
            InvariantKind::EdgeOwnership => "edge ownership",
            InvariantKind::ActivationState => "activation state",
            InvariantKind::DimensionMismatch => "dimension mismatch",
            InvariantKind::ChildrenInUse => "children in use",
            InvariantKind::VertexIdCollision => "vertex id collision",
        };
        f.write_str(name)
    }
}

/// Unified error type for background-mesh operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// A structural invariant of the forest does not hold.
    #[error("invariant violated ({kind}): {context}")]
    InvariantViolated {
        kind: InvariantKind,
        context: String,
    },
    /// Only one-, two- and three-dimensional forests exist.
    #[error("unsupported dimension {0}; expected 1, 2 or 3")]
    UnsupportedDimension(usize),
    /// An index into a fixed-capacity table or arena is out of range.
    #[error("{what} index {index} out of range (capacity {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Activation pattern id beyond the configured pattern count.
    #[error("activation pattern {pattern} out of range ({count} patterns)")]
    PatternOutOfRange { pattern: usize, count: usize },
    /// Refinement past the deepest supported level.
    #[error("cell {domain_id} cannot be refined beyond level {max}")]
    MaxLevelExceeded { domain_id: u64, max: u8 },
    /// A refinement request on a cell that is not active under the pattern.
    #[error("cell {domain_id} is not active on pattern {pattern}")]
    CellNotActive { domain_id: u64, pattern: usize },
    /// The root named by a pedigree path is not stored on this process.
    #[error("pedigree root {0} is not present on this process")]
    UnknownPedigreeRoot(u64),
    /// A pedigree path descends below the local tree.
    #[error("pedigree path from root {root} cannot be followed at level {level}")]
    PedigreeUnresolved { root: u64, level: u8 },
    /// A pedigree record whose length does not match its level.
    #[error("malformed pedigree record: {0}")]
    MalformedPedigree(String),
    /// Communication failure with a neighbor rank.
    #[error("communication error with rank {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },
    /// A received buffer had an unexpected size.
    #[error("buffer size mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// A shared entity has no global id after synchronization.
    #[error("{entity} {index} has no resolved global id")]
    UnresolvedId { entity: &'static str, index: usize },
}

impl MeshError {
    /// Shorthand for [`MeshError::InvariantViolated`].
    pub fn invariant(kind: InvariantKind, context: impl Into<String>) -> Self {
        MeshError::InvariantViolated {
            kind,
            context: context.into(),
        }
    }
}
