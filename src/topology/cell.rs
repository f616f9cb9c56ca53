//! Background cells: the nodes of the refinement forest.

use crate::mesh_error::MeshError;
use crate::topology::dimension::Dimension;
use crate::topology::handle::{CellIndex, EdgeIndex, FacetIndex};
use crate::topology::tables::child_bits;
use smallvec::{SmallVec, smallvec};

/// Refinement state of a cell under one activation pattern.
///
/// A cell is in exactly one state per pattern. `Refined` means the pattern uses the
/// cell's children instead of the cell itself; `Inactive` cells are either below an
/// active leaf of the pattern or exist only because another pattern refined their parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PatternState {
    #[default]
    Inactive,
    Active,
    Refined,
}

/// A node of the quadtree/octree forest.
///
/// Cells are stored in the [`Forest`](crate::forest::Forest) arena and refer to parents,
/// children, neighbors, facets and edges by index. Neighbor slot `s` holds the same-level
/// cell at offset [`neighbor_offset(s)`](crate::topology::tables::TopologyTables::neighbor_offset),
/// or the coarser cell covering that position when no same-level cell exists, or nothing
/// outside the stored domain.
#[derive(Clone, Debug)]
pub struct BackgroundCell {
    pub(crate) level: u8,
    pub(crate) domain_id: u64,
    pub(crate) domain_index: Option<u64>,
    pub(crate) memory_index: CellIndex,
    pub(crate) owner: usize,
    pub(crate) ijk: [u64; 3],
    pub(crate) child_index: u8,
    pub(crate) parent: Option<CellIndex>,
    pub(crate) children: SmallVec<[CellIndex; 8]>,
    pub(crate) neighbors: SmallVec<[Option<CellIndex>; 26]>,
    pub(crate) facets: SmallVec<[Option<FacetIndex>; 6]>,
    pub(crate) owns_facet: SmallVec<[bool; 6]>,
    pub(crate) edges: SmallVec<[Option<EdgeIndex>; 12]>,
    pub(crate) owns_edge: SmallVec<[bool; 12]>,
    pub(crate) states: SmallVec<[PatternState; 4]>,
    pub(crate) padding: bool,
    pub(crate) queued: bool,
}

impl BackgroundCell {
    pub(crate) fn new(
        dim: Dimension,
        patterns: usize,
        level: u8,
        domain_id: u64,
        memory_index: CellIndex,
        owner: usize,
        ijk: [u64; 3],
    ) -> Self {
        Self {
            level,
            domain_id,
            domain_index: None,
            memory_index,
            owner,
            ijk,
            child_index: 0,
            parent: None,
            children: SmallVec::new(),
            neighbors: smallvec![None; dim.neighbors()],
            facets: smallvec![None; dim.facets()],
            owns_facet: smallvec![false; dim.facets()],
            edges: smallvec![None; dim.edges()],
            owns_edge: smallvec![false; dim.edges()],
            states: smallvec![PatternState::Inactive; patterns],
            padding: false,
            queued: false,
        }
    }

    /// Depth in the tree; level-0 cells are roots.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Domain-wide id, a pure function of level and position.
    pub fn domain_id(&self) -> u64 {
        self.domain_id
    }

    /// Dense index among the active cells of the last numbered pattern.
    pub fn domain_index(&self) -> Option<u64> {
        self.domain_index
    }

    /// Position in the process-local arena.
    pub fn memory_index(&self) -> CellIndex {
        self.memory_index
    }

    /// Rank owning this cell.
    pub fn owner(&self) -> usize {
        self.owner
    }

    /// Integer position on this cell's level, in padded coordinates.
    pub fn ijk(&self) -> [u64; 3] {
        self.ijk
    }

    /// Which child of its parent this cell is (bit `axis` set for the high half).
    pub fn child_index(&self) -> usize {
        self.child_index as usize
    }

    pub fn parent(&self) -> Option<CellIndex> {
        self.parent
    }

    /// Children exist. Whether a pattern uses them is given by [`state`](Self::state).
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn number_of_children(&self) -> usize {
        self.children.len()
    }

    pub fn children(&self) -> &[CellIndex] {
        &self.children
    }

    /// Child `k`, failing when the index is out of range or the cell is a leaf.
    pub fn child(&self, k: usize) -> Result<CellIndex, MeshError> {
        self.children
            .get(k)
            .copied()
            .ok_or(MeshError::IndexOutOfRange {
                what: "child",
                index: k,
                len: self.children.len(),
            })
    }

    pub fn neighbors(&self) -> &[Option<CellIndex>] {
        &self.neighbors
    }

    /// Neighbor slot `s`; `Ok(None)` marks the domain boundary.
    pub fn neighbor(&self, s: usize) -> Result<Option<CellIndex>, MeshError> {
        self.neighbors
            .get(s)
            .copied()
            .ok_or(MeshError::IndexOutOfRange {
                what: "neighbor",
                index: s,
                len: self.neighbors.len(),
            })
    }

    pub fn facets(&self) -> &[Option<FacetIndex>] {
        &self.facets
    }

    pub fn facet(&self, f: usize) -> Result<Option<FacetIndex>, MeshError> {
        self.facets
            .get(f)
            .copied()
            .ok_or(MeshError::IndexOutOfRange {
                what: "facet",
                index: f,
                len: self.facets.len(),
            })
    }

    /// This cell is responsible for releasing the facet in slot `f`.
    pub fn owns_facet(&self, f: usize) -> bool {
        self.owns_facet.get(f).copied().unwrap_or(false)
    }

    pub fn edges(&self) -> &[Option<EdgeIndex>] {
        &self.edges
    }

    /// Edge slot `e`. Cells of 1D/2D forests have no edge slots.
    pub fn edge(&self, e: usize) -> Result<Option<EdgeIndex>, MeshError> {
        if self.edges.is_empty() {
            return Err(MeshError::invariant(
                crate::mesh_error::InvariantKind::DimensionMismatch,
                format!("cell {} has no edges; edges exist in 3D only", self.domain_id),
            ));
        }
        self.edges
            .get(e)
            .copied()
            .ok_or(MeshError::IndexOutOfRange {
                what: "edge",
                index: e,
                len: self.edges.len(),
            })
    }

    /// This cell is responsible for releasing the edge in slot `e`.
    pub fn owns_edge(&self, e: usize) -> bool {
        self.owns_edge.get(e).copied().unwrap_or(false)
    }

    /// Number of activation patterns tracked by this cell.
    pub fn number_of_patterns(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, pattern: usize) -> Result<PatternState, MeshError> {
        self.states
            .get(pattern)
            .copied()
            .ok_or(MeshError::PatternOutOfRange {
                pattern,
                count: self.states.len(),
            })
    }

    /// Leaf-local test: the pattern uses this cell itself.
    pub fn is_active(&self, pattern: usize) -> bool {
        self.states.get(pattern) == Some(&PatternState::Active)
    }

    /// The pattern uses this cell's children.
    pub fn is_refined(&self, pattern: usize) -> bool {
        self.states.get(pattern) == Some(&PatternState::Refined)
    }

    pub(crate) fn set_state(&mut self, pattern: usize, state: PatternState) -> Result<(), MeshError> {
        let count = self.states.len();
        let slot = self
            .states
            .get_mut(pattern)
            .ok_or(MeshError::PatternOutOfRange { pattern, count })?;
        *slot = state;
        Ok(())
    }

    /// Exists only to complete the rectangular decomposition; never carries basis functions.
    pub fn is_padding(&self) -> bool {
        self.padding
    }

    /// Flagged for the next refinement pass.
    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Position of child `k` on the next level: `2·ijk + bit(k, axis)`.
    pub fn child_ijk(&self, k: usize, dim: Dimension) -> [u64; 3] {
        let bits = child_bits(k);
        let mut ijk = [0u64; 3];
        for a in 0..dim.get() {
            ijk[a] = 2 * self.ijk[a] + bits[a] as u64;
        }
        ijk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(dim: Dimension) -> BackgroundCell {
        BackgroundCell::new(dim, 2, 0, 5, CellIndex::new(0), 0, [1, 2, 0])
    }

    #[test]
    fn fresh_cell_is_an_inactive_leaf() {
        let c = cell(Dimension::Two);
        assert!(!c.has_children());
        assert_eq!(c.neighbors().len(), 8);
        assert_eq!(c.facets().len(), 4);
        assert_eq!(c.state(1), Ok(PatternState::Inactive));
        assert!(!c.is_active(0));
    }

    #[test]
    fn slot_access_is_checked() {
        let c = cell(Dimension::Two);
        assert!(matches!(
            c.neighbor(8),
            Err(MeshError::IndexOutOfRange { what: "neighbor", .. })
        ));
        assert!(matches!(c.child(0), Err(MeshError::IndexOutOfRange { .. })));
        assert!(matches!(c.state(2), Err(MeshError::PatternOutOfRange { .. })));
        assert!(matches!(c.edge(0), Err(MeshError::InvariantViolated { .. })));
    }

    #[test]
    fn child_positions_double_the_parent() {
        let c = cell(Dimension::Two);
        assert_eq!(c.child_ijk(0, Dimension::Two), [2, 4, 0]);
        assert_eq!(c.child_ijk(1, Dimension::Two), [3, 4, 0]);
        assert_eq!(c.child_ijk(3, Dimension::Two), [3, 5, 0]);
    }

    #[test]
    fn states_are_explicit_assignments() {
        let mut c = cell(Dimension::Three);
        c.set_state(0, PatternState::Active).unwrap();
        assert!(c.is_active(0));
        c.set_state(0, PatternState::Refined).unwrap();
        assert!(!c.is_active(0));
        assert!(c.is_refined(0));
        assert_eq!(c.edges().len(), 12);
    }
}
