//! Hexahedron edges shared by up to four same-level cells.

use crate::mesh_error::{InvariantKind, MeshError};
use crate::topology::handle::{CellIndex, EdgeIndex};

/// Maximum number of cells around one edge of a structured hexahedral grid.
pub const MAX_CELLS_PER_EDGE: usize = 4;

/// An edge of a 3D forest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub(crate) id: Option<u64>,
    pub(crate) index: EdgeIndex,
    pub(crate) owner: Option<usize>,
    pub(crate) owner_cell: CellIndex,
    pub(crate) index_on_owner: u8,
    pub(crate) elements: [Option<CellIndex>; MAX_CELLS_PER_EDGE],
    pub(crate) index_in_element: [u8; MAX_CELLS_PER_EDGE],
    pub(crate) count: u8,
}

impl Edge {
    pub(crate) fn new(index: EdgeIndex, owner_cell: CellIndex, index_on_owner: usize) -> Self {
        Edge {
            id: None,
            index,
            owner: None,
            owner_cell,
            index_on_owner: index_on_owner as u8,
            elements: [None; MAX_CELLS_PER_EDGE],
            index_in_element: [0; MAX_CELLS_PER_EDGE],
            count: 0,
        }
    }

    /// Registers `cell` seeing this edge in local slot `local`. Registering a cell twice is a
    /// no-op; a fifth distinct cell is an error.
    pub(crate) fn push(&mut self, cell: CellIndex, local: usize) -> Result<(), MeshError> {
        if self.contains(cell) {
            return Ok(());
        }
        let n = self.count as usize;
        if n == MAX_CELLS_PER_EDGE {
            return Err(MeshError::invariant(
                InvariantKind::EdgeOverflow,
                format!("edge {} already lists {MAX_CELLS_PER_EDGE} cells", self.index),
            ));
        }
        self.elements[n] = Some(cell);
        self.index_in_element[n] = local as u8;
        self.count += 1;
        Ok(())
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn index(&self) -> EdgeIndex {
        self.index
    }

    /// Owning rank; `None` when the edge touches the domain boundary.
    pub fn owner(&self) -> Option<usize> {
        self.owner
    }

    /// Cell responsible for the edge (lowest domain id among the sharers).
    pub fn owner_cell(&self) -> CellIndex {
        self.owner_cell
    }

    pub fn index_on_owner(&self) -> usize {
        self.index_on_owner as usize
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    /// `(cell, local edge slot)` for every registered sharer.
    pub fn elements(&self) -> impl Iterator<Item = (CellIndex, usize)> + '_ {
        self.elements[..self.count()]
            .iter()
            .zip(&self.index_in_element)
            .filter_map(|(c, &l)| c.map(|c| (c, l as usize)))
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        self.elements[..self.count()].contains(&Some(cell))
    }

    /// Local slot under which `cell` sees this edge.
    pub fn slot_on(&self, cell: CellIndex) -> Option<usize> {
        self.elements().find(|&(c, _)| c == cell).map(|(_, l)| l)
    }

    /// Drops `cell` from the element list, keeping the remaining entries packed.
    pub(crate) fn remove(&mut self, cell: CellIndex) {
        let n = self.count();
        if let Some(pos) = self.elements[..n].iter().position(|c| *c == Some(cell)) {
            for i in pos..n - 1 {
                self.elements[i] = self.elements[i + 1];
                self.index_in_element[i] = self.index_in_element[i + 1];
            }
            self.elements[n - 1] = None;
            self.index_in_element[n - 1] = 0;
            self.count -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifth_sharer_overflows() {
        let mut e = Edge::new(EdgeIndex::new(0), CellIndex::new(0), 0);
        for i in 0..4 {
            e.push(CellIndex::new(i), i).unwrap();
        }
        e.push(CellIndex::new(2), 2).unwrap();
        assert_eq!(e.count(), 4);
        let err = e.push(CellIndex::new(9), 1).unwrap_err();
        assert!(matches!(
            err,
            MeshError::InvariantViolated {
                kind: InvariantKind::EdgeOverflow,
                ..
            }
        ));
    }

    #[test]
    fn remove_keeps_entries_packed() {
        let mut e = Edge::new(EdgeIndex::new(0), CellIndex::new(0), 0);
        e.push(CellIndex::new(0), 0).unwrap();
        e.push(CellIndex::new(1), 1).unwrap();
        e.push(CellIndex::new(2), 3).unwrap();
        e.remove(CellIndex::new(1));
        assert_eq!(e.count(), 2);
        assert_eq!(e.slot_on(CellIndex::new(2)), Some(3));
        assert!(!e.contains(CellIndex::new(1)));
    }
}
