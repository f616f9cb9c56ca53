//! Facets: (N-1)-dimensional entities shared by at most two cells.

use crate::topology::handle::{CellIndex, FacetIndex};

/// A facet between a master cell and an optional slave cell.
///
/// The master is the cell that created the facet and is responsible for releasing it. A
/// facet between two same-level cells has both sides set; a facet on the domain boundary or
/// on a level transition (where the finer cell owns it) has no slave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Facet {
    pub(crate) id: Option<u64>,
    pub(crate) index: FacetIndex,
    pub(crate) owner: Option<usize>,
    pub(crate) master: CellIndex,
    pub(crate) slave: Option<CellIndex>,
    pub(crate) index_on_master: u8,
    pub(crate) index_on_slave: Option<u8>,
    pub(crate) level: u8,
}

impl Facet {
    pub(crate) fn new(index: FacetIndex, master: CellIndex, index_on_master: usize, level: u8) -> Self {
        Facet {
            id: None,
            index,
            owner: None,
            master,
            slave: None,
            index_on_master: index_on_master as u8,
            index_on_slave: None,
            level,
        }
    }

    /// Domain-wide id, assigned by synchronization.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Position in the process-local facet arena.
    pub fn index(&self) -> FacetIndex {
        self.index
    }

    /// Owning rank; `None` for facets on the domain boundary.
    pub fn owner(&self) -> Option<usize> {
        self.owner
    }

    pub fn master(&self) -> CellIndex {
        self.master
    }

    pub fn slave(&self) -> Option<CellIndex> {
        self.slave
    }

    pub fn index_on_master(&self) -> usize {
        self.index_on_master as usize
    }

    pub fn index_on_slave(&self) -> Option<usize> {
        self.index_on_slave.map(usize::from)
    }

    /// Level of the master cell.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// No cell on the far side.
    pub fn is_boundary(&self) -> bool {
        self.slave.is_none()
    }

    /// Local facet slot that `cell` sees this facet in, if it is one of the two sides.
    pub fn slot_on(&self, cell: CellIndex) -> Option<usize> {
        if cell == self.master {
            Some(self.index_on_master())
        } else if Some(cell) == self.slave {
            self.index_on_slave()
        } else {
            None
        }
    }
}
