//! Facet creation and ownership.
//!
//! Facet slot `f` of a cell lies across neighbor slot `f`. For each empty slot:
//! * no neighbor: a boundary facet owned by this cell, no owning rank;
//! * coarser neighbor: the finer cell (this one) creates and owns the facet, no slave;
//! * same-level neighbor: one facet installed in both cells' slots, the cell with the lower
//!   domain id is master and owner.

use super::Forest;
use crate::mesh_error::{InvariantKind, MeshError};
use crate::topology::facet::Facet;
use crate::topology::handle::{CellIndex, FacetIndex};

impl Forest {
    fn alloc_facet(&mut self, master: CellIndex, slot: usize) -> FacetIndex {
        let idx = FacetIndex::new(self.facets.len());
        let level = self.cells[master.get()].level;
        self.facets.push(Some(Facet::new(idx, master, slot, level)));
        let cell = &mut self.cells[master.get()];
        cell.facets[slot] = Some(idx);
        cell.owns_facet[slot] = true;
        idx
    }

    /// Fills every empty facet slot of `idx`. Returns the number of facets created.
    pub fn create_facets(&mut self, idx: CellIndex) -> Result<usize, MeshError> {
        let (level, domain_id, owner) = {
            let c = self.cell(idx)?;
            (c.level, c.domain_id, c.owner)
        };
        let mut created = 0;
        for f in 0..self.dim.facets() {
            if self.cells[idx.get()].facets[f].is_some() {
                continue;
            }
            let across = self.cells[idx.get()].neighbors[self.tables.facet_neighbor(f)];
            match across {
                None => {
                    self.alloc_facet(idx, f);
                }
                Some(n) if self.cells[n.get()].level < level => {
                    let fi = self.alloc_facet(idx, f);
                    self.facet_mut(fi)?.owner = Some(owner);
                }
                Some(n) => {
                    let g = self.tables.opposite_facet(f);
                    if let Some(existing) = self.cells[n.get()].facets[g] {
                        return Err(MeshError::invariant(
                            InvariantKind::FacetSlotMismatch,
                            format!(
                                "cell {} facet {f} is empty but neighbor {} holds facet {existing} on the shared side",
                                domain_id, self.cells[n.get()].domain_id
                            ),
                        ));
                    }
                    let (master, slave, fm, fs) = if domain_id < self.cells[n.get()].domain_id {
                        (idx, n, f, g)
                    } else {
                        (n, idx, g, f)
                    };
                    let fi = self.alloc_facet(master, fm);
                    let master_owner = self.cells[master.get()].owner;
                    let facet = self.facet_mut(fi)?;
                    facet.owner = Some(master_owner);
                    facet.slave = Some(slave);
                    facet.index_on_slave = Some(fs as u8);
                    self.cells[slave.get()].facets[fs] = Some(fi);
                }
            }
            created += 1;
        }
        Ok(created)
    }

    /// Drops all facets and rebuilds them for every cell. Returns the number created.
    pub fn create_all_facets(&mut self) -> Result<usize, MeshError> {
        self.facets.clear();
        for cell in &mut self.cells {
            cell.facets.fill(None);
            cell.owns_facet.fill(false);
        }
        let mut created = 0;
        for i in 0..self.cells.len() {
            created += self.create_facets(CellIndex::new(i))?;
        }
        log::debug!("created {created} facets for {} cells", self.cells.len());
        Ok(created)
    }

    pub(crate) fn facet_mut(&mut self, idx: FacetIndex) -> Result<&mut Facet, MeshError> {
        let len = self.facets.len();
        self.facets
            .get_mut(idx.get())
            .and_then(Option::as_mut)
            .ok_or(MeshError::IndexOutOfRange {
                what: "facet",
                index: idx.get(),
                len,
            })
    }

    /// Removes a facet and clears the slots referencing it.
    pub(crate) fn release_facet(&mut self, idx: FacetIndex) {
        let Some(facet) = self.facets.get_mut(idx.get()).and_then(Option::take) else {
            return;
        };
        let m = &mut self.cells[facet.master.get()];
        m.facets[facet.index_on_master as usize] = None;
        m.owns_facet[facet.index_on_master as usize] = false;
        if let (Some(s), Some(fs)) = (facet.slave, facet.index_on_slave) {
            self.cells[s.get()].facets[fs as usize] = None;
        }
    }
}
