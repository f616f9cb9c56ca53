//! Structural invariants of a forest.

use super::Forest;
use crate::debug_invariants::{DebugInvariants, ensure};
use crate::mesh_error::{InvariantKind, MeshError};
use crate::topology::cell::{BackgroundCell, PatternState};
use crate::topology::handle::CellIndex;

impl Forest {
    fn validate_cell(&self, cell: &BackgroundCell) -> Result<(), MeshError> {
        let id = cell.domain_id;
        let idx = cell.memory_index;
        let n = self.dim.get();

        // fan-out and parent links
        ensure(
            cell.children.is_empty() || cell.children.len() == self.dim.children(),
            InvariantKind::ChildCount,
            || format!("cell {id} has {} children", cell.children.len()),
        )?;
        for (k, &c) in cell.children.iter().enumerate() {
            let child = self.cell(c)?;
            ensure(
                child.parent == Some(idx) && child.child_index() == k,
                InvariantKind::ChildCount,
                || format!("child {k} of cell {id} does not point back"),
            )?;
        }

        // neighbor slots hold same-level cells, or coarser leaves covering the slot position
        for (s, slot) in cell.neighbors.iter().enumerate() {
            let Some(nidx) = *slot else { continue };
            let nb = self.cell(nidx)?;
            ensure(nb.level <= cell.level, InvariantKind::NeighborPosition, || {
                format!("cell {id} slot {s} holds finer cell {}", nb.domain_id)
            })?;
            let o = self.tables.neighbor_offset(s);
            let shift = cell.level - nb.level;
            let covers = (0..n).all(|a| {
                let target = cell.ijk[a] as i64 + o[a] as i64;
                target >= 0 && (target >> shift) as u64 == nb.ijk[a]
            });
            ensure(covers, InvariantKind::NeighborPosition, || {
                format!("cell {id} slot {s} holds cell {} at the wrong position", nb.domain_id)
            })?;
            ensure(shift == 0 || !nb.has_children(), InvariantKind::NeighborPosition, || {
                format!(
                    "cell {id} slot {s} holds coarser cell {} whose children cover the position",
                    nb.domain_id
                )
            })?;
            if shift == 0 {
                let back = self.tables.opposite(s);
                ensure(
                    nb.neighbors[back] == Some(idx),
                    InvariantKind::NeighborSymmetry,
                    || format!("cell {} slot {back} does not point back to {id}", nb.domain_id),
                )?;
            }
        }

        for (f, slot) in cell.facets.iter().enumerate() {
            let Some(fi) = *slot else { continue };
            let facet = self.facet(fi)?;
            ensure(
                facet.slot_on(idx) == Some(f),
                InvariantKind::FacetSlotMismatch,
                || format!("cell {id} facet slot {f} references facet {fi} from another side"),
            )?;
            ensure(
                cell.owns_facet[f] == (facet.master == idx),
                InvariantKind::FacetOwnership,
                || format!("cell {id} facet {f} ownership flag disagrees with the master"),
            )?;
        }

        for (e, slot) in cell.edges.iter().enumerate() {
            let Some(ei) = *slot else { continue };
            let edge = self.edge(ei)?;
            ensure(
                edge.slot_on(idx) == Some(e),
                InvariantKind::EdgeOwnership,
                || format!("cell {id} edge slot {e} references edge {ei} which does not list it"),
            )?;
            ensure(
                cell.owns_edge[e] == (edge.owner_cell == idx),
                InvariantKind::EdgeOwnership,
                || format!("cell {id} edge {e} ownership flag disagrees with the owner"),
            )?;
        }

        // activation: refined needs children, active needs a parent that hands over
        for (p, state) in cell.states.iter().enumerate() {
            match state {
                PatternState::Refined => ensure(
                    cell.has_children(),
                    InvariantKind::ActivationState,
                    || format!("cell {id} is refined on pattern {p} without children"),
                )?,
                PatternState::Active => {
                    if let Some(parent) = cell.parent {
                        ensure(
                            self.cells[parent.get()].states[p] == PatternState::Refined,
                            InvariantKind::ActivationState,
                            || format!("cell {id} is active on pattern {p} below an unrefined parent"),
                        )?;
                    }
                }
                PatternState::Inactive => {}
            }
        }
        Ok(())
    }

    fn validate_shared(&self) -> Result<(), MeshError> {
        for facet in self.facets() {
            let master = self.cell(facet.master)?;
            ensure(
                master.facets[facet.index_on_master()] == Some(facet.index)
                    && master.owns_facet[facet.index_on_master()],
                InvariantKind::FacetOwnership,
                || format!("facet {} is not owned by its master", facet.index),
            )?;
            if let (Some(s), Some(fs)) = (facet.slave, facet.index_on_slave()) {
                let slave = self.cell(s)?;
                ensure(
                    slave.facets[fs] == Some(facet.index) && !slave.owns_facet[fs],
                    InvariantKind::FacetOwnership,
                    || format!("facet {} has an inconsistent slave", facet.index),
                )?;
            }
        }
        for edge in self.edges() {
            let owners = edge
                .elements()
                .filter(|&(c, l)| self.cells[c.get()].owns_edge[l])
                .count();
            ensure(owners == 1, InvariantKind::EdgeOwnership, || {
                format!("edge {} has {owners} owning cells", edge.index)
            })?;
        }
        Ok(())
    }
}

impl DebugInvariants for Forest {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "forest invalid");
    }

    fn validate_invariants(&self) -> Result<(), MeshError> {
        for (i, cell) in self.cells.iter().enumerate() {
            ensure(
                cell.memory_index == CellIndex::new(i),
                InvariantKind::NeighborPosition,
                || format!("cell {} is stored at {i} but records {}", cell.domain_id, cell.memory_index),
            )?;
        }

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            self.cells.par_iter().try_for_each(|c| self.validate_cell(c))?;
        }
        #[cfg(not(feature = "rayon"))]
        for c in &self.cells {
            self.validate_cell(c)?;
        }

        self.validate_shared()
    }
}
