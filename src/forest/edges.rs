//! Edge creation for hexahedral forests.

use super::Forest;
use crate::mesh_error::{InvariantKind, MeshError};
use crate::topology::dimension::Dimension;
use crate::topology::edge::{Edge, MAX_CELLS_PER_EDGE};
use crate::topology::handle::{CellIndex, EdgeIndex};
use smallvec::SmallVec;

impl Forest {
    fn require_3d(&self, op: &str) -> Result<(), MeshError> {
        if self.dim == Dimension::Three {
            Ok(())
        } else {
            Err(MeshError::invariant(
                InvariantKind::DimensionMismatch,
                format!("{op} requires a 3D forest, this one is {}D", self.dim.get()),
            ))
        }
    }

    /// Fills every empty edge slot of `idx`, adopting edges already created by a same-level
    /// sharer. Returns the number of new edges.
    pub fn create_edges(&mut self, idx: CellIndex) -> Result<usize, MeshError> {
        self.require_3d("create_edges")?;
        let level = self.cell(idx)?.level;
        let mut created = 0;
        for e in 0..self.dim.edges() {
            if self.cells[idx.get()].edges[e].is_some() {
                continue;
            }
            let mut sharers: SmallVec<[(CellIndex, usize); MAX_CELLS_PER_EDGE]> = SmallVec::new();
            sharers.push((idx, e));
            let mut on_boundary = false;
            for share in self.tables.edge_shares(e) {
                match self.cells[idx.get()].neighbors[share.slot as usize] {
                    None => on_boundary = true,
                    Some(n) if self.cells[n.get()].level == level => {
                        sharers.push((n, share.edge as usize))
                    }
                    Some(_) => {}
                }
            }

            let existing = sharers[1..]
                .iter()
                .find_map(|&(n, local)| self.cells[n.get()].edges[local]);
            let ei = match existing {
                Some(ei) => ei,
                None => {
                    let &(owner_cell, local) = sharers
                        .iter()
                        .min_by_key(|(c, _)| self.cells[c.get()].domain_id)
                        .unwrap_or(&(idx, e));
                    let ei = EdgeIndex::new(self.edges.len());
                    let mut edge = Edge::new(ei, owner_cell, local);
                    edge.owner = if on_boundary {
                        None
                    } else {
                        Some(self.cells[owner_cell.get()].owner)
                    };
                    self.edges.push(Some(edge));
                    self.cells[owner_cell.get()].owns_edge[local] = true;
                    created += 1;
                    ei
                }
            };

            for &(c, local) in &sharers {
                match self.cells[c.get()].edges[local] {
                    Some(other) if other != ei => {
                        return Err(MeshError::invariant(
                            InvariantKind::EdgeOwnership,
                            format!(
                                "cell {} edge {local} holds edge {other}, expected {ei}",
                                self.cells[c.get()].domain_id
                            ),
                        ));
                    }
                    _ => self.cells[c.get()].edges[local] = Some(ei),
                }
                self.edge_mut(ei)?.push(c, local)?;
            }
        }
        Ok(created)
    }

    /// Drops all edges and rebuilds them for every cell. Returns the number created.
    pub fn create_all_edges(&mut self) -> Result<usize, MeshError> {
        self.require_3d("create_all_edges")?;
        self.edges.clear();
        for cell in &mut self.cells {
            cell.edges.fill(None);
            cell.owns_edge.fill(false);
        }
        let mut created = 0;
        for i in 0..self.cells.len() {
            created += self.create_edges(CellIndex::new(i))?;
        }
        log::debug!("created {created} edges for {} cells", self.cells.len());
        Ok(created)
    }

    pub(crate) fn edge_mut(&mut self, idx: EdgeIndex) -> Result<&mut Edge, MeshError> {
        let len = self.edges.len();
        self.edges
            .get_mut(idx.get())
            .and_then(Option::as_mut)
            .ok_or(MeshError::IndexOutOfRange {
                what: "edge",
                index: idx.get(),
                len,
            })
    }

    /// Removes an edge and clears every slot referencing it.
    pub(crate) fn release_edge(&mut self, idx: EdgeIndex) {
        let Some(edge) = self.edges.get_mut(idx.get()).and_then(Option::take) else {
            return;
        };
        for (c, local) in edge.elements() {
            let cell = &mut self.cells[c.get()];
            cell.edges[local] = None;
            cell.owns_edge[local] = false;
        }
    }
}
