//! Domain-wide numbering of facets, edges and active cells.
//!
//! Each entity is numbered by exactly one rank: the owner of its master cell (facets), of its
//! owning cell (edges) or of the cell itself. Owned entities are sorted by
//! `(domain id, local slot)` and numbered from the rank's offset. Copies touching an owned
//! cell of another rank are then resolved through their pedigree.

use super::{BackgroundMesh, SyncPhase};
use crate::algs::communicator::Communicator;
use crate::algs::offsets::gather_offsets;
use crate::algs::reconcile::{IdRequest, reconcile_ids};
use crate::mesh_error::MeshError;
use crate::pedigree::PedigreePath;
use crate::topology::handle::{CellIndex, EdgeIndex, FacetIndex};
use std::collections::HashMap;

/// Requests grouped by the rank answering them, with the local entity each answer is for.
struct Requests<T> {
    outgoing: HashMap<usize, Vec<IdRequest>>,
    targets: HashMap<usize, Vec<T>>,
}

impl<T> Requests<T> {
    fn new() -> Self {
        Requests {
            outgoing: HashMap::new(),
            targets: HashMap::new(),
        }
    }

    fn push(&mut self, rank: usize, request: IdRequest, target: T) {
        self.outgoing.entry(rank).or_default().push(request);
        self.targets.entry(rank).or_default().push(target);
    }

    /// Pairs every answer with its entity.
    fn zip(self, mut answers: HashMap<usize, Vec<u64>>) -> impl Iterator<Item = (T, u64)> {
        self.targets.into_iter().flat_map(move |(rank, targets)| {
            let ids = answers.remove(&rank).unwrap_or_default();
            targets.into_iter().zip(ids)
        })
    }
}

impl<C: Communicator> BackgroundMesh<C> {
    fn request(&self, cell: CellIndex, slot: usize) -> Result<IdRequest, MeshError> {
        Ok(IdRequest {
            path: PedigreePath::encode(&self.forest, cell)?,
            slot: slot as u32,
        })
    }

    /// Assigns global ids to every facet touching an owned cell. Collective; returns the
    /// number of facets numbered across all ranks.
    pub fn synchronize_facet_ids(&mut self) -> Result<u64, MeshError> {
        let me = self.rank();
        let mut owned: Vec<(u64, usize, FacetIndex)> = Vec::new();
        let mut requests = Requests::new();
        for facet in self.forest.facets() {
            let master = &self.forest[facet.master()];
            if master.owner() == me {
                owned.push((master.domain_id(), facet.index_on_master(), facet.index()));
            } else if facet.slave().is_some_and(|s| self.forest[s].owner() == me) {
                requests.push(
                    master.owner(),
                    self.request(facet.master(), facet.index_on_master())?,
                    facet.index(),
                );
            }
        }
        owned.sort_unstable();

        let table = gather_offsets(&self.comm, &[owned.len() as u64]);
        let offset = table.offset(me, 0);
        for facet in self.forest.facets.iter_mut().flatten() {
            facet.id = None;
        }
        for (i, &(_, _, fi)) in owned.iter().enumerate() {
            self.forest.facet_mut(fi)?.id = Some(offset + i as u64);
        }

        let forest = &self.forest;
        let answers = reconcile_ids(
            &self.comm,
            self.tags(SyncPhase::Facets),
            forest.dimension(),
            &self.proc_neighbors,
            &requests.outgoing,
            |_, req| {
                let cell = req.path.decode(forest)?;
                let slot = req.slot as usize;
                forest[cell]
                    .facet(slot)?
                    .and_then(|fi| forest.facet(fi).ok())
                    .and_then(|f| f.id())
                    .ok_or(MeshError::UnresolvedId {
                        entity: "facet",
                        index: slot,
                    })
            },
        )?;
        let mut resolved = 0usize;
        for (fi, id) in requests.zip(answers) {
            self.forest.facet_mut(fi)?.id = Some(id);
            resolved += 1;
        }
        log::debug!(
            "rank {me}: numbered {} facets from {offset}, resolved {resolved} remote ids",
            owned.len()
        );
        Ok(table.total(0))
    }

    /// Assigns global ids to every edge touching an owned cell of a 3D mesh. Collective.
    pub fn synchronize_edge_ids(&mut self) -> Result<u64, MeshError> {
        let me = self.rank();
        let mut owned: Vec<(u64, usize, EdgeIndex)> = Vec::new();
        let mut requests = Requests::new();
        for edge in self.forest.edges() {
            let owner_cell = &self.forest[edge.owner_cell()];
            if owner_cell.owner() == me {
                owned.push((owner_cell.domain_id(), edge.index_on_owner(), edge.index()));
            } else if edge.elements().any(|(c, _)| self.forest[c].owner() == me) {
                requests.push(
                    owner_cell.owner(),
                    self.request(edge.owner_cell(), edge.index_on_owner())?,
                    edge.index(),
                );
            }
        }
        owned.sort_unstable();

        let table = gather_offsets(&self.comm, &[owned.len() as u64]);
        let offset = table.offset(me, 0);
        for edge in self.forest.edges.iter_mut().flatten() {
            edge.id = None;
        }
        for (i, &(_, _, ei)) in owned.iter().enumerate() {
            self.forest.edge_mut(ei)?.id = Some(offset + i as u64);
        }

        let forest = &self.forest;
        let answers = reconcile_ids(
            &self.comm,
            self.tags(SyncPhase::Edges),
            forest.dimension(),
            &self.proc_neighbors,
            &requests.outgoing,
            |_, req| {
                let cell = req.path.decode(forest)?;
                let slot = req.slot as usize;
                forest[cell]
                    .edge(slot)?
                    .and_then(|ei| forest.edge(ei).ok())
                    .and_then(|e| e.id())
                    .ok_or(MeshError::UnresolvedId {
                        entity: "edge",
                        index: slot,
                    })
            },
        )?;
        let mut resolved = 0usize;
        for (ei, id) in requests.zip(answers) {
            self.forest.edge_mut(ei)?.id = Some(id);
            resolved += 1;
        }
        log::debug!(
            "rank {me}: numbered {} edges from {offset}, resolved {resolved} remote ids",
            owned.len()
        );
        Ok(table.total(0))
    }

    /// Numbers the active non-padding cells of `pattern` densely in domain id order, rank by
    /// rank, and fetches the indices of the aura cells. Collective; returns the global count.
    pub fn update_domain_indices(&mut self, pattern: usize) -> Result<u64, MeshError> {
        let me = self.rank();
        let owned = self.owned_active_cells(pattern)?;
        let mut requests = Requests::new();
        for c in self.forest.active_cells(pattern)? {
            let cell = &self.forest[c];
            if cell.owner() != me && !cell.is_padding() {
                requests.push(cell.owner(), self.request(c, 0)?, c);
            }
        }

        let table = gather_offsets(&self.comm, &[owned.len() as u64]);
        let offset = table.offset(me, 0);
        for cell in &mut self.forest.cells {
            cell.domain_index = None;
        }
        for (i, &c) in owned.iter().enumerate() {
            self.forest.cell_mut(c)?.domain_index = Some(offset + i as u64);
        }

        let forest = &self.forest;
        let answers = reconcile_ids(
            &self.comm,
            self.tags(SyncPhase::Cells),
            forest.dimension(),
            &self.proc_neighbors,
            &requests.outgoing,
            |_, req| {
                let cell = &forest[req.path.decode(forest)?];
                cell.domain_index().ok_or(MeshError::UnresolvedId {
                    entity: "cell",
                    index: cell.domain_id() as usize,
                })
            },
        )?;
        for (c, id) in requests.zip(answers) {
            self.forest.cell_mut(c)?.domain_index = Some(id);
        }
        log::debug!(
            "rank {me}: {} active cells on pattern {pattern} numbered from {offset}",
            owned.len()
        );
        Ok(table.total(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::config::MeshConfig;
    use std::collections::HashSet;

    #[test]
    fn serial_facet_ids_are_dense() {
        let mut m = BackgroundMesh::new(MeshConfig::new(&[3, 2]), NoComm).unwrap();
        m.create_facets().unwrap();
        let total = m.synchronize_facet_ids().unwrap();
        // 4 vertical lines of 2 facets, 3 horizontal lines of 3
        assert_eq!(total, 8 + 9);
        let ids: HashSet<u64> = m.forest().facets().filter_map(|f| f.id()).collect();
        assert_eq!(ids, (0..17).collect());
    }

    #[test]
    fn serial_cell_indices_follow_domain_ids() {
        let cfg = MeshConfig::new(&[2, 2]).with_padding(1);
        let mut m = BackgroundMesh::new(cfg, NoComm).unwrap();
        let first = m.forest().locate(0, &[1, 1, 0]).unwrap();
        m.flag_for_refinement(first, 0).unwrap();
        m.perform_refinement(0).unwrap();
        assert_eq!(m.update_domain_indices(0).unwrap(), 3 + 4);
        let owned = m.owned_active_cells(0).unwrap();
        for (i, &c) in owned.iter().enumerate() {
            assert_eq!(m.forest()[c].domain_index(), Some(i as u64));
        }
        // padding and refined cells stay unnumbered
        assert_eq!(m.forest()[first].domain_index(), None);
        let pad = m.forest().locate(0, &[0, 0, 0]).unwrap();
        assert_eq!(m.forest()[pad].domain_index(), None);
    }

    #[test]
    fn serial_edge_ids_need_three_dimensions() {
        let mut m = BackgroundMesh::new(MeshConfig::new(&[1, 1, 1]), NoComm).unwrap();
        m.create_edges().unwrap();
        assert_eq!(m.synchronize_edge_ids().unwrap(), 12);
        let mut m2 = BackgroundMesh::new(MeshConfig::new(&[1, 1]), NoComm).unwrap();
        assert!(m2.create_edges().is_err());
    }
}
