//! Refinement queue.
//!
//! Cells are flagged locally, the queue is grown by the refinement buffer and kept consistent
//! across ranks, then all queued cells are refined coarsest level first.

use super::{BackgroundMesh, SyncPhase};
use crate::algs::communicator::Communicator;
use crate::algs::exchange::exchange_bytes;
use crate::algs::reconcile::IdRequest;
use crate::algs::wire::{decode_requests, encode_requests};
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshError;
use crate::pedigree::PedigreePath;
use crate::topology::handle::CellIndex;
use std::collections::HashMap;

impl<C: Communicator> BackgroundMesh<C> {
    /// Queues an active cell of `pattern` for the next [`perform_refinement`](Self::perform_refinement).
    pub fn flag_for_refinement(&mut self, idx: CellIndex, pattern: usize) -> Result<(), MeshError> {
        self.forest.check_pattern(pattern)?;
        let max = self.forest.max_level();
        let cell = self.forest.cell(idx)?;
        if !cell.is_active(pattern) {
            return Err(MeshError::CellNotActive {
                domain_id: cell.domain_id(),
                pattern,
            });
        }
        if cell.level() >= max {
            return Err(MeshError::MaxLevelExceeded {
                domain_id: cell.domain_id(),
                max,
            });
        }
        self.forest.cell_mut(idx)?.queued = true;
        Ok(())
    }

    /// Queued cells, coarsest first.
    pub fn queued_cells(&self) -> Vec<CellIndex> {
        let mut out: Vec<CellIndex> = self
            .forest
            .cells()
            .filter(|c| c.is_queued())
            .map(|c| c.memory_index())
            .collect();
        out.sort_by_key(|&c| (self.forest[c].level(), self.forest[c].domain_id()));
        out
    }

    /// Drops every flag without refining.
    pub fn clear_queue(&mut self) {
        for cell in &mut self.forest.cells {
            cell.queued = false;
        }
    }

    /// Grows the queue by the refinement buffer, agrees on it with the neighbor ranks and
    /// refines every queued cell on `pattern`. Collective. Returns the number of cells
    /// refined on this rank.
    pub fn perform_refinement(&mut self, pattern: usize) -> Result<usize, MeshError> {
        self.forest.check_pattern(pattern)?;
        let tags = self.tags(SyncPhase::Refinement);
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            self.expand_queue(pattern)?;

            let queued = self.queued_cells();
            let requests = queued
                .iter()
                .map(|&c| {
                    Ok(IdRequest {
                        path: PedigreePath::encode(&self.forest, c)?,
                        slot: pattern as u32,
                    })
                })
                .collect::<Result<Vec<_>, MeshError>>()?;
            let payload = encode_requests(&requests);
            let outgoing: HashMap<usize, Vec<u8>> = self
                .proc_neighbors
                .iter()
                .map(|&nbr| (nbr, payload.clone()))
                .collect();
            let incoming =
                exchange_bytes(&outgoing, &self.comm, tags.sizes, tags.flags, &self.proc_neighbors)?;

            let mut received = 0u8;
            let mut maybe_err = None;
            for (nbr, bytes) in incoming {
                let accepted = decode_requests(&bytes, self.forest.dimension()).and_then(|reqs| {
                    reqs.iter()
                        .map(|req| self.accept_remote_flag(nbr, req))
                        .try_fold(false, |any, r| r.map(|grew| any | grew))
                });
                match accepted {
                    Ok(true) => received = 1,
                    Ok(false) => {}
                    Err(e) => {
                        maybe_err.get_or_insert(e);
                    }
                }
            }

            // every rank takes part in the vote, even after a local failure
            let mut any = vec![0u8; self.comm.size().max(1)];
            self.comm.allgather(&[received], &mut any);
            if let Some(e) = maybe_err {
                return Err(e);
            }
            if any.iter().all(|&f| f == 0) {
                break;
            }
        }

        let queued = self.queued_cells();
        for &c in &queued {
            self.forest.refine_on_pattern(c, pattern)?;
            self.forest.cell_mut(c)?.queued = false;
        }
        log::info!(
            "rank {}: refined {} cells on pattern {} after {} rounds",
            self.rank(),
            queued.len(),
            pattern,
            rounds
        );
        self.forest.debug_assert_invariants();
        Ok(queued.len())
    }

    /// Adds the buffer around every queued cell until nothing changes: the active cells in
    /// the parent's same-level neighborhood of order `refinement_buffer`, and every coarser
    /// active neighbor.
    fn expand_queue(&mut self, pattern: usize) -> Result<(), MeshError> {
        let order = self.config.refinement_buffer;
        let max = self.forest.max_level();
        let mut work = self.queued_cells();
        let mut added = 0usize;
        while let Some(c) = work.pop() {
            let mut candidates = Vec::new();
            let cell = &self.forest[c];
            for n in cell.neighbors().iter().flatten() {
                if self.forest[*n].level() < cell.level() {
                    candidates.push(*n);
                }
            }
            if order > 0 {
                if let Some(p) = cell.parent() {
                    candidates.extend(
                        self.forest
                            .neighbors_from_same_level(p, order)?
                            .into_iter()
                            .flatten(),
                    );
                }
            }
            for n in candidates {
                let cand = &self.forest[n];
                if cand.is_queued() || !cand.is_active(pattern) || cand.level() >= max {
                    continue;
                }
                self.forest.cell_mut(n)?.queued = true;
                work.push(n);
                added += 1;
            }
        }
        log::debug!("rank {}: refinement buffer added {added} cells", self.rank());
        Ok(())
    }

    /// Queues the cell a neighbor flagged if we store it. Returns whether the queue grew.
    fn accept_remote_flag(&mut self, from: usize, req: &IdRequest) -> Result<bool, MeshError> {
        let idx = match req.path.decode(&self.forest) {
            Ok(idx) => idx,
            Err(MeshError::UnknownPedigreeRoot(_)) => return Ok(false),
            Err(e) => {
                log::warn!(
                    "rank {}: ignoring refinement flag from rank {from}: {e}",
                    self.rank()
                );
                return Ok(false);
            }
        };
        let pattern = req.slot as usize;
        let cell = &self.forest[idx];
        if cell.is_queued() || !cell.is_active(pattern) {
            return Ok(false);
        }
        self.forest.cell_mut(idx)?.queued = true;
        Ok(true)
    }
}
