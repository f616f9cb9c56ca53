//! Activation pattern bookkeeping.
//!
//! Each pattern selects a set of active leaves from the shared tree. Refining under one
//! pattern creates children structurally, but other patterns keep using the parent.

use super::Forest;
use crate::mesh_error::MeshError;
use crate::topology::cell::PatternState;
use crate::topology::handle::CellIndex;
use smallvec::SmallVec;

impl Forest {
    /// Replaces an active cell of `pattern` by its children, creating them if needed.
    pub fn refine_on_pattern(
        &mut self,
        idx: CellIndex,
        pattern: usize,
    ) -> Result<SmallVec<[CellIndex; 8]>, MeshError> {
        self.check_pattern(pattern)?;
        let cell = self.cell(idx)?;
        if !cell.is_active(pattern) {
            return Err(MeshError::CellNotActive {
                domain_id: cell.domain_id,
                pattern,
            });
        }
        let children = self.refine(idx)?;
        self.cells[idx.get()].set_state(pattern, PatternState::Refined)?;
        for &c in &children {
            self.cells[c.get()].set_state(pattern, PatternState::Active)?;
        }
        Ok(children)
    }

    /// Makes `idx` active again on `pattern`, deactivating everything below it. Returns
    /// `false` when the pattern did not use the cell's children.
    pub fn coarsen_on_pattern(&mut self, idx: CellIndex, pattern: usize) -> Result<bool, MeshError> {
        self.check_pattern(pattern)?;
        if !self.cell(idx)?.is_refined(pattern) {
            return Ok(false);
        }
        for d in self.collect_descendants(idx)?.into_iter().skip(1) {
            self.cells[d.get()].set_state(pattern, PatternState::Inactive)?;
        }
        self.cells[idx.get()].set_state(pattern, PatternState::Active)?;
        Ok(true)
    }

    /// Overwrites pattern `to` with the states of pattern `from`.
    pub fn copy_pattern(&mut self, from: usize, to: usize) -> Result<(), MeshError> {
        self.check_pattern(from)?;
        self.check_pattern(to)?;
        for cell in &mut self.cells {
            cell.states[to] = cell.states[from];
        }
        Ok(())
    }

    /// Resets `pattern` to the level-0 grid.
    pub fn reset_pattern(&mut self, pattern: usize) -> Result<(), MeshError> {
        self.check_pattern(pattern)?;
        for cell in &mut self.cells {
            cell.states[pattern] = if cell.level == 0 {
                PatternState::Active
            } else {
                PatternState::Inactive
            };
        }
        Ok(())
    }
}
