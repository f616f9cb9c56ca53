//! Structural refinement with table-driven neighbor derivation.

use super::Forest;
use crate::mesh_error::MeshError;
use crate::topology::cell::BackgroundCell;
use crate::topology::handle::CellIndex;
use crate::topology::tables::ChildNeighborRule;
use smallvec::SmallVec;

impl Forest {
    /// Creates the `2^N` children of `parent` and derives their neighbors from the parent's
    /// neighbor slots, with a constant number of lookups per slot.
    ///
    /// Same-level cells found for a child get the back reference through the opposite slot,
    /// and finer cells around the parent that saw it as a coarse neighbor are re-pointed to
    /// the adjacent new child. Children start inactive on every pattern; see
    /// [`refine_on_pattern`](Forest::refine_on_pattern) to make a pattern use them.
    ///
    /// Refining a cell that already has children returns the existing children.
    pub fn refine(&mut self, parent: CellIndex) -> Result<SmallVec<[CellIndex; 8]>, MeshError> {
        let dim = self.dim;
        let (parent_level, owner, padding, parent_neighbors) = {
            let p = self.cell(parent)?;
            if p.has_children() {
                return Ok(p.children.clone());
            }
            if p.level >= self.max_level {
                return Err(MeshError::MaxLevelExceeded {
                    domain_id: p.domain_id,
                    max: self.max_level,
                });
            }
            (p.level, p.owner, p.padding, p.neighbors.clone())
        };
        let level = parent_level + 1;

        let mut ids: SmallVec<[(u64, [u64; 3]); 8]> = SmallVec::new();
        for k in 0..dim.children() {
            let ijk = self.cells[parent.get()].child_ijk(k, dim);
            let id = self
                .domain_id_of(level, &ijk)
                .ok_or(MeshError::MaxLevelExceeded {
                    domain_id: self.cells[parent.get()].domain_id,
                    max: parent_level,
                })?;
            ids.push((id, ijk));
        }

        let first = self.cells.len();
        let children: SmallVec<[CellIndex; 8]> =
            (0..dim.children()).map(|k| CellIndex::new(first + k)).collect();
        for (k, &(domain_id, ijk)) in ids.iter().enumerate() {
            let mut cell =
                BackgroundCell::new(dim, self.patterns, level, domain_id, children[k], owner, ijk);
            cell.child_index = k as u8;
            cell.parent = Some(parent);
            cell.padding = padding;
            self.cells.push(cell);
        }
        self.cells[parent.get()].children = children.clone();

        for (k, &child) in children.iter().enumerate() {
            let neighbors = (0..dim.neighbors())
                .map(|s| match self.tables.child_rule(k, s) {
                    ChildNeighborRule::Sibling(j) => Some(children[j as usize]),
                    ChildNeighborRule::ParentNeighbor { slot, child } => {
                        parent_neighbors[slot as usize].map(|n| {
                            let nc = &self.cells[n.get()];
                            if nc.level == parent_level && nc.has_children() {
                                nc.children[child as usize]
                            } else {
                                n
                            }
                        })
                    }
                })
                .collect();
            self.cells[child.get()].neighbors = neighbors;
        }

        // runs before the back references, which would hide `parent` from the walk
        self.relink_finer_neighbors(parent, &children, &parent_neighbors);

        for &child in &children {
            for s in 0..dim.neighbors() {
                if let Some(n) = self.cells[child.get()].neighbors[s] {
                    if self.cells[n.get()].level == level {
                        let back = self.tables.opposite(s);
                        self.cells[n.get()].neighbors[back] = Some(child);
                    }
                }
            }
        }

        log::debug!(
            "refined cell {} (level {}) into {} children",
            self.cells[parent.get()].domain_id,
            parent_level,
            children.len()
        );
        Ok(children)
    }

    /// Re-points slots of finer cells that referenced `parent` as their coarse neighbor.
    ///
    /// Only descendants of the parent's same-level neighbors can hold such a reference, and a
    /// cell can only hold one if its own parent does, so the walk stops at the first
    /// descendant that does not reference `parent`.
    fn relink_finer_neighbors(
        &mut self,
        parent: CellIndex,
        children: &[CellIndex],
        parent_neighbors: &[Option<CellIndex>],
    ) {
        let n = self.dim.get();
        let parent_level = self.cells[parent.get()].level;
        let child_level = parent_level + 1;

        let mut seeds: Vec<CellIndex> = parent_neighbors
            .iter()
            .flatten()
            .copied()
            .filter(|&c| self.cells[c.get()].level == parent_level)
            .collect();
        seeds.sort_unstable();
        seeds.dedup();

        let mut stack: Vec<CellIndex> = seeds
            .iter()
            .flat_map(|&s| self.cells[s.get()].children.iter().copied())
            .collect();

        while let Some(d) = stack.pop() {
            let (d_level, d_ijk) = {
                let c = &self.cells[d.get()];
                (c.level, c.ijk)
            };
            let shift = d_level - child_level;
            let mut touched = false;
            for t in 0..self.dim.neighbors() {
                if self.cells[d.get()].neighbors[t] != Some(parent) {
                    continue;
                }
                touched = true;
                let o = self.tables.neighbor_offset(t);
                let mut k = 0usize;
                for a in 0..n {
                    let target = (d_ijk[a] as i64 + o[a] as i64) >> shift;
                    k |= ((target & 1) as usize) << a;
                }
                self.cells[d.get()].neighbors[t] = Some(children[k]);
            }
            if touched {
                stack.extend(self.cells[d.get()].children.iter().copied());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_invariants::DebugInvariants;
    use crate::topology::dimension::Dimension;

    #[test]
    fn binary_tree_children_see_each_other() {
        let mut f = Forest::uniform(Dimension::One, &[3], 1).unwrap();
        let mid = f.root_by_ijk(&[1, 0, 0]).unwrap();
        let left = f.root_by_ijk(&[0, 0, 0]).unwrap();
        let kids = f.refine(mid).unwrap();
        assert_eq!(f[kids[0]].neighbors(), &[Some(left), Some(kids[1])]);
        assert_eq!(f[kids[0]].ijk(), [2, 0, 0]);
        assert_eq!(f[kids[1]].ijk(), [3, 0, 0]);
        // refining the left root links the new cells across the old boundary
        let lk = f.refine(left).unwrap();
        assert_eq!(f[lk[1]].neighbor(1).unwrap(), Some(kids[0]));
        assert_eq!(f[kids[0]].neighbor(0).unwrap(), Some(lk[1]));
    }

    #[test]
    fn deeper_cells_are_repointed_when_their_coarse_neighbor_refines() {
        let mut f = Forest::uniform(Dimension::Two, &[2, 1], 1).unwrap();
        let a = f.root_by_ijk(&[0, 0, 0]).unwrap();
        let b = f.root_by_ijk(&[1, 0, 0]).unwrap();
        let ak = f.refine(a).unwrap();
        let deep = f.refine(ak[1]).unwrap();
        // east of the deepest corner cell is the coarse root b
        assert_eq!(f[deep[3]].neighbor(1).unwrap(), Some(b));
        let bk = f.refine(b).unwrap();
        // now it is whichever child of b covers the position
        let ne = f.tables().slot_of(&[1, 1, 0]).unwrap();
        assert_eq!(f[deep[3]].neighbor(1).unwrap(), Some(bk[0]));
        assert_eq!(f[deep[1]].neighbor(1).unwrap(), Some(bk[0]));
        assert_eq!(f[deep[3]].neighbor(ne).unwrap(), Some(bk[2]));
        assert_eq!(f[ak[1]].neighbor(1).unwrap(), Some(bk[0]));
        assert_eq!(f[bk[0]].neighbor(0).unwrap(), Some(ak[1]));
        f.validate_invariants().unwrap();
    }

    #[test]
    fn grandchildren_inherit_the_repointed_neighbor() {
        let mut f = Forest::uniform(Dimension::Two, &[2, 1], 1).unwrap();
        let a = f.root_by_ijk(&[0, 0, 0]).unwrap();
        let b = f.root_by_ijk(&[1, 0, 0]).unwrap();
        let ak = f.refine(a).unwrap();
        let deep = f.refine(ak[1]).unwrap();
        let bk = f.refine(b).unwrap();
        let fine = f.refine(deep[3]).unwrap();
        // (7, 2) on level 3: east is (8, 2), inside the unrefined bk[0]
        assert_eq!(f[fine[1]].neighbor(1).unwrap(), Some(bk[0]));
        assert_eq!(f[fine[3]].neighbor(1).unwrap(), Some(bk[0]));
        assert_eq!(f[fine[0]].neighbor(1).unwrap(), Some(fine[1]));
        f.validate_invariants().unwrap();
    }

    #[test]
    fn refining_twice_returns_the_same_children() {
        let mut f = Forest::uniform(Dimension::Three, &[1, 1, 1], 1).unwrap();
        let root = f.roots()[0];
        let first = f.refine(root).unwrap();
        let second = f.refine(root).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.len(), 9);
    }

    #[test]
    fn max_level_is_enforced() {
        let mut f = Forest::uniform(Dimension::Two, &[1, 1], 1)
            .unwrap()
            .with_max_level(1);
        let kids = f.refine(f.roots()[0]).unwrap();
        assert!(matches!(
            f.refine(kids[0]),
            Err(MeshError::MaxLevelExceeded { max: 1, .. })
        ));
    }
}
