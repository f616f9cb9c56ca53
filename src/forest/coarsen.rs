//! Discarding subtrees and compacting the cell arena.

use super::Forest;
use crate::mesh_error::{InvariantKind, MeshError};
use crate::topology::handle::CellIndex;

impl Forest {
    /// Destroys every descendant of `parent`.
    ///
    /// Facets and edges owned by discarded cells are released and cleared from the surviving
    /// side; a facet mastered by a surviving same-level cell loses its slave and becomes a
    /// level-transition facet of that cell. Surviving cells that referenced a discarded cell
    /// as neighbor now reference `parent`. The arena is compacted, so indices of cells stored
    /// after `parent`'s subtree change; facet slots emptied here are filled again by the next
    /// [`create_facets`](Forest::create_facets) pass.
    ///
    /// Fails with [`InvariantKind::ChildrenInUse`] if any pattern still uses the children.
    /// Returns the number of discarded cells.
    pub fn discard_children(&mut self, parent: CellIndex) -> Result<usize, MeshError> {
        let p = self.cell(parent)?;
        if !p.has_children() {
            return Ok(0);
        }
        if let Some(pattern) = (0..self.patterns).find(|&pt| p.is_refined(pt)) {
            return Err(MeshError::invariant(
                InvariantKind::ChildrenInUse,
                format!(
                    "children of cell {} are used by pattern {pattern}",
                    p.domain_id
                ),
            ));
        }

        let removed: Vec<CellIndex> = self.collect_descendants(parent)?.into_iter().skip(1).collect();
        let mut is_removed = vec![false; self.cells.len()];
        for r in &removed {
            is_removed[r.get()] = true;
        }

        for &r in &removed {
            for f in 0..self.dim.facets() {
                let Some(fi) = self.cells[r.get()].facets[f] else {
                    continue;
                };
                if self.cells[r.get()].owns_facet[f] {
                    self.release_facet(fi);
                } else {
                    let facet = self.facet_mut(fi)?;
                    facet.slave = None;
                    facet.index_on_slave = None;
                    self.cells[r.get()].facets[f] = None;
                }
            }
            for e in 0..self.dim.edges() {
                let Some(ei) = self.cells[r.get()].edges[e] else {
                    continue;
                };
                if self.cells[r.get()].owns_edge[e] {
                    self.release_edge(ei);
                } else {
                    self.edge_mut(ei)?.remove(r);
                    self.cells[r.get()].edges[e] = None;
                }
            }
        }

        for i in 0..self.cells.len() {
            if is_removed[i] {
                continue;
            }
            for s in 0..self.dim.neighbors() {
                if let Some(n) = self.cells[i].neighbors[s] {
                    if is_removed[n.get()] {
                        self.cells[i].neighbors[s] = Some(parent);
                    }
                }
            }
        }
        self.cells[parent.get()].children.clear();

        self.compact(&is_removed);
        log::debug!("discarded {} cells below {parent}", removed.len());
        Ok(removed.len())
    }

    /// Drops removed cells and renumbers every reference to the survivors.
    fn compact(&mut self, is_removed: &[bool]) {
        let mut remap: Vec<Option<CellIndex>> = Vec::with_capacity(is_removed.len());
        let mut next = 0;
        for &gone in is_removed {
            if gone {
                remap.push(None);
            } else {
                remap.push(Some(CellIndex::new(next)));
                next += 1;
            }
        }
        let map = |c: CellIndex| remap[c.get()];

        let mut i = 0;
        self.cells.retain(|_| {
            let keep = !is_removed[i];
            i += 1;
            keep
        });
        for cell in &mut self.cells {
            cell.memory_index = map(cell.memory_index).unwrap_or(cell.memory_index);
            cell.parent = cell.parent.and_then(map);
            for c in cell.children.iter_mut() {
                *c = map(*c).unwrap_or(*c);
            }
            for n in cell.neighbors.iter_mut() {
                *n = n.and_then(map);
            }
        }
        for facet in self.facets.iter_mut().flatten() {
            facet.master = map(facet.master).unwrap_or(facet.master);
            facet.slave = facet.slave.and_then(map);
        }
        for edge in self.edges.iter_mut().flatten() {
            edge.owner_cell = map(edge.owner_cell).unwrap_or(edge.owner_cell);
            for c in edge.elements.iter_mut() {
                *c = c.and_then(map);
            }
        }
        for r in self.roots.iter_mut() {
            *r = map(*r).unwrap_or(*r);
        }
        for r in self.root_lookup.values_mut() {
            *r = map(*r).unwrap_or(*r);
        }
    }
}
