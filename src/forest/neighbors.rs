use super::Forest;
use crate::mesh_error::MeshError;
use crate::topology::handle::CellIndex;
use crate::topology::tables::{MAX_STENCIL_ORDER, Offset};
use std::collections::VecDeque;

impl Forest {
    /// Same-level cells within `order` layers of `idx`, indexed like
    /// [`Stencil`](crate::topology::tables::Stencil) positions: `(2·order+1)^N - 1` slots,
    /// the first `3^N - 1` equal to the cell's own neighbor slots.
    ///
    /// The neighborhood is assembled by asking every found neighbor for its neighbors; the
    /// first cell written to a position is kept. Slots with no same-level cell stay empty.
    pub fn neighbors_from_same_level(
        &self,
        idx: CellIndex,
        order: usize,
    ) -> Result<Vec<Option<CellIndex>>, MeshError> {
        let stencil = self
            .tables
            .stencil(order)
            .ok_or(MeshError::IndexOutOfRange {
                what: "neighborhood order",
                index: order,
                len: MAX_STENCIL_ORDER + 1,
            })?;
        let origin = self.cell(idx)?;
        let level = origin.level;
        let b = self.dim.neighbors();

        let mut out = vec![None; stencil.len()];
        let mut queue = VecDeque::new();
        for (s, n) in origin.neighbors.iter().enumerate() {
            if let Some(n) = *n {
                if self.cells[n.get()].level == level {
                    out[s] = Some(n);
                    queue.push_back((s, n));
                }
            }
        }

        while let Some((pos, c)) = queue.pop_front() {
            let base = stencil.offset(pos);
            for t in 0..b {
                let Some(n) = self.cells[c.get()].neighbors[t] else {
                    continue;
                };
                if self.cells[n.get()].level != level {
                    continue;
                }
                let step = self.tables.neighbor_offset(t);
                let o: Offset = [base[0] + step[0], base[1] + step[1], base[2] + step[2]];
                if let Some(q) = stencil.index_of(&o) {
                    if out[q].is_none() {
                        out[q] = Some(n);
                        queue.push_back((q, n));
                    }
                }
            }
        }
        Ok(out)
    }
}
