//! Corner vertices of the active cells.
//!
//! A vertex is identified by its position on the finest level it was seen from, collapsed to
//! the coarsest level whose grid still contains the point. Two cells sharing a corner thus
//! compute the same [`VertexKey`] whatever their levels. The rank owning the level-0 cell the
//! point falls into numbers the vertex.

use super::{BackgroundMesh, SyncPhase};
use crate::algs::communicator::Communicator;
use crate::algs::offsets::gather_offsets;
use crate::algs::reconcile::{IdRequest, reconcile_ids};
use crate::forest::Forest;
use crate::mesh_error::{InvariantKind, MeshError};
use crate::pedigree::PedigreePath;
use crate::topology::dimension::Dimension;
use crate::topology::handle::CellIndex;
use crate::topology::tables::child_bits;
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Canonical position of a grid point: point `ijk` of the level-`level` vertex grid, with
/// `level` as low as possible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexKey {
    pub level: u8,
    pub ijk: [u64; 3],
}

impl VertexKey {
    pub fn canonical(mut level: u8, mut ijk: [u64; 3], dim: Dimension) -> Self {
        let n = dim.get();
        while level > 0 && ijk[..n].iter().all(|&x| x % 2 == 0) {
            for x in &mut ijk[..n] {
                *x /= 2;
            }
            level -= 1;
        }
        VertexKey { level, ijk }
    }

    /// Corner `k` of cell `idx` (bit `axis` of `k` selects the high side).
    pub fn of_corner(forest: &Forest, idx: CellIndex, k: usize) -> Self {
        let dim = forest.dimension();
        let cell = &forest[idx];
        let bits = child_bits(k);
        let mut ijk = [0u64; 3];
        for a in 0..dim.get() {
            ijk[a] = cell.ijk()[a] + bits[a] as u64;
        }
        Self::canonical(cell.level(), ijk, dim)
    }

    /// Level-0 cell containing the point, points on the upper grid boundary belonging to the
    /// last cell.
    pub fn root_ijk(&self, extent: &[u64; 3], dim: Dimension) -> [u64; 3] {
        let mut out = [0u64; 3];
        for a in 0..dim.get() {
            out[a] = (self.ijk[a] >> self.level).min(extent[a].saturating_sub(1));
        }
        out
    }
}

/// Global vertex ids known to one rank.
#[derive(Clone, Debug, Default)]
pub struct VertexNumbering {
    ids: HashMap<VertexKey, u64>,
    owned: usize,
    total: u64,
}

impl VertexNumbering {
    pub fn id(&self, key: &VertexKey) -> Option<u64> {
        self.ids.get(key).copied()
    }

    /// Vertices with an id on this rank, owned or not.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn number_owned(&self) -> usize {
        self.owned
    }

    /// Vertices across all ranks.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VertexKey, u64)> + '_ {
        self.ids.iter().map(|(k, &id)| (k, id))
    }
}

impl<C: Communicator> BackgroundMesh<C> {
    fn vertex_owner(&self, key: &VertexKey) -> usize {
        let dim = self.forest.dimension();
        let root = key.root_ijk(&self.forest.extent(), dim);
        self.decomposition.owner_of(&root)
    }

    /// Numbers the corners of the active non-padding cells of `pattern`. Collective; returns
    /// the global vertex count.
    pub fn number_vertices(&mut self, pattern: usize) -> Result<u64, MeshError> {
        let me = self.rank();
        let corners = self.forest.dimension().children();
        let mut owned: BTreeSet<VertexKey> = BTreeSet::new();
        let mut asked: HashSet<VertexKey> = HashSet::new();
        let mut outgoing: HashMap<usize, Vec<IdRequest>> = HashMap::new();
        let mut targets: HashMap<usize, Vec<VertexKey>> = HashMap::new();
        for c in self.forest.active_cells(pattern)? {
            let cell = &self.forest[c];
            if cell.is_padding() {
                continue;
            }
            for k in 0..corners {
                let key = VertexKey::of_corner(&self.forest, c, k);
                let owner = self.vertex_owner(&key);
                if owner == me {
                    owned.insert(key);
                } else if cell.owner() == me && asked.insert(key) {
                    outgoing.entry(owner).or_default().push(IdRequest {
                        path: PedigreePath::encode(&self.forest, c)?,
                        slot: k as u32,
                    });
                    targets.entry(owner).or_default().push(key);
                }
            }
        }

        let table = gather_offsets(&self.comm, &[owned.len() as u64]);
        let offset = table.offset(me, 0);
        let mut ids: HashMap<VertexKey, u64> = owned
            .iter()
            .enumerate()
            .map(|(i, &key)| (key, offset + i as u64))
            .collect();

        let forest = &self.forest;
        let answers = reconcile_ids(
            &self.comm,
            self.tags(SyncPhase::Vertices),
            forest.dimension(),
            &self.proc_neighbors,
            &outgoing,
            |_, req| {
                let cell = req.path.decode(forest)?;
                let key = VertexKey::of_corner(forest, cell, req.slot as usize);
                ids.get(&key).copied().ok_or(MeshError::UnresolvedId {
                    entity: "vertex",
                    index: req.slot as usize,
                })
            },
        )?;
        for (rank, keys) in targets {
            let got = answers.get(&rank).map(Vec::as_slice).unwrap_or(&[]);
            ids.extend(keys.into_iter().zip(got.iter().copied()));
        }

        log::debug!(
            "rank {me}: numbered {} vertices from {offset}, {} known in total",
            owned.len(),
            ids.len()
        );
        self.vertices = VertexNumbering {
            ids,
            owned: owned.len(),
            total: table.total(0),
        };
        Ok(self.vertices.total)
    }

    pub fn vertices(&self) -> &VertexNumbering {
        &self.vertices
    }

    /// Vertex ids of cell `idx` by local corner index.
    pub fn cell_vertex_ids(&self, idx: CellIndex) -> Result<SmallVec<[u64; 8]>, MeshError> {
        self.forest.cell(idx)?;
        (0..self.forest.dimension().children())
            .map(|k| {
                let key = VertexKey::of_corner(&self.forest, idx, k);
                self.vertices.id(&key).ok_or(MeshError::UnresolvedId {
                    entity: "vertex",
                    index: k,
                })
            })
            .collect()
    }

    /// Vertex ids of cell `idx` in VTK corner order.
    pub fn vtk_connectivity(&self, idx: CellIndex) -> Result<SmallVec<[u64; 8]>, MeshError> {
        let ids = self.cell_vertex_ids(idx)?;
        Ok(self
            .cell_type()
            .vtk_corner_order()
            .iter()
            .map(|&k| ids[k])
            .collect())
    }

    /// Checks that every owned active cell of `pattern` has all corner ids and that no id
    /// names two different points.
    pub fn check_vertex_consistency(&self, pattern: usize) -> Result<(), MeshError> {
        let mut seen: HashMap<u64, VertexKey> = HashMap::new();
        for (key, id) in self.vertices.iter() {
            if let Some(other) = seen.insert(id, *key) {
                return Err(MeshError::invariant(
                    InvariantKind::VertexIdCollision,
                    format!("vertex id {id} names both {other:?} and {key:?}"),
                ));
            }
            if id >= self.vertices.total {
                return Err(MeshError::invariant(
                    InvariantKind::VertexIdCollision,
                    format!("vertex id {id} of {key:?} exceeds the total {}", self.vertices.total),
                ));
            }
        }
        for c in self.owned_active_cells(pattern)? {
            self.cell_vertex_ids(c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::config::MeshConfig;

    #[test]
    fn keys_collapse_to_the_coarsest_grid() {
        let k = VertexKey::canonical(3, [8, 4, 0], Dimension::Two);
        assert_eq!(k, VertexKey { level: 1, ijk: [2, 1, 0] });
        let k = VertexKey::canonical(2, [3, 4, 0], Dimension::Two);
        assert_eq!(k.level, 2);
        // unused axes do not block the collapse
        let k = VertexKey::canonical(1, [2, 0, 7], Dimension::One);
        assert_eq!(k, VertexKey { level: 0, ijk: [1, 0, 7] });
    }

    #[test]
    fn shared_corners_share_ids() {
        let mut m = BackgroundMesh::new(MeshConfig::new(&[2, 1]), NoComm).unwrap();
        let a = m.forest().locate(0, &[0, 0, 0]).unwrap();
        m.flag_for_refinement(a, 0).unwrap();
        m.perform_refinement(0).unwrap();
        // 2x1 grid with the left cell split: 6 coarse points plus 5 inside the split cell
        assert_eq!(m.number_vertices(0).unwrap(), 11);
        m.check_vertex_consistency(0).unwrap();

        let b = m.forest().locate(0, &[1, 0, 0]).unwrap();
        let east_child = m.forest().locate(1, &[1, 0, 0]).unwrap();
        let b_ids = m.cell_vertex_ids(b).unwrap();
        let c_ids = m.cell_vertex_ids(east_child).unwrap();
        // b's lower-left corner is the child's lower-right corner
        assert_eq!(b_ids[0], c_ids[1]);
    }

    #[test]
    fn vtk_order_walks_the_quad() {
        let mut m = BackgroundMesh::new(MeshConfig::new(&[1, 1]), NoComm).unwrap();
        m.number_vertices(0).unwrap();
        let root = m.forest().roots()[0];
        let local = m.cell_vertex_ids(root).unwrap();
        let vtk = m.vtk_connectivity(root).unwrap();
        assert_eq!(vtk.as_slice(), &[local[0], local[1], local[3], local[2]]);
    }
}
