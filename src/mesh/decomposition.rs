//! Rectangular decomposition of the level-0 grid over a process grid.
//!
//! The real domain of `n_a` cells per axis is surrounded by `padding` layers of padding
//! cells on every side; positions are given in these padded coordinates. Each rank owns a
//! box of real cells. It additionally stores an aura of `max(1, refinement_buffer)` layers of
//! other ranks' cells, and all padding layers next to its box when the box touches the domain
//! boundary. Padding cells are owned by the rank owning the nearest real cell.

use crate::config::MeshConfig;
use crate::forest::RootSpec;
use crate::mesh_error::MeshError;
use crate::topology::dimension::Dimension;
use itertools::Itertools;
use std::ops::Range;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decomposition {
    dim: Dimension,
    elements: [u64; 3],
    padding: u64,
    aura: u64,
    proc_dims: [usize; 3],
    rank: usize,
}

impl Decomposition {
    pub fn new(config: &MeshConfig, rank: usize, size: usize) -> Result<Self, MeshError> {
        let dim = config.dimension()?;
        let n = dim.get();
        let mut elements = [1u64; 3];
        elements[..n].copy_from_slice(&config.elements_per_dimension);

        let proc_dims = match &config.proc_dims {
            Some(p) => {
                let product: usize = p.iter().product();
                if product != size {
                    return Err(MeshError::InvalidConfig(format!(
                        "proc_dims {p:?} describe {product} processes, running on {size}"
                    )));
                }
                let mut out = [1usize; 3];
                out[..n].copy_from_slice(p);
                out
            }
            None => balanced_proc_dims(&elements[..n], size)?,
        };
        if rank >= size {
            return Err(MeshError::IndexOutOfRange {
                what: "rank",
                index: rank,
                len: size,
            });
        }
        Ok(Decomposition {
            dim,
            elements,
            padding: config.padding_size,
            aura: config.refinement_buffer.max(1) as u64,
            proc_dims,
            rank,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn proc_dims(&self) -> &[usize] {
        &self.proc_dims[..self.dim.get()]
    }

    /// Aura width in level-0 layers.
    pub fn aura(&self) -> u64 {
        self.aura
    }

    pub fn padding(&self) -> u64 {
        self.padding
    }

    /// Padded level-0 grid size per axis.
    pub fn padded_extent(&self) -> Vec<u64> {
        self.elements[..self.dim.get()]
            .iter()
            .map(|&e| e + 2 * self.padding)
            .collect()
    }

    /// Process-grid coordinates of `rank`, x fastest.
    pub fn proc_coords(&self, rank: usize) -> [usize; 3] {
        let mut out = [0usize; 3];
        let mut rest = rank;
        for a in 0..self.dim.get() {
            out[a] = rest % self.proc_dims[a];
            rest /= self.proc_dims[a];
        }
        out
    }

    fn chunk_start(&self, axis: usize, coord: usize) -> u64 {
        coord as u64 * self.elements[axis] / self.proc_dims[axis] as u64
    }

    /// Real cells owned by `rank` along `axis`.
    pub fn owned_range(&self, rank: usize, axis: usize) -> Range<u64> {
        let c = self.proc_coords(rank)[axis];
        self.chunk_start(axis, c)..self.chunk_start(axis, c + 1)
    }

    /// Rank owning the level-0 position `ijk` (padded coordinates). Positions outside the
    /// real domain are clamped onto it first.
    pub fn owner_of(&self, ijk: &[u64; 3]) -> usize {
        let mut rank = 0;
        let mut stride = 1;
        for a in 0..self.dim.get() {
            let real = ijk[a]
                .saturating_sub(self.padding)
                .min(self.elements[a] - 1);
            let p = self.proc_dims[a];
            let c = (0..p)
                .rev()
                .find(|&c| self.chunk_start(a, c) <= real)
                .unwrap_or(0);
            rank += c * stride;
            stride *= p;
        }
        rank
    }

    /// `ijk` lies in the padding layers.
    pub fn is_padding(&self, ijk: &[u64; 3]) -> bool {
        (0..self.dim.get())
            .any(|a| ijk[a] < self.padding || ijk[a] >= self.padding + self.elements[a])
    }

    /// Padded level-0 range stored by this rank along `axis`.
    pub fn local_range(&self, axis: usize) -> Range<u64> {
        let owned = self.owned_range(self.rank, axis);
        let padded = self.elements[axis] + 2 * self.padding;
        let lo = if owned.start == 0 {
            0
        } else {
            (owned.start + self.padding).saturating_sub(self.aura)
        };
        let hi = if owned.end == self.elements[axis] {
            padded
        } else {
            (owned.end + self.padding + self.aura).min(padded)
        };
        lo..hi
    }

    /// Level-0 cells stored by this rank.
    pub fn local_roots(&self) -> Vec<RootSpec> {
        let n = self.dim.get();
        (0..n)
            .map(|a| self.local_range(a))
            .multi_cartesian_product()
            .map(|v| {
                let mut ijk = [0u64; 3];
                // multi_cartesian_product varies the last axis fastest
                ijk[..n].copy_from_slice(&v);
                RootSpec::new(ijk, self.owner_of(&ijk)).padding(self.is_padding(&ijk))
            })
            .collect()
    }

    /// Ranks whose owned boxes lie within aura distance of ours, ascending. The relation is
    /// symmetric and covers the owners of every stored cell.
    pub fn proc_neighbors(&self, size: usize) -> Vec<usize> {
        let n = self.dim.get();
        (0..size)
            .filter(|&r| r != self.rank)
            .filter(|&r| {
                (0..n).all(|a| {
                    let mine = self.owned_range(self.rank, a);
                    let theirs = self.owned_range(r, a);
                    let gap = if theirs.start >= mine.end {
                        theirs.start - mine.end
                    } else if mine.start >= theirs.end {
                        mine.start - theirs.end
                    } else {
                        0
                    };
                    gap < self.aura
                })
            })
            .collect()
    }
}

/// Splits `size` ranks over the axes, giving each prime factor to the axis with the most
/// cells per process.
fn balanced_proc_dims(elements: &[u64], size: usize) -> Result<[usize; 3], MeshError> {
    let mut factors = Vec::new();
    let mut rest = size.max(1);
    let mut f = 2;
    while f * f <= rest {
        while rest % f == 0 {
            factors.push(f);
            rest /= f;
        }
        f += 1;
    }
    if rest > 1 {
        factors.push(rest);
    }
    factors.sort_unstable_by(|a, b| b.cmp(a));

    let mut dims = [1usize; 3];
    for f in factors {
        let axis = (0..elements.len())
            .filter(|&a| (dims[a] * f) as u64 <= elements[a])
            .max_by(|&a, &b| {
                let ra = elements[a] as f64 / dims[a] as f64;
                let rb = elements[b] as f64 / dims[b] as f64;
                ra.total_cmp(&rb).then(b.cmp(&a))
            })
            .ok_or_else(|| {
                MeshError::InvalidConfig(format!(
                    "cannot split a {elements:?} grid over {size} processes"
                ))
            })?;
        dims[axis] *= f;
    }
    Ok(dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_split_prefers_long_axes() {
        assert_eq!(balanced_proc_dims(&[8, 2], 4).unwrap(), [4, 1, 1]);
        assert_eq!(balanced_proc_dims(&[4, 4], 4).unwrap(), [2, 2, 1]);
        assert_eq!(balanced_proc_dims(&[6, 6, 6], 1).unwrap(), [1, 1, 1]);
        assert!(balanced_proc_dims(&[2, 1], 3).is_err());
    }

    #[test]
    fn owners_clamp_into_the_real_domain() {
        let cfg = MeshConfig::new(&[4, 2]).with_padding(1).with_proc_dims(&[2, 1]);
        let d = Decomposition::new(&cfg, 0, 2).unwrap();
        assert_eq!(d.padded_extent(), vec![6, 4]);
        assert_eq!(d.owner_of(&[0, 0, 0]), 0);
        assert_eq!(d.owner_of(&[2, 1, 0]), 0);
        assert_eq!(d.owner_of(&[3, 1, 0]), 1);
        assert_eq!(d.owner_of(&[5, 3, 0]), 1);
        assert!(d.is_padding(&[0, 1, 0]));
        assert!(!d.is_padding(&[1, 1, 0]));
    }

    #[test]
    fn local_region_is_owned_box_plus_aura_and_padding() {
        let cfg = MeshConfig::new(&[6]).with_padding(1).with_refinement_buffer(2);
        let d0 = Decomposition::new(&cfg, 0, 3).unwrap();
        let d1 = Decomposition::new(&cfg, 1, 3).unwrap();
        // rank 0 owns real 0..2 (padded 1..3), rank 1 owns real 2..4 (padded 3..5)
        assert_eq!(d0.local_range(0), 0..5);
        assert_eq!(d1.local_range(0), 1..7);
        assert_eq!(d1.local_roots().len(), 6);
        // rank 0 sees real cells up to 3, rank 2 starts at 4
        assert_eq!(d0.proc_neighbors(3), vec![1]);
        assert_eq!(d1.proc_neighbors(3), vec![0, 2]);
    }

    #[test]
    fn neighbors_are_symmetric() {
        let cfg = MeshConfig::new(&[9, 4]).with_refinement_buffer(1);
        let ds: Vec<_> = (0..6).map(|r| Decomposition::new(&cfg, r, 6).unwrap()).collect();
        for a in &ds {
            for &b in &a.proc_neighbors(6) {
                assert!(ds[b].proc_neighbors(6).contains(&a.rank()));
            }
            // every stored cell is owned by us or a neighbor
            let nbrs = a.proc_neighbors(6);
            for root in a.local_roots() {
                assert!(root.owner == a.rank() || nbrs.contains(&root.owner));
            }
        }
    }
}
