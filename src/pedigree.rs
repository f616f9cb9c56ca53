//! Pedigree paths: pointer-free cell addresses.
//!
//! A pedigree path names a cell by its level-0 ancestor's domain id and the child index taken
//! at every level below it. Child indices are `N`-bit fields written root to leaf, most
//! significant bit first, into 32-bit words; fields may straddle a word boundary in 3D.
//! Because level-0 domain ids agree across processes, a path encoded on one process can be
//! decoded on any process storing the same subtree.
//!
//! The flat form is `[root_id, word_0, .., word_{w-1}]` with `w = ceil(level·N/32)`. It does
//! not hold the level: the request header carries it on the wire, and
//! [`PedigreePath::from_sequence`] takes it as an argument.

use crate::forest::Forest;
use crate::mesh_error::MeshError;
use crate::topology::dimension::Dimension;
use crate::topology::handle::CellIndex;
use smallvec::SmallVec;

/// Compact record of a cell's position in the forest.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PedigreePath {
    root_domain_id: u64,
    level: u8,
    words: SmallVec<[u32; 4]>,
}

/// Number of packed words for a path to `level`: `ceil(level·N / 32)`.
#[inline]
pub const fn word_count_for(level: u8, dim: Dimension) -> usize {
    (level as usize * dim.get()).div_ceil(32)
}

impl PedigreePath {
    /// Reassembles a path from its parts, checking the word count against the level.
    pub fn from_parts(
        root_domain_id: u64,
        level: u8,
        words: &[u32],
        dim: Dimension,
    ) -> Result<Self, MeshError> {
        let expected = word_count_for(level, dim);
        if words.len() != expected {
            return Err(MeshError::MalformedPedigree(format!(
                "level {level} in {}D needs {expected} words, got {}",
                dim.get(),
                words.len()
            )));
        }
        Ok(PedigreePath {
            root_domain_id,
            level,
            words: SmallVec::from_slice(words),
        })
    }

    /// Records the path from the root down to `idx`.
    pub fn encode(forest: &Forest, idx: CellIndex) -> Result<Self, MeshError> {
        let dim = forest.dimension();
        let n = dim.get();
        let mut cell = forest.cell(idx)?;
        let level = cell.level();

        let mut fields: SmallVec<[u8; 32]> = SmallVec::with_capacity(level as usize);
        while let Some(parent) = cell.parent() {
            fields.push(cell.child_index() as u8);
            cell = forest.cell(parent)?;
        }
        fields.reverse();

        let mut words: SmallVec<[u32; 4]> = SmallVec::from_elem(0, word_count_for(level, dim));
        for (l, &k) in fields.iter().enumerate() {
            for bit in 0..n {
                // most significant bit of the field first
                if (k >> (n - 1 - bit)) & 1 == 1 {
                    let b = l * n + bit;
                    words[b / 32] |= 1 << (31 - b % 32);
                }
            }
        }
        Ok(PedigreePath {
            root_domain_id: cell.domain_id(),
            level,
            words,
        })
    }

    /// Follows the path in `forest`.
    pub fn decode(&self, forest: &Forest) -> Result<CellIndex, MeshError> {
        let dim = forest.dimension();
        let n = dim.get();
        if self.words.len() != word_count_for(self.level, dim) {
            return Err(MeshError::MalformedPedigree(format!(
                "level {} in {}D needs {} words, got {}",
                self.level,
                n,
                word_count_for(self.level, dim),
                self.words.len()
            )));
        }
        let mut idx = forest
            .root_by_domain_id(self.root_domain_id)
            .ok_or(MeshError::UnknownPedigreeRoot(self.root_domain_id))?;
        for l in 0..self.level as usize {
            let mut k = 0usize;
            for bit in 0..n {
                let b = l * n + bit;
                let set = (self.words[b / 32] >> (31 - b % 32)) & 1;
                k = (k << 1) | set as usize;
            }
            idx = forest[idx]
                .children()
                .get(k)
                .copied()
                .ok_or(MeshError::PedigreeUnresolved {
                    root: self.root_domain_id,
                    level: l as u8,
                })?;
        }
        Ok(idx)
    }

    pub fn root_domain_id(&self) -> u64 {
        self.root_domain_id
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Length of the flat form, `ceil(level·N/32) + 1`.
    pub fn encoded_len(&self) -> usize {
        self.words.len() + 1
    }

    /// Flat form: root id followed by the packed words.
    pub fn to_sequence(&self) -> Vec<u64> {
        std::iter::once(self.root_domain_id)
            .chain(self.words.iter().map(|&w| w as u64))
            .collect()
    }

    /// Reads the flat form back; `level` must be the level the path was encoded at.
    pub fn from_sequence(level: u8, seq: &[u64], dim: Dimension) -> Result<Self, MeshError> {
        let (&root, rest) = seq
            .split_first()
            .ok_or_else(|| MeshError::MalformedPedigree("empty sequence".into()))?;
        let words = rest
            .iter()
            .map(|&w| {
                u32::try_from(w).map_err(|_| {
                    MeshError::MalformedPedigree(format!("word {w:#x} does not fit 32 bits"))
                })
            })
            .collect::<Result<SmallVec<[u32; 4]>, _>>()?;
        Self::from_parts(root, level, &words, dim)
    }
}
