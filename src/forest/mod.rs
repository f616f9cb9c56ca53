//! Arena-backed forest of background cells.
//!
//! A [`Forest`] stores every cell known to one process (owned cells, the aura around them and
//! all their descendants) in a single `Vec`, together with the facets and edges created between
//! them. Roots are the level-0 cells of the padded grid; each root may carry a quadtree (2D),
//! octree (3D) or binary tree (1D).
//!
//! Domain ids are a pure function of `(level, ijk)`: the number of cells on all coarser levels
//! of the padded grid plus the linear index of `ijk` on its level, x fastest. Any process that
//! stores a cell therefore agrees on its id without communication.

mod coarsen;
mod edges;
mod facets;
mod neighbors;
mod patterns;
mod refine;
mod validation;

use crate::mesh_error::MeshError;
use crate::topology::cell::{BackgroundCell, PatternState};
use crate::topology::dimension::Dimension;
use crate::topology::edge::Edge;
use crate::topology::facet::Facet;
use crate::topology::handle::{CellIndex, EdgeIndex, FacetIndex};
use crate::topology::tables::{Offset, TopologyTables};
use std::collections::HashMap;
use std::ops::Index;

/// Deepest level a forest may be refined to unless configured lower.
pub const MAX_LEVEL: u8 = 24;

/// Description of one level-0 cell handed to [`Forest::from_roots`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootSpec {
    /// Position in the padded level-0 grid (unused axes zero).
    pub ijk: [u64; 3],
    pub owner: usize,
    pub padding: bool,
}

impl RootSpec {
    pub fn new(ijk: [u64; 3], owner: usize) -> Self {
        RootSpec {
            ijk,
            owner,
            padding: false,
        }
    }

    pub fn padding(mut self, padding: bool) -> Self {
        self.padding = padding;
        self
    }
}

/// Process-local forest of background cells with its facet and edge arenas.
#[derive(Clone, Debug)]
pub struct Forest {
    dim: Dimension,
    tables: &'static TopologyTables,
    patterns: usize,
    extent: [u64; 3],
    max_level: u8,
    pub(crate) cells: Vec<BackgroundCell>,
    roots: Vec<CellIndex>,
    root_lookup: HashMap<u64, CellIndex>,
    pub(crate) facets: Vec<Option<Facet>>,
    pub(crate) edges: Vec<Option<Edge>>,
}

impl Forest {
    /// Builds a forest over a padded level-0 grid of `extent` cells per axis, storing only
    /// the given roots. Roots start active on every pattern; neighbor slots between stored
    /// roots are linked immediately.
    pub fn from_roots<I>(
        dim: Dimension,
        extent: &[u64],
        patterns: usize,
        roots: I,
    ) -> Result<Self, MeshError>
    where
        I: IntoIterator<Item = RootSpec>,
    {
        let n = dim.get();
        if extent.len() != n {
            return Err(MeshError::InvalidConfig(format!(
                "grid extent has {} axes, forest is {}D",
                extent.len(),
                n
            )));
        }
        if extent.iter().any(|&e| e == 0) {
            return Err(MeshError::InvalidConfig(format!(
                "grid extent {extent:?} has an empty axis"
            )));
        }
        if patterns == 0 {
            return Err(MeshError::InvalidConfig(
                "at least one activation pattern is required".into(),
            ));
        }
        let mut padded = [1u64; 3];
        padded[..n].copy_from_slice(extent);

        let mut forest = Forest {
            dim,
            tables: dim.tables(),
            patterns,
            extent: padded,
            max_level: MAX_LEVEL,
            cells: Vec::new(),
            roots: Vec::new(),
            root_lookup: HashMap::new(),
            facets: Vec::new(),
            edges: Vec::new(),
        };

        for spec in roots {
            let domain_id = forest.domain_id_of(0, &spec.ijk).ok_or_else(|| {
                MeshError::InvalidConfig(format!(
                    "root {:?} lies outside the level-0 grid {:?}",
                    spec.ijk, extent
                ))
            })?;
            if forest.root_lookup.contains_key(&domain_id) {
                return Err(MeshError::InvalidConfig(format!(
                    "root {:?} given twice",
                    spec.ijk
                )));
            }
            let idx = CellIndex::new(forest.cells.len());
            let mut cell = BackgroundCell::new(dim, patterns, 0, domain_id, idx, spec.owner, spec.ijk);
            cell.padding = spec.padding;
            cell.states.fill(PatternState::Active);
            forest.cells.push(cell);
            forest.roots.push(idx);
            forest.root_lookup.insert(domain_id, idx);
        }
        forest.link_roots();
        log::debug!(
            "forest: {} roots on a {:?} grid ({}D, {} patterns)",
            forest.roots.len(),
            extent,
            n,
            patterns
        );
        Ok(forest)
    }

    /// Forest holding every cell of an `extent` grid, all owned by rank 0.
    pub fn uniform(dim: Dimension, extent: &[u64], patterns: usize) -> Result<Self, MeshError> {
        let n = dim.get();
        if extent.len() != n {
            return Err(MeshError::InvalidConfig(format!(
                "grid extent has {} axes, forest is {}D",
                extent.len(),
                n
            )));
        }
        let mut specs = Vec::new();
        let mut ijk = [0u64; 3];
        let total: u64 = extent.iter().product();
        for linear in 0..total {
            let mut rest = linear;
            for a in 0..n {
                ijk[a] = rest % extent[a];
                rest /= extent[a];
            }
            specs.push(RootSpec::new(ijk, 0));
        }
        Self::from_roots(dim, extent, patterns, specs)
    }

    /// Lowers the deepest level `refine` may create.
    pub fn with_max_level(mut self, max_level: u8) -> Self {
        self.max_level = max_level.min(MAX_LEVEL);
        self
    }

    fn link_roots(&mut self) {
        let tables = self.tables;
        for r in 0..self.roots.len() {
            let root = self.roots[r];
            let ijk = self.cells[root.get()].ijk;
            for s in 0..self.dim.neighbors() {
                let n = self
                    .shifted(0, &ijk, &tables.neighbor_offset(s))
                    .and_then(|p| self.root_by_ijk(&p));
                self.cells[root.get()].neighbors[s] = n;
            }
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dim
    }

    pub fn tables(&self) -> &'static TopologyTables {
        self.tables
    }

    pub fn number_of_patterns(&self) -> usize {
        self.patterns
    }

    /// Padded level-0 grid size, one entry per axis (unused axes are 1).
    pub fn extent(&self) -> [u64; 3] {
        self.extent
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Grid size on `level`, or `None` if a dimension overflows.
    pub fn level_extent(&self, level: u8) -> Option<[u64; 3]> {
        let mut out = [1u64; 3];
        for a in 0..self.dim.get() {
            out[a] = self.extent[a].checked_mul(1u64.checked_shl(level as u32)?)?;
        }
        Some(out)
    }

    /// Domain id of position `ijk` on `level`, or `None` outside the padded grid.
    pub fn domain_id_of(&self, level: u8, ijk: &[u64; 3]) -> Option<u64> {
        let n = self.dim.get();
        let mut offset = 0u64;
        for l in 0..level {
            let e = self.level_extent(l)?;
            let count = e[..n].iter().try_fold(1u64, |acc, &x| acc.checked_mul(x))?;
            offset = offset.checked_add(count)?;
        }
        let e = self.level_extent(level)?;
        let mut linear = 0u64;
        for a in (0..n).rev() {
            if ijk[a] >= e[a] {
                return None;
            }
            linear = linear.checked_mul(e[a])?.checked_add(ijk[a])?;
        }
        offset.checked_add(linear)
    }

    /// `ijk + offset` on `level`, if it stays inside the padded grid.
    pub fn shifted(&self, level: u8, ijk: &[u64; 3], offset: &Offset) -> Option<[u64; 3]> {
        let e = self.level_extent(level)?;
        let mut out = [0u64; 3];
        for a in 0..self.dim.get() {
            let v = ijk[a].checked_add_signed(offset[a] as i64)?;
            if v >= e[a] {
                return None;
            }
            out[a] = v;
        }
        Some(out)
    }

    /// Number of cells in the arena.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checked access to a cell.
    pub fn cell(&self, idx: CellIndex) -> Result<&BackgroundCell, MeshError> {
        self.cells.get(idx.get()).ok_or(MeshError::IndexOutOfRange {
            what: "cell",
            index: idx.get(),
            len: self.cells.len(),
        })
    }

    pub(crate) fn cell_mut(&mut self, idx: CellIndex) -> Result<&mut BackgroundCell, MeshError> {
        let len = self.cells.len();
        self.cells.get_mut(idx.get()).ok_or(MeshError::IndexOutOfRange {
            what: "cell",
            index: idx.get(),
            len,
        })
    }

    /// All cells in arena order.
    pub fn cells(&self) -> impl Iterator<Item = &BackgroundCell> + '_ {
        self.cells.iter()
    }

    pub fn roots(&self) -> &[CellIndex] {
        &self.roots
    }

    pub fn root_by_domain_id(&self, domain_id: u64) -> Option<CellIndex> {
        self.root_lookup.get(&domain_id).copied()
    }

    /// Stored level-0 cell at `ijk`.
    pub fn root_by_ijk(&self, ijk: &[u64; 3]) -> Option<CellIndex> {
        self.domain_id_of(0, ijk)
            .and_then(|id| self.root_by_domain_id(id))
    }

    /// Cell at `ijk` on `level`, found by descending from its root. `None` if the root is
    /// not stored or the tree is not refined that deep.
    pub fn locate(&self, level: u8, ijk: &[u64; 3]) -> Option<CellIndex> {
        if level > self.max_level {
            return None;
        }
        let n = self.dim.get();
        let mut root_ijk = [0u64; 3];
        for a in 0..n {
            root_ijk[a] = ijk[a] >> level;
        }
        let mut c = self.root_by_ijk(&root_ijk)?;
        for l in 1..=level {
            let shift = level - l;
            let k = (0..n)
                .map(|a| (((ijk[a] >> shift) & 1) as usize) << a)
                .sum::<usize>();
            c = *self.cells[c.get()].children.get(k)?;
        }
        Some(c)
    }

    /// Deepest stored cell covering `ijk` on `level`.
    pub fn locate_deepest(&self, level: u8, ijk: &[u64; 3]) -> Option<CellIndex> {
        if level > self.max_level {
            return None;
        }
        let n = self.dim.get();
        let mut root_ijk = [0u64; 3];
        for a in 0..n {
            root_ijk[a] = ijk[a] >> level;
        }
        let mut c = self.root_by_ijk(&root_ijk)?;
        for l in 1..=level {
            let shift = level - l;
            let k = (0..n)
                .map(|a| (((ijk[a] >> shift) & 1) as usize) << a)
                .sum::<usize>();
            match self.cells[c.get()].children.get(k) {
                Some(&child) => c = child,
                None => break,
            }
        }
        Some(c)
    }

    pub fn facet(&self, idx: FacetIndex) -> Result<&Facet, MeshError> {
        self.facets
            .get(idx.get())
            .and_then(Option::as_ref)
            .ok_or(MeshError::IndexOutOfRange {
                what: "facet",
                index: idx.get(),
                len: self.facets.len(),
            })
    }

    /// Live facets.
    pub fn facets(&self) -> impl Iterator<Item = &Facet> + '_ {
        self.facets.iter().flatten()
    }

    pub fn number_of_facets(&self) -> usize {
        self.facets().count()
    }

    pub fn edge(&self, idx: EdgeIndex) -> Result<&Edge, MeshError> {
        self.edges
            .get(idx.get())
            .and_then(Option::as_ref)
            .ok_or(MeshError::IndexOutOfRange {
                what: "edge",
                index: idx.get(),
                len: self.edges.len(),
            })
    }

    /// Live edges.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().flatten()
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges().count()
    }

    pub(crate) fn check_pattern(&self, pattern: usize) -> Result<(), MeshError> {
        if pattern < self.patterns {
            Ok(())
        } else {
            Err(MeshError::PatternOutOfRange {
                pattern,
                count: self.patterns,
            })
        }
    }

    // ---- traversals ----

    /// The cell and all of its structural descendants.
    pub fn count_descendants(&self, idx: CellIndex) -> Result<usize, MeshError> {
        Ok(self.collect_descendants(idx)?.len())
    }

    /// The cell and all of its structural descendants, parents before children.
    pub fn collect_descendants(&self, idx: CellIndex) -> Result<Vec<CellIndex>, MeshError> {
        self.cell(idx)?;
        let mut out = Vec::new();
        let mut stack = vec![idx];
        while let Some(c) = stack.pop() {
            out.push(c);
            stack.extend(self.cells[c.get()].children.iter().rev().copied());
        }
        Ok(out)
    }

    /// Active cells of `pattern` in the subtree of `idx`.
    pub fn count_active_descendants(&self, idx: CellIndex, pattern: usize) -> Result<usize, MeshError> {
        Ok(self.collect_active_descendants(idx, pattern)?.len())
    }

    /// Active cells of `pattern` in the subtree of `idx`. The walk only descends where the
    /// pattern uses a cell's children.
    pub fn collect_active_descendants(
        &self,
        idx: CellIndex,
        pattern: usize,
    ) -> Result<Vec<CellIndex>, MeshError> {
        self.check_pattern(pattern)?;
        self.cell(idx)?;
        let mut out = Vec::new();
        let mut stack = vec![idx];
        while let Some(c) = stack.pop() {
            let cell = &self.cells[c.get()];
            match cell.states[pattern] {
                PatternState::Active => out.push(c),
                PatternState::Refined => stack.extend(cell.children.iter().rev().copied()),
                PatternState::Inactive => {}
            }
        }
        Ok(out)
    }

    /// Every stored cell on `level`, root by root.
    pub fn collect_cells_on_level(&self, level: u8) -> Vec<CellIndex> {
        let mut out = Vec::new();
        for &root in &self.roots {
            let mut stack = vec![root];
            while let Some(c) = stack.pop() {
                let cell = &self.cells[c.get()];
                if cell.level == level {
                    out.push(c);
                } else {
                    stack.extend(cell.children.iter().rev().copied());
                }
            }
        }
        out
    }

    pub fn count_elements_on_level(&self, level: u8) -> usize {
        self.cells.iter().filter(|c| c.level == level).count()
    }

    /// Active cells of `pattern` across all roots.
    pub fn active_cells(&self, pattern: usize) -> Result<Vec<CellIndex>, MeshError> {
        let mut out = Vec::new();
        for &root in &self.roots {
            out.extend(self.collect_active_descendants(root, pattern)?);
        }
        Ok(out)
    }

    /// Deepest level holding any cell.
    pub fn depth(&self) -> u8 {
        self.cells.iter().map(|c| c.level).max().unwrap_or(0)
    }
}

impl Index<CellIndex> for Forest {
    type Output = BackgroundCell;

    /// # Panics
    ///
    /// Panics if `idx` does not refer to a cell of this forest.
    fn index(&self, idx: CellIndex) -> &BackgroundCell {
        &self.cells[idx.get()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_ids_stack_levels() {
        let f = Forest::uniform(Dimension::Two, &[2, 3], 1).unwrap();
        assert_eq!(f.domain_id_of(0, &[0, 0, 0]), Some(0));
        assert_eq!(f.domain_id_of(0, &[1, 2, 0]), Some(5));
        // level 1 starts after the 6 level-0 cells; 4 columns per row
        assert_eq!(f.domain_id_of(1, &[0, 0, 0]), Some(6));
        assert_eq!(f.domain_id_of(1, &[3, 1, 0]), Some(6 + 7));
        assert_eq!(f.domain_id_of(0, &[2, 0, 0]), None);
    }

    #[test]
    fn roots_are_linked_and_active() {
        let f = Forest::uniform(Dimension::Two, &[2, 2], 2).unwrap();
        let r0 = f.root_by_ijk(&[0, 0, 0]).unwrap();
        let r1 = f.root_by_ijk(&[1, 0, 0]).unwrap();
        let r3 = f.root_by_ijk(&[1, 1, 0]).unwrap();
        assert_eq!(f[r0].neighbor(1).unwrap(), Some(r1));
        assert_eq!(f[r0].neighbor(0).unwrap(), None);
        let ne = f.tables().slot_of(&[1, 1, 0]).unwrap();
        assert_eq!(f[r0].neighbor(ne).unwrap(), Some(r3));
        assert!(f[r0].is_active(0) && f[r0].is_active(1));
    }

    #[test]
    fn rejects_bad_grids() {
        assert!(matches!(
            Forest::uniform(Dimension::Two, &[2], 1),
            Err(MeshError::InvalidConfig(_))
        ));
        assert!(matches!(
            Forest::from_roots(
                Dimension::One,
                &[2],
                1,
                [RootSpec::new([0, 0, 0], 0), RootSpec::new([0, 0, 0], 0)]
            ),
            Err(MeshError::InvalidConfig(_))
        ));
        assert!(Forest::from_roots(Dimension::One, &[2], 1, [RootSpec::new([5, 0, 0], 0)]).is_err());
    }

    #[test]
    fn locate_descends_through_children() {
        let mut f = Forest::uniform(Dimension::Two, &[2, 2], 1).unwrap();
        let r = f.root_by_ijk(&[1, 0, 0]).unwrap();
        let kids = f.refine(r).unwrap();
        assert_eq!(f.locate(1, &[3, 1, 0]), Some(kids[3]));
        assert_eq!(f.locate(1, &[0, 0, 0]), None);
        assert_eq!(f.locate_deepest(1, &[0, 0, 0]), f.root_by_ijk(&[0, 0, 0]));
        assert_eq!(f.locate(0, &[1, 0, 0]), Some(r));
        // deeper than any cell can be
        assert_eq!(f.locate(70, &[1, 0, 0]), None);
        assert_eq!(f.locate_deepest(u8::MAX, &[0, 0, 0]), None);
    }

    #[test]
    fn pattern_traversal_stops_at_active_leaves() {
        let mut f = Forest::uniform(Dimension::Two, &[1, 1], 2).unwrap();
        let root = f.roots()[0];
        let kids = f.refine_on_pattern(root, 0).unwrap();
        assert_eq!(f.count_descendants(root).unwrap(), 5);
        assert_eq!(f.count_active_descendants(root, 0).unwrap(), 4);
        // pattern 1 still uses the root itself
        assert_eq!(f.count_active_descendants(root, 1).unwrap(), 1);
        assert_eq!(f.collect_active_descendants(root, 1).unwrap(), vec![root]);
        assert_eq!(f.collect_cells_on_level(1), kids.to_vec());
        assert_eq!(f.count_elements_on_level(1), 4);
        assert!(matches!(
            f.active_cells(2),
            Err(MeshError::PatternOutOfRange { .. })
        ));
    }
}
