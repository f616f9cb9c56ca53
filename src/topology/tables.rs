//! Immutable per-dimensionality lookup tables.
//!
//! Every topological relation that depends only on the dimensionality is tabulated once
//! and shared: neighbor slot offsets and their opposites, the child-neighbor derivation
//! rules used by [`Forest::refine`](crate::forest::Forest::refine), the edge
//! correspondence tables for hexahedra, and the larger stencils used by
//! [`Forest::neighbors_from_same_level`](crate::forest::Forest::neighbors_from_same_level).
//!
//! # Slot layout
//! Neighbor slots `0..2N` are the facet neighbors, ordered `f = 2·axis + side` with
//! `side = 0` toward lower coordinates. Facet slot `f` therefore shares the index of the
//! neighbor across it. The remaining `3^N - 1 - 2N` slots hold the diagonal neighbors in
//! lexicographic offset order (last axis fastest).
//!
//! ```text
//!   2D neighbor slots            child indices (bit 0 = x, bit 1 = y)
//!   5 ---- 3 ---- 7              +-----+-----+
//!   |      |      |              |  2  |  3  |
//!   0 ---- * ---- 1              +-----+-----+
//!   |      |      |              |  0  |  1  |
//!   4 ---- 2 ---- 6              +-----+-----+
//! ```

use crate::topology::dimension::Dimension;
use itertools::Itertools;
use once_cell::sync::Lazy;

/// Signed offset of a neighbor position, one entry per axis (unused axes are zero).
pub type Offset = [i8; 3];

/// Highest neighborhood order supported by [`Stencil`].
pub const MAX_STENCIL_ORDER: usize = 3;

/// How a child fills one of its neighbor slots right after refinement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildNeighborRule {
    /// The neighbor is the given child of the same parent.
    Sibling(u8),
    /// Look through the parent's neighbor slot `slot`. If that neighbor is refined at the
    /// parent's level use its child `child`, otherwise take the neighbor itself (or nothing).
    ParentNeighbor { slot: u8, child: u8 },
}

/// One same-level cell sharing a hexahedron edge: the neighbor slot it occupies and the
/// local index of the shared edge on that neighbor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeShare {
    pub slot: u8,
    pub edge: u8,
}

/// Neighborhood of a given order: all offsets in `[-order, order]^N` without the origin.
///
/// The first `3^N - 1` entries coincide with the neighbor slots, so an order-1 stencil is
/// indexed exactly like a cell's neighbor array.
#[derive(Clone, Debug)]
pub struct Stencil {
    order: usize,
    dim: usize,
    offsets: Vec<Offset>,
    lookup: Vec<Option<u16>>,
}

impl Stencil {
    fn build(dim: usize, order: usize, neighbor_offsets: &[Offset]) -> Self {
        let k = order as i8;
        let width = 2 * order + 1;
        let mut offsets: Vec<Offset> = neighbor_offsets.to_vec();
        offsets.extend(
            cube_offsets(dim, k)
                .into_iter()
                .filter(|o| o.iter().any(|&c| c.abs() > 1)),
        );
        let mut lookup = vec![None; width.pow(dim as u32)];
        for (i, o) in offsets.iter().enumerate() {
            lookup[cube_position(dim, order, o)] = Some(i as u16);
        }
        Stencil {
            order,
            dim,
            offsets,
            lookup,
        }
    }

    /// Neighborhood order.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of positions, `(2·order + 1)^N - 1`.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Always false; a stencil never is empty.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offset of position `i`.
    pub fn offset(&self, i: usize) -> Offset {
        self.offsets[i]
    }

    /// Position of an offset, if it lies inside the stencil and is not the origin.
    pub fn index_of(&self, o: &Offset) -> Option<usize> {
        let k = self.order as i8;
        if o[..self.dim].iter().any(|&c| c < -k || c > k) {
            return None;
        }
        self.lookup[cube_position(self.dim, self.order, o)].map(usize::from)
    }
}

/// All tables for one dimensionality.
#[derive(Debug)]
pub struct TopologyTables {
    dim: Dimension,
    neighbor_offsets: Vec<Offset>,
    opposite: Vec<u8>,
    child_rules: Vec<ChildNeighborRule>,
    edge_shares: Vec<[EdgeShare; 3]>,
    stencils: Vec<Stencil>,
}

static TABLES_1D: Lazy<TopologyTables> = Lazy::new(|| TopologyTables::build(Dimension::One));
static TABLES_2D: Lazy<TopologyTables> = Lazy::new(|| TopologyTables::build(Dimension::Two));
static TABLES_3D: Lazy<TopologyTables> = Lazy::new(|| TopologyTables::build(Dimension::Three));

impl TopologyTables {
    /// Shared tables for `dim`, built on first use.
    pub fn for_dimension(dim: Dimension) -> &'static TopologyTables {
        match dim {
            Dimension::One => &TABLES_1D,
            Dimension::Two => &TABLES_2D,
            Dimension::Three => &TABLES_3D,
        }
    }

    fn build(dim: Dimension) -> Self {
        let n = dim.get();

        let mut neighbor_offsets: Vec<Offset> = (0..dim.facets())
            .map(|f| {
                let mut o = [0i8; 3];
                o[f / 2] = if f % 2 == 0 { -1 } else { 1 };
                o
            })
            .collect();
        neighbor_offsets.extend(
            cube_offsets(n, 1)
                .into_iter()
                .filter(|o| o.iter().filter(|&&c| c != 0).count() > 1),
        );
        debug_assert_eq!(neighbor_offsets.len(), dim.neighbors());

        let slot_of = |o: &Offset| -> u8 {
            neighbor_offsets
                .iter()
                .position(|x| x == o)
                .map(|p| p as u8)
                .unwrap_or_else(|| unreachable!("offset {o:?} is not a neighbor offset"))
        };

        let opposite = neighbor_offsets
            .iter()
            .map(|o| slot_of(&[-o[0], -o[1], -o[2]]))
            .collect();

        let mut child_rules = Vec::with_capacity(dim.children() * dim.neighbors());
        for k in 0..dim.children() {
            let bits = child_bits(k);
            for o in &neighbor_offsets {
                let mut target = [0i8; 3];
                for a in 0..n {
                    target[a] = bits[a] as i8 + o[a];
                }
                if target[..n].iter().all(|&t| (0..=1).contains(&t)) {
                    child_rules.push(ChildNeighborRule::Sibling(child_from_bits(&target) as u8));
                } else {
                    let mut through = [0i8; 3];
                    let mut inner = [0i8; 3];
                    for a in 0..n {
                        through[a] = match target[a] {
                            t if t < 0 => -1,
                            t if t > 1 => 1,
                            _ => 0,
                        };
                        inner[a] = target[a].rem_euclid(2);
                    }
                    child_rules.push(ChildNeighborRule::ParentNeighbor {
                        slot: slot_of(&through),
                        child: child_from_bits(&inner) as u8,
                    });
                }
            }
        }

        let mut edge_shares = Vec::with_capacity(dim.edges());
        for e in 0..dim.edges() {
            let (axis, b, c) = edge_axes(e);
            let sb = (e & 1) as i8;
            let sc = ((e >> 1) & 1) as i8;
            let db = if sb == 0 { -1 } else { 1 };
            let dc = if sc == 0 { -1 } else { 1 };
            let share = |ob: i8, oc: i8| {
                let mut o = [0i8; 3];
                o[b] = ob;
                o[c] = oc;
                let nb = if ob != 0 { 1 - sb } else { sb };
                let nc = if oc != 0 { 1 - sc } else { sc };
                EdgeShare {
                    slot: slot_of(&o),
                    edge: (4 * axis as i8 + nb + 2 * nc) as u8,
                }
            };
            edge_shares.push([share(db, 0), share(0, dc), share(db, dc)]);
        }

        let stencils = (1..=MAX_STENCIL_ORDER)
            .map(|order| Stencil::build(n, order, &neighbor_offsets))
            .collect();

        TopologyTables {
            dim,
            neighbor_offsets,
            opposite,
            child_rules,
            edge_shares,
            stencils,
        }
    }

    /// Dimensionality these tables describe.
    pub fn dimension(&self) -> Dimension {
        self.dim
    }

    /// Offset of neighbor slot `slot`.
    #[inline]
    pub fn neighbor_offset(&self, slot: usize) -> Offset {
        self.neighbor_offsets[slot]
    }

    /// Slot that points back from the neighbor in slot `slot`.
    #[inline]
    pub fn opposite(&self, slot: usize) -> usize {
        self.opposite[slot] as usize
    }

    /// Neighbor slot holding `offset`, if it is a unit offset.
    pub fn slot_of(&self, offset: &Offset) -> Option<usize> {
        self.neighbor_offsets.iter().position(|o| o == offset)
    }

    /// Derivation rule for neighbor slot `slot` of child `child`.
    #[inline]
    pub fn child_rule(&self, child: usize, slot: usize) -> ChildNeighborRule {
        self.child_rules[child * self.dim.neighbors() + slot]
    }

    /// Same-level cells sharing local edge `edge` of a hexahedron.
    #[inline]
    pub fn edge_shares(&self, edge: usize) -> &[EdgeShare; 3] {
        &self.edge_shares[edge]
    }

    /// Neighbor slot across facet `facet`.
    #[inline]
    pub const fn facet_neighbor(&self, facet: usize) -> usize {
        facet
    }

    /// Local facet index on the cell across facet `facet`.
    #[inline]
    pub const fn opposite_facet(&self, facet: usize) -> usize {
        facet ^ 1
    }

    /// Stencil of neighborhood order `order` (1..=3).
    pub fn stencil(&self, order: usize) -> Option<&Stencil> {
        order.checked_sub(1).and_then(|i| self.stencils.get(i))
    }
}

/// Low/high bit per axis of child (or corner) `k`: bit `axis` of `k`.
#[inline]
pub const fn child_bits(k: usize) -> [u8; 3] {
    [(k & 1) as u8, ((k >> 1) & 1) as u8, ((k >> 2) & 1) as u8]
}

/// Inverse of [`child_bits`].
#[inline]
pub fn child_from_bits<T: Copy + Into<i64>>(bits: &[T; 3]) -> usize {
    bits.iter()
        .enumerate()
        .map(|(a, &b)| ((b.into() & 1) as usize) << a)
        .sum()
}

/// Axis an edge runs along, and the two transverse axes in ascending order.
#[inline]
pub const fn edge_axes(edge: usize) -> (usize, usize, usize) {
    match edge / 4 {
        0 => (0, 1, 2),
        1 => (1, 0, 2),
        _ => (2, 0, 1),
    }
}

fn cube_offsets(dim: usize, k: i8) -> Vec<Offset> {
    (0..dim)
        .map(|_| -k..=k)
        .multi_cartesian_product()
        .filter(|v| v.iter().any(|&c| c != 0))
        .map(|v| {
            let mut o = [0i8; 3];
            o[..dim].copy_from_slice(&v);
            o
        })
        .collect()
}

fn cube_position(dim: usize, order: usize, o: &Offset) -> usize {
    let width = 2 * order + 1;
    o[..dim]
        .iter()
        .fold(0usize, |acc, &c| acc * width + (c as i64 + order as i64) as usize)
}
